//! Profiler datastore.
//!
//! Sits between a profiling agent on a device and an IDE client: polls the
//! agent, reconciles device/process state across polls, caches byte payloads
//! and answers typed queries from the last known state, even after the agent
//! connection drops.
//!
//! The agent is reached through an injected [`ProfilerClient`]; this crate
//! does not implement any device transport.

pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod ipc;
pub mod poller;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod state;

#[cfg(test)]
mod testing;

pub use cache::{ByteCache, CacheError, MemoryByteCache};
pub use client::{ProfilerClient, TransportError};
pub use db::Db;
pub use poller::{Poller, PollerHandle, PollerStatus, TickOutcome};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use service::ProfilerService;
