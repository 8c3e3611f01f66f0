//! Holder for the live agent connection.
//!
//! The registry is the only place that knows whether the remote is reachable.
//! Reconnection policy belongs to whoever supplies handles; nothing here
//! blocks or retries.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::client::ProfilerClient;

pub type ConnectionHandle = Arc<dyn ProfilerClient>;

#[derive(Default)]
pub struct ConnectionRegistry {
    active: RwLock<Option<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active capability. `None` marks the remote unreachable.
    pub fn set_connection(&self, handle: Option<ConnectionHandle>) {
        let connected = handle.is_some();
        let mut active = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let was_connected = active.is_some();
        *active = handle;
        drop(active);

        info!(connected, was_connected, "Agent connection replaced");
    }

    /// Returns a clone of the active handle; callers drop it when done.
    pub fn current_connection(&self) -> Option<ConnectionHandle> {
        self.active
            .read()
            .map(|active| active.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_connected(&self) -> bool {
        self.current_connection().is_some()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connected", &self.is_connected())
            .finish()
    }
}
