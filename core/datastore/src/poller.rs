//! Periodic agent poll.
//!
//! Each tick borrows the registry's connection, reads devices and processes,
//! reconciles them into the durable view and publishes the result. A tick
//! without a connection, or with any transport failure, leaves the durable
//! view untouched; the next tick simply tries again.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::{ProfilerClient, TransportError};
use crate::reconciler::{mark_all_dead, reconcile_with_diff, ReconcileDiff, RemoteSnapshot};
use crate::registry::ConnectionRegistry;
use crate::state::SharedState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No live connection; nothing was read.
    Skipped,
    /// The agent failed mid-tick; nothing was committed.
    Failed(TransportError),
    Committed(ReconcileDiff),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerStatus {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub failed_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct Poller {
    registry: Arc<ConnectionRegistry>,
    state: Arc<SharedState>,
    // Held for the whole tick so ticks never overlap.
    tick_guard: Mutex<()>,
    status: Mutex<PollerStatus>,
}

impl Poller {
    pub fn new(registry: Arc<ConnectionRegistry>, state: Arc<SharedState>) -> Self {
        Self {
            registry,
            state,
            tick_guard: Mutex::new(()),
            status: Mutex::new(PollerStatus::default()),
        }
    }

    pub fn tick(&self) -> TickOutcome {
        let _in_flight = self
            .tick_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let outcome = match self.registry.current_connection() {
            None => TickOutcome::Skipped,
            Some(client) => match fetch_snapshot(client.as_ref()) {
                Ok(snapshot) => {
                    let previous = self.state.polled_snapshot();
                    let (next, diff) = reconcile_with_diff(&previous, &snapshot);
                    if !diff.is_empty() {
                        debug!(
                            devices_added = diff.devices_added,
                            processes_added = diff.processes_added,
                            processes_died = diff.processes_died,
                            processes_revived = diff.processes_revived,
                            processes_updated = diff.processes_updated,
                            "Poll reconciled"
                        );
                    }
                    self.state.commit_polled(next);
                    TickOutcome::Committed(diff)
                }
                Err(err) => {
                    warn!(error = %err, "Agent poll failed; keeping last known state");
                    TickOutcome::Failed(err)
                }
            },
        };

        self.record(&outcome);
        outcome
    }

    /// Clears the connection and marks every known process DEAD.
    ///
    /// Runs under the tick guard so an in-flight tick cannot re-publish the
    /// stopped agent's processes as alive.
    pub fn stop_monitoring(&self) {
        let _in_flight = self
            .tick_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.registry.set_connection(None);
        let previous = self.state.polled_snapshot();
        let next = mark_all_dead(&previous);
        info!(
            processes_died = previous.alive_count(),
            "Agent monitoring stopped"
        );
        self.state.commit_polled(next);
    }

    pub fn status(&self) -> PollerStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    /// Runs `tick` every `interval` on a background thread until the handle
    /// is stopped or dropped.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> io::Result<PollerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let poller = Arc::clone(self);
        let join = thread::Builder::new()
            .name("profiler-poller".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        poller.tick();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!("Poller stopped");
                        break;
                    }
                }
            })?;

        Ok(PollerHandle {
            stop: Some(stop_tx),
            join: Some(join),
        })
    }

    fn record(&self, outcome: &TickOutcome) {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        status.ticks = status.ticks.saturating_add(1);
        match outcome {
            TickOutcome::Skipped => {
                status.skipped_ticks = status.skipped_ticks.saturating_add(1);
            }
            TickOutcome::Failed(err) => {
                status.failed_ticks = status.failed_ticks.saturating_add(1);
                status.last_error = Some(err.to_string());
            }
            TickOutcome::Committed(_) => {
                status.last_success_at = Some(Utc::now());
            }
        }
    }
}

fn fetch_snapshot(client: &dyn ProfilerClient) -> Result<RemoteSnapshot, TransportError> {
    let devices = client.fetch_devices()?;
    let mut processes = Vec::new();
    for device in &devices {
        processes.extend(client.fetch_processes(device.device_id)?);
    }
    Ok(RemoteSnapshot { devices, processes })
}

pub struct PollerHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("Poller thread panicked");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
