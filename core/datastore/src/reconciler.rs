//! Merges a freshly polled agent snapshot into the durable view.
//!
//! Devices are never dropped, and a process the agent stops reporting is kept
//! as DEAD so clients retain last-known process history. Sessions are not
//! polled; they change only through begin/end calls on the service.

use std::collections::{HashMap, HashSet};

use profiler_datastore_protocol::{Device, Process, ProcessState};

/// The query-visible result of all ticks so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolledState {
    pub devices: Vec<Device>,
    pub processes: Vec<Process>,
}

impl PolledState {
    pub fn processes_for_device(&self, device_id: i64) -> Vec<Process> {
        self.processes
            .iter()
            .filter(|process| process.device_id == device_id)
            .cloned()
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.processes.iter().filter(|p| p.is_alive()).count()
    }
}

/// What one tick read from the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub devices: Vec<Device>,
    pub processes: Vec<Process>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    pub devices_added: usize,
    pub processes_added: usize,
    pub processes_died: usize,
    pub processes_revived: usize,
    pub processes_updated: usize,
}

impl ReconcileDiff {
    pub fn is_empty(&self) -> bool {
        *self == ReconcileDiff::default()
    }
}

pub fn reconcile(previous: &PolledState, snapshot: &RemoteSnapshot) -> PolledState {
    reconcile_with_diff(previous, snapshot).0
}

pub fn reconcile_with_diff(
    previous: &PolledState,
    snapshot: &RemoteSnapshot,
) -> (PolledState, ReconcileDiff) {
    let mut diff = ReconcileDiff::default();

    let mut devices = previous.devices.clone();
    let mut known_devices: HashSet<i64> = devices.iter().map(|d| d.device_id).collect();
    for device in &snapshot.devices {
        if known_devices.insert(device.device_id) {
            devices.push(device.clone());
            diff.devices_added = diff.devices_added.saturating_add(1);
        }
    }

    // Later duplicates in one snapshot win, but keep the first position.
    let mut reported: HashMap<(i64, i32), &Process> = HashMap::new();
    let mut reported_order: Vec<(i64, i32)> = Vec::new();
    for process in &snapshot.processes {
        if reported.insert(process.identity(), process).is_none() {
            reported_order.push(process.identity());
        }
    }

    let mut processes = Vec::with_capacity(previous.processes.len() + reported_order.len());
    let mut carried: HashSet<(i64, i32)> = HashSet::new();
    for existing in &previous.processes {
        carried.insert(existing.identity());
        let next = match reported.get(&existing.identity()) {
            Some(current) => {
                if !existing.is_alive() && current.is_alive() {
                    diff.processes_revived = diff.processes_revived.saturating_add(1);
                } else if existing != *current {
                    diff.processes_updated = diff.processes_updated.saturating_add(1);
                }
                (*current).clone()
            }
            None => {
                if existing.is_alive() {
                    diff.processes_died = diff.processes_died.saturating_add(1);
                }
                existing.with_state(ProcessState::Dead)
            }
        };
        processes.push(next);
    }

    for identity in reported_order {
        if carried.contains(&identity) {
            continue;
        }
        if let Some(process) = reported.get(&identity) {
            processes.push((*process).clone());
            diff.processes_added = diff.processes_added.saturating_add(1);
        }
    }

    (PolledState { devices, processes }, diff)
}

/// Forces every known process DEAD, used when an agent is shut down on purpose.
pub fn mark_all_dead(previous: &PolledState) -> PolledState {
    PolledState {
        devices: previous.devices.clone(),
        processes: previous
            .processes
            .iter()
            .map(|process| process.with_state(ProcessState::Dead))
            .collect(),
    }
}
