//! Scriptable agent used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use profiler_datastore_protocol::{
    AgentState, AgentStatusRequest, AgentStatusResponse, BeginSessionRequest, BytesRequest,
    BytesResponse, Device, EndSessionRequest, Process, Session, TimeRequest, TimeResponse,
    VersionRequest, VersionResponse,
};

use crate::client::{ProfilerClient, TransportError};

pub const DEVICE_ID: i64 = 1234;

pub fn device() -> Device {
    Device {
        device_id: DEVICE_ID,
        serial: "SomeSerialId".to_string(),
        boot_id: "SOME BOOT ID".to_string(),
    }
}

pub fn process(pid: i32, name: &str) -> Process {
    Process {
        device_id: DEVICE_ID,
        pid,
        name: name.to_string(),
        ..Process::default()
    }
}

#[derive(Default)]
struct Script {
    devices: Vec<Device>,
    processes: HashMap<i64, Vec<Process>>,
    payloads: HashMap<String, Vec<u8>>,
    session: Option<Session>,
    failing: bool,
}

#[derive(Default)]
pub struct FakeAgent {
    script: Mutex<Script>,
    bytes_calls: AtomicUsize,
    process_calls: AtomicUsize,
}

impl FakeAgent {
    pub fn with_device() -> Self {
        let agent = Self::default();
        agent.set_devices(vec![device()]);
        agent
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        self.script.lock().expect("script").devices = devices;
    }

    pub fn set_processes(&self, device_id: i64, processes: Vec<Process>) {
        self.script
            .lock()
            .expect("script")
            .processes
            .insert(device_id, processes);
    }

    pub fn set_payload(&self, id: &str, contents: &[u8]) {
        self.script
            .lock()
            .expect("script")
            .payloads
            .insert(id.to_string(), contents.to_vec());
    }

    pub fn set_session(&self, session: Option<Session>) {
        self.script.lock().expect("script").session = session;
    }

    pub fn set_failing(&self, failing: bool) {
        self.script.lock().expect("script").failing = failing;
    }

    pub fn bytes_calls(&self) -> usize {
        self.bytes_calls.load(Ordering::SeqCst)
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.script.lock().expect("script").failing {
            Err(TransportError::Unavailable("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ProfilerClient for FakeAgent {
    fn fetch_time(&self, _request: &TimeRequest) -> Result<TimeResponse, TransportError> {
        self.check()?;
        Ok(TimeResponse {
            timestamp_ns: 42_000,
        })
    }

    fn fetch_version(&self, _request: &VersionRequest) -> Result<VersionResponse, TransportError> {
        self.check()?;
        Ok(VersionResponse {
            version: "agent-1.0".to_string(),
        })
    }

    fn fetch_devices(&self) -> Result<Vec<Device>, TransportError> {
        self.check()?;
        Ok(self.script.lock().expect("script").devices.clone())
    }

    fn fetch_processes(&self, device_id: i64) -> Result<Vec<Process>, TransportError> {
        self.check()?;
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script
            .lock()
            .expect("script")
            .processes
            .get(&device_id)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_bytes(&self, request: &BytesRequest) -> Result<BytesResponse, TransportError> {
        self.check()?;
        self.bytes_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().expect("script");
        Ok(script
            .payloads
            .get(&request.id)
            .map(|contents| BytesResponse::new(contents.clone()))
            .unwrap_or_default())
    }

    fn begin_remote_session(
        &self,
        _request: &BeginSessionRequest,
    ) -> Result<Option<Session>, TransportError> {
        self.check()?;
        Ok(self.script.lock().expect("script").session.clone())
    }

    fn end_remote_session(
        &self,
        _request: &EndSessionRequest,
    ) -> Result<Option<Session>, TransportError> {
        self.check()?;
        Ok(self.script.lock().expect("script").session.clone())
    }

    fn fetch_agent_status(
        &self,
        _request: &AgentStatusRequest,
    ) -> Result<AgentStatusResponse, TransportError> {
        self.check()?;
        Ok(AgentStatusResponse {
            status: AgentState::Attached,
            is_agent_attachable: true,
        })
    }
}
