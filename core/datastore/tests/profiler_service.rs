use profiler_datastore::{
    ConnectionHandle, MemoryByteCache, ProfilerClient, ProfilerService, TransportError,
};
use profiler_datastore_protocol::{
    AgentStatusRequest, AgentStatusResponse, BeginSessionRequest, BytesRequest, BytesResponse,
    Device, EndSessionRequest, GetProcessesRequest, Process, ProcessState, Session, TimeRequest,
    TimeResponse, VersionRequest, VersionResponse, SESSION_END_UNBOUNDED,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DEVICE_ID: i64 = 1234;
const BYTES_ID_1: &str = "0123456789";
const BYTES_ID_2: &str = "9876543210";
const BAD_ID: &str = "0000000000";

fn device() -> Device {
    Device {
        device_id: DEVICE_ID,
        serial: "SomeSerialId".to_string(),
        boot_id: "SOME BOOT ID".to_string(),
    }
}

fn process(pid: i32, name: &str, state: ProcessState) -> Process {
    Process {
        device_id: DEVICE_ID,
        pid,
        name: name.to_string(),
        state,
    }
}

fn session(session_id: i64, pid: i32, start: i64, end: i64) -> Session {
    Session {
        session_id,
        device_id: DEVICE_ID,
        pid,
        start_timestamp: start,
        end_timestamp: end,
    }
}

/// Agent double: one device, a swappable process list, two known payloads.
struct FakeAgent {
    devices: Mutex<Vec<Device>>,
    processes: Mutex<Vec<Process>>,
    session: Mutex<Option<Session>>,
    bytes_calls: AtomicUsize,
}

impl FakeAgent {
    fn new() -> Self {
        Self {
            devices: Mutex::new(vec![device()]),
            processes: Mutex::new(vec![process(1234, "INITIAL", ProcessState::Alive)]),
            session: Mutex::new(None),
            bytes_calls: AtomicUsize::new(0),
        }
    }

    fn set_processes(&self, processes: Vec<Process>) {
        *self.processes.lock().expect("processes") = processes;
    }

    fn set_session(&self, session: Session) {
        *self.session.lock().expect("session") = Some(session);
    }
}

impl ProfilerClient for FakeAgent {
    fn fetch_time(&self, _request: &TimeRequest) -> Result<TimeResponse, TransportError> {
        Ok(TimeResponse::default())
    }

    fn fetch_version(&self, _request: &VersionRequest) -> Result<VersionResponse, TransportError> {
        Ok(VersionResponse::default())
    }

    fn fetch_devices(&self) -> Result<Vec<Device>, TransportError> {
        Ok(self.devices.lock().expect("devices").clone())
    }

    fn fetch_processes(&self, _device_id: i64) -> Result<Vec<Process>, TransportError> {
        Ok(self.processes.lock().expect("processes").clone())
    }

    fn fetch_bytes(&self, request: &BytesRequest) -> Result<BytesResponse, TransportError> {
        self.bytes_calls.fetch_add(1, Ordering::SeqCst);
        let payloads: HashMap<&str, &[u8]> =
            HashMap::from([(BYTES_ID_1, &b"FILE_1"[..]), (BYTES_ID_2, &b"FILE_2"[..])]);
        Ok(payloads
            .get(request.id.as_str())
            .map(|contents| BytesResponse::new(contents.to_vec()))
            .unwrap_or_default())
    }

    fn begin_remote_session(
        &self,
        _request: &BeginSessionRequest,
    ) -> Result<Option<Session>, TransportError> {
        Ok(self.session.lock().expect("session").clone())
    }

    fn end_remote_session(
        &self,
        _request: &EndSessionRequest,
    ) -> Result<Option<Session>, TransportError> {
        Ok(self.session.lock().expect("session").clone())
    }

    fn fetch_agent_status(
        &self,
        _request: &AgentStatusRequest,
    ) -> Result<AgentStatusResponse, TransportError> {
        Ok(AgentStatusResponse::default())
    }
}

fn setup() -> (ProfilerService, Arc<FakeAgent>) {
    let service = ProfilerService::new(Arc::new(MemoryByteCache::new()));
    let agent = Arc::new(FakeAgent::new());
    service.start_monitoring(Arc::clone(&agent) as ConnectionHandle);
    service.tick();
    (service, agent)
}

fn processes(service: &ProfilerService) -> Vec<Process> {
    service
        .get_processes(&GetProcessesRequest {
            device_id: DEVICE_ID,
        })
        .processes
}

#[test]
fn get_times_and_version_pass_through() {
    let (service, _agent) = setup();
    assert_eq!(
        service.get_current_time(&TimeRequest::default()),
        TimeResponse::default()
    );
    assert_eq!(
        service.get_version(&VersionRequest::default()),
        VersionResponse::default()
    );
}

#[test]
fn get_devices() {
    let (service, _agent) = setup();
    assert_eq!(service.get_devices().devices, vec![device()]);
}

#[test]
fn get_processes() {
    let (service, _agent) = setup();
    assert_eq!(
        processes(&service),
        vec![process(1234, "INITIAL", ProcessState::Alive)]
    );
}

#[test]
fn replaced_process_list_marks_previous_process_dead() {
    let (service, agent) = setup();
    agent.set_processes(vec![process(4321, "FINAL", ProcessState::Alive)]);
    service.tick();

    assert_eq!(
        processes(&service),
        vec![
            process(1234, "INITIAL", ProcessState::Dead),
            process(4321, "FINAL", ProcessState::Alive),
        ]
    );
}

#[test]
fn disconnect_keeps_last_known_state() {
    let (service, _agent) = setup();
    service.registry().set_connection(None);
    service.tick();

    assert_eq!(service.get_devices().devices, vec![device()]);
    assert_eq!(
        processes(&service),
        vec![process(1234, "INITIAL", ProcessState::Alive)]
    );
}

#[test]
fn stopping_the_agent_marks_processes_dead() {
    let (service, _agent) = setup();
    service.stop_monitoring();
    service.tick();

    assert_eq!(
        processes(&service),
        vec![process(1234, "INITIAL", ProcessState::Dead)]
    );
}

#[test]
fn three_tick_process_history() {
    let (service, agent) = setup();
    agent.set_processes(vec![process(10, "A", ProcessState::Alive)]);
    service.tick();
    // pid 1234 from setup is already DEAD here; keep the assertions on 10/20.
    let tail = |service: &ProfilerService| -> Vec<Process> {
        processes(service)
            .into_iter()
            .filter(|p| p.pid != 1234)
            .collect()
    };
    assert_eq!(tail(&service), vec![process(10, "A", ProcessState::Alive)]);

    agent.set_processes(Vec::new());
    service.tick();
    assert_eq!(tail(&service), vec![process(10, "A", ProcessState::Dead)]);

    agent.set_processes(vec![process(20, "B", ProcessState::Alive)]);
    service.tick();
    assert_eq!(
        tail(&service),
        vec![
            process(10, "A", ProcessState::Dead),
            process(20, "B", ProcessState::Alive),
        ]
    );
}

#[test]
fn device_set_never_shrinks() {
    let (service, agent) = setup();
    let second = Device {
        device_id: 5678,
        serial: "Other".to_string(),
        boot_id: "OTHER BOOT".to_string(),
    };
    *agent.devices.lock().expect("devices") = vec![second.clone()];
    service.tick();
    *agent.devices.lock().expect("devices") = Vec::new();
    service.tick();

    assert_eq!(service.get_devices().devices, vec![device(), second]);
}

#[test]
fn unchanged_polls_are_idempotent() {
    let (service, _agent) = setup();
    let devices = service.get_devices();
    let before = processes(&service);
    service.tick();
    service.tick();
    assert_eq!(service.get_devices(), devices);
    assert_eq!(processes(&service), before);
}

#[test]
fn get_file() {
    let (service, _agent) = setup();
    assert_eq!(
        service.get_bytes(&BytesRequest::new(BYTES_ID_1)),
        BytesResponse::new(b"FILE_1".to_vec())
    );
    assert_eq!(
        service.get_bytes(&BytesRequest::new(BYTES_ID_2)),
        BytesResponse::new(b"FILE_2".to_vec())
    );
    assert_eq!(
        service.get_bytes(&BytesRequest::new(BAD_ID)),
        BytesResponse::default()
    );
}

#[test]
fn get_file_cached_after_disconnect() {
    let (service, agent) = setup();
    service.get_bytes(&BytesRequest::new(BYTES_ID_1));
    service.get_bytes(&BytesRequest::new(BYTES_ID_2));
    let calls = agent.bytes_calls.load(Ordering::SeqCst);

    service.registry().set_connection(None);

    assert_eq!(
        service.get_bytes(&BytesRequest::new(BYTES_ID_1)),
        BytesResponse::new(b"FILE_1".to_vec())
    );
    assert_eq!(
        service.get_bytes(&BytesRequest::new(BYTES_ID_2)),
        BytesResponse::new(b"FILE_2".to_vec())
    );
    assert_eq!(
        service.get_bytes(&BytesRequest::new(BAD_ID)),
        BytesResponse::default()
    );
    assert_eq!(agent.bytes_calls.load(Ordering::SeqCst), calls);
}

#[test]
fn get_sessions_after_begin_end_session() {
    let (service, agent) = setup();
    assert!(service.get_sessions().sessions.is_empty());

    agent.set_session(session(1, 1234, 100, SESSION_END_UNBOUNDED));
    service.begin_session(&BeginSessionRequest::default());
    assert_eq!(
        service.get_sessions().sessions,
        vec![session(1, 1234, 100, SESSION_END_UNBOUNDED)]
    );

    agent.set_session(session(2, 4321, 150, SESSION_END_UNBOUNDED));
    service.begin_session(&BeginSessionRequest::default());
    assert_eq!(
        service.get_sessions().sessions,
        vec![
            session(1, 1234, 100, SESSION_END_UNBOUNDED),
            session(2, 4321, 150, SESSION_END_UNBOUNDED),
        ]
    );

    agent.set_session(session(1, 1234, 100, 200));
    service.end_session(&EndSessionRequest::default());
    assert_eq!(
        service.get_sessions().sessions,
        vec![
            session(1, 1234, 100, 200),
            session(2, 4321, 150, SESSION_END_UNBOUNDED),
        ]
    );

    agent.set_session(session(2, 4321, 150, 250));
    service.end_session(&EndSessionRequest::default());
    assert_eq!(
        service.get_sessions().sessions,
        vec![session(1, 1234, 100, 200), session(2, 4321, 150, 250)]
    );
}
