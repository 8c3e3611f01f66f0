//! The datastore's query surface.
//!
//! Every operation answers from the durable view and the byte cache. Only
//! pass-through calls, cache misses and session begin/end touch the agent,
//! and their failures degrade to default responses instead of errors.

use std::sync::Arc;

use profiler_datastore_protocol::{
    AgentStatusRequest, AgentStatusResponse, BeginSessionRequest, BeginSessionResponse,
    BytesRequest, BytesResponse, EndSessionRequest, EndSessionResponse, GetDevicesResponse,
    GetProcessesRequest, GetProcessesResponse, GetSessionRequest, GetSessionResponse,
    GetSessionsResponse, Session, TimeRequest, TimeResponse, VersionRequest, VersionResponse,
    SESSION_END_UNBOUNDED,
};
use tracing::{debug, info, warn};

use crate::cache::ByteCache;
use crate::poller::{Poller, PollerStatus, TickOutcome};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::state::SharedState;

pub struct ProfilerService {
    registry: Arc<ConnectionRegistry>,
    state: Arc<SharedState>,
    cache: Arc<dyn ByteCache>,
    poller: Arc<Poller>,
}

enum EndOutcome {
    Closed(Session),
    AlreadyClosed(Session),
}

impl ProfilerService {
    pub fn new(cache: Arc<dyn ByteCache>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = Arc::new(SharedState::new());
        let poller = Arc::new(Poller::new(Arc::clone(&registry), Arc::clone(&state)));
        Self {
            registry,
            state,
            cache,
            poller,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn start_monitoring(&self, client: ConnectionHandle) {
        self.registry.set_connection(Some(client));
    }

    pub fn stop_monitoring(&self) {
        self.poller.stop_monitoring();
    }

    pub fn tick(&self) -> TickOutcome {
        self.poller.tick()
    }

    pub fn poller_status(&self) -> PollerStatus {
        self.poller.status()
    }

    pub fn is_connected(&self) -> bool {
        self.registry.is_connected()
    }

    pub fn cached_payload_count(&self) -> Option<usize> {
        match self.cache.len() {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(error = %err, "Failed to count cached payloads");
                None
            }
        }
    }

    pub fn get_current_time(&self, request: &TimeRequest) -> TimeResponse {
        let Some(client) = self.registry.current_connection() else {
            return TimeResponse::default();
        };
        client.fetch_time(request).unwrap_or_else(|err| {
            warn!(error = %err, "Time query failed; returning default");
            TimeResponse::default()
        })
    }

    pub fn get_version(&self, request: &VersionRequest) -> VersionResponse {
        let Some(client) = self.registry.current_connection() else {
            return VersionResponse::default();
        };
        client.fetch_version(request).unwrap_or_else(|err| {
            warn!(error = %err, "Version query failed; returning default");
            VersionResponse::default()
        })
    }

    pub fn get_agent_status(&self, request: &AgentStatusRequest) -> AgentStatusResponse {
        let Some(client) = self.registry.current_connection() else {
            return AgentStatusResponse::default();
        };
        client.fetch_agent_status(request).unwrap_or_else(|err| {
            warn!(
                error = %err,
                device_id = request.device_id,
                pid = request.pid,
                "Agent status query failed; returning default"
            );
            AgentStatusResponse::default()
        })
    }

    pub fn get_devices(&self) -> GetDevicesResponse {
        GetDevicesResponse {
            devices: self.state.polled_snapshot().devices.clone(),
        }
    }

    pub fn get_processes(&self, request: &GetProcessesRequest) -> GetProcessesResponse {
        GetProcessesResponse {
            processes: self
                .state
                .polled_snapshot()
                .processes_for_device(request.device_id),
        }
    }

    /// Serves from the cache, fetching and caching on a miss while connected.
    ///
    /// Whatever the agent returns is cached, including an empty payload for
    /// an id it does not know, so a given id costs at most one remote call.
    pub fn get_bytes(&self, request: &BytesRequest) -> BytesResponse {
        match self.cache.get(&request.id) {
            Ok(Some(contents)) => return BytesResponse { contents },
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, id = %request.id, "Byte cache read failed; treating as miss");
            }
        }

        let Some(client) = self.registry.current_connection() else {
            debug!(id = %request.id, "Byte cache miss with no agent connection");
            return BytesResponse::default();
        };

        match client.fetch_bytes(request) {
            Ok(response) => {
                if let Err(err) = self.cache.put(&request.id, &response.contents) {
                    warn!(error = %err, id = %request.id, "Failed to cache fetched bytes");
                }
                response
            }
            Err(err) => {
                warn!(error = %err, id = %request.id, "Byte fetch failed; returning default");
                BytesResponse::default()
            }
        }
    }

    pub fn begin_session(&self, request: &BeginSessionRequest) -> BeginSessionResponse {
        let Some(client) = self.registry.current_connection() else {
            warn!(
                device_id = request.device_id,
                pid = request.pid,
                "Cannot begin session without an agent connection"
            );
            return BeginSessionResponse::default();
        };

        let remote = match client.begin_remote_session(request) {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(pid = request.pid, "Agent declined to begin a session");
                return BeginSessionResponse::default();
            }
            Err(err) => {
                warn!(error = %err, pid = request.pid, "Begin session failed");
                return BeginSessionResponse::default();
            }
        };

        let session = Session {
            end_timestamp: SESSION_END_UNBOUNDED,
            ..remote
        };
        if !self.state.append_session(session.clone()) {
            warn!(
                session_id = session.session_id,
                "Agent reused an existing session id; keeping the stored session"
            );
            return BeginSessionResponse {
                session: self.state.find_session(session.session_id),
            };
        }

        info!(
            session_id = session.session_id,
            device_id = session.device_id,
            pid = session.pid,
            start_timestamp = session.start_timestamp,
            "Session begun"
        );
        BeginSessionResponse {
            session: Some(session),
        }
    }

    /// Closes the stored session matching the one the agent reports ended.
    pub fn end_session(&self, request: &EndSessionRequest) -> EndSessionResponse {
        let Some(client) = self.registry.current_connection() else {
            warn!(
                session_id = request.session_id,
                "Cannot end session without an agent connection"
            );
            return EndSessionResponse::default();
        };

        let remote = match client.end_remote_session(request) {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(
                    session_id = request.session_id,
                    "Agent did not report an ended session"
                );
                return EndSessionResponse::default();
            }
            Err(err) => {
                warn!(error = %err, session_id = request.session_id, "End session failed");
                return EndSessionResponse::default();
            }
        };

        if remote.end_timestamp == SESSION_END_UNBOUNDED {
            warn!(
                session_id = remote.session_id,
                "Agent reported an ended session without an end timestamp"
            );
            return EndSessionResponse::default();
        }

        let outcome = self.state.update_session(remote.session_id, |stored| {
            if stored.is_open() {
                stored.end_timestamp = remote.end_timestamp;
                EndOutcome::Closed(stored.clone())
            } else {
                EndOutcome::AlreadyClosed(stored.clone())
            }
        });

        match outcome {
            Some(EndOutcome::Closed(session)) => {
                info!(
                    session_id = session.session_id,
                    end_timestamp = session.end_timestamp,
                    "Session ended"
                );
                EndSessionResponse {
                    session: Some(session),
                }
            }
            Some(EndOutcome::AlreadyClosed(session)) => {
                warn!(
                    session_id = session.session_id,
                    "Session already ended; keeping first end timestamp"
                );
                EndSessionResponse {
                    session: Some(session),
                }
            }
            None => {
                warn!(
                    session_id = remote.session_id,
                    "Ignoring end for a session that was never begun"
                );
                EndSessionResponse::default()
            }
        }
    }

    pub fn get_sessions(&self) -> GetSessionsResponse {
        GetSessionsResponse {
            sessions: self.state.sessions_snapshot(),
        }
    }

    pub fn get_session(&self, request: &GetSessionRequest) -> GetSessionResponse {
        GetSessionResponse {
            session: self.state.find_session(request.session_id),
        }
    }
}
