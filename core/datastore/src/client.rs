//! The remote agent capability the datastore polls.
//!
//! Implementations live with the transport (device bridge, RPC stub, test
//! fake). Every call may fail with a [`TransportError`]; the datastore treats
//! a failure as "no data this round" and never surfaces it to its own callers.

use profiler_datastore_protocol::{
    AgentStatusRequest, AgentStatusResponse, BeginSessionRequest, BytesRequest, BytesResponse,
    Device, EndSessionRequest, Process, Session, TimeRequest, TimeResponse, VersionRequest,
    VersionResponse,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("agent unreachable: {0}")]
    Unavailable(String),

    #[error("agent call timed out after {0}ms")]
    Timeout(u64),

    #[error("agent returned a malformed response: {0}")]
    Malformed(String),
}

/// Query surface of a profiling agent running on a device.
///
/// Bounded timeouts are the implementor's job.
pub trait ProfilerClient: Send + Sync {
    fn fetch_time(&self, request: &TimeRequest) -> Result<TimeResponse, TransportError>;

    fn fetch_version(&self, request: &VersionRequest) -> Result<VersionResponse, TransportError>;

    fn fetch_devices(&self) -> Result<Vec<Device>, TransportError>;

    fn fetch_processes(&self, device_id: i64) -> Result<Vec<Process>, TransportError>;

    fn fetch_bytes(&self, request: &BytesRequest) -> Result<BytesResponse, TransportError>;

    /// Returns the session the agent started, or `None` if it declined.
    fn begin_remote_session(
        &self,
        request: &BeginSessionRequest,
    ) -> Result<Option<Session>, TransportError>;

    /// Returns the closed session, or `None` if the agent did not know it.
    fn end_remote_session(
        &self,
        request: &EndSessionRequest,
    ) -> Result<Option<Session>, TransportError>;

    fn fetch_agent_status(
        &self,
        request: &AgentStatusRequest,
    ) -> Result<AgentStatusResponse, TransportError>;
}
