//! IPC protocol and data types for the profiler datastore.
//!
//! This crate is shared by the datastore and its clients to prevent schema
//! drift. The datastore remains the authority on validation, but clients can
//! reuse the same types to construct valid requests.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_BYTES_ID_LEN: usize = 256;

/// End timestamp carried by a session that has not ended yet.
pub const SESSION_END_UNBOUNDED: i64 = i64::MAX;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetHealth,
    GetCurrentTime,
    GetVersion,
    GetDevices,
    GetProcesses,
    GetBytes,
    GetAgentStatus,
    BeginSession,
    EndSession,
    GetSessions,
    GetSession,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data model
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Device {
    pub device_id: i64,
    pub serial: String,
    pub boot_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    #[default]
    Alive,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Process {
    pub device_id: i64,
    pub pid: i32,
    pub name: String,
    #[serde(default)]
    pub state: ProcessState,
}

impl Process {
    pub fn identity(&self) -> (i64, i32) {
        (self.device_id, self.pid)
    }

    pub fn is_alive(&self) -> bool {
        self.state == ProcessState::Alive
    }

    pub fn with_state(&self, state: ProcessState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    pub session_id: i64,
    pub device_id: i64,
    pub pid: i32,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_timestamp == SESSION_END_UNBOUNDED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Unspecified,
    Attached,
    Detached,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests and responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TimeRequest {
    #[serde(default)]
    pub device_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimeResponse {
    pub timestamp_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct VersionRequest {
    #[serde(default)]
    pub device_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetDevicesResponse {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GetProcessesRequest {
    pub device_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetProcessesResponse {
    pub processes: Vec<Process>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BytesRequest {
    pub id: String,
}

impl BytesRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.id.trim().is_empty() {
            return Err(ErrorInfo::new("missing_field", "id is required"));
        }
        if self.id.len() > MAX_BYTES_ID_LEN {
            return Err(ErrorInfo::new(
                "invalid_id",
                format!("id must be {} characters or fewer", MAX_BYTES_ID_LEN),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BytesResponse {
    pub contents: Vec<u8>,
}

impl BytesResponse {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AgentStatusRequest {
    pub device_id: i64,
    pub pid: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentStatusResponse {
    pub status: AgentState,
    pub is_agent_attachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BeginSessionRequest {
    pub device_id: i64,
    pub pid: i32,
}

impl BeginSessionRequest {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.pid <= 0 {
            return Err(ErrorInfo::new("invalid_pid", "pid is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BeginSessionResponse {
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EndSessionRequest {
    pub device_id: i64,
    pub session_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndSessionResponse {
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetSessionsResponse {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GetSessionRequest {
    pub session_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GetSessionResponse {
    pub session: Option<Session>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Param parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Decodes request params, treating a missing payload as the default request.
pub fn parse_params<T>(params: Option<Value>) -> Result<T, ErrorInfo>
where
    T: DeserializeOwned + Default,
{
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => decode(value),
    }
}

/// Decodes request params that have no sensible default.
pub fn parse_required_params<T>(params: Option<Value>, field: &str) -> Result<T, ErrorInfo>
where
    T: DeserializeOwned,
{
    match params {
        None | Some(Value::Null) => Err(ErrorInfo::new(
            "invalid_params",
            format!("{} is required", field),
        )),
        Some(value) => decode(value),
    }
}

pub fn parse_bytes_request(params: Option<Value>) -> Result<BytesRequest, ErrorInfo> {
    let request: BytesRequest = parse_required_params(params, "id")?;
    request.validate()?;
    Ok(request)
}

pub fn parse_begin_session(params: Option<Value>) -> Result<BeginSessionRequest, ErrorInfo> {
    let request: BeginSessionRequest = parse_required_params(params, "pid")?;
    request.validate()?;
    Ok(request)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ErrorInfo> {
    if !value.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }
    serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("params are invalid JSON: {}", err),
        )
    })
}
