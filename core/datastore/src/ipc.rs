//! Newline-delimited JSON adapter over a Unix socket.
//!
//! One request per connection: read a line, dispatch it to the
//! [`ProfilerService`], write one response line. The service never fails, so
//! every error here is about the request itself.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use profiler_datastore_protocol::{
    parse_begin_session, parse_bytes_request, parse_params, parse_required_params,
    AgentStatusRequest, EndSessionRequest, ErrorInfo, GetProcessesRequest, GetSessionRequest,
    Method, Request, Response, TimeRequest, VersionRequest, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::service::ProfilerService;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

/// Accepts connections until the listener fails, one thread per connection.
pub fn serve(listener: UnixListener, service: Arc<ProfilerService>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let service = Arc::clone(&service);
                thread::spawn(move || handle_connection(stream, service));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept datastore connection");
            }
        }
    }
}

pub fn handle_connection(mut stream: UnixStream, service: Arc<ProfilerService>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    debug!(method = ?request.method, id = ?request.id, "Datastore request received");
    let response = handle_request(request, &service);
    if let Err(err) = write_response(&mut stream, response) {
        debug!(error = %err, "Failed to write response");
    }
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    decode_request(&buffer)
}

fn decode_request(buffer: &[u8]) -> Result<Request, ErrorInfo> {
    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer,
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

pub fn handle_request(request: Request, service: &ProfilerService) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    let id = request.id;
    let params = request.params;
    match request.method {
        Method::GetHealth => {
            let cached_payloads = service.cached_payload_count();
            let data = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "connected": service.is_connected(),
                "cached_payloads": cached_payloads,
                "poller": service.poller_status(),
            });
            Response::ok(id, data)
        }
        Method::GetCurrentTime => match parse_params::<TimeRequest>(params) {
            Ok(parsed) => respond(id, &service.get_current_time(&parsed)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::GetVersion => match parse_params::<VersionRequest>(params) {
            Ok(parsed) => respond(id, &service.get_version(&parsed)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::GetDevices => respond(id, &service.get_devices()),
        Method::GetProcesses => {
            match parse_required_params::<GetProcessesRequest>(params, "device_id") {
                Ok(parsed) => respond(id, &service.get_processes(&parsed)),
                Err(err) => Response::error_with_info(id, err),
            }
        }
        Method::GetBytes => match parse_bytes_request(params) {
            Ok(parsed) => respond(id, &service.get_bytes(&parsed)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::GetAgentStatus => {
            match parse_required_params::<AgentStatusRequest>(params, "device_id and pid") {
                Ok(parsed) => respond(id, &service.get_agent_status(&parsed)),
                Err(err) => Response::error_with_info(id, err),
            }
        }
        Method::BeginSession => match parse_begin_session(params) {
            Ok(parsed) => respond(id, &service.begin_session(&parsed)),
            Err(err) => Response::error_with_info(id, err),
        },
        Method::EndSession => {
            match parse_required_params::<EndSessionRequest>(params, "session_id") {
                Ok(parsed) => respond(id, &service.end_session(&parsed)),
                Err(err) => Response::error_with_info(id, err),
            }
        }
        Method::GetSessions => {
            let sessions = service.get_sessions();
            debug!(sessions = sessions.sessions.len(), "Sessions snapshot");
            respond(id, &sessions)
        }
        Method::GetSession => {
            match parse_required_params::<GetSessionRequest>(params, "session_id") {
                Ok(parsed) => respond(id, &service.get_session(&parsed)),
                Err(err) => Response::error_with_info(id, err),
            }
        }
    }
}

fn respond<T: Serialize>(id: Option<String>, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
