//! Profiler datastore entrypoint.
//!
//! Serves the query service on a Unix socket and polls whichever agent a
//! transport layer attaches through `ProfilerService::start_monitoring`.
//! Without an attached agent it still answers from the persistent byte cache.

use fs_err as fs;
use std::env;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use profiler_datastore::config::{self, CacheBackend, DatastoreConfig};
use profiler_datastore::{ipc, ByteCache, Db, MemoryByteCache, ProfilerService};

fn main() {
    init_logging();

    let config = match config::load_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load datastore config; using defaults");
            DatastoreConfig::default()
        }
    };

    let cache = match open_cache(&config) {
        Ok(cache) => cache,
        Err(err) => {
            error!(error = %err, "Failed to open byte cache");
            std::process::exit(1);
        }
    };

    let socket_path = match config.socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve datastore socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare datastore socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind datastore socket");
            std::process::exit(1);
        }
    };

    let service = Arc::new(ProfilerService::new(cache));
    let _poller = match service.poller().spawn(config.poll_interval()) {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "Failed to start poller thread");
            std::process::exit(1);
        }
    };

    info!(
        path = %socket_path.display(),
        poll_interval_ms = config.poll.interval_ms,
        cache_backend = ?config.cache.backend,
        "Profiler datastore started"
    );

    ipc::serve(listener, service);
}

fn init_logging() {
    let debug_enabled = env::var("PROFILER_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_cache(config: &DatastoreConfig) -> Result<Arc<dyn ByteCache>, String> {
    match config.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryByteCache::new())),
        CacheBackend::Sqlite => {
            let path = config.cache_path().map_err(|err| err.to_string())?;
            let db = Db::new(path).map_err(|err| err.to_string())?;
            info!(path = %db.path().display(), "Byte cache opened");
            Ok(Arc::new(db))
        }
    }
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}
