//! Focusd Daemon - Audio focus arbitration service.
//!
//! Loads the stream priority policy, owns the focus arbiter and serves
//! client requests on a Unix socket. Clients are notified of focus changes
//! through their FIFO endpoints.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod policy;
mod server;
mod signals;

use config::LogFormat;
use focusd_core::{FocusArbiter, PriorityTable, ProcfsProbe};
use focusd_ipc::{ErrorInfo, FifoNotifier, IpcServer, Method, Response, socket_path};

/// Crates whose log level follows the config when `RUST_LOG` is unset.
const LOG_TARGETS: &[&str] = &["focusd", "focusd_core", "focusd_ipc"];

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::load_config()?;

    // Initialize logging
    let filter = env_filter(&config.daemon.log_level)?;
    match config.daemon.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting focusd");

    // Fetch the stream priority table once
    let priorities = {
        let source = policy::source_from_config(&config.policy);
        PriorityTable::fetch(source.as_ref(), config.policy.precedence)
            .context("Failed to load stream priorities")?
    };
    info!(
        streams = priorities.len(),
        precedence = ?priorities.precedence(),
        "Stream priority table loaded"
    );

    let notifier = FifoNotifier::with_dir(&config.ipc.peer_dir);
    let arbiter = Arc::new(
        FocusArbiter::new(Arc::new(priorities), Arc::new(notifier), Arc::new(ProcfsProbe::new()))
            .with_timeout(config.ipc.notify_timeout()),
    );
    info!(
        peer_dir = ?config.ipc.peer_dir,
        timeout_ms = config.ipc.notify_timeout_ms,
        "Focus arbiter ready"
    );

    // Start IPC server
    let socket = config.ipc.socket_path.clone().unwrap_or_else(socket_path);
    info!(?socket, "Starting IPC server");
    let (ipc_server, mut request_rx) =
        IpcServer::bind(&socket).await.context("Failed to start IPC server")?;

    // Spawn IPC server task
    let ipc_handle = tokio::spawn(async move {
        ipc_server.run().await;
    });

    // Set up signal handling
    let mut shutdown_rx = signals::setup_signal_handlers()?;

    info!("Daemon running. Press Ctrl+C to exit.");

    // Main event loop
    loop {
        tokio::select! {
            // Handle IPC requests
            Some((client_id, request, response_tx)) = request_rx.recv() => {
                debug!(client_id, request_id = request.id, "Handling IPC request");

                if matches!(request.method, Method::Shutdown) {
                    let result = Ok(json!({"success": true}));
                    let response = Response { id: request.id, result };
                    let _ = response_tx.send(response).await;
                    info!("Shutdown command processed");
                    break;
                }

                // Arbiter calls block on the registry lock and on peer FIFOs
                let arbiter = Arc::clone(&arbiter);
                tokio::spawn(async move {
                    let id = request.id;
                    let result = tokio::task::spawn_blocking(move || {
                        server::handle_request(&request.method, &arbiter)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        error!(client_id, request_id = id, error = %e, "Request handler failed");
                        Err(ErrorInfo::new(ErrorInfo::INTERNAL, "request handler failed"))
                    });
                    let _ = response_tx.send(Response { id, result }).await;
                });
            }

            // Handle shutdown signal
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    ipc_handle.abort();
    if let Err(e) = std::fs::remove_file(&socket) {
        debug!(error = %e, "Socket already gone");
    }

    info!("focusd stopped");
    Ok(())
}

/// `RUST_LOG` if set, otherwise `log_level` for the focusd crates.
fn env_filter(log_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::new("warn");
    for target in LOG_TARGETS {
        filter = filter.add_directive(
            format!("{target}={log_level}")
                .parse()
                .with_context(|| format!("Invalid log level: {log_level}"))?,
        );
    }
    Ok(filter)
}
