//! IPC server implementation.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::error::IpcResult;
use crate::messages::{ErrorInfo, Request, Response};

/// Longest accepted request line.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A decoded request with the client it came from and where to answer.
pub type IncomingRequest = (u64, Request, mpsc::Sender<Response>);

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: UnixListener,
    next_client_id: AtomicU64,
    request_tx: mpsc::Sender<IncomingRequest>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<IncomingRequest>)> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(?socket_path, "IPC server listening");

        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((Self { listener, next_client_id: AtomicU64::new(1), request_tx }, request_rx))
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let request_tx = self.request_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(client_id, stream, request_tx).await {
                            error!(client_id, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    async fn handle_client(
        client_id: u64,
        stream: UnixStream,
        request_tx: mpsc::Sender<IncomingRequest>,
    ) -> IpcResult<()> {
        let (reader, writer) = stream.into_split();
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LEN));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());

        let (response_tx, mut response_rx) = mpsc::channel::<Response>(16);

        loop {
            tokio::select! {
                // Read request from client
                frame = lines.next() => {
                    match frame {
                        None => {
                            debug!(client_id, "Client disconnected");
                            break;
                        }
                        Some(Ok(line)) => match serde_json::from_str::<Request>(&line) {
                            Ok(request) => {
                                debug!(client_id, request_id = request.id, "Received request");
                                let incoming = (client_id, request, response_tx.clone());
                                if request_tx.send(incoming).await.is_err() {
                                    warn!(client_id, "Dispatcher gone, closing client");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(client_id, error = %e, "Invalid request format");
                                let reply = Response {
                                    id: request_id(&line),
                                    result: Err(ErrorInfo::new(
                                        ErrorInfo::INVALID_ARGUMENT,
                                        e.to_string(),
                                    )),
                                };
                                sink.send(serde_json::to_string(&reply)?).await?;
                            }
                        },
                        Some(Err(e)) => {
                            error!(client_id, error = %e, "Read error");
                            break;
                        }
                    }
                }

                // Send response to client
                Some(response) = response_rx.recv() => {
                    sink.send(serde_json::to_string(&response)?).await?;
                }
            }
        }

        info!(client_id, "Client handler exiting");
        Ok(())
    }
}

/// The `id` of a request line whose method failed to decode, or 0.
fn request_id(line: &str) -> u64 {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_u64))
        .unwrap_or(0)
}
