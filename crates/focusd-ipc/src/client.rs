//! IPC client implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use crate::error::{IpcError, IpcResult};
use crate::messages::{Method, Request, Response};
use crate::server::MAX_LINE_LEN;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// IPC client for connecting to the focusd daemon.
pub struct IpcClient {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    next_id: AtomicU64,
    pending: Pending,
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        // Spawn reader task
        let pending_clone = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LEN));
            while let Some(frame) = lines.next().await {
                match frame {
                    Ok(line) => match serde_json::from_str::<Response>(&line) {
                        Ok(response) => {
                            let mut pending = pending_clone.lock().await;
                            if let Some(tx) = pending.remove(&response.id) {
                                let _ = tx.send(response);
                            } else {
                                warn!(response_id = response.id, "Response for unknown request");
                            }
                        }
                        Err(e) => warn!(error = %e, "Unknown message format"),
                    },
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                }
            }
            debug!("Connection closed");
            // Fail whatever is still waiting
            pending_clone.lock().await.clear();
        });

        Ok(Self {
            writer: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    /// Connect to the daemon at the default socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect_default() -> IpcResult<Self> {
        Self::connect(&crate::socket_path()).await
    }

    /// Send a request and wait for a response.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or the connection drops.
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request { id, method };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        self.writer.lock().await.send(json).await?;

        rx.await.map_err(|_| IpcError::ChannelClosed)
    }

    /// Send a request and unwrap its result.
    ///
    /// # Errors
    /// Returns `ServerError` carrying the daemon's error code on failure.
    pub async fn call(&self, method: Method) -> IpcResult<Value> {
        self.request(method)
            .await?
            .result
            .map_err(|e| IpcError::ServerError { code: e.code, message: e.message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ErrorInfo;
    use crate::server::IpcServer;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn test_request_round_trip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket = dir.path().join("focusd/daemon.sock");
        let (server, mut request_rx) = IpcServer::bind(&socket).await.expect("Failed to bind");
        tokio::spawn(async move { server.run().await });

        // Minimal dispatcher: echo node lookups, reject everything else
        tokio::spawn(async move {
            while let Some((_, request, response_tx)) = request_rx.recv().await {
                let result = match request.method {
                    Method::GetNodes => Ok(json!([])),
                    _ => Err(ErrorInfo::new(ErrorInfo::NOT_FOUND, "no such node")),
                };
                let _ = response_tx.send(Response { id: request.id, result }).await;
            }
        });

        let client = IpcClient::connect(&socket).await.expect("Failed to connect");
        assert_eq!(client.call(Method::GetNodes).await.unwrap(), json!([]));

        let err = client.call(Method::EmergencyExit { pid: 1 }).await;
        assert_matches!(err, Err(IpcError::ServerError { code: 404, .. }));
    }
}
