//! Focusd IPC - Request socket, notification channel, and client library.
//!
//! This crate defines the request/response protocol between clients and the
//! daemon, the FIFO channel the daemon uses to notify clients of focus
//! changes, and the client-side pieces for both.

pub mod client;
pub mod error;
pub mod fifo;
pub mod messages;
pub mod peer;
pub mod server;
pub mod wire;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use fifo::{
    ChannelAddress, DEFAULT_PEER_DIR, DefaultResolver, FifoNotifier, PeerAddressResolver,
};
pub use messages::{ErrorInfo, Method, Request, Response};
pub use peer::PeerEndpoint;
pub use server::{IncomingRequest, IpcServer};

use std::path::PathBuf;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/focusd/daemon.sock` or falls back to
/// `/run/user/$UID/focusd/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("focusd/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/focusd/daemon.sock"))
    }
}
