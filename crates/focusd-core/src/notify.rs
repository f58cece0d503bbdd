//! Peer notification seam.
//!
//! The arbiter tells clients that they lost or regained focus, and tells
//! watchers about transitions, through a [`PeerNotifier`]. Delivery is a
//! synchronous round trip bounded by a timeout; the peer answers with an
//! [`Ack`] echoing its handle.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::focus::{FocusState, FocusType, HandleId, Pid};

/// Default round-trip timeout for a single notification.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_millis(2500);

/// Kind of channel a notification is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A focus holder losing or regaining focus
    Focus,
    /// A watcher observing a transition
    Watch,
}

/// Addressee of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerTarget {
    pub pid: Pid,
    pub handle_id: HandleId,
    pub kind: TargetKind,
}

impl PeerTarget {
    #[must_use]
    pub fn focus(pid: Pid, handle_id: HandleId) -> Self {
        Self { pid, handle_id, kind: TargetKind::Focus }
    }

    #[must_use]
    pub fn watch(pid: Pid, handle_id: HandleId) -> Self {
        Self { pid, handle_id, kind: TargetKind::Watch }
    }
}

/// Content of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusNotice {
    /// Pid of the notified node
    pub pid: Pid,
    /// Handle of the notified node
    pub handle_id: HandleId,
    /// Directions affected
    pub focus_type: FocusType,
    pub state: FocusState,
    /// Stream type of the node that caused the transition
    pub stream_type: String,
    /// Option name supplied by the node that caused the transition
    pub option_name: String,
}

/// Peer reply to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Handle echoed by the peer
    pub handle_id: HandleId,
    /// Peer wants focus handed back when the taker releases
    pub auto_reacquire: bool,
    /// Peer manages focus for its whole session
    pub by_session: bool,
}

impl Ack {
    /// Plain acknowledgement with reacquisition enabled.
    #[must_use]
    pub fn new(handle_id: HandleId) -> Self {
        Self { handle_id, auto_reacquire: true, by_session: false }
    }
}

/// Notification delivery failure.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Handle mismatch: expected {expected}, got {actual}")]
    HandleMismatch { expected: HandleId, actual: HandleId },
}

/// Result type for notification delivery.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Delivers focus notifications to peer processes.
#[cfg_attr(test, mockall::automock)]
pub trait PeerNotifier: Send + Sync {
    /// Deliver `notice` to `target` and wait up to `timeout` for its reply.
    ///
    /// # Errors
    /// Returns a [`NotifyError`] if the peer is absent, silent, or replies
    /// with something other than its own handle.
    fn notify(
        &self,
        target: PeerTarget,
        notice: &FocusNotice,
        timeout: Duration,
    ) -> NotifyResult<Ack>;
}

