//! Error types for focusd core.

use thiserror::Error;

use crate::focus::{HandleId, Pid};

/// Core error type for focus arbitration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid stream type: {0}")]
    InvalidStreamType(String),

    #[error("Node already exists: pid {pid}, handle {handle_id}")]
    AlreadyExists { pid: Pid, handle_id: HandleId },

    #[error("Node not found: pid {pid}, handle {handle_id}")]
    NotFound { pid: Pid, handle_id: HandleId },

    #[error("No node holds {0}")]
    NoHolder(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Blocked by pid {blocker_pid}, handle {blocker_handle} (priority {blocker_priority})")]
    PolicyBlocked { blocker_pid: Pid, blocker_handle: HandleId, blocker_priority: i32 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type alias for focusd core operations.
pub type Result<T> = std::result::Result<T, Error>;
