//! IPC message types.

use focusd_core::{FocusType, HandleId, Pid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    pub const INVALID_ARGUMENT: i32 = 400;
    pub const POLICY_BLOCKED: i32 = 403;
    pub const NOT_FOUND: i32 = 404;
    pub const ALREADY_EXISTS: i32 = 409;
    pub const INVALID_STATE: i32 = 412;
    pub const INTERNAL: i32 = 500;

    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // Holder lifecycle
    /// Register a focus holder for a stream type
    Register {
        pid: Pid,
        handle_id: HandleId,
        stream_type: String,
        #[serde(default)]
        is_for_session: bool,
    },
    /// Unregister a focus holder
    Unregister {
        pid: Pid,
        handle_id: HandleId,
        #[serde(default)]
        is_for_session: bool,
    },
    /// Enable or disable automatic reacquisition
    SetReacquisition { pid: Pid, handle_id: HandleId, enabled: bool },
    /// Query the reacquisition flag
    GetReacquisition { pid: Pid, handle_id: HandleId },

    // Focus control
    /// Acquire focus for one or both directions
    Acquire {
        pid: Pid,
        handle_id: HandleId,
        focus_type: FocusType,
        #[serde(default)]
        name: String,
        #[serde(default)]
        is_for_session: bool,
    },
    /// Release previously acquired focus
    Release {
        pid: Pid,
        handle_id: HandleId,
        focus_type: FocusType,
        #[serde(default)]
        name: String,
        #[serde(default)]
        is_for_session: bool,
    },
    /// Move focus between two handles of one process
    Deliver { pid: Pid, src_handle_id: HandleId, dst_handle_id: HandleId, focus_type: FocusType },

    // Watching
    /// Observe focus transitions
    Watch {
        pid: Pid,
        handle_id: HandleId,
        focus_type: FocusType,
        #[serde(default)]
        is_for_session: bool,
    },
    /// Stop observing focus transitions
    Unwatch {
        pid: Pid,
        handle_id: HandleId,
        #[serde(default)]
        is_for_session: bool,
    },

    // Queries
    /// Who holds a single direction
    GetAcquiredFocusInfo { focus_type: FocusType },
    /// Every registered node, for diagnostics
    GetNodes,

    // System
    /// Reclaim everything a process owns
    EmergencyExit { pid: Pid },
    /// Request graceful shutdown
    Shutdown,
}
