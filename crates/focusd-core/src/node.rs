//! Focus holder and watch nodes.

use serde::{Deserialize, Serialize};

use crate::focus::{FocusDirection, FocusType, HandleId, Pid};

/// Registry-assigned stable node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Who currently holds a direction away from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakenBy {
    pub pid: Pid,
    pub handle_id: HandleId,
    /// Refers to the whole session of `pid` rather than one handle
    pub by_session: bool,
}

impl TakenBy {
    /// True if this entry names the node `(pid, handle_id)`.
    ///
    /// Session-tagged entries match any node of the same pid.
    #[must_use]
    pub fn refers_to(&self, pid: Pid, handle_id: HandleId) -> bool {
        self.pid == pid && (self.by_session || self.handle_id == handle_id)
    }
}

/// A registry entry: either a focus holder or a focus watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusNode {
    pub id: NodeId,
    pub pid: Pid,
    pub handle_id: HandleId,
    pub is_for_watch: bool,
    pub is_for_session: bool,
    /// Stream type name; empty for watch nodes
    pub stream_type: String,
    /// Priority resolved from the priority table; 0 for watch nodes
    pub priority: i32,
    /// Held directions for holders, observed directions for watchers
    pub status: FocusType,
    /// Per-direction record of who took focus away (playback, capture)
    pub taken_by: [Option<TakenBy>; 2],
    /// Whether the client wants focus handed back automatically
    pub reacquisition: bool,
    /// Option name from the last acquire or release
    pub option_name: String,
}

impl FocusNode {
    /// Create a deactivated holder node.
    #[must_use]
    pub fn holder(
        id: NodeId,
        pid: Pid,
        handle_id: HandleId,
        stream_type: &str,
        priority: i32,
        is_for_session: bool,
    ) -> Self {
        Self {
            id,
            pid,
            handle_id,
            is_for_watch: false,
            is_for_session,
            stream_type: stream_type.to_string(),
            priority,
            status: FocusType::DEACTIVATED,
            taken_by: [None, None],
            reacquisition: true,
            option_name: String::new(),
        }
    }

    /// Create a watch node observing `watched` directions.
    #[must_use]
    pub fn watcher(
        id: NodeId,
        pid: Pid,
        handle_id: HandleId,
        watched: FocusType,
        is_for_session: bool,
    ) -> Self {
        Self {
            id,
            pid,
            handle_id,
            is_for_watch: true,
            is_for_session,
            stream_type: String::new(),
            priority: 0,
            status: watched,
            taken_by: [None, None],
            reacquisition: false,
            option_name: String::new(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status.is_empty()
    }

    /// True if `(pid, handle_id)` names this node.
    #[must_use]
    pub fn is(&self, pid: Pid, handle_id: HandleId) -> bool {
        self.pid == pid && self.handle_id == handle_id
    }

    #[must_use]
    pub fn taken_by(&self, direction: FocusDirection) -> Option<TakenBy> {
        self.taken_by[direction.index()]
    }

    pub fn set_taken_by(&mut self, direction: FocusDirection, holder: Option<TakenBy>) {
        self.taken_by[direction.index()] = holder;
    }

    /// The `TakenBy` entry other nodes record when this node preempts them.
    #[must_use]
    pub fn as_taker(&self) -> TakenBy {
        TakenBy { pid: self.pid, handle_id: self.handle_id, by_session: self.is_for_session }
    }
}
