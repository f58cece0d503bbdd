//! Focusd Core - Audio focus arbitration.
//!
//! This crate holds the focus registry, the priority table and the arbiter
//! that decides who may play or record. Delivery of notifications to client
//! processes happens through the [`PeerNotifier`] seam so the engine stays
//! free of any transport.

pub mod arbiter;
pub mod error;
pub mod focus;
pub mod node;
pub mod notify;
pub mod priority;
pub mod process;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use arbiter::{AcquiredFocus, FocusArbiter, FocusRequest};
pub use error::{Error, Result};
pub use focus::{FocusDirection, FocusState, FocusType, HandleId, MAX_NAME_LEN, Pid};
pub use node::{FocusNode, NodeId, TakenBy};
pub use notify::{
    Ack, DEFAULT_NOTIFY_TIMEOUT, FocusNotice, NotifyError, NotifyResult, PeerNotifier, PeerTarget,
    TargetKind,
};
pub use priority::{Precedence, PriorityTable, StreamPolicySource};
pub use process::{ProcessProbe, ProcfsProbe};
pub use registry::FocusRegistry;
