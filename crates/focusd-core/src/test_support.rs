//! Shared fixtures for unit tests.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;

use crate::focus::{FocusState, HandleId, Pid};
use crate::notify::{Ack, FocusNotice, NotifyError, NotifyResult, PeerNotifier, PeerTarget};
use crate::priority::{Precedence, PriorityTable};
use crate::process::ProcessProbe;

/// Priority table used across tests; lower numbers win.
pub fn test_table() -> PriorityTable {
    PriorityTable::new(
        [("emergency", 1), ("call", 2), ("alarm", 3), ("notification", 4), ("media", 5)]
            .into_iter()
            .map(|(name, priority)| (name.to_string(), priority)),
        Precedence::LowerWins,
    )
    .expect("Failed to build test table")
}

/// Probe where every pid is alive until killed.
#[derive(Default)]
pub struct StaticProbe {
    dead: Mutex<HashSet<Pid>>,
}

impl StaticProbe {
    pub fn kill(&self, pid: Pid) {
        self.dead.lock().insert(pid);
    }
}

impl ProcessProbe for StaticProbe {
    fn is_alive(&self, pid: Pid) -> bool {
        !self.dead.lock().contains(&pid)
    }
}

/// Notifier that records every delivery and answers with a canned reply.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(PeerTarget, FocusNotice)>>,
    unreachable: Mutex<HashSet<Pid>>,
    no_reacquire: Mutex<HashSet<(Pid, HandleId)>>,
}

impl RecordingNotifier {
    /// Every delivery attempt so far, in order.
    pub fn calls(&self) -> Vec<(PeerTarget, FocusNotice)> {
        self.calls.lock().clone()
    }

    /// Deliveries to one target with the given state.
    pub fn calls_to(&self, target: PeerTarget, state: FocusState) -> usize {
        self.calls.lock().iter().filter(|(t, n)| *t == target && n.state == state).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Make deliveries to `pid` fail as if the peer were gone.
    pub fn make_unreachable(&self, pid: Pid) {
        self.unreachable.lock().insert(pid);
    }

    /// Make a peer answer with auto-reacquire disabled.
    pub fn decline_reacquire(&self, pid: Pid, handle_id: HandleId) {
        self.no_reacquire.lock().insert((pid, handle_id));
    }
}

impl PeerNotifier for RecordingNotifier {
    fn notify(
        &self,
        target: PeerTarget,
        notice: &FocusNotice,
        _timeout: Duration,
    ) -> NotifyResult<Ack> {
        self.calls.lock().push((target, notice.clone()));
        if self.unreachable.lock().contains(&target.pid) {
            return Err(NotifyError::Unreachable(format!("pid {}", target.pid)));
        }
        let declined = self.no_reacquire.lock().contains(&(target.pid, target.handle_id));
        Ok(Ack { handle_id: target.handle_id, auto_reacquire: !declined, by_session: false })
    }
}
