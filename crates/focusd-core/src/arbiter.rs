//! Focus arbitration.
//!
//! [`FocusArbiter`] owns the registry behind one lock and runs every
//! acquire/release/exit to completion while holding it, peer notifications
//! included. Preemption is decided on an unchanged registry first and only
//! then applied, so a blocked request never leaves partial state behind.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::focus::{FocusState, FocusType, HandleId, Pid, validate_name};
use crate::node::{FocusNode, NodeId, TakenBy};
use crate::notify::{Ack, DEFAULT_NOTIFY_TIMEOUT, FocusNotice, PeerNotifier, PeerTarget};
use crate::priority::PriorityTable;
use crate::process::ProcessProbe;
use crate::registry::FocusRegistry;

/// Parameters of an acquire or release request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusRequest {
    pub pid: Pid,
    pub handle_id: HandleId,
    pub focus_type: FocusType,
    /// Free-form option name forwarded to notified peers
    pub option_name: String,
    /// Informational only; session behavior follows the flag the holder
    /// was registered with
    pub is_for_session: bool,
}

impl FocusRequest {
    #[must_use]
    pub fn new(pid: Pid, handle_id: HandleId, focus_type: FocusType) -> Self {
        Self { pid, handle_id, focus_type, option_name: String::new(), is_for_session: false }
    }

    #[must_use]
    pub fn with_option(mut self, option_name: impl Into<String>) -> Self {
        self.option_name = option_name.into();
        self
    }

    #[must_use]
    pub fn for_session(mut self, is_for_session: bool) -> Self {
        self.is_for_session = is_for_session;
        self
    }
}

/// Who currently holds a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredFocus {
    pub pid: Pid,
    pub handle_id: HandleId,
    pub stream_type: String,
    pub option_name: String,
}

/// The focus arbitration engine.
pub struct FocusArbiter {
    registry: Mutex<FocusRegistry>,
    notifier: Arc<dyn PeerNotifier>,
    timeout: Duration,
}

impl FocusArbiter {
    /// Create an arbiter with an empty registry.
    #[must_use]
    pub fn new(
        priorities: Arc<PriorityTable>,
        notifier: Arc<dyn PeerNotifier>,
        probe: Arc<dyn ProcessProbe>,
    ) -> Self {
        Self {
            registry: Mutex::new(FocusRegistry::new(priorities, probe)),
            notifier,
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Set the per-notification timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `f` against the registry under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&FocusRegistry) -> R) -> R {
        f(&self.registry.lock())
    }

    /// Copy of every node, holders first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FocusNode> {
        let reg = self.registry.lock();
        reg.holders().chain(reg.watchers()).cloned().collect()
    }

    /// Register a focus holder.
    ///
    /// # Errors
    /// See [`FocusRegistry::create_node`].
    pub fn register(
        &self,
        pid: Pid,
        handle_id: HandleId,
        stream_type: &str,
        is_for_session: bool,
    ) -> Result<NodeId> {
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);
        let id = reg.create_node(pid, handle_id, stream_type, is_for_session)?;
        info!(pid, handle_id, stream_type, is_for_session, "Focus node registered");
        Ok(id)
    }

    /// Unregister a focus holder. Focus it still holds is released first.
    ///
    /// `is_for_session` is only logged; the registered flag decides whether
    /// a surviving session sibling suppresses the release callbacks.
    ///
    /// # Errors
    /// Returns `NotFound` if the holder does not exist.
    pub fn unregister(&self, pid: Pid, handle_id: HandleId, is_for_session: bool) -> Result<()> {
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);

        let node = reg.find_holder(pid, handle_id).ok_or(Error::NotFound { pid, handle_id })?;
        let (id, status) = (node.id, node.status);
        if node.is_active() {
            let session_lives = node.is_for_session && reg.has_session_sibling(pid, id);
            if session_lives {
                debug!(pid, handle_id, "Session still registered, skipping release callbacks");
            }
            self.release_bits(&mut reg, id, status, session_lives, false);
        }

        reg.destroy_node(pid, handle_id)?;
        info!(pid, handle_id, is_for_session, "Focus node unregistered");
        Ok(())
    }

    /// Enable or disable automatic reacquisition for a holder.
    ///
    /// # Errors
    /// Returns `NotFound` if the holder does not exist.
    pub fn set_reacquisition(&self, pid: Pid, handle_id: HandleId, enabled: bool) -> Result<()> {
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);
        let node = reg.find_holder_mut(pid, handle_id).ok_or(Error::NotFound { pid, handle_id })?;
        node.reacquisition = enabled;
        debug!(pid, handle_id, enabled, "Reacquisition updated");
        Ok(())
    }

    /// Current reacquisition flag of a holder.
    ///
    /// # Errors
    /// Returns `NotFound` if the holder does not exist.
    pub fn reacquisition(&self, pid: Pid, handle_id: HandleId) -> Result<bool> {
        let reg = self.registry.lock();
        reg.find_holder(pid, handle_id)
            .map(|n| n.reacquisition)
            .ok_or(Error::NotFound { pid, handle_id })
    }

    /// Acquire focus, preempting every overlapping holder that does not
    /// outrank the requester.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown holder, `InvalidState` if a
    /// requested direction is already held, and `PolicyBlocked` if an
    /// overlapping holder outranks the requester.
    pub fn acquire(&self, req: &FocusRequest) -> Result<()> {
        Self::validate_request(req)?;
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);

        let me = reg
            .find_holder(req.pid, req.handle_id)
            .ok_or(Error::NotFound { pid: req.pid, handle_id: req.handle_id })?
            .clone();
        if me.status.intersects(req.focus_type) {
            return Err(Error::InvalidState(format!(
                "pid {} handle {} already holds {}, requested {}",
                me.pid, me.handle_id, me.status, req.focus_type
            )));
        }

        let victims = Self::preemption_set(&reg, &me, req.focus_type)?;

        let taker = me.as_taker();
        let mut suppress_watch = false;
        for id in victims {
            let Some(victim) = reg.get(id) else { continue };
            let lost = victim.status.intersection(req.focus_type);
            if victim.stream_type == me.stream_type {
                suppress_watch = true;
            }
            let notice = FocusNotice {
                pid: victim.pid,
                handle_id: victim.handle_id,
                focus_type: lost,
                state: FocusState::Released,
                stream_type: me.stream_type.clone(),
                option_name: req.option_name.clone(),
            };
            let stored_reacquire = victim.reacquisition;
            let ack = self.send_notice(PeerTarget::focus(victim.pid, victim.handle_id), &notice);

            let (reacquire, by_session) = match ack {
                Some(ack) => (stored_reacquire && ack.auto_reacquire, ack.by_session),
                None => (stored_reacquire, false),
            };
            let entry = reacquire
                .then_some(TakenBy { by_session: taker.by_session || by_session, ..taker });

            let Some(victim) = reg.get_mut(id) else { continue };
            victim.status = victim.status.difference(lost);
            for dir in lost.directions() {
                victim.set_taken_by(dir, entry);
            }
            info!(
                pid = victim.pid,
                handle_id = victim.handle_id,
                lost = %lost,
                by_pid = me.pid,
                by_handle = me.handle_id,
                reacquire,
                "Focus preempted"
            );
        }

        let node = reg
            .get_mut(me.id)
            .ok_or_else(|| Error::Internal(format!("{} vanished during acquire", me.id)))?;
        node.status = node.status.union(req.focus_type);
        node.option_name.clone_from(&req.option_name);
        for dir in req.focus_type.directions() {
            node.set_taken_by(dir, None);
        }
        let source = node.clone();

        if suppress_watch {
            debug!(
                stream_type = %source.stream_type,
                "Same stream type preempted, skipping watch broadcast"
            );
        } else {
            self.broadcast_watch(&reg, &source, req.focus_type, FocusState::Acquired);
        }

        info!(
            pid = req.pid,
            handle_id = req.handle_id,
            focus_type = %req.focus_type,
            "Focus acquired"
        );
        Ok(())
    }

    /// Release focus and hand it back to the holders it was taken from.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown holder and `InvalidState` if the
    /// holder is inactive or holds something other than the requested type.
    pub fn release(&self, req: &FocusRequest) -> Result<()> {
        Self::validate_request(req)?;
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);

        let me = reg
            .find_holder_mut(req.pid, req.handle_id)
            .ok_or(Error::NotFound { pid: req.pid, handle_id: req.handle_id })?;
        if !me.is_active() {
            return Err(Error::InvalidState(format!(
                "pid {} handle {} holds no focus",
                req.pid, req.handle_id
            )));
        }
        if me.status != FocusType::BOTH && me.status != req.focus_type {
            return Err(Error::InvalidState(format!(
                "pid {} handle {} holds {}, cannot release {}",
                req.pid, req.handle_id, me.status, req.focus_type
            )));
        }
        me.option_name.clone_from(&req.option_name);
        let (id, is_for_session) = (me.id, me.is_for_session);

        let session_holds = is_for_session && reg.session_holds(req.pid, id, req.focus_type);
        if session_holds {
            debug!(pid = req.pid, "Session still holds focus, skipping callbacks");
        }
        self.release_bits(&mut reg, id, req.focus_type, session_holds, false);

        info!(
            pid = req.pid,
            handle_id = req.handle_id,
            focus_type = %req.focus_type,
            "Focus released"
        );
        Ok(())
    }

    /// Start observing focus transitions.
    ///
    /// # Errors
    /// See [`FocusRegistry::set_watch`].
    pub fn watch(
        &self,
        pid: Pid,
        handle_id: HandleId,
        focus_type: FocusType,
        is_for_session: bool,
    ) -> Result<NodeId> {
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);
        let id = reg.set_watch(pid, handle_id, focus_type, is_for_session)?;
        info!(pid, handle_id, %focus_type, "Focus watch set");
        Ok(id)
    }

    /// Stop observing focus transitions. `is_for_session` is only logged.
    ///
    /// # Errors
    /// Returns `NotFound` if no such watch exists.
    pub fn unwatch(&self, pid: Pid, handle_id: HandleId, is_for_session: bool) -> Result<()> {
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);
        reg.unset_watch(pid, handle_id)?;
        info!(pid, handle_id, is_for_session, "Focus watch unset");
        Ok(())
    }

    /// Reclaim everything a process owns, releasing focus it still holds.
    ///
    /// Idempotent: a second call for the same pid is a no-op.
    pub fn emergency_exit(&self, pid: Pid) {
        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);
        self.exit_locked(&mut reg, pid);
    }

    /// Move focus between two holders of the same process without callbacks.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for identical handles or an empty type,
    /// `NotFound` if either holder is missing and `InvalidState` if the
    /// source does not hold every requested direction.
    pub fn deliver(
        &self,
        pid: Pid,
        src_handle: HandleId,
        dst_handle: HandleId,
        focus_type: FocusType,
    ) -> Result<()> {
        if src_handle == dst_handle {
            return Err(Error::InvalidArgument("cannot deliver focus to the same handle".into()));
        }
        if focus_type.is_empty() {
            return Err(Error::InvalidArgument("focus type must not be empty".to_string()));
        }

        let mut reg = self.registry.lock();
        self.reap_dead(&mut reg);

        let src = reg
            .find_holder(pid, src_handle)
            .ok_or(Error::NotFound { pid, handle_id: src_handle })?;
        if !src.status.contains(focus_type) {
            return Err(Error::InvalidState(format!(
                "pid {pid} handle {src_handle} holds {}, cannot deliver {focus_type}",
                src.status
            )));
        }
        let src_id = src.id;
        let dst_id = reg
            .find_holder(pid, dst_handle)
            .ok_or(Error::NotFound { pid, handle_id: dst_handle })?
            .id;

        if let Some(src) = reg.get_mut(src_id) {
            src.status = src.status.difference(focus_type);
        }
        if let Some(dst) = reg.get_mut(dst_id) {
            dst.status = dst.status.union(focus_type);
            for dir in focus_type.directions() {
                dst.set_taken_by(dir, None);
            }
        }
        let moved = reg.retarget_taken_by(pid, src_handle, dst_handle, focus_type);

        info!(pid, src_handle, dst_handle, %focus_type, moved, "Focus delivered");
        Ok(())
    }

    /// The first holder currently holding a single direction.
    ///
    /// # Errors
    /// Returns `InvalidArgument` unless the type is exactly playback or
    /// capture, and `NoHolder` if nobody holds it.
    pub fn acquired_focus_info(&self, focus_type: FocusType) -> Result<AcquiredFocus> {
        if focus_type != FocusType::PLAYBACK && focus_type != FocusType::CAPTURE {
            return Err(Error::InvalidArgument(format!(
                "expected playback or capture, got {focus_type}"
            )));
        }

        let reg = self.registry.lock();
        reg.holders()
            .find(|n| n.status.contains(focus_type))
            .map(|n| AcquiredFocus {
                pid: n.pid,
                handle_id: n.handle_id,
                stream_type: n.stream_type.clone(),
                option_name: n.option_name.clone(),
            })
            .ok_or_else(|| Error::NoHolder(focus_type.to_string()))
    }

    fn validate_request(req: &FocusRequest) -> Result<()> {
        if req.focus_type.is_empty() {
            return Err(Error::InvalidArgument("focus type must not be empty".to_string()));
        }
        validate_name("option name", &req.option_name)
    }

    /// True if a holder in `status` competes with a request for `request`.
    fn conflicts(status: FocusType, request: FocusType) -> bool {
        !status.is_empty()
            && (status.intersects(request)
                || request == FocusType::BOTH
                || status == FocusType::BOTH)
    }

    /// Holders `me` would preempt, in registry order, or the first blocker.
    fn preemption_set(
        reg: &FocusRegistry,
        me: &FocusNode,
        request: FocusType,
    ) -> Result<Vec<NodeId>> {
        let mut victims = Vec::new();
        for node in reg.holders() {
            if node.id == me.id {
                continue;
            }
            if me.is_for_session && node.is_for_session && node.pid == me.pid {
                continue;
            }
            if !Self::conflicts(node.status, request) {
                continue;
            }
            if reg.priorities().outranks(node.priority, me.priority) {
                info!(
                    pid = me.pid,
                    handle_id = me.handle_id,
                    blocker_pid = node.pid,
                    blocker_handle = node.handle_id,
                    "Acquire blocked by higher priority holder"
                );
                return Err(Error::PolicyBlocked {
                    blocker_pid: node.pid,
                    blocker_handle: node.handle_id,
                    blocker_priority: node.priority,
                });
            }
            victims.push(node.id);
        }
        Ok(victims)
    }

    /// Drop `bits` from node `my_id`, restoring every holder it took them from.
    ///
    /// With `skip_callbacks` only the status changes. With `dying` set, nodes
    /// owned by the same process are not restored.
    fn release_bits(
        &self,
        reg: &mut FocusRegistry,
        my_id: NodeId,
        bits: FocusType,
        skip_callbacks: bool,
        dying: bool,
    ) {
        let Some(me) = reg.get(my_id).cloned() else { return };
        let mut suppress_watch = false;

        if !skip_callbacks {
            let restores: Vec<(NodeId, FocusType)> = reg
                .holders()
                .filter(|n| n.id != my_id && !(dying && n.pid == me.pid))
                .filter_map(|n| {
                    let restored = bits
                        .directions()
                        .filter(|d| {
                            n.taken_by(*d).is_some_and(|t| t.refers_to(me.pid, me.handle_id))
                        })
                        .fold(FocusType::DEACTIVATED, |acc, d| acc.union(d.into()));
                    (!restored.is_empty()).then_some((n.id, restored))
                })
                .collect();

            for (id, restored) in restores {
                let Some(node) = reg.get_mut(id) else { continue };
                for dir in restored.directions() {
                    node.set_taken_by(dir, None);
                }
                node.status = node.status.union(restored);
                if node.stream_type == me.stream_type {
                    suppress_watch = true;
                }
                let notice = FocusNotice {
                    pid: node.pid,
                    handle_id: node.handle_id,
                    focus_type: restored,
                    state: FocusState::Acquired,
                    stream_type: me.stream_type.clone(),
                    option_name: me.option_name.clone(),
                };
                info!(
                    pid = node.pid,
                    handle_id = node.handle_id,
                    restored = %restored,
                    "Focus restored"
                );
                let target = PeerTarget::focus(node.pid, node.handle_id);
                self.send_notice(target, &notice);
            }
        }

        if let Some(node) = reg.get_mut(my_id) {
            node.status = node.status.difference(bits);
        }

        if skip_callbacks || suppress_watch {
            debug!(pid = me.pid, handle_id = me.handle_id, "Release watch broadcast suppressed");
        } else {
            self.broadcast_watch(reg, &me, bits, FocusState::Released);
        }
    }

    /// Tell every watcher observing `bits` about a transition caused by `source`.
    fn broadcast_watch(
        &self,
        reg: &FocusRegistry,
        source: &FocusNode,
        bits: FocusType,
        state: FocusState,
    ) {
        for watcher in reg.watchers() {
            let observed = watcher.status.intersection(bits);
            if observed.is_empty() {
                continue;
            }
            if source.is_for_session && watcher.is_for_session && watcher.pid == source.pid {
                continue;
            }
            let notice = FocusNotice {
                pid: watcher.pid,
                handle_id: watcher.handle_id,
                focus_type: observed,
                state,
                stream_type: source.stream_type.clone(),
                option_name: source.option_name.clone(),
            };
            self.send_notice(PeerTarget::watch(watcher.pid, watcher.handle_id), &notice);
        }
    }

    /// Deliver one notification; failures are logged and absorbed.
    fn send_notice(&self, target: PeerTarget, notice: &FocusNotice) -> Option<Ack> {
        match self.notifier.notify(target, notice, self.timeout) {
            Ok(ack) => {
                debug!(
                    pid = target.pid,
                    handle_id = target.handle_id,
                    kind = ?target.kind,
                    state = ?notice.state,
                    "Peer notified"
                );
                Some(ack)
            }
            Err(e) => {
                warn!(
                    pid = target.pid,
                    handle_id = target.handle_id,
                    kind = ?target.kind,
                    error = %e,
                    "Peer notification failed"
                );
                None
            }
        }
    }

    /// Reclaim every process the probe reports as dead.
    fn reap_dead(&self, reg: &mut FocusRegistry) {
        for pid in reg.dead_pids() {
            info!(pid, "Process is gone, reclaiming its focus");
            self.exit_locked(reg, pid);
        }
    }

    fn exit_locked(&self, reg: &mut FocusRegistry, pid: Pid) {
        let watchers = reg.remove_watchers_of(pid);
        let holders = reg.holder_ids_of(pid);

        // Restores below only follow direct takers
        let bypassed = reg.bypass_siblings(pid);

        for &id in &holders {
            let Some(node) = reg.get(id) else { continue };
            if node.is_active() {
                let status = node.status;
                self.release_bits(reg, id, status, false, true);
            }
        }
        for &id in &holders {
            reg.take_holder(id);
        }
        let scrubbed = reg.scrub_pid(pid);

        if watchers.is_empty() && holders.is_empty() && scrubbed == 0 {
            debug!(pid, "Emergency exit: nothing to reclaim");
        } else {
            info!(
                pid,
                watchers = watchers.len(),
                holders = holders.len(),
                bypassed,
                scrubbed,
                "Emergency exit processed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::FocusDirection;
    use crate::notify::{MockPeerNotifier, NotifyError};
    use crate::test_support::{RecordingNotifier, StaticProbe, test_table};
    use assert_matches::assert_matches;

    struct Fixture {
        arbiter: FocusArbiter,
        notifier: Arc<RecordingNotifier>,
        probe: Arc<StaticProbe>,
    }

    fn fixture() -> Fixture {
        let notifier = Arc::new(RecordingNotifier::default());
        let probe = Arc::new(StaticProbe::default());
        let arbiter = FocusArbiter::new(Arc::new(test_table()), notifier.clone(), probe.clone());
        Fixture { arbiter, notifier, probe }
    }

    fn node(arbiter: &FocusArbiter, pid: Pid, handle_id: HandleId) -> FocusNode {
        arbiter.inspect(|reg| reg.find_holder(pid, handle_id).cloned()).expect("node missing")
    }

    fn playback(pid: Pid, handle_id: HandleId) -> FocusRequest {
        FocusRequest::new(pid, handle_id, FocusType::PLAYBACK)
    }

    #[test]
    fn test_acquire_unknown_node() {
        let f = fixture();
        assert_matches!(f.arbiter.acquire(&playback(1, 1)), Err(Error::NotFound { .. }));
    }

    #[test]
    fn test_acquire_already_held_is_invalid_state() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();

        assert_matches!(f.arbiter.acquire(&playback(100, 1)), Err(Error::InvalidState(_)));
        let both = FocusRequest::new(100, 1, FocusType::BOTH);
        assert_matches!(f.arbiter.acquire(&both), Err(Error::InvalidState(_)));
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_acquire_empty_type_rejected() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        let req = FocusRequest::new(100, 1, FocusType::DEACTIVATED);
        assert_matches!(f.arbiter.acquire(&req), Err(Error::InvalidArgument(_)));
    }

    #[test]
    fn test_higher_priority_holder_blocks() {
        let f = fixture();
        f.arbiter.register(100, 1, "alarm", false).unwrap();
        f.arbiter.register(200, 1, "media", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.notifier.clear();

        assert_matches!(
            f.arbiter.acquire(&playback(200, 1)),
            Err(Error::PolicyBlocked { blocker_pid: 100, blocker_handle: 1, .. })
        );
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::DEACTIVATED);
        assert!(f.notifier.calls().is_empty());
    }

    #[test]
    fn test_blocked_request_leaves_lower_victims_untouched() {
        let f = fixture();
        f.arbiter.register(100, 1, "notification", false).unwrap();
        f.arbiter.register(200, 1, "call", false).unwrap();
        f.arbiter.register(300, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&FocusRequest::new(100, 1, FocusType::CAPTURE)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();

        // alarm would preempt notification (capture) but call blocks it (playback)
        let both = FocusRequest::new(300, 1, FocusType::BOTH);
        assert_matches!(
            f.arbiter.acquire(&both),
            Err(Error::PolicyBlocked { blocker_pid: 200, .. })
        );
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::CAPTURE);
    }

    #[test]
    fn test_preemption_records_taker_and_notifies_victim() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();

        f.arbiter.acquire(&playback(200, 1).with_option("wake-up")).expect("Failed to preempt");

        let victim = node(&f.arbiter, 100, 1);
        assert_eq!(victim.status, FocusType::DEACTIVATED);
        assert_eq!(
            victim.taken_by(FocusDirection::Playback),
            Some(TakenBy { pid: 200, handle_id: 1, by_session: false })
        );
        assert_eq!(victim.taken_by(FocusDirection::Capture), None);

        let calls = f.notifier.calls();
        let (target, notice) = calls.last().unwrap();
        assert_eq!(*target, PeerTarget::focus(100, 1));
        assert_eq!(notice.state, FocusState::Released);
        assert_eq!(notice.focus_type, FocusType::PLAYBACK);
        assert_eq!(notice.stream_type, "alarm");
        assert_eq!(notice.option_name, "wake-up");
    }

    #[test]
    fn test_equal_priority_later_acquirer_wins() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "media", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();

        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::DEACTIVATED);
        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_partial_preemption_keeps_other_direction() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "call", false).unwrap();
        f.arbiter.acquire(&FocusRequest::new(100, 1, FocusType::BOTH)).unwrap();

        f.arbiter.acquire(&FocusRequest::new(200, 1, FocusType::CAPTURE)).unwrap();

        let victim = node(&f.arbiter, 100, 1);
        assert_eq!(victim.status, FocusType::PLAYBACK);
        assert!(victim.taken_by(FocusDirection::Capture).is_some());
        assert_eq!(victim.taken_by(FocusDirection::Playback), None);
    }

    #[test]
    fn test_release_restores_victim() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.notifier.clear();

        f.arbiter.release(&playback(200, 1)).expect("Failed to release");

        let victim = node(&f.arbiter, 100, 1);
        assert_eq!(victim.status, FocusType::PLAYBACK);
        assert_eq!(victim.taken_by(FocusDirection::Playback), None);
        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::DEACTIVATED);
        assert_eq!(f.notifier.calls_to(PeerTarget::focus(100, 1), FocusState::Acquired), 1);
    }

    #[test]
    fn test_release_state_checks() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        assert_matches!(f.arbiter.release(&playback(100, 1)), Err(Error::InvalidState(_)));

        f.arbiter.acquire(&playback(100, 1)).unwrap();
        let both = FocusRequest::new(100, 1, FocusType::BOTH);
        assert_matches!(f.arbiter.release(&both), Err(Error::InvalidState(_)));
        let capture = FocusRequest::new(100, 1, FocusType::CAPTURE);
        assert_matches!(f.arbiter.release(&capture), Err(Error::InvalidState(_)));
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_release_one_direction_of_both() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.acquire(&FocusRequest::new(100, 1, FocusType::BOTH)).unwrap();

        f.arbiter.release(&FocusRequest::new(100, 1, FocusType::CAPTURE)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_concrete_media_alarm_scenario() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();

        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        let media = node(&f.arbiter, 100, 1);
        assert_eq!(media.status, FocusType::DEACTIVATED);
        assert_eq!(
            media.taken_by(FocusDirection::Playback),
            Some(TakenBy { pid: 200, handle_id: 1, by_session: false })
        );

        f.arbiter.release(&playback(200, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_restore_chain_through_three_holders() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.register(300, 1, "emergency", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.arbiter.acquire(&playback(300, 1)).unwrap();

        f.arbiter.release(&playback(300, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::PLAYBACK);
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::DEACTIVATED);

        f.arbiter.release(&playback(200, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_unregister_middle_of_chain_reconnects() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.register(300, 1, "emergency", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.arbiter.acquire(&playback(300, 1)).unwrap();

        // alarm is preempted (inactive); removing it hands media's entry to emergency
        f.arbiter.unregister(200, 1, false).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).taken_by(FocusDirection::Playback).unwrap().pid, 300);

        f.arbiter.release(&playback(300, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_unregister_active_holder_restores_victims() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();

        f.arbiter.unregister(200, 1, false).unwrap();

        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
        assert_eq!(f.notifier.calls_to(PeerTarget::focus(100, 1), FocusState::Acquired), 1);
        assert_matches!(f.arbiter.unregister(200, 1, false), Err(Error::NotFound { .. }));
    }

    #[test]
    fn test_watch_receives_one_notice_per_transition() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.watch(500, 9, FocusType::PLAYBACK, false).unwrap();

        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.release(&playback(100, 1)).unwrap();
        // capture transitions are not observed
        f.arbiter.acquire(&FocusRequest::new(100, 1, FocusType::CAPTURE)).unwrap();

        let watch = PeerTarget::watch(500, 9);
        assert_eq!(f.notifier.calls_to(watch, FocusState::Acquired), 1);
        assert_eq!(f.notifier.calls_to(watch, FocusState::Released), 1);

        let calls = f.notifier.calls();
        let (_, notice) = calls.iter().find(|(t, _)| *t == watch).unwrap();
        assert_eq!(notice.stream_type, "media");
        assert_eq!(notice.focus_type, FocusType::PLAYBACK);
    }

    #[test]
    fn test_watch_suppressed_for_same_stream_type() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "media", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.watch(500, 9, FocusType::BOTH, false).unwrap();

        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.arbiter.release(&playback(200, 1)).unwrap();

        assert!(f.notifier.calls().iter().all(|(t, _)| *t != PeerTarget::watch(500, 9)));
    }

    #[test]
    fn test_session_release_skips_callbacks_while_sibling_holds() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", true).unwrap();
        f.arbiter.register(200, 2, "alarm", true).unwrap();
        f.arbiter.watch(500, 9, FocusType::PLAYBACK, false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1).for_session(true)).unwrap();
        // session sibling does not preempt its own session
        f.arbiter.acquire(&playback(200, 2).for_session(true)).unwrap();
        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::PLAYBACK);
        f.notifier.clear();

        f.arbiter.release(&playback(200, 1).for_session(true)).unwrap();

        assert!(f.notifier.calls().is_empty());
        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::DEACTIVATED);
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::DEACTIVATED);

        // Last session member releases: the media victim comes back
        f.arbiter.release(&playback(200, 2).for_session(true)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_session_taker_recorded_by_session() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", true).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1).for_session(true)).unwrap();

        let taken = node(&f.arbiter, 100, 1).taken_by(FocusDirection::Playback).unwrap();
        assert!(taken.by_session);
        assert!(taken.refers_to(200, 42));
    }

    #[test]
    fn test_failed_notification_still_commits() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.notifier.make_unreachable(100);

        f.arbiter.acquire(&playback(200, 1)).expect("Unreachable victim must not block");

        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::DEACTIVATED);
        assert!(node(&f.arbiter, 100, 1).taken_by(FocusDirection::Playback).is_some());
        assert_eq!(f.notifier.calls_to(PeerTarget::focus(100, 1), FocusState::Released), 1);
    }

    #[test]
    fn test_declined_reacquire_is_not_restored() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.notifier.decline_reacquire(100, 1);

        f.arbiter.acquire(&playback(200, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).taken_by(FocusDirection::Playback), None);

        f.arbiter.release(&playback(200, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::DEACTIVATED);
    }

    #[test]
    fn test_stored_reacquisition_flag() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        assert!(f.arbiter.reacquisition(100, 1).unwrap());

        f.arbiter.set_reacquisition(100, 1, false).unwrap();
        assert!(!f.arbiter.reacquisition(100, 1).unwrap());
        assert_matches!(f.arbiter.set_reacquisition(9, 9, true), Err(Error::NotFound { .. }));

        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).taken_by(FocusDirection::Playback), None);
    }

    #[test]
    fn test_emergency_exit_restores_and_cleans() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.register(200, 2, "media", false).unwrap();
        f.arbiter.watch(200, 3, FocusType::BOTH, false).unwrap();
        f.arbiter.watch(500, 9, FocusType::PLAYBACK, false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.notifier.clear();

        f.arbiter.emergency_exit(200);

        f.arbiter.inspect(|reg| {
            assert!(reg.holders().chain(reg.watchers()).all(|n| n.pid != 200));
            assert_eq!(reg.references_to(200), 0);
        });
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
        assert_eq!(f.notifier.calls_to(PeerTarget::watch(500, 9), FocusState::Released), 1);

        // Second call is a no-op
        let before = f.arbiter.snapshot();
        f.arbiter.emergency_exit(200);
        assert_eq!(f.arbiter.snapshot(), before);
    }

    #[test]
    fn test_dead_process_swept_on_next_call() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();

        f.probe.kill(200);
        f.arbiter.register(300, 1, "notification", false).unwrap();

        assert!(f.arbiter.inspect(|reg| reg.find_holder(200, 1).is_none()));
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    /// Victim 100/1 loses playback to 200/1, which loses it to 200/2.
    fn exit_after_same_process_chain(sibling_first: bool, keep_capture: bool) -> Fixture {
        let f = fixture();
        if sibling_first {
            f.arbiter.register(200, 2, "emergency", false).unwrap();
        }
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        if !sibling_first {
            f.arbiter.register(200, 2, "emergency", false).unwrap();
        }

        f.arbiter.acquire(&playback(100, 1)).unwrap();
        let middle = if keep_capture { FocusType::BOTH } else { FocusType::PLAYBACK };
        f.arbiter.acquire(&FocusRequest::new(200, 1, middle)).unwrap();
        f.arbiter.acquire(&playback(200, 2)).unwrap();
        assert_eq!(node(&f.arbiter, 200, 1).status, middle.difference(FocusType::PLAYBACK));
        f.notifier.clear();

        f.arbiter.emergency_exit(200);
        f
    }

    #[test]
    fn test_emergency_exit_restores_through_same_process_chain() {
        for sibling_first in [true, false] {
            for keep_capture in [true, false] {
                let f = exit_after_same_process_chain(sibling_first, keep_capture);

                let victim = node(&f.arbiter, 100, 1);
                assert_eq!(victim.status, FocusType::PLAYBACK, "sibling_first={sibling_first}");
                assert_eq!(victim.taken_by(FocusDirection::Playback), None);
                assert_eq!(f.notifier.calls_to(PeerTarget::focus(100, 1), FocusState::Acquired), 1);
                assert_eq!(f.arbiter.inspect(FocusRegistry::len), 1);
            }
        }
    }

    #[test]
    fn test_emergency_exit_reaps_dead_processes_first() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(300, 1, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(300, 1)).unwrap();
        f.probe.kill(300);

        f.arbiter.emergency_exit(200);

        assert!(f.arbiter.inspect(|reg| reg.find_holder(300, 1).is_none()));
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_unregister_session_node_skips_callbacks() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", true).unwrap();
        f.arbiter.register(200, 2, "alarm", true).unwrap();
        f.arbiter.watch(500, 9, FocusType::PLAYBACK, false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.notifier.clear();

        f.arbiter.unregister(200, 1, true).expect("Failed to unregister");

        assert!(f.notifier.calls().is_empty());
        assert!(f.arbiter.inspect(|reg| reg.find_holder(200, 1).is_none()));
        let victim = node(&f.arbiter, 100, 1);
        assert_eq!(victim.status, FocusType::DEACTIVATED);
        assert!(victim.taken_by(FocusDirection::Playback).is_some_and(|t| t.refers_to(200, 2)));
    }

    #[test]
    fn test_registered_session_flag_decides_preemption() {
        let f = fixture();
        f.arbiter.register(200, 1, "alarm", true).unwrap();
        f.arbiter.register(200, 2, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();

        // Not a session holder, so the request flag does not spare its sibling
        f.arbiter.acquire(&playback(200, 2).for_session(true)).unwrap();

        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::DEACTIVATED);
        assert_eq!(node(&f.arbiter, 200, 2).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_deliver_moves_focus_and_entries() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.register(200, 2, "alarm", false).unwrap();
        f.arbiter.acquire(&playback(100, 1)).unwrap();
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        f.notifier.clear();

        f.arbiter.deliver(200, 1, 2, FocusType::PLAYBACK).expect("Failed to deliver");

        assert_eq!(node(&f.arbiter, 200, 1).status, FocusType::DEACTIVATED);
        assert_eq!(node(&f.arbiter, 200, 2).status, FocusType::PLAYBACK);
        assert_eq!(
            node(&f.arbiter, 100, 1).taken_by(FocusDirection::Playback).map(|t| t.handle_id),
            Some(2)
        );
        assert!(f.notifier.calls().is_empty());

        f.arbiter.release(&playback(200, 2)).unwrap();
        assert_eq!(node(&f.arbiter, 100, 1).status, FocusType::PLAYBACK);
    }

    #[test]
    fn test_deliver_errors() {
        let f = fixture();
        f.arbiter.register(200, 1, "alarm", false).unwrap();
        f.arbiter.register(200, 2, "alarm", false).unwrap();

        let playback_ty = FocusType::PLAYBACK;
        assert_matches!(f.arbiter.deliver(200, 1, 1, playback_ty), Err(Error::InvalidArgument(_)));
        assert_matches!(f.arbiter.deliver(200, 1, 2, playback_ty), Err(Error::InvalidState(_)));
        assert_matches!(
            f.arbiter.deliver(200, 1, 3, FocusType::DEACTIVATED),
            Err(Error::InvalidArgument(_))
        );
        f.arbiter.acquire(&playback(200, 1)).unwrap();
        assert_matches!(f.arbiter.deliver(200, 1, 3, playback_ty), Err(Error::NotFound { .. }));
    }

    #[test]
    fn test_acquired_focus_info() {
        let f = fixture();
        f.arbiter.register(100, 1, "media", false).unwrap();
        assert_matches!(
            f.arbiter.acquired_focus_info(FocusType::PLAYBACK),
            Err(Error::NoHolder(_))
        );
        assert_matches!(
            f.arbiter.acquired_focus_info(FocusType::BOTH),
            Err(Error::InvalidArgument(_))
        );

        f.arbiter.acquire(&playback(100, 1).with_option("podcast")).unwrap();
        let info = f.arbiter.acquired_focus_info(FocusType::PLAYBACK).unwrap();
        assert_eq!(info.stream_type, "media");
        assert_eq!(info.option_name, "podcast");
        assert_eq!((info.pid, info.handle_id), (100, 1));
    }

    #[test]
    fn test_mock_notifier_called_once_per_victim() {
        let mut mock = MockPeerNotifier::new();
        mock.expect_notify()
            .withf(|target, notice, _| {
                *target == PeerTarget::focus(100, 1) && notice.state == FocusState::Released
            })
            .times(1)
            .returning(|_, _, _| Err(NotifyError::Timeout(Duration::from_millis(10))));

        let probe = Arc::new(StaticProbe::default());
        let arbiter = FocusArbiter::new(Arc::new(test_table()), Arc::new(mock), probe)
            .with_timeout(Duration::from_millis(10));
        arbiter.register(100, 1, "media", false).unwrap();
        arbiter.register(200, 1, "call", false).unwrap();
        arbiter.acquire(&playback(100, 1)).unwrap();
        arbiter.acquire(&playback(200, 1)).unwrap();

        assert_eq!(node(&arbiter, 200, 1).status, FocusType::PLAYBACK);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const STREAMS: [&str; 5] = ["emergency", "call", "alarm", "notification", "media"];

        #[derive(Debug, Clone)]
        enum Op {
            Register { pid: Pid, handle: HandleId, stream: usize, session: bool },
            Acquire { pid: Pid, handle: HandleId, bits: u8 },
            Release { pid: Pid, handle: HandleId, bits: u8 },
            Unregister { pid: Pid, handle: HandleId },
            Watch { pid: Pid, handle: HandleId, bits: u8 },
            Deliver { pid: Pid, src: HandleId, dst: HandleId, bits: u8 },
        }

        fn op(sessions: bool) -> impl Strategy<Value = Op> {
            let pid = 1..4i32;
            let handle = 1..4i32;
            let session = any::<bool>().prop_map(move |s| s && sessions);
            prop_oneof![
                (pid.clone(), handle.clone(), 0..STREAMS.len(), session).prop_map(
                    |(pid, handle, stream, session)| Op::Register { pid, handle, stream, session }
                ),
                // Same-process preemption chains
                (pid.clone(), handle.clone(), 0..STREAMS.len()).prop_map(|(pid, handle, stream)| {
                    Op::Register { pid, handle, stream, session: false }
                }),
                (pid.clone(), handle.clone(), handle.clone(), 1..=3u8)
                    .prop_map(|(pid, src, dst, bits)| Op::Deliver { pid, src, dst, bits }),
                (pid.clone(), handle.clone(), 1..=3u8)
                    .prop_map(|(pid, handle, bits)| Op::Acquire { pid, handle, bits }),
                (pid.clone(), handle.clone(), 1..=3u8)
                    .prop_map(|(pid, handle, bits)| Op::Release { pid, handle, bits }),
                (pid.clone(), handle.clone())
                    .prop_map(|(pid, handle)| Op::Unregister { pid, handle }),
                (pid, handle, 1..=3u8)
                    .prop_map(|(pid, handle, bits)| Op::Watch { pid, handle, bits }),
            ]
        }

        fn apply(arbiter: &FocusArbiter, op: &Op) {
            let bits = |b: u8| FocusType::from_bits(b).unwrap();
            // Errors are expected outcomes here; only the final state matters
            let _ = match *op {
                Op::Register { pid, handle, stream, session } => {
                    arbiter.register(pid, handle, STREAMS[stream], session).map(|_| ())
                }
                Op::Acquire { pid, handle, bits: b } => {
                    arbiter.acquire(&FocusRequest::new(pid, handle, bits(b)))
                }
                Op::Release { pid, handle, bits: b } => {
                    arbiter.release(&FocusRequest::new(pid, handle, bits(b)))
                }
                Op::Unregister { pid, handle } => arbiter.unregister(pid, handle, false),
                Op::Watch { pid, handle, bits: b } => {
                    arbiter.watch(pid, handle, bits(b), false).map(|_| ())
                }
                Op::Deliver { pid, src, dst, bits: b } => arbiter.deliver(pid, src, dst, bits(b)),
            };
        }

        proptest! {
            #[test]
            fn test_emergency_exit_leaves_no_trace(
                ops in prop::collection::vec(op(true), 0..40),
                victim in 1..4i32,
            ) {
                let f = fixture();
                for op in &ops {
                    apply(&f.arbiter, op);
                }

                f.arbiter.emergency_exit(victim);

                let (owned, refs) = f.arbiter.inspect(|reg| {
                    let owned = reg.holders().chain(reg.watchers()).filter(|n| n.pid == victim);
                    (owned.count(), reg.references_to(victim))
                });
                prop_assert_eq!(owned, 0);
                prop_assert_eq!(refs, 0);

                let before = f.arbiter.snapshot();
                f.arbiter.emergency_exit(victim);
                prop_assert_eq!(f.arbiter.snapshot(), before);
            }

            #[test]
            fn test_emergency_exit_never_strands_other_processes(
                ops in prop::collection::vec(op(false), 0..60),
                victim in 1..4i32,
            ) {
                let f = fixture();
                for op in &ops {
                    apply(&f.arbiter, op);
                }
                let waiting: Vec<(NodeId, FocusDirection)> = f.arbiter.inspect(|reg| {
                    reg.holders()
                        .filter(|n| n.pid != victim)
                        .flat_map(|n| {
                            FocusDirection::ALL
                                .into_iter()
                                .filter(move |d| n.taken_by(*d).is_some_and(|t| t.pid == victim))
                                .map(move |d| (n.id, d))
                        })
                        .collect()
                });

                f.arbiter.emergency_exit(victim);

                for (id, dir) in waiting {
                    let node = f.arbiter.inspect(|reg| reg.get(id).cloned()).expect("node missing");
                    prop_assert!(
                        node.status.intersects(dir.focus_type()) || node.taken_by(dir).is_some(),
                        "{:?} stranded in {:?}",
                        node,
                        dir
                    );
                }
            }

            #[test]
            fn test_taken_by_only_on_cleared_bits(ops in prop::collection::vec(op(true), 0..40)) {
                let f = fixture();
                for op in &ops {
                    apply(&f.arbiter, op);
                }

                for node in f.arbiter.snapshot().iter().filter(|n| !n.is_for_watch) {
                    for dir in FocusDirection::ALL {
                        if node.taken_by(dir).is_some() {
                            prop_assert!(!node.status.intersects(dir.focus_type()));
                        }
                    }
                }
            }
        }
    }
}
