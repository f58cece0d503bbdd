//! The focus node registry.
//!
//! Holds every holder and watch node in insertion order. The registry is
//! not synchronized itself; [`crate::FocusArbiter`] owns it behind a single
//! lock and every operation runs with that lock held.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::focus::{FocusDirection, FocusType, HandleId, Pid, validate_name};
use crate::node::{FocusNode, NodeId, TakenBy};
use crate::priority::PriorityTable;
use crate::process::ProcessProbe;

/// In-memory collection of focus holder and watch nodes.
pub struct FocusRegistry {
    /// Holder nodes in insertion order
    holders: Vec<FocusNode>,
    /// Watch nodes in insertion order
    watchers: Vec<FocusNode>,
    priorities: Arc<PriorityTable>,
    probe: Arc<dyn ProcessProbe>,
    next_id: u64,
}

impl FocusRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(priorities: Arc<PriorityTable>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self { holders: Vec::new(), watchers: Vec::new(), priorities, probe, next_id: 1 }
    }

    #[must_use]
    pub fn priorities(&self) -> &PriorityTable {
        &self.priorities
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a holder node.
    ///
    /// # Errors
    /// Returns `AlreadyExists` for a duplicate `(pid, handle_id)` and
    /// `InvalidStreamType` if the stream type is not in the priority table.
    pub fn create_node(
        &mut self,
        pid: Pid,
        handle_id: HandleId,
        stream_type: &str,
        is_for_session: bool,
    ) -> Result<NodeId> {
        self.sweep_dead();

        if self.find_holder(pid, handle_id).is_some() {
            return Err(Error::AlreadyExists { pid, handle_id });
        }
        validate_name("stream type", stream_type)
            .map_err(|_| Error::InvalidStreamType(stream_type.to_string()))?;
        let priority = self
            .priorities
            .priority_of(stream_type)
            .ok_or_else(|| Error::InvalidStreamType(stream_type.to_string()))?;

        let id = self.alloc_id();
        self.holders.push(FocusNode::holder(
            id,
            pid,
            handle_id,
            stream_type,
            priority,
            is_for_session,
        ));
        debug!(%id, pid, handle_id, stream_type, priority, is_for_session, "Holder node created");
        Ok(id)
    }

    /// Remove a holder node, re-pointing `taken_by` entries that named it.
    ///
    /// # Errors
    /// Returns `NotFound` if no holder matches.
    pub fn destroy_node(&mut self, pid: Pid, handle_id: HandleId) -> Result<FocusNode> {
        let pos = self
            .holders
            .iter()
            .position(|n| n.is(pid, handle_id))
            .ok_or(Error::NotFound { pid, handle_id })?;
        let node = self.holders.remove(pos);

        if node.is_for_session && self.has_session_sibling(pid, node.id) {
            debug!(pid, handle_id, "Session still alive, keeping taken_by entries");
        } else {
            self.chain_taken_by(&node);
        }

        debug!(id = %node.id, pid, handle_id, "Holder node destroyed");
        Ok(node)
    }

    /// Remove a holder by id and chain its `taken_by` entries unconditionally.
    pub fn take_holder(&mut self, id: NodeId) -> Option<FocusNode> {
        let pos = self.holders.iter().position(|n| n.id == id)?;
        let node = self.holders.remove(pos);
        self.chain_taken_by(&node);
        Some(node)
    }

    /// Register a watch node observing `request_type`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty type and `AlreadyExists` for a
    /// duplicate watch.
    pub fn set_watch(
        &mut self,
        pid: Pid,
        handle_id: HandleId,
        request_type: FocusType,
        is_for_session: bool,
    ) -> Result<NodeId> {
        self.sweep_dead();

        if request_type.is_empty() {
            return Err(Error::InvalidArgument("watch type must not be empty".to_string()));
        }
        if self.find_watcher(pid, handle_id).is_some() {
            return Err(Error::AlreadyExists { pid, handle_id });
        }

        let id = self.alloc_id();
        self.watchers.push(FocusNode::watcher(id, pid, handle_id, request_type, is_for_session));
        debug!(%id, pid, handle_id, %request_type, "Watch node created");
        Ok(id)
    }

    /// Remove a watch node.
    ///
    /// # Errors
    /// Returns `NotFound` if no watch node matches.
    pub fn unset_watch(&mut self, pid: Pid, handle_id: HandleId) -> Result<FocusNode> {
        let pos = self
            .watchers
            .iter()
            .position(|n| n.is(pid, handle_id))
            .ok_or(Error::NotFound { pid, handle_id })?;
        let node = self.watchers.remove(pos);
        debug!(id = %node.id, pid, handle_id, "Watch node removed");
        Ok(node)
    }

    /// Remove every watch node owned by `pid`.
    pub fn remove_watchers_of(&mut self, pid: Pid) -> Vec<FocusNode> {
        let (gone, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.watchers).into_iter().partition(|n| n.pid == pid);
        self.watchers = kept;
        gone
    }

    /// Remove every node owned by a dead process, using the configured probe.
    pub fn sweep_dead(&mut self) -> Vec<FocusNode> {
        let probe = Arc::clone(&self.probe);
        self.sweep_dead_with(|pid| probe.is_alive(pid))
    }

    /// Remove every node whose pid fails `is_alive`.
    pub fn sweep_dead_with(&mut self, is_alive: impl Fn(Pid) -> bool) -> Vec<FocusNode> {
        let mut removed = Vec::new();
        for pid in self.distinct_pids().into_iter().filter(|pid| !is_alive(*pid)) {
            info!(pid, "Reclaiming nodes of dead process");
            removed.extend(self.remove_watchers_of(pid));
            self.bypass_siblings(pid);
            for id in self.holder_ids_of(pid) {
                removed.extend(self.take_holder(id));
            }
            self.scrub_pid(pid);
        }
        removed
    }

    /// Pids, in registry order, that the probe reports as dead.
    #[must_use]
    pub fn dead_pids(&self) -> Vec<Pid> {
        self.distinct_pids().into_iter().filter(|pid| !self.probe.is_alive(*pid)).collect()
    }

    fn distinct_pids(&self) -> Vec<Pid> {
        let mut pids = Vec::new();
        for node in self.holders.iter().chain(&self.watchers) {
            if !pids.contains(&node.pid) {
                pids.push(node.pid);
            }
        }
        pids
    }

    /// Re-point entries that named `removed` to whatever `removed` itself had
    /// recorded, one hop further back.
    fn chain_taken_by(&mut self, removed: &FocusNode) {
        for node in &mut self.holders {
            for dir in FocusDirection::ALL {
                let Some(holder) = node.taken_by(dir) else { continue };
                if !holder.refers_to(removed.pid, removed.handle_id) {
                    continue;
                }
                let previous = removed
                    .taken_by(dir)
                    .filter(|prev| !prev.refers_to(node.pid, node.handle_id));
                debug!(
                    pid = node.pid,
                    handle_id = node.handle_id,
                    ?dir,
                    ?previous,
                    "Chaining taken_by past removed node"
                );
                node.set_taken_by(dir, previous);
            }
        }
    }

    /// Re-point exact (non-session) entries for `bits` from one handle of
    /// `pid` to another. Returns the number of slots changed.
    pub fn retarget_taken_by(
        &mut self,
        pid: Pid,
        from: HandleId,
        to: HandleId,
        bits: FocusType,
    ) -> usize {
        let mut moved = 0;
        for node in &mut self.holders {
            if node.is(pid, to) {
                continue;
            }
            for dir in bits.directions() {
                if let Some(entry) = node.taken_by(dir)
                    && !entry.by_session
                    && entry.pid == pid
                    && entry.handle_id == from
                {
                    node.set_taken_by(dir, Some(TakenBy { handle_id: to, ..entry }));
                    moved += 1;
                }
            }
        }
        moved
    }

    /// Re-point entries past holders of `pid` that lost a direction to
    /// another holder of `pid`. Afterwards no holder of `pid` records a
    /// sibling as its taker. Returns the number of slots changed.
    pub fn bypass_siblings(&mut self, pid: Pid) -> usize {
        let mut changed = 0;
        for id in self.holder_ids_of(pid) {
            for dir in FocusDirection::ALL {
                let Some(node) = self.get(id) else { continue };
                let Some(taker) = node.taken_by(dir).filter(|t| t.pid == pid) else {
                    continue;
                };
                let (node_pid, node_handle) = (node.pid, node.handle_id);

                for other in &mut self.holders {
                    if other.id == id {
                        continue;
                    }
                    let Some(entry) = other.taken_by(dir) else { continue };
                    if !entry.refers_to(node_pid, node_handle) {
                        continue;
                    }
                    let next = Some(taker).filter(|t| !t.refers_to(other.pid, other.handle_id));
                    other.set_taken_by(dir, next);
                    changed += 1;
                }

                if let Some(node) = self.get_mut(id) {
                    node.set_taken_by(dir, None);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Clear every `taken_by` slot naming `pid`. Returns the number cleared.
    pub fn scrub_pid(&mut self, pid: Pid) -> usize {
        let mut cleared = 0;
        for node in &mut self.holders {
            for slot in &mut node.taken_by {
                if slot.is_some_and(|t| t.pid == pid) {
                    *slot = None;
                    cleared += 1;
                }
            }
        }
        cleared
    }

    /// Number of `taken_by` slots naming `pid`.
    #[must_use]
    pub fn references_to(&self, pid: Pid) -> usize {
        self.holders
            .iter()
            .flat_map(|n| n.taken_by.iter().flatten())
            .filter(|t| t.pid == pid)
            .count()
    }

    #[must_use]
    pub fn find_holder(&self, pid: Pid, handle_id: HandleId) -> Option<&FocusNode> {
        self.holders.iter().find(|n| n.is(pid, handle_id))
    }

    pub fn find_holder_mut(&mut self, pid: Pid, handle_id: HandleId) -> Option<&mut FocusNode> {
        self.holders.iter_mut().find(|n| n.is(pid, handle_id))
    }

    #[must_use]
    pub fn find_watcher(&self, pid: Pid, handle_id: HandleId) -> Option<&FocusNode> {
        self.watchers.iter().find(|n| n.is(pid, handle_id))
    }

    /// Look up any node by id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&FocusNode> {
        self.holders.iter().chain(&self.watchers).find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut FocusNode> {
        self.holders.iter_mut().chain(&mut self.watchers).find(|n| n.id == id)
    }

    /// Ids of the holders owned by `pid`, in insertion order.
    #[must_use]
    pub fn holder_ids_of(&self, pid: Pid) -> Vec<NodeId> {
        self.holders.iter().filter(|n| n.pid == pid).map(|n| n.id).collect()
    }

    /// True if another session holder of `pid` exists besides `exclude`.
    #[must_use]
    pub fn has_session_sibling(&self, pid: Pid, exclude: NodeId) -> bool {
        self.holders.iter().any(|n| n.id != exclude && n.pid == pid && n.is_for_session)
    }

    /// True if another session holder of `pid` holds any of `bits`.
    #[must_use]
    pub fn session_holds(&self, pid: Pid, exclude: NodeId, bits: FocusType) -> bool {
        self.holders.iter().any(|n| {
            n.id != exclude && n.pid == pid && n.is_for_session && n.status.intersects(bits)
        })
    }

    /// Holder nodes in insertion order.
    pub fn holders(&self) -> impl Iterator<Item = &FocusNode> {
        self.holders.iter()
    }

    /// Watch nodes in insertion order.
    pub fn watchers(&self) -> impl Iterator<Item = &FocusNode> {
        self.watchers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.holders.len() + self.watchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty() && self.watchers.is_empty()
    }
}
