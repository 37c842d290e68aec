// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Discovery database: per-change acknowledgement bookkeeping for a
//! discovery-server topology.
//!
//! The server keeps, for every discovery change it published, the set of
//! remote participants that are relevant to it and whether each has
//! acknowledged the latest version. A background loop retransmits to any
//! participant still unacked until its lease expires.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::types::{GuidPrefix, SequenceNumber};

/// Ack status of one discovery change across remote participants.
#[derive(Debug, Clone, Default)]
pub struct ParticipantsAckStatus {
    relevant: HashMap<GuidPrefix, bool>,
}

impl ParticipantsAckStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a participant's ack state.
    pub fn add_or_update(&mut self, guid_prefix: GuidPrefix, acked: bool) {
        self.relevant.insert(guid_prefix, acked);
    }

    /// Forget a participant entirely.
    pub fn remove(&mut self, guid_prefix: &GuidPrefix) {
        self.relevant.remove(guid_prefix);
    }

    /// Mark every participant unacked (the change was republished).
    pub fn unmatch_all(&mut self) {
        for acked in self.relevant.values_mut() {
            *acked = false;
        }
    }

    /// True iff the participant is known and has acked.
    pub fn is_matched(&self, guid_prefix: &GuidPrefix) -> bool {
        self.relevant.get(guid_prefix).copied().unwrap_or(false)
    }

    /// True iff the participant is known at all.
    pub fn is_relevant_participant(&self, guid_prefix: &GuidPrefix) -> bool {
        self.relevant.contains_key(guid_prefix)
    }

    /// Participants that have not acked yet.
    pub fn pending(&self) -> Vec<GuidPrefix> {
        self.relevant
            .iter()
            .filter(|(_, &acked)| !acked)
            .map(|(prefix, _)| *prefix)
            .collect()
    }

    /// True when every relevant participant acked.
    pub fn is_acked_by_all(&self) -> bool {
        self.relevant.values().all(|&acked| acked)
    }

    pub fn len(&self) -> usize {
        self.relevant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relevant.is_empty()
    }
}

/// Server-side tracking of own discovery changes and who acked them.
#[derive(Default)]
pub struct DiscoveryDatabase {
    changes: Mutex<BTreeMap<SequenceNumber, ParticipantsAckStatus>>,
}

impl DiscoveryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new own discovery change was published: every known participant
    /// becomes relevant and unacked for it.
    pub fn change_published(&self, seq: SequenceNumber, participants: &[GuidPrefix]) {
        let mut status = ParticipantsAckStatus::new();
        for prefix in participants {
            status.add_or_update(*prefix, false);
        }
        self.changes.lock().insert(seq, status);
    }

    /// A remote participant appeared: it becomes relevant (unacked) for
    /// every outstanding change.
    pub fn participant_added(&self, guid_prefix: GuidPrefix) {
        let mut changes = self.changes.lock();
        for status in changes.values_mut() {
            status.add_or_update(guid_prefix, false);
        }
    }

    /// A remote participant's lease expired or it left: forget it.
    pub fn participant_removed(&self, guid_prefix: &GuidPrefix) {
        let mut changes = self.changes.lock();
        for status in changes.values_mut() {
            status.remove(guid_prefix);
        }
    }

    /// An ACKNACK on the discovery topic acknowledged everything below
    /// `base` for the sending participant.
    pub fn acked_up_to(&self, guid_prefix: GuidPrefix, base: SequenceNumber) {
        let mut changes = self.changes.lock();
        for (seq, status) in changes.iter_mut() {
            if *seq < base && status.is_relevant_participant(&guid_prefix) {
                status.add_or_update(guid_prefix, true);
            }
        }
    }

    /// Changes that still have unacked participants, with the pending set.
    /// This is what the retransmit loop iterates.
    pub fn pending_changes(&self) -> Vec<(SequenceNumber, Vec<GuidPrefix>)> {
        self.changes
            .lock()
            .iter()
            .filter_map(|(seq, status)| {
                let pending = status.pending();
                if pending.is_empty() {
                    None
                } else {
                    Some((*seq, pending))
                }
            })
            .collect()
    }

    /// Drop tracking for a withdrawn change.
    pub fn change_removed(&self, seq: SequenceNumber) {
        self.changes.lock().remove(&seq);
    }

    /// Snapshot of one change's ack status (tests/diagnostics).
    pub fn status_of(&self, seq: SequenceNumber) -> Option<ParticipantsAckStatus> {
        self.changes.lock().get(&seq).cloned()
    }
}
