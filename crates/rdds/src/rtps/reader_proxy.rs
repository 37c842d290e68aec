// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Writer-side per-reader state (RTPS v2.3 Sec.8.4.7.5 ReaderProxy).
//!
//! One `ChangeForReader` entry per (reader, change). Entries hold only the
//! sequence number and status; payload lookup goes through the writer's
//! history at send time, so an evicted change can never dangle. For reliable
//! readers the status progresses `Unsent -> Underway -> Unacknowledged ->
//! Acknowledged`, re-entering `Requested` from `Unacknowledged` on a NACK.

use std::collections::BTreeMap;

use crate::types::{Guid, Locator, SequenceNumber};

/// Delivery status of one change with respect to one reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeForReaderStatus {
    Unsent,
    Underway,
    Unacknowledged,
    Requested,
    Acknowledged,
}

/// State of one change for one reader.
#[derive(Debug, Clone, Copy)]
pub struct ChangeForReader {
    pub status: ChangeForReaderStatus,
    pub is_relevant: bool,
}

/// Per-matched-reader bookkeeping held by a stateful writer.
pub struct ReaderProxy {
    pub remote_guid: Guid,
    /// Remote reader expects reliable delivery.
    pub reliable: bool,
    pub expects_inline_qos: bool,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    changes: BTreeMap<SequenceNumber, ChangeForReader>,
    /// Monotonic counter stamped on heartbeats sent to this reader.
    heartbeat_count: u32,
    /// Highest ACKNACK count processed (duplicate-replay protection).
    last_acknack_count: Option<u32>,
    /// Highest NACKFRAG count processed.
    last_nackfrag_count: Option<u32>,
    /// Heartbeats sent while this reader made no ack progress.
    unanswered_heartbeats: u32,
}

impl ReaderProxy {
    pub fn new(
        remote_guid: Guid,
        reliable: bool,
        unicast_locators: Vec<Locator>,
        multicast_locators: Vec<Locator>,
    ) -> Self {
        Self {
            remote_guid,
            reliable,
            expects_inline_qos: false,
            unicast_locators,
            multicast_locators,
            changes: BTreeMap::new(),
            heartbeat_count: 0,
            last_acknack_count: None,
            last_nackfrag_count: None,
            unanswered_heartbeats: 0,
        }
    }

    /// Register a new change in `Unsent`.
    pub fn change_created(&mut self, seq: SequenceNumber) {
        self.changes.insert(
            seq,
            ChangeForReader {
                status: ChangeForReaderStatus::Unsent,
                is_relevant: true,
            },
        );
    }

    /// Register an old change as already settled (volatile late-join: the
    /// reader will never receive it; a NACK for it yields GAP).
    pub fn change_irrelevant(&mut self, seq: SequenceNumber) {
        self.changes.insert(
            seq,
            ChangeForReader {
                status: ChangeForReaderStatus::Acknowledged,
                is_relevant: false,
            },
        );
    }

    /// History evicted `seq`: settle the entry so nothing retransmits it.
    /// Returns true when the reader had not acknowledged it yet (a GAP is
    /// owed downstream).
    pub fn change_removed(&mut self, seq: SequenceNumber) -> bool {
        match self.changes.get_mut(&seq) {
            Some(entry) => {
                let owed = entry.status != ChangeForReaderStatus::Acknowledged;
                entry.status = ChangeForReaderStatus::Acknowledged;
                entry.is_relevant = false;
                owed
            }
            None => false,
        }
    }

    /// Collect changes to transmit this pass (Unsent + Requested), marking
    /// them Underway.
    pub fn take_sendable(&mut self) -> Vec<SequenceNumber> {
        let mut out = Vec::new();
        for (&seq, entry) in self.changes.iter_mut() {
            if !entry.is_relevant {
                continue;
            }
            if matches!(
                entry.status,
                ChangeForReaderStatus::Unsent | ChangeForReaderStatus::Requested
            ) {
                entry.status = ChangeForReaderStatus::Underway;
                out.push(seq);
            }
        }
        out
    }

    /// Transmission of `seq` done: Underway -> Unacknowledged for reliable
    /// readers; best-effort entries are settled immediately.
    pub fn change_sent(&mut self, seq: SequenceNumber) {
        if let Some(entry) = self.changes.get_mut(&seq) {
            if entry.status == ChangeForReaderStatus::Underway {
                entry.status = if self.reliable {
                    ChangeForReaderStatus::Unacknowledged
                } else {
                    ChangeForReaderStatus::Acknowledged
                };
            }
        }
    }

    /// ACKNACK base: everything below `base` is acknowledged.
    pub fn acked_changes_set(&mut self, base: SequenceNumber) {
        for (_, entry) in self.changes.range_mut(..base) {
            entry.status = ChangeForReaderStatus::Acknowledged;
        }
        self.unanswered_heartbeats = 0;
    }

    /// A heartbeat went out with acks still pending; returns the count of
    /// consecutive unanswered heartbeats (the writer's give-up signal).
    pub fn heartbeat_unanswered(&mut self) -> u32 {
        self.unanswered_heartbeats = self.unanswered_heartbeats.saturating_add(1);
        self.unanswered_heartbeats
    }

    /// ACKNACK bitmap bit: transition to Requested. Returns false when the
    /// sequence is not retransmittable from this proxy (unknown or already
    /// settled as irrelevant) and the writer owes a GAP instead.
    pub fn requested_change_set(&mut self, seq: SequenceNumber) -> bool {
        match self.changes.get_mut(&seq) {
            Some(entry) if entry.is_relevant => {
                if matches!(
                    entry.status,
                    ChangeForReaderStatus::Unacknowledged | ChangeForReaderStatus::Underway
                ) {
                    entry.status = ChangeForReaderStatus::Requested;
                }
                true
            }
            _ => false,
        }
    }

    /// Duplicate-replay check for ACKNACK. Returns false (drop) for a count
    /// at or below the last processed one.
    pub fn acknack_count_check(&mut self, count: u32) -> bool {
        if let Some(last) = self.last_acknack_count {
            if count <= last {
                return false;
            }
        }
        self.last_acknack_count = Some(count);
        true
    }

    /// Duplicate-replay check for NACKFRAG.
    pub fn nackfrag_count_check(&mut self, count: u32) -> bool {
        if let Some(last) = self.last_nackfrag_count {
            if count <= last {
                return false;
            }
        }
        self.last_nackfrag_count = Some(count);
        true
    }

    /// Next heartbeat count for this proxy (monotonic).
    pub fn next_heartbeat_count(&mut self) -> u32 {
        self.heartbeat_count = self.heartbeat_count.wrapping_add(1);
        self.heartbeat_count
    }

    /// Inclusive range of unacknowledged relevant changes, if any.
    pub fn unacked_range(&self) -> Option<(SequenceNumber, SequenceNumber)> {
        let mut lo = None;
        let mut hi = None;
        for (&seq, entry) in &self.changes {
            if entry.is_relevant && entry.status != ChangeForReaderStatus::Acknowledged {
                lo.get_or_insert(seq);
                hi = Some(seq);
            }
        }
        Some((lo?, hi?))
    }

    /// True when every relevant entry is acknowledged.
    pub fn all_acknowledged(&self) -> bool {
        self.changes
            .values()
            .all(|e| !e.is_relevant || e.status == ChangeForReaderStatus::Acknowledged)
    }

    /// Highest sequence acknowledged contiguously from the start of the set
    /// (used for history GC across all proxies).
    pub fn acked_up_to(&self) -> SequenceNumber {
        let mut acked = 0;
        for (&seq, entry) in &self.changes {
            if entry.status == ChangeForReaderStatus::Acknowledged {
                acked = seq;
            } else {
                break;
            }
        }
        acked
    }

    /// Status of one entry (diagnostics and tests).
    pub fn status_of(&self, seq: SequenceNumber) -> Option<ChangeForReaderStatus> {
        self.changes.get(&seq).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Preferred destination for unicast traffic to this reader.
    pub fn preferred_locator(&self) -> Option<&Locator> {
        self.unicast_locators
            .first()
            .or_else(|| self.multicast_locators.first())
    }
}
