// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Stateful writer: the writer half of the reliability protocol.
//!
//! Event handlers (all under the owning endpoint's mutex):
//! - new local change: every matched proxy gains an `Unsent` entry
//! - send pass: Unsent/Requested go out as DATA (or DATAFRAG trains),
//!   transitioning Underway then Unacknowledged
//! - heartbeat period: HEARTBEAT per proxy with pending acks, final-flag
//!   HEARTBEAT once everything is acknowledged
//! - ACKNACK: idempotent on count; base acknowledges, bitmap re-requests,
//!   unavailable sequences answer with GAP
//! - NACKFRAG: per-fragment retransmission
//!
//! Changes acknowledged by every matched reader are garbage-collected from
//! the history unless durability keeps them for late joiners.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheChange, ChangeKind, HistoryCache};
use crate::config::{
    DEFAULT_HEARTBEAT_PERIOD, DEFAULT_NACK_RESPONSE_DELAY, MAX_HEARTBEAT_RETRANSMITS,
    UDP_MTU_PAYLOAD,
};
use crate::error::{Error, Result};
use crate::messages::{
    AckNackSubmessage, DataFragSubmessage, DataSubmessage, GapSubmessage, HeartbeatSubmessage,
    MessageBuilder, NackFragSubmessage,
};
use crate::qos::{Durability, QosProfile};
use crate::rtps::reader_proxy::ReaderProxy;
use crate::rtps::{MessageSender, WriterListener};
use crate::types::{Guid, GuidPrefix, InstanceHandle, Locator, SequenceNumber};

/// Reliable writer with per-reader proxies.
pub struct StatefulWriter {
    guid: Guid,
    qos: QosProfile,
    history: HistoryCache,
    matched_readers: BTreeMap<Guid, ReaderProxy>,
    last_sequence_number: SequenceNumber,
    listener: Option<Arc<dyn WriterListener>>,
    heartbeat_period: Duration,
    nack_response_delay: Duration,
}

impl StatefulWriter {
    pub fn new(guid: Guid, qos: QosProfile) -> Self {
        let history = HistoryCache::new(qos.history, qos.resource_limits);
        Self {
            guid,
            qos,
            history,
            matched_readers: BTreeMap::new(),
            last_sequence_number: 0,
            listener: None,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            nack_response_delay: DEFAULT_NACK_RESPONSE_DELAY,
        }
    }

    pub fn set_listener(&mut self, listener: Arc<dyn WriterListener>) {
        self.listener = Some(listener);
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn qos(&self) -> &QosProfile {
        &self.qos
    }

    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period
    }

    pub fn nack_response_delay(&self) -> Duration {
        self.nack_response_delay
    }

    pub fn last_sequence_number(&self) -> SequenceNumber {
        self.last_sequence_number
    }

    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    pub fn matched_reader_count(&self) -> usize {
        self.matched_readers.len()
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Add (or replace) a matched reader.
    ///
    /// With TRANSIENT_LOCAL durability the existing history is replayed to
    /// the late joiner; with VOLATILE the old changes are registered as
    /// settled so a NACK for them draws a GAP, not a retransmission.
    pub fn matched_reader_add(&mut self, mut proxy: ReaderProxy) {
        for change in self.history.iter() {
            if self.qos.durability == Durability::TransientLocal {
                proxy.change_created(change.sequence_number);
            } else {
                proxy.change_irrelevant(change.sequence_number);
            }
        }
        log::debug!(
            "[StatefulWriter] {} matched reader {}",
            self.guid,
            proxy.remote_guid
        );
        self.matched_readers.insert(proxy.remote_guid, proxy);
        if let Some(listener) = &self.listener {
            listener.on_reader_matched(true);
        }
    }

    pub fn matched_reader_remove(&mut self, reader_guid: &Guid) -> bool {
        let removed = self.matched_readers.remove(reader_guid).is_some();
        if removed {
            if let Some(listener) = &self.listener {
                listener.on_reader_matched(false);
            }
        }
        removed
    }

    pub fn is_matched_to(&self, reader_guid: &Guid) -> bool {
        self.matched_readers.contains_key(reader_guid)
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Create a new local change; every matched proxy gains an Unsent entry.
    /// The caller follows up with [`StatefulWriter::perform_send`].
    pub fn new_change(
        &mut self,
        kind: ChangeKind,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
    ) -> Result<SequenceNumber> {
        let seq = self.last_sequence_number + 1;
        let change = CacheChange::keyed(kind, self.guid, seq, instance_handle, payload);

        let evicted = match self.history.add_change(change) {
            Ok(evicted) => evicted,
            Err(Error::HistoryFull) => {
                // Reliable backpressure: refuse until acks advance.
                log::debug!(
                    "[StatefulWriter] {} history full at seq={}, refusing sample",
                    self.guid,
                    seq
                );
                return Err(Error::HistoryFull);
            }
            Err(e) => return Err(e),
        };

        self.last_sequence_number = seq;
        for proxy in self.matched_readers.values_mut() {
            for &old in &evicted {
                proxy.change_removed(old);
            }
            proxy.change_created(seq);
        }
        Ok(seq)
    }

    /// Send pass: transmit every Unsent/Requested change of every proxy.
    ///
    /// The last DATA to a reliable reader carries a piggybacked HEARTBEAT
    /// so the reader learns the writer's window without waiting for the
    /// next heartbeat period.
    pub fn perform_send(&mut self, sender: &dyn MessageSender) {
        let prefix = self.guid.prefix;
        let writer_entity = self.guid.entity_id;

        for proxy in self.matched_readers.values_mut() {
            let Some(&locator) = proxy.preferred_locator() else {
                continue;
            };
            let sendable = proxy.take_sendable();
            let last_index = sendable.len().saturating_sub(1);
            for (index, seq) in sendable.into_iter().enumerate() {
                match self.history.get_change(seq) {
                    Some(change) => {
                        let piggyback = if proxy.reliable && index == last_index {
                            let first = self.history.min_seq().unwrap_or(seq);
                            let count = proxy.next_heartbeat_count();
                            Some(HeartbeatSubmessage::new(
                                proxy.remote_guid.entity_id,
                                writer_entity,
                                first,
                                self.last_sequence_number,
                                count,
                            ))
                        } else {
                            None
                        };
                        send_change(
                            prefix,
                            writer_entity,
                            proxy,
                            &locator,
                            change,
                            piggyback.as_ref(),
                            sender,
                        );
                        proxy.change_sent(seq);
                    }
                    None => {
                        // Evicted since the entry was created: the reader
                        // must skip it.
                        send_gap(prefix, writer_entity, proxy, &locator, seq, sender);
                        proxy.change_removed(seq);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Timer events
    // ========================================================================

    /// Heartbeat-period event. Returns the proxies that exceeded the
    /// retransmit cap (reliable delivery gave up on them).
    pub fn on_heartbeat_period(&mut self, sender: &dyn MessageSender) -> Vec<Guid> {
        let first = self
            .history
            .min_seq()
            .unwrap_or(self.last_sequence_number + 1);
        let last = self.last_sequence_number;
        let prefix = self.guid.prefix;
        let writer_entity = self.guid.entity_id;

        let mut gave_up = Vec::new();
        let mut all_acked = !self.matched_readers.is_empty();

        for proxy in self.matched_readers.values_mut() {
            let Some(&locator) = proxy.preferred_locator() else {
                continue;
            };
            let count = proxy.next_heartbeat_count();
            let mut hb =
                HeartbeatSubmessage::new(proxy.remote_guid.entity_id, writer_entity, first, last, count);

            if proxy.all_acknowledged() {
                hb = hb.with_final();
            } else {
                all_acked = false;
                if proxy.heartbeat_unanswered() > MAX_HEARTBEAT_RETRANSMITS {
                    log::debug!(
                        "[StatefulWriter] {} giving up on reader {} after {} heartbeats",
                        self.guid,
                        proxy.remote_guid,
                        MAX_HEARTBEAT_RETRANSMITS
                    );
                    gave_up.push(proxy.remote_guid);
                    continue;
                }
            }

            let mut builder = MessageBuilder::new(prefix);
            builder.info_dst(proxy.remote_guid.prefix);
            builder.heartbeat(&hb);
            sender.send(&locator, &builder.take());
        }

        for guid in &gave_up {
            self.matched_readers.remove(guid);
        }
        if all_acked && gave_up.is_empty() {
            if let Some(listener) = &self.listener {
                listener.on_all_acknowledged();
            }
        }
        gave_up
    }

    // ========================================================================
    // Inbound handlers
    // ========================================================================

    /// ACKNACK handler. Returns true when a retransmission pass should be
    /// scheduled after `nack_response_delay`.
    pub fn on_acknack(
        &mut self,
        source_prefix: GuidPrefix,
        acknack: &AckNackSubmessage,
        sender: &dyn MessageSender,
    ) -> bool {
        let reader_guid = Guid::new(source_prefix, acknack.reader_id);
        let prefix = self.guid.prefix;
        let writer_entity = self.guid.entity_id;

        let Some(proxy) = self.matched_readers.get_mut(&reader_guid) else {
            log::debug!(
                "[StatefulWriter] {} ACKNACK from unmatched reader {}",
                self.guid,
                reader_guid
            );
            return false;
        };
        if !proxy.acknack_count_check(acknack.count) {
            return false;
        }

        proxy.acked_changes_set(acknack.reader_sn_state.base());

        let mut respond = false;
        for seq in acknack.reader_sn_state.iter() {
            let retransmittable =
                proxy.requested_change_set(seq) && self.history.get_change(seq).is_some();
            if retransmittable {
                respond = true;
            } else if let Some(&locator) = proxy.preferred_locator() {
                send_gap(prefix, writer_entity, proxy, &locator, seq, sender);
                proxy.change_removed(seq);
            }
        }

        self.collect_acknowledged();
        if self.all_acked() {
            if let Some(listener) = &self.listener {
                listener.on_all_acknowledged();
            }
        }
        respond
    }

    /// NACKFRAG handler: retransmit the requested fragments of one sample.
    pub fn on_nackfrag(
        &mut self,
        source_prefix: GuidPrefix,
        nackfrag: &NackFragSubmessage,
        sender: &dyn MessageSender,
    ) {
        let reader_guid = Guid::new(source_prefix, nackfrag.reader_id);
        let prefix = self.guid.prefix;
        let writer_entity = self.guid.entity_id;

        let Some(proxy) = self.matched_readers.get_mut(&reader_guid) else {
            return;
        };
        if !proxy.nackfrag_count_check(nackfrag.count) {
            return;
        }
        let Some(&locator) = proxy.preferred_locator() else {
            return;
        };

        match self.history.get_change(nackfrag.sequence_number) {
            Some(change) => {
                for frag_num in nackfrag.fragment_state.fragments() {
                    if let Some(frag) = build_fragment(
                        proxy.remote_guid.entity_id,
                        writer_entity,
                        change,
                        frag_num,
                    ) {
                        let mut builder = MessageBuilder::new(prefix);
                        builder.info_dst(proxy.remote_guid.prefix);
                        builder.data_frag(&frag);
                        sender.send(&locator, &builder.take());
                    }
                }
            }
            None => {
                send_gap(
                    prefix,
                    writer_entity,
                    proxy,
                    &locator,
                    nackfrag.sequence_number,
                    sender,
                );
            }
        }
    }

    /// True when every matched reader acknowledged everything.
    pub fn all_acked(&self) -> bool {
        self.matched_readers.values().all(ReaderProxy::all_acknowledged)
    }

    /// Lowest sequence acknowledged by every matched reader.
    pub fn acked_by_all_up_to(&self) -> SequenceNumber {
        self.matched_readers
            .values()
            .map(ReaderProxy::acked_up_to)
            .min()
            .unwrap_or(0)
    }

    /// Release fully-acknowledged changes from the history (VOLATILE only;
    /// TRANSIENT_LOCAL keeps them for late joiners).
    fn collect_acknowledged(&mut self) {
        if self.qos.durability != Durability::Volatile {
            return;
        }
        let up_to = self.acked_by_all_up_to();
        if up_to > 0 {
            let removed = self.history.remove_below(up_to + 1);
            if removed > 0 {
                log::debug!(
                    "[StatefulWriter] {} released {} acked changes (<= {})",
                    self.guid,
                    removed,
                    up_to
                );
            }
        }
    }

    /// Proxy accessor for tests and diagnostics.
    pub fn matched_reader(&self, guid: &Guid) -> Option<&ReaderProxy> {
        self.matched_readers.get(guid)
    }
}

// ============================================================================
// Datagram helpers
// ============================================================================

fn send_change(
    prefix: GuidPrefix,
    writer_entity: crate::types::EntityId,
    proxy: &ReaderProxy,
    locator: &Locator,
    change: &CacheChange,
    piggyback: Option<&HeartbeatSubmessage>,
    sender: &dyn MessageSender,
) {
    if change.payload.len() > UDP_MTU_PAYLOAD {
        send_fragmented(prefix, writer_entity, proxy, locator, change, sender);
        return;
    }

    let mut builder = MessageBuilder::new(prefix);
    builder.info_dst(proxy.remote_guid.prefix);
    builder.info_ts(change.source_timestamp_ns);
    let mut data = DataSubmessage::new(
        proxy.remote_guid.entity_id,
        writer_entity,
        change.sequence_number,
        change.payload.clone(),
    );
    attach_lifecycle_qos(&mut data, change);
    builder.data(&data);
    if let Some(hb) = piggyback {
        builder.heartbeat(hb);
    }
    sender.send(locator, &builder.take());
}

fn send_fragmented(
    prefix: GuidPrefix,
    writer_entity: crate::types::EntityId,
    proxy: &ReaderProxy,
    locator: &Locator,
    change: &CacheChange,
    sender: &dyn MessageSender,
) {
    let total = change.payload.len();
    let frag_count = total.div_ceil(UDP_MTU_PAYLOAD);
    for index in 0..frag_count {
        let frag_num = (index + 1) as u32;
        if let Some(frag) =
            build_fragment(proxy.remote_guid.entity_id, writer_entity, change, frag_num)
        {
            let mut builder = MessageBuilder::new(prefix);
            builder.info_dst(proxy.remote_guid.prefix);
            builder.info_ts(change.source_timestamp_ns);
            builder.data_frag(&frag);
            sender.send(locator, &builder.take());
        }
    }
}

/// Build one DATAFRAG for `frag_num` (1-based) of a cached change.
fn build_fragment(
    reader_entity: crate::types::EntityId,
    writer_entity: crate::types::EntityId,
    change: &CacheChange,
    frag_num: u32,
) -> Option<DataFragSubmessage> {
    let total = change.payload.len();
    let start = (frag_num as usize - 1) * UDP_MTU_PAYLOAD;
    if frag_num == 0 || start >= total {
        return None;
    }
    let end = (start + UDP_MTU_PAYLOAD).min(total);
    Some(DataFragSubmessage {
        reader_id: reader_entity,
        writer_id: writer_entity,
        sequence_number: change.sequence_number,
        fragment_starting_num: frag_num,
        fragments_in_submessage: 1,
        fragment_size: UDP_MTU_PAYLOAD as u16,
        sample_size: total as u32,
        inline_qos: Vec::new(),
        payload: change.payload[start..end].to_vec(),
    })
}

fn send_gap(
    prefix: GuidPrefix,
    writer_entity: crate::types::EntityId,
    proxy: &ReaderProxy,
    locator: &Locator,
    seq: SequenceNumber,
    sender: &dyn MessageSender,
) {
    let Some(gap) = GapSubmessage::single(proxy.remote_guid.entity_id, writer_entity, seq) else {
        return;
    };
    let mut builder = MessageBuilder::new(prefix);
    builder.info_dst(proxy.remote_guid.prefix);
    builder.gap(&gap);
    sender.send(locator, &builder.take());
}

/// Disposal/unregistration travels as inline QoS (status info + key hash).
fn attach_lifecycle_qos(data: &mut DataSubmessage, change: &CacheChange) {
    use crate::messages::{PID_KEY_HASH, PID_STATUS_INFO};
    let flags: u8 = match change.kind {
        ChangeKind::Alive => return,
        ChangeKind::NotAliveDisposed => 0x01,
        ChangeKind::NotAliveUnregistered => 0x02,
        ChangeKind::NotAliveDisposedUnregistered => 0x03,
    };
    data.push_inline_qos(PID_STATUS_INFO, vec![0, 0, 0, flags]);
    data.push_inline_qos(PID_KEY_HASH, change.instance_handle.to_vec());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ReceivedMessage, Submessage};
    use crate::rtps::ChangeForReaderStatus;
    use crate::types::SequenceNumberSet;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;

    #[derive(Default)]
    struct CollectingSender {
        sent: Mutex<Vec<(Locator, Vec<u8>)>>,
    }

    impl MessageSender for CollectingSender {
        fn send(&self, locator: &Locator, datagram: &[u8]) {
            self.sent.lock().push((*locator, datagram.to_vec()));
        }
    }

    impl CollectingSender {
        fn submessages(&self) -> Vec<Submessage> {
            self.sent
                .lock()
                .iter()
                .flat_map(|(_, d)| {
                    ReceivedMessage::parse(d)
                        .expect("parses")
                        .submessages
                        .into_iter()
                        .map(|s| s.submessage)
                })
                .collect()
        }
    }

    fn writer_guid() -> Guid {
        Guid::new([1; 12], [0, 0, 1, 0x02])
    }

    fn reader_guid() -> Guid {
        Guid::new([2; 12], [0, 0, 1, 0x07])
    }

    fn reliable_proxy() -> ReaderProxy {
        ReaderProxy::new(
            reader_guid(),
            true,
            vec![Locator::udpv4(Ipv4Addr::new(127, 0, 0, 1), 7411)],
            Vec::new(),
        )
    }

    fn writer() -> StatefulWriter {
        StatefulWriter::new(writer_guid(), QosProfile::reliable())
    }

    fn acknack(base: SequenceNumber, nacked: &[SequenceNumber], count: u32) -> AckNackSubmessage {
        let set = SequenceNumberSet::from_sequences(base, nacked).expect("valid set");
        AckNackSubmessage::new(
            reader_guid().entity_id,
            writer_guid().entity_id,
            set,
            count,
            nacked.is_empty(),
        )
    }

    #[test]
    fn test_new_change_registers_unsent() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        let seq = w
            .new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0, 1])
            .expect("write succeeds");
        assert_eq!(seq, 1);

        let proxy = w.matched_reader(&reader_guid()).expect("proxy exists");
        assert_eq!(proxy.status_of(1), Some(ChangeForReaderStatus::Unsent));
    }

    #[test]
    fn test_perform_send_emits_data_and_transitions() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0, 1])
            .expect("write succeeds");

        let sender = CollectingSender::default();
        w.perform_send(&sender);

        let subs = sender.submessages();
        assert!(subs.iter().any(|s| matches!(s, Submessage::Data(d) if d.sequence_number == 1)));

        let proxy = w.matched_reader(&reader_guid()).expect("proxy exists");
        assert_eq!(
            proxy.status_of(1),
            Some(ChangeForReaderStatus::Unacknowledged)
        );
    }

    #[test]
    fn test_acknack_acks_and_requests() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        for _ in 0..3 {
            w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
                .expect("write succeeds");
        }
        let sender = CollectingSender::default();
        w.perform_send(&sender);

        // Reader acknowledges 1, requests 2 (lost), has not seen 3.
        let respond = w.on_acknack(reader_guid().prefix, &acknack(2, &[2], 1), &sender);
        assert!(respond);

        let proxy = w.matched_reader(&reader_guid()).expect("proxy exists");
        assert_eq!(proxy.status_of(1), Some(ChangeForReaderStatus::Acknowledged));
        assert_eq!(proxy.status_of(2), Some(ChangeForReaderStatus::Requested));

        // The retransmit pass resends seq 2.
        sender.sent.lock().clear();
        w.perform_send(&sender);
        let subs = sender.submessages();
        assert!(subs.iter().any(|s| matches!(s, Submessage::Data(d) if d.sequence_number == 2)));
    }

    #[test]
    fn test_acknack_idempotent_on_count() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        for _ in 0..2 {
            w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
                .expect("write succeeds");
        }
        let sender = CollectingSender::default();
        w.perform_send(&sender);

        assert!(w.on_acknack(reader_guid().prefix, &acknack(1, &[1], 1), &sender));
        let status_before = w
            .matched_reader(&reader_guid())
            .and_then(|p| p.status_of(1));

        // Replay with the same count must change nothing.
        assert!(!w.on_acknack(reader_guid().prefix, &acknack(1, &[1], 1), &sender));
        let status_after = w
            .matched_reader(&reader_guid())
            .and_then(|p| p.status_of(1));
        assert_eq!(status_before, status_after);
    }

    #[test]
    fn test_acknack_for_evicted_seq_draws_gap() {
        let mut w = StatefulWriter::new(
            writer_guid(),
            QosProfile {
                history: crate::qos::History::KeepLast(2),
                ..QosProfile::reliable()
            },
        );
        w.matched_reader_add(reliable_proxy());
        let sender = CollectingSender::default();

        // Three writes to one instance: seq 1 is evicted (depth 2).
        for _ in 0..3 {
            w.new_change(ChangeKind::Alive, [7; 16], vec![0, 1, 0, 0])
                .expect("write succeeds");
        }
        assert_eq!(w.history().min_seq(), Some(2));

        // Late request for seq 1 answers with GAP.
        let respond = w.on_acknack(reader_guid().prefix, &acknack(1, &[1], 1), &sender);
        assert!(!respond);
        let subs = sender.submessages();
        assert!(subs
            .iter()
            .any(|s| matches!(s, Submessage::Gap(g) if g.irrelevant_sequences() == vec![1])));
    }

    #[test]
    fn test_heartbeat_period_emits_per_proxy() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect("write succeeds");
        let sender = CollectingSender::default();
        w.perform_send(&sender);
        sender.sent.lock().clear();

        w.on_heartbeat_period(&sender);
        let subs = sender.submessages();
        let hb = subs
            .iter()
            .find_map(|s| match s {
                Submessage::Heartbeat(hb) => Some(*hb),
                _ => None,
            })
            .expect("heartbeat sent");
        assert_eq!(hb.first_sn, 1);
        assert_eq!(hb.last_sn, 1);
        assert!(!hb.final_flag);
    }

    #[test]
    fn test_final_heartbeat_when_all_acked() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect("write succeeds");
        let sender = CollectingSender::default();
        w.perform_send(&sender);
        w.on_acknack(reader_guid().prefix, &acknack(2, &[], 1), &sender);
        assert!(w.all_acked());
        sender.sent.lock().clear();

        w.on_heartbeat_period(&sender);
        let subs = sender.submessages();
        assert!(subs
            .iter()
            .any(|s| matches!(s, Submessage::Heartbeat(hb) if hb.final_flag)));
    }

    #[test]
    fn test_volatile_gc_after_full_ack() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        for _ in 0..3 {
            w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
                .expect("write succeeds");
        }
        let sender = CollectingSender::default();
        w.perform_send(&sender);
        assert_eq!(w.history().len(), 3);

        w.on_acknack(reader_guid().prefix, &acknack(3, &[], 1), &sender);
        // Seqs 1, 2 acked by the only reader: released.
        assert_eq!(w.history().min_seq(), Some(3));
    }

    #[test]
    fn test_transient_local_replays_to_late_joiner() {
        let mut w = StatefulWriter::new(
            writer_guid(),
            QosProfile {
                durability: Durability::TransientLocal,
                ..QosProfile::reliable()
            },
        );
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0, 1])
            .expect("write succeeds");
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0, 2])
            .expect("write succeeds");

        // Late joiner gets existing changes as Unsent.
        w.matched_reader_add(reliable_proxy());
        let sender = CollectingSender::default();
        w.perform_send(&sender);

        let data_seqs: Vec<_> = sender
            .submessages()
            .iter()
            .filter_map(|s| match s {
                Submessage::Data(d) => Some(d.sequence_number),
                _ => None,
            })
            .collect();
        assert_eq!(data_seqs, vec![1, 2]);
    }

    #[test]
    fn test_volatile_late_joiner_gets_gap_not_replay() {
        let mut w = writer();
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect("write succeeds");
        w.matched_reader_add(reliable_proxy());

        let sender = CollectingSender::default();
        w.perform_send(&sender);
        assert!(sender.sent.lock().is_empty(), "no replay for volatile");

        // A NACK for the pre-match change draws a GAP.
        w.on_acknack(reader_guid().prefix, &acknack(1, &[1], 1), &sender);
        assert!(sender
            .submessages()
            .iter()
            .any(|s| matches!(s, Submessage::Gap(_))));
    }

    #[test]
    fn test_large_payload_fragments() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        let payload = vec![0xAB; UDP_MTU_PAYLOAD * 2 + 100];
        w.new_change(ChangeKind::Alive, [0; 16], payload)
            .expect("write succeeds");

        let sender = CollectingSender::default();
        w.perform_send(&sender);

        let frags: Vec<_> = sender
            .submessages()
            .into_iter()
            .filter_map(|s| match s {
                Submessage::DataFrag(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(frags.len(), 3);
        assert_eq!(frags[0].fragment_starting_num, 1);
        assert_eq!(frags[2].fragment_starting_num, 3);
        assert_eq!(frags[2].payload.len(), 100);
        assert!(frags
            .iter()
            .all(|f| f.sample_size as usize == UDP_MTU_PAYLOAD * 2 + 100));
    }

    #[test]
    fn test_nackfrag_retransmits_requested_fragment() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        let payload = vec![0xCD; UDP_MTU_PAYLOAD + 10];
        w.new_change(ChangeKind::Alive, [0; 16], payload)
            .expect("write succeeds");
        let sender = CollectingSender::default();
        w.perform_send(&sender);
        sender.sent.lock().clear();

        let nackfrag = NackFragSubmessage {
            reader_id: reader_guid().entity_id,
            writer_id: writer_guid().entity_id,
            sequence_number: 1,
            fragment_state: crate::types::FragmentNumberSet::from_fragments(2, &[2])
                .expect("valid set"),
            count: 1,
        };
        w.on_nackfrag(reader_guid().prefix, &nackfrag, &sender);

        let frags: Vec<_> = sender
            .submessages()
            .into_iter()
            .filter_map(|s| match s {
                Submessage::DataFrag(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].fragment_starting_num, 2);
        assert_eq!(frags[0].payload.len(), 10);
    }

    #[test]
    fn test_backpressure_keep_all_full() {
        let mut w = StatefulWriter::new(
            writer_guid(),
            QosProfile {
                history: crate::qos::History::KeepAll,
                resource_limits: crate::qos::ResourceLimits {
                    max_samples: 2,
                    max_instances: 10,
                    max_samples_per_instance: 2,
                },
                ..QosProfile::reliable()
            },
        );
        w.matched_reader_add(reliable_proxy());
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect("write succeeds");
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect("write succeeds");

        let err = w
            .new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect_err("history full refuses");
        assert!(matches!(err, Error::HistoryFull));

        // Acks advance, samples flow again.
        let sender = CollectingSender::default();
        w.perform_send(&sender);
        w.on_acknack(reader_guid().prefix, &acknack(3, &[], 1), &sender);
        w.new_change(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0])
            .expect("write succeeds after acks");
    }

    #[test]
    fn test_disposal_carries_status_info() {
        let mut w = writer();
        w.matched_reader_add(reliable_proxy());
        w.new_change(ChangeKind::NotAliveDisposed, [9; 16], Vec::new())
            .expect("write succeeds");
        let sender = CollectingSender::default();
        w.perform_send(&sender);

        let subs = sender.submessages();
        let data = subs
            .iter()
            .find_map(|s| match s {
                Submessage::Data(d) => Some(d),
                _ => None,
            })
            .expect("data sent");
        assert_eq!(data.status_info(), Some(0x01));
        assert_eq!(data.key_hash(), Some([9; 16]));
    }
}
