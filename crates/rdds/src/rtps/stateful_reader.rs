// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Stateful reader: the reader half of the reliability protocol.
//!
//! One `WriterProxy` per matched writer tracks missing/lost sequences and
//! drives ACKNACK generation. User delivery is strictly in-order per writer:
//! out-of-order arrivals wait in a per-proxy pending set until the
//! contiguous watermark reaches them; sequences a GAP declared lost are
//! skipped and never delivered afterwards. Duplicates are dropped at the
//! proxy, so the user callback fires at most once per (writer, seq).
//!
//! The participant creates a stateful reader for RELIABLE endpoints; the
//! BEST_EFFORT path uses [`crate::rtps::StatelessReader`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheChange, HistoryCache};
use crate::config::DEFAULT_HEARTBEAT_RESPONSE_DELAY;
use crate::messages::{
    DataFragSubmessage, DataSubmessage, GapSubmessage, HeartbeatFragSubmessage,
    HeartbeatSubmessage, MessageBuilder, NackFragSubmessage,
};
use crate::qos::QosProfile;
use crate::rtps::stateless_reader::change_kind_from_status;
use crate::rtps::writer_proxy::WriterProxy;
use crate::rtps::{MessageSender, ReaderListener};
use crate::types::{
    EntityId, FragmentNumberSet, Guid, GuidPrefix, SequenceNumber, ENTITYID_UNKNOWN,
};

/// In-flight reassembly of one fragmented sample.
struct FragmentAssembly {
    buffer: Vec<u8>,
    received: Vec<bool>,
    fragment_size: usize,
    total_fragments: usize,
}

impl FragmentAssembly {
    fn new(sample_size: u32, fragment_size: u16) -> Self {
        let fragment_size = fragment_size as usize;
        let total = (sample_size as usize).div_ceil(fragment_size);
        Self {
            buffer: vec![0u8; sample_size as usize],
            received: vec![false; total],
            fragment_size,
            total_fragments: total,
        }
    }

    /// Insert one fragment (1-based). Returns true when the sample is
    /// complete.
    fn insert(&mut self, frag_num: u32, payload: &[u8]) -> bool {
        let index = frag_num as usize - 1;
        if index >= self.total_fragments || self.received[index] {
            return self.is_complete();
        }
        let start = index * self.fragment_size;
        let end = (start + payload.len()).min(self.buffer.len());
        self.buffer[start..end].copy_from_slice(&payload[..end - start]);
        self.received[index] = true;
        self.is_complete()
    }

    fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    fn missing_fragments(&self, up_to: u32) -> Vec<u32> {
        self.received
            .iter()
            .enumerate()
            .take(up_to as usize)
            .filter(|(_, &r)| !r)
            .map(|(i, _)| (i + 1) as u32)
            .collect()
    }
}

/// Reliable reader with per-writer proxies.
pub struct StatefulReader {
    guid: Guid,
    #[allow(dead_code)] // deadline/ownership consulted by discovery matching only
    qos: QosProfile,
    history: HistoryCache,
    matched_writers: BTreeMap<Guid, WriterProxy>,
    /// Out-of-order samples waiting for contiguity, per writer.
    pending: HashMap<Guid, BTreeMap<SequenceNumber, CacheChange>>,
    /// Already-delivered watermark per writer (user sees each seq once).
    delivered_up_to: HashMap<Guid, SequenceNumber>,
    /// Fragmented samples being reassembled.
    assemblies: HashMap<(Guid, SequenceNumber), FragmentAssembly>,
    nackfrag_counts: HashMap<Guid, u32>,
    listener: Option<Arc<dyn ReaderListener>>,
    trusted_writer: Option<EntityId>,
    heartbeat_response_delay: Duration,
}

impl StatefulReader {
    pub fn new(guid: Guid, qos: QosProfile) -> Self {
        let history = HistoryCache::new(qos.history, qos.resource_limits);
        Self {
            guid,
            qos,
            history,
            matched_writers: BTreeMap::new(),
            pending: HashMap::new(),
            delivered_up_to: HashMap::new(),
            assemblies: HashMap::new(),
            nackfrag_counts: HashMap::new(),
            listener: None,
            trusted_writer: None,
            heartbeat_response_delay: DEFAULT_HEARTBEAT_RESPONSE_DELAY,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn set_listener(&mut self, listener: Arc<dyn ReaderListener>) {
        self.listener = Some(listener);
    }

    /// Restrict accepted writers (builtin endpoints).
    pub fn set_trusted_writer(&mut self, entity_id: EntityId) {
        self.trusted_writer = Some(entity_id);
    }

    pub fn heartbeat_response_delay(&self) -> Duration {
        self.heartbeat_response_delay
    }

    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    pub fn matched_writer_count(&self) -> usize {
        self.matched_writers.len()
    }

    // ========================================================================
    // Matching
    // ========================================================================

    pub fn matched_writer_add(&mut self, proxy: WriterProxy) {
        log::debug!(
            "[StatefulReader] {} matched writer {}",
            self.guid,
            proxy.remote_guid
        );
        self.matched_writers.insert(proxy.remote_guid, proxy);
        if let Some(listener) = &self.listener {
            listener.on_writer_matched(true);
        }
    }

    pub fn matched_writer_remove(&mut self, writer_guid: &Guid) -> bool {
        let removed = self.matched_writers.remove(writer_guid).is_some();
        if removed {
            self.pending.remove(writer_guid);
            self.delivered_up_to.remove(writer_guid);
            self.assemblies.retain(|(g, _), _| g != writer_guid);
            self.nackfrag_counts.remove(writer_guid);
            if let Some(listener) = &self.listener {
                listener.on_writer_matched(false);
            }
        }
        removed
    }

    pub fn is_matched_to(&self, writer_guid: &Guid) -> bool {
        self.matched_writers.contains_key(writer_guid)
    }

    pub fn matched_writer(&self, guid: &Guid) -> Option<&WriterProxy> {
        self.matched_writers.get(guid)
    }

    // ========================================================================
    // Inbound handlers
    // ========================================================================

    /// Inbound DATA. Returns true when the sample entered the reader.
    pub fn on_data(
        &mut self,
        source_prefix: GuidPrefix,
        data: &DataSubmessage,
        timestamp_ns: Option<u64>,
    ) -> bool {
        if !self.accepts_writer(data.writer_id) {
            return false;
        }
        let writer_guid = Guid::new(source_prefix, data.writer_id);
        let Some(proxy) = self.matched_writers.get_mut(&writer_guid) else {
            log::debug!(
                "[StatefulReader] {} DATA from unmatched writer {}",
                self.guid,
                writer_guid
            );
            return false;
        };

        if !proxy.received_change_set(data.sequence_number) {
            return false;
        }

        let kind = change_kind_from_status(data.status_info());
        let instance = data.key_hash().unwrap_or([0u8; 16]);
        let mut change = CacheChange::keyed(
            kind,
            writer_guid,
            data.sequence_number,
            instance,
            data.payload.clone(),
        );
        if let Some(ts) = timestamp_ns {
            change.source_timestamp_ns = ts;
        }

        self.pending
            .entry(writer_guid)
            .or_default()
            .insert(data.sequence_number, change);
        self.deliver_in_order(&writer_guid);
        true
    }

    /// Inbound DATAFRAG: reassemble; a completed sample takes the DATA path.
    pub fn on_datafrag(
        &mut self,
        source_prefix: GuidPrefix,
        frag: &DataFragSubmessage,
        timestamp_ns: Option<u64>,
    ) -> bool {
        if !self.accepts_writer(frag.writer_id) {
            return false;
        }
        let writer_guid = Guid::new(source_prefix, frag.writer_id);
        let Some(proxy) = self.matched_writers.get(&writer_guid) else {
            return false;
        };
        // Already settled: ignore stray fragments.
        if frag.sequence_number <= proxy.watermark() {
            return false;
        }

        let key = (writer_guid, frag.sequence_number);
        let assembly = self
            .assemblies
            .entry(key)
            .or_insert_with(|| FragmentAssembly::new(frag.sample_size, frag.fragment_size));

        let mut frag_num = frag.fragment_starting_num;
        let mut offset = 0usize;
        let mut complete = false;
        for _ in 0..frag.fragments_in_submessage.max(1) {
            let end = (offset + frag.fragment_size as usize).min(frag.payload.len());
            if offset >= frag.payload.len() {
                break;
            }
            complete = assembly.insert(frag_num, &frag.payload[offset..end]);
            frag_num += 1;
            offset = end;
        }

        if !complete {
            return false;
        }
        let payload = self
            .assemblies
            .remove(&key)
            .map(|a| a.buffer)
            .unwrap_or_default();

        let data = DataSubmessage {
            reader_id: frag.reader_id,
            writer_id: frag.writer_id,
            sequence_number: frag.sequence_number,
            inline_qos: frag.inline_qos.clone(),
            payload,
            key_payload: false,
        };
        self.on_data(source_prefix, &data, timestamp_ns)
    }

    /// Inbound HEARTBEAT. Returns true when the acknack response delay
    /// should be armed.
    pub fn on_heartbeat(&mut self, source_prefix: GuidPrefix, hb: &HeartbeatSubmessage) -> bool {
        if !self.accepts_writer(hb.writer_id) {
            return false;
        }
        let writer_guid = Guid::new(source_prefix, hb.writer_id);
        let Some(proxy) = self.matched_writers.get_mut(&writer_guid) else {
            return false;
        };

        let outcome = proxy.on_heartbeat(hb);
        if let Some(first) = outcome.pruned_below {
            // The writer discarded everything below `first`; drop stale
            // pending samples and move the delivery mark past the hole.
            if let Some(pending) = self.pending.get_mut(&writer_guid) {
                *pending = pending.split_off(&first);
            }
            let delivered = self.delivered_up_to.entry(writer_guid).or_insert(0);
            *delivered = (*delivered).max(first - 1);
            self.assemblies
                .retain(|(g, seq), _| g != &writer_guid || *seq >= first);
        }
        self.deliver_in_order(&writer_guid);
        outcome.must_respond
    }

    /// Inbound HEARTBEAT_FRAG: request missing fragments right away.
    pub fn on_heartbeat_frag(
        &mut self,
        source_prefix: GuidPrefix,
        hbf: &HeartbeatFragSubmessage,
        sender: &dyn MessageSender,
    ) {
        if !self.accepts_writer(hbf.writer_id) {
            return;
        }
        let writer_guid = Guid::new(source_prefix, hbf.writer_id);
        if !self.matched_writers.contains_key(&writer_guid) {
            return;
        }

        let key = (writer_guid, hbf.sequence_number);
        let missing = match self.assemblies.get(&key) {
            Some(assembly) => assembly.missing_fragments(hbf.last_fragment_num),
            None => return,
        };
        if missing.is_empty() {
            return;
        }
        let Some(set) = FragmentNumberSet::from_fragments(missing[0], &missing) else {
            return;
        };

        let count = self
            .nackfrag_counts
            .entry(writer_guid)
            .and_modify(|c| *c += 1)
            .or_insert(1);
        let nackfrag = NackFragSubmessage {
            reader_id: self.guid.entity_id,
            writer_id: hbf.writer_id,
            sequence_number: hbf.sequence_number,
            fragment_state: set,
            count: *count,
        };

        let Some(proxy) = self.matched_writers.get(&writer_guid) else {
            return;
        };
        let Some(&locator) = proxy.preferred_locator() else {
            return;
        };
        let mut builder = MessageBuilder::new(self.guid.prefix);
        builder.info_dst(writer_guid.prefix);
        builder.nack_frag(&nackfrag);
        sender.send(&locator, &builder.take());
    }

    /// Inbound GAP: declared sequences are lost, never delivered.
    pub fn on_gap(&mut self, source_prefix: GuidPrefix, gap: &GapSubmessage) {
        if !self.accepts_writer(gap.writer_id) {
            return;
        }
        let writer_guid = Guid::new(source_prefix, gap.writer_id);
        let Some(proxy) = self.matched_writers.get_mut(&writer_guid) else {
            return;
        };
        let seqs = gap.irrelevant_sequences();
        proxy.irrelevant_change_set(seqs.iter().copied());
        for seq in &seqs {
            self.assemblies.remove(&(writer_guid, *seq));
            if let Some(pending) = self.pending.get_mut(&writer_guid) {
                pending.remove(seq);
            }
        }
        self.deliver_in_order(&writer_guid);
    }

    /// Response event (heartbeat_response_delay elapsed): send one ACKNACK
    /// per matched writer that is not yet synchronized, plus a final-flagged
    /// one where synchronization just completed.
    pub fn send_acknack(&mut self, sender: &dyn MessageSender) {
        let reader_entity = self.guid.entity_id;
        let prefix = self.guid.prefix;
        for proxy in self.matched_writers.values_mut() {
            let Some(&locator) = proxy.preferred_locator() else {
                continue;
            };
            let acknack = proxy.build_acknack(reader_entity);
            let mut builder = MessageBuilder::new(prefix);
            builder.info_dst(proxy.remote_guid.prefix);
            builder.acknack(&acknack);
            sender.send(&locator, &builder.take());
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Deliver every contiguous settled sample the user has not seen yet.
    fn deliver_in_order(&mut self, writer_guid: &Guid) {
        let Some(proxy) = self.matched_writers.get(writer_guid) else {
            return;
        };
        let watermark = proxy.watermark();
        let delivered = self.delivered_up_to.entry(*writer_guid).or_insert(0);

        let Some(pending) = self.pending.get_mut(writer_guid) else {
            *delivered = (*delivered).max(watermark);
            return;
        };

        while *delivered < watermark {
            let next = *delivered + 1;
            *delivered = next;
            // Lost sequences have no pending entry: skip them silently.
            if let Some(mut change) = pending.remove(&next) {
                if let Some(listener) = &self.listener {
                    listener.on_data_available(&change);
                }
                change.is_read = true;
                if let Err(e) = self.history.add_change(change) {
                    log::debug!(
                        "[StatefulReader] {} history insert failed: {}",
                        self.guid,
                        e
                    );
                }
            }
        }
    }

    fn accepts_writer(&self, writer_id: EntityId) -> bool {
        match self.trusted_writer {
            Some(trusted) => writer_id == trusted || writer_id == ENTITYID_UNKNOWN,
            None => true,
        }
    }
}
