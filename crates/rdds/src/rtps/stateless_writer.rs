// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Stateless writer: fire-and-forget DATA, no per-reader state.
//!
//! Every new change is pushed once to every configured reader locator; no
//! heartbeats are emitted and nothing is retransmitted on loss. SPDP runs
//! on one of these, publishing a fresh participant announcement each
//! period; [`StatelessWriter::resend_all`] replays the cached history to
//! the locators when a caller wants repetition without new changes.

use crate::cache::{CacheChange, ChangeKind, HistoryCache};
use crate::error::Result;
use crate::messages::{DataSubmessage, MessageBuilder};
use crate::qos::QosProfile;
use crate::rtps::MessageSender;
use crate::types::{Guid, InstanceHandle, Locator, SequenceNumber, ENTITYID_UNKNOWN};

/// Best-effort writer without reader proxies.
pub struct StatelessWriter {
    guid: Guid,
    history: HistoryCache,
    reader_locators: Vec<Locator>,
    last_sequence_number: SequenceNumber,
}

impl StatelessWriter {
    pub fn new(guid: Guid, qos: QosProfile) -> Self {
        Self {
            guid,
            history: HistoryCache::new(qos.history, qos.resource_limits),
            reader_locators: Vec::new(),
            last_sequence_number: 0,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Add a destination locator (duplicates ignored).
    pub fn reader_locator_add(&mut self, locator: Locator) {
        if !self.reader_locators.contains(&locator) {
            self.reader_locators.push(locator);
        }
    }

    pub fn reader_locator_remove(&mut self, locator: &Locator) {
        self.reader_locators.retain(|l| l != locator);
    }

    pub fn reader_locators(&self) -> &[Locator] {
        &self.reader_locators
    }

    pub fn last_sequence_number(&self) -> SequenceNumber {
        self.last_sequence_number
    }

    /// Create a change and push it to every reader locator exactly once.
    pub fn write(
        &mut self,
        kind: ChangeKind,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
        sender: &dyn MessageSender,
    ) -> Result<SequenceNumber> {
        let seq = self.last_sequence_number + 1;
        let change = CacheChange::keyed(kind, self.guid, seq, instance_handle, payload);
        let timestamp_ns = change.source_timestamp_ns;
        let payload_copy = change.payload.clone();
        self.history.add_change(change)?;
        self.last_sequence_number = seq;

        self.send_data(seq, timestamp_ns, &payload_copy, sender);
        Ok(seq)
    }

    /// Re-send every cached change to all locators (periodic announcement).
    pub fn resend_all(&self, sender: &dyn MessageSender) {
        for change in self.history.iter() {
            self.send_data(
                change.sequence_number,
                change.source_timestamp_ns,
                &change.payload,
                sender,
            );
        }
    }

    /// Drop a cached change (e.g. a replaced announcement).
    pub fn remove_change(&mut self, seq: SequenceNumber) -> bool {
        self.history.remove_change(seq).is_some()
    }

    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    fn send_data(
        &self,
        seq: SequenceNumber,
        timestamp_ns: u64,
        payload: &[u8],
        sender: &dyn MessageSender,
    ) {
        if self.reader_locators.is_empty() {
            log::debug!("[StatelessWriter] {} write with no reader locators", self.guid);
            return;
        }

        let mut builder = MessageBuilder::new(self.guid.prefix);
        builder.info_ts(timestamp_ns);
        builder.data(&DataSubmessage::new(
            ENTITYID_UNKNOWN,
            self.guid.entity_id,
            seq,
            payload.to_vec(),
        ));
        let datagram = builder.take();

        for locator in &self.reader_locators {
            sender.send(locator, &datagram);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ReceivedMessage, Submessage};
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;

    /// Collects (locator, datagram) pairs instead of touching the network.
    #[derive(Default)]
    pub(crate) struct CollectingSender {
        pub sent: Mutex<Vec<(Locator, Vec<u8>)>>,
    }

    impl MessageSender for CollectingSender {
        fn send(&self, locator: &Locator, datagram: &[u8]) {
            self.sent.lock().push((*locator, datagram.to_vec()));
        }
    }

    fn writer() -> StatelessWriter {
        StatelessWriter::new(
            Guid::new([1; 12], [0, 1, 0, 0xC2]),
            QosProfile::best_effort(),
        )
    }

    #[test]
    fn test_write_sends_to_every_locator() {
        let mut w = writer();
        w.reader_locator_add(Locator::udpv4(Ipv4Addr::new(239, 255, 0, 1), 7400));
        w.reader_locator_add(Locator::udpv4(Ipv4Addr::new(127, 0, 0, 1), 7410));

        let sender = CollectingSender::default();
        let seq = w
            .write(
                ChangeKind::Alive,
                [0; 16],
                vec![0, 1, 0, 0, 5],
                &sender,
            )
            .expect("write succeeds");
        assert_eq!(seq, 1);

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 2);

        let parsed = ReceivedMessage::parse(&sent[0].1).expect("parses");
        assert_eq!(parsed.submessages.len(), 1);
        match &parsed.submessages[0].submessage {
            Submessage::Data(data) => {
                assert_eq!(data.sequence_number, 1);
                assert_eq!(data.reader_id, ENTITYID_UNKNOWN);
            }
            other => panic!("expected DATA, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut w = writer();
        w.reader_locator_add(Locator::udpv4(Ipv4Addr::new(127, 0, 0, 1), 7410));
        let sender = CollectingSender::default();

        for expected in 1..=3 {
            let seq = w
                .write(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0], &sender)
                .expect("write succeeds");
            assert_eq!(seq, expected);
        }
    }

    #[test]
    fn test_resend_all_replays_history() {
        let mut w = writer();
        w.reader_locator_add(Locator::udpv4(Ipv4Addr::new(239, 255, 0, 1), 7400));
        let sender = CollectingSender::default();

        w.write(ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0, 1], &sender)
            .expect("write succeeds");
        sender.sent.lock().clear();

        w.resend_all(&sender);
        assert_eq!(sender.sent.lock().len(), 1);
    }

    #[test]
    fn test_duplicate_locator_ignored() {
        let mut w = writer();
        let loc = Locator::udpv4(Ipv4Addr::new(127, 0, 0, 1), 7410);
        w.reader_locator_add(loc);
        w.reader_locator_add(loc);
        assert_eq!(w.reader_locators().len(), 1);
    }
}
