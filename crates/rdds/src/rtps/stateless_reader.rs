// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Stateless reader: consumes DATA with no per-writer proxy state.
//!
//! Only the max-seq-monotonic guarantee holds: a sample older than the
//! newest already seen from the same writer is dropped, everything else is
//! delivered immediately. SPDP runs on one of these.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CacheChange, ChangeKind, HistoryCache};
use crate::messages::DataSubmessage;
use crate::qos::QosProfile;
use crate::rtps::ReaderListener;
use crate::types::{EntityId, Guid, GuidPrefix, SequenceNumber, ENTITYID_UNKNOWN};

/// Best-effort reader without writer proxies.
pub struct StatelessReader {
    guid: Guid,
    history: HistoryCache,
    /// Highest sequence seen per remote writer (monotonic filter).
    max_seen: HashMap<Guid, SequenceNumber>,
    listener: Option<Arc<dyn ReaderListener>>,
    /// Builtin readers only accept data from this peer writer entity.
    trusted_writer: Option<EntityId>,
}

impl StatelessReader {
    pub fn new(guid: Guid, qos: QosProfile) -> Self {
        Self {
            guid,
            history: HistoryCache::new(qos.history, qos.resource_limits),
            max_seen: HashMap::new(),
            listener: None,
            trusted_writer: None,
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

    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    /// Inbound DATA. Returns true when the sample was delivered.
    pub fn on_data(
        &mut self,
        source_prefix: GuidPrefix,
        data: &DataSubmessage,
        timestamp_ns: Option<u64>,
    ) -> bool {
        if let Some(trusted) = self.trusted_writer {
            if data.writer_id != trusted && data.writer_id != ENTITYID_UNKNOWN {
                log::debug!(
                    "[StatelessReader] {} dropping DATA from untrusted writer {:02x?}",
                    self.guid,
                    data.writer_id
                );
                return false;
            }
        }

        let writer_guid = Guid::new(source_prefix, data.writer_id);
        let seq = data.sequence_number;
        let max = self.max_seen.get(&writer_guid).copied().unwrap_or(0);
        if seq <= max {
            return false;
        }
        self.max_seen.insert(writer_guid, seq);

        let kind = change_kind_from_status(data.status_info());
        let instance = data.key_hash().unwrap_or([0u8; 16]);
        let mut change = CacheChange::keyed(kind, writer_guid, seq, instance, data.payload.clone());
        if let Some(ts) = timestamp_ns {
            change.source_timestamp_ns = ts;
        }

        if let Some(listener) = &self.listener {
            listener.on_data_available(&change);
        }
        if let Err(e) = self.history.add_change(change) {
            log::debug!("[StatelessReader] {} history insert failed: {}", self.guid, e);
        }
        true
    }
}

/// Map inline-QoS status flags onto a change kind.
pub(crate) fn change_kind_from_status(status: Option<u8>) -> ChangeKind {
    match status.unwrap_or(0) & 0x03 {
        0x01 => ChangeKind::NotAliveDisposed,
        0x02 => ChangeKind::NotAliveUnregistered,
        0x03 => ChangeKind::NotAliveDisposedUnregistered,
        _ => ChangeKind::Alive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seqs: Mutex<Vec<SequenceNumber>>,
    }

    impl ReaderListener for Recorder {
        fn on_data_available(&self, change: &CacheChange) {
            self.seqs.lock().push(change.sequence_number);
        }
    }

    fn reader() -> StatelessReader {
        StatelessReader::new(
            Guid::new([1; 12], [0, 0, 1, 0x07]),
            QosProfile::best_effort(),
        )
    }

    fn data(seq: SequenceNumber) -> DataSubmessage {
        DataSubmessage::new([0; 4], [0, 0, 1, 0x02], seq, vec![0, 1, 0, 0])
    }

    #[test]
    fn test_delivers_new_samples() {
        let mut r = reader();
        let recorder = Arc::new(Recorder::default());
        r.set_listener(recorder.clone());

        assert!(r.on_data([2; 12], &data(1), None));
        assert!(r.on_data([2; 12], &data(2), None));
        assert_eq!(*recorder.seqs.lock(), vec![1, 2]);
    }

    #[test]
    fn test_max_seq_monotonic_filter() {
        let mut r = reader();
        let recorder = Arc::new(Recorder::default());
        r.set_listener(recorder.clone());

        assert!(r.on_data([2; 12], &data(3), None));
        // Late arrival below the max is dropped.
        assert!(!r.on_data([2; 12], &data(2), None));
        // Duplicate dropped.
        assert!(!r.on_data([2; 12], &data(3), None));
        assert_eq!(*recorder.seqs.lock(), vec![3]);
    }

    #[test]
    fn test_per_writer_filtering() {
        let mut r = reader();
        assert!(r.on_data([2; 12], &data(5), None));
        // Different writer prefix tracks its own max.
        assert!(r.on_data([3; 12], &data(1), None));
    }

    #[test]
    fn test_trusted_writer_drops_strangers() {
        let mut r = reader();
        r.set_trusted_writer([0, 1, 0, 0xC2]);

        let stranger = DataSubmessage::new([0; 4], [0, 0, 9, 0x02], 1, vec![0, 1, 0, 0]);
        assert!(!r.on_data([2; 12], &stranger, None));

        let trusted = DataSubmessage::new([0; 4], [0, 1, 0, 0xC2], 1, vec![0, 1, 0, 0]);
        assert!(r.on_data([2; 12], &trusted, None));
    }

    #[test]
    fn test_timestamp_applied() {
        let mut r = reader();
        r.on_data([2; 12], &data(1), Some(42));
        let change = r.history().get_change(1).expect("cached");
        assert_eq!(change.source_timestamp_ns, 42);
    }
}
