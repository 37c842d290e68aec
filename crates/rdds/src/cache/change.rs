// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! `CacheChange`: one sample plus its metadata.
//!
//! Once inserted into a history cache every field is immutable except
//! `is_read`, which only the reader side touches.

use crate::types::{Guid, InstanceHandle, SequenceNumber, INSTANCE_HANDLE_UNKNOWN};

/// Lifecycle kind of a change (RTPS v2.3 Sec.8.2.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeKind {
    #[default]
    Alive,
    NotAliveDisposed,
    NotAliveUnregistered,
    NotAliveDisposedUnregistered,
}

/// Write parameters carried alongside a sample, used for request/reply
/// correlation (related sample identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteParams {
    pub related_writer_guid: Guid,
    pub related_sequence_number: SequenceNumber,
}

impl Default for WriteParams {
    fn default() -> Self {
        Self {
            related_writer_guid: Guid::unknown(),
            related_sequence_number: crate::types::SEQUENCE_NUMBER_UNKNOWN,
        }
    }
}

/// A single sample in a history cache.
#[derive(Debug, Clone)]
pub struct CacheChange {
    pub kind: ChangeKind,
    pub writer_guid: Guid,
    pub instance_handle: InstanceHandle,
    pub sequence_number: SequenceNumber,
    /// Source timestamp in nanoseconds since the UNIX epoch (0 = unknown).
    pub source_timestamp_ns: u64,
    /// Serialized payload, prefixed by the 4-byte CDR encapsulation header.
    pub payload: Vec<u8>,
    pub write_params: WriteParams,
    /// Reader-side flag: has the user consumed this sample.
    pub is_read: bool,
}

impl CacheChange {
    /// New ALIVE change with the unkeyed instance handle.
    pub fn alive(writer_guid: Guid, sequence_number: SequenceNumber, payload: Vec<u8>) -> Self {
        Self {
            kind: ChangeKind::Alive,
            writer_guid,
            instance_handle: INSTANCE_HANDLE_UNKNOWN,
            sequence_number,
            source_timestamp_ns: now_ns(),
            payload,
            write_params: WriteParams::default(),
            is_read: false,
        }
    }

    /// New keyed change with an explicit kind and instance handle.
    pub fn keyed(
        kind: ChangeKind,
        writer_guid: Guid,
        sequence_number: SequenceNumber,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            writer_guid,
            instance_handle,
            sequence_number,
            source_timestamp_ns: now_ns(),
            payload,
            write_params: WriteParams::default(),
            is_read: false,
        }
    }

    /// Attach request/reply correlation parameters.
    pub fn with_write_params(mut self, params: WriteParams) -> Self {
        self.write_params = params;
        self
    }

    /// Serialized payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Current time in nanoseconds since the UNIX epoch.
pub(crate) fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer_guid() -> Guid {
        Guid::new([1; 12], [0, 0, 1, 0x02])
    }

    #[test]
    fn test_alive_change_defaults() {
        let change = CacheChange::alive(writer_guid(), 1, vec![0, 1, 0, 0, 42]);
        assert_eq!(change.kind, ChangeKind::Alive);
        assert_eq!(change.sequence_number, 1);
        assert_eq!(change.instance_handle, INSTANCE_HANDLE_UNKNOWN);
        assert!(!change.is_read);
        assert!(change.source_timestamp_ns > 0);
    }

    #[test]
    fn test_keyed_change() {
        let handle = [7u8; 16];
        let change = CacheChange::keyed(
            ChangeKind::NotAliveDisposed,
            writer_guid(),
            3,
            handle,
            Vec::new(),
        );
        assert_eq!(change.kind, ChangeKind::NotAliveDisposed);
        assert_eq!(change.instance_handle, handle);
        assert_eq!(change.payload_len(), 0);
    }

    #[test]
    fn test_write_params_attach() {
        let related = Guid::new([2; 12], [0, 0, 2, 0x02]);
        let change = CacheChange::alive(writer_guid(), 5, Vec::new()).with_write_params(
            WriteParams {
                related_writer_guid: related,
                related_sequence_number: 17,
            },
        );
        assert_eq!(change.write_params.related_writer_guid, related);
        assert_eq!(change.write_params.related_sequence_number, 17);
    }
}
