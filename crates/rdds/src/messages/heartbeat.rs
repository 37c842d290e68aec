// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! HEARTBEAT and HEARTBEAT_FRAG submessages (RTPS v2.3 Sec.8.3.7.5-6).

use super::{
    begin_submessage, end_submessage, read_seq, read_u32, SUBMESSAGE_HEARTBEAT,
    SUBMESSAGE_HEARTBEAT_FRAG,
};
use crate::types::sequence::encode_seq_le;
use crate::types::{EntityId, SequenceNumber};

/// HEARTBEAT flag: no response required.
const FLAG_FINAL: u8 = 0x02;
/// HEARTBEAT flag: liveliness assertion.
const FLAG_LIVELINESS: u8 = 0x04;

/// HEARTBEAT submessage: writer announces its available sequence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// Oldest sequence number still held by the writer.
    pub first_sn: SequenceNumber,
    /// Newest sequence number written.
    pub last_sn: SequenceNumber,
    /// Monotonic per reader-proxy; duplicates are dropped by the reader.
    pub count: u32,
    /// When set, the reader need not respond.
    pub final_flag: bool,
    pub liveliness_flag: bool,
}

impl HeartbeatSubmessage {
    pub fn new(
        reader_id: EntityId,
        writer_id: EntityId,
        first_sn: SequenceNumber,
        last_sn: SequenceNumber,
        count: u32,
    ) -> Self {
        Self {
            reader_id,
            writer_id,
            first_sn,
            last_sn,
            count,
            final_flag: false,
            liveliness_flag: false,
        }
    }

    pub fn with_final(mut self) -> Self {
        self.final_flag = true;
        self
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut flags = 0u8;
        if self.final_flag {
            flags |= FLAG_FINAL;
        }
        if self.liveliness_flag {
            flags |= FLAG_LIVELINESS;
        }

        let len_at = begin_submessage(buf, SUBMESSAGE_HEARTBEAT, flags);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        encode_seq_le(self.first_sn, buf);
        encode_seq_le(self.last_sn, buf);
        buf.extend_from_slice(&self.count.to_le_bytes());
        end_submessage(buf, len_at);
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let reader_id: EntityId = body.get(0..4)?.try_into().ok()?;
        let writer_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let first_sn = read_seq(body.get(8..16)?, le)?;
        let last_sn = read_seq(body.get(16..24)?, le)?;
        let count = read_u32(body.get(24..28)?, le)?;
        if first_sn < 1 || last_sn < 0 {
            // last < first - 1 is how an empty writer announces itself;
            // anything below that is malformed.
            return None;
        }
        if last_sn < first_sn - 1 {
            return None;
        }
        Some(Self {
            reader_id,
            writer_id,
            first_sn,
            last_sn,
            count,
            final_flag: flags & FLAG_FINAL != 0,
            liveliness_flag: flags & FLAG_LIVELINESS != 0,
        })
    }
}

/// HEARTBEAT_FRAG submessage: writer announces fragment availability of one
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatFragSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub sequence_number: SequenceNumber,
    /// Highest fragment number available for this sample.
    pub last_fragment_num: u32,
    pub count: u32,
}

impl HeartbeatFragSubmessage {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let len_at = begin_submessage(buf, SUBMESSAGE_HEARTBEAT_FRAG, 0);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        encode_seq_le(self.sequence_number, buf);
        buf.extend_from_slice(&self.last_fragment_num.to_le_bytes());
        buf.extend_from_slice(&self.count.to_le_bytes());
        end_submessage(buf, len_at);
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let reader_id: EntityId = body.get(0..4)?.try_into().ok()?;
        let writer_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let sequence_number = read_seq(body.get(8..16)?, le)?;
        let last_fragment_num = read_u32(body.get(16..20)?, le)?;
        let count = read_u32(body.get(20..24)?, le)?;
        if sequence_number < 1 {
            return None;
        }
        Some(Self {
            reader_id,
            writer_id,
            sequence_number,
            last_fragment_num,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SUBMESSAGE_HEADER_LEN;

    #[test]
    fn test_heartbeat_roundtrip() {
        let hb = HeartbeatSubmessage::new([0; 4], [0, 0, 1, 0x02], 1, 10, 5);
        let mut buf = Vec::new();
        hb.encode(&mut buf);
        assert_eq!(buf[0], SUBMESSAGE_HEARTBEAT);

        let decoded =
            HeartbeatSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..]).expect("decodes");
        assert_eq!(decoded, hb);
    }

    #[test]
    fn test_heartbeat_final_flag() {
        let hb = HeartbeatSubmessage::new([0; 4], [0, 0, 1, 0x02], 1, 3, 1).with_final();
        let mut buf = Vec::new();
        hb.encode(&mut buf);

        let decoded =
            HeartbeatSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..]).expect("decodes");
        assert!(decoded.final_flag);
    }

    #[test]
    fn test_heartbeat_empty_writer_window() {
        // first=1, last=0 announces "nothing written yet" and must decode.
        let hb = HeartbeatSubmessage::new([0; 4], [0, 0, 1, 0x02], 1, 0, 1);
        let mut buf = Vec::new();
        hb.encode(&mut buf);
        assert!(HeartbeatSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..]).is_some());
    }

    #[test]
    fn test_heartbeat_rejects_inverted_window() {
        let hb = HeartbeatSubmessage::new([0; 4], [0, 0, 1, 0x02], 5, 2, 1);
        let mut buf = Vec::new();
        hb.encode(&mut buf);
        assert!(HeartbeatSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..]).is_none());
    }

    #[test]
    fn test_heartbeat_frag_roundtrip() {
        let hbf = HeartbeatFragSubmessage {
            reader_id: [0; 4],
            writer_id: [0, 0, 1, 0x02],
            sequence_number: 9,
            last_fragment_num: 4,
            count: 2,
        };
        let mut buf = Vec::new();
        hbf.encode(&mut buf);
        assert_eq!(buf[0], SUBMESSAGE_HEARTBEAT_FRAG);

        let decoded = HeartbeatFragSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..])
            .expect("decodes");
        assert_eq!(decoded, hbf);
    }
}
