// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! ACKNACK and NACK_FRAG submessages (RTPS v2.3 Sec.8.3.7.1, 8.3.7.10).
//!
//! An ACKNACK acknowledges everything below `reader_sn_state.base()` and
//! requests retransmission of every sequence whose bitmap bit is set.

use super::{
    begin_submessage, end_submessage, read_seq, read_u32, SUBMESSAGE_ACKNACK, SUBMESSAGE_NACK_FRAG,
};
use crate::types::sequence::encode_seq_le;
use crate::types::{EntityId, FragmentNumberSet, SequenceNumber, SequenceNumberSet};

/// ACKNACK flag: reader is synchronized, no response required.
const FLAG_FINAL: u8 = 0x02;

/// ACKNACK submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckNackSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// Base acknowledges `< base`; set bits request retransmission.
    pub reader_sn_state: SequenceNumberSet,
    /// Monotonic per reader; the writer ignores duplicates.
    pub count: u32,
    pub final_flag: bool,
}

impl AckNackSubmessage {
    pub fn new(
        reader_id: EntityId,
        writer_id: EntityId,
        reader_sn_state: SequenceNumberSet,
        count: u32,
        final_flag: bool,
    ) -> Self {
        Self {
            reader_id,
            writer_id,
            reader_sn_state,
            count,
            final_flag,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let flags = if self.final_flag { FLAG_FINAL } else { 0 };
        let len_at = begin_submessage(buf, SUBMESSAGE_ACKNACK, flags);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        self.reader_sn_state.encode_le(buf);
        buf.extend_from_slice(&self.count.to_le_bytes());
        end_submessage(buf, len_at);
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let reader_id: EntityId = body.get(0..4)?.try_into().ok()?;
        let writer_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let (reader_sn_state, consumed) = decode_sn_set(body.get(8..)?, le)?;
        let count = read_u32(body.get(8 + consumed..8 + consumed + 4)?, le)?;
        Some(Self {
            reader_id,
            writer_id,
            reader_sn_state,
            count,
            final_flag: flags & FLAG_FINAL != 0,
        })
    }
}

/// NACK_FRAG submessage: per-fragment retransmission request for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackFragSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub sequence_number: SequenceNumber,
    pub fragment_state: FragmentNumberSet,
    pub count: u32,
}

impl NackFragSubmessage {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let len_at = begin_submessage(buf, SUBMESSAGE_NACK_FRAG, 0);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        encode_seq_le(self.sequence_number, buf);
        self.fragment_state.encode_le(buf);
        buf.extend_from_slice(&self.count.to_le_bytes());
        end_submessage(buf, len_at);
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        if !le {
            // Big-endian fragment sets never appear from the vendors we
            // interoperate with; drop rather than misparse.
            return None;
        }
        let reader_id: EntityId = body.get(0..4)?.try_into().ok()?;
        let writer_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let sequence_number = read_seq(body.get(8..16)?, le)?;
        if sequence_number < 1 {
            return None;
        }
        let (fragment_state, consumed) = FragmentNumberSet::decode_le(body.get(16..)?)?;
        let count = read_u32(body.get(16 + consumed..16 + consumed + 4)?, le)?;
        Some(Self {
            reader_id,
            writer_id,
            sequence_number,
            fragment_state,
            count,
        })
    }
}

/// Decode a `SequenceNumberSet` in either endianness.
fn decode_sn_set(buf: &[u8], le: bool) -> Option<(SequenceNumberSet, usize)> {
    if le {
        return SequenceNumberSet::decode_le(buf);
    }
    // Big-endian path: re-read scalars manually.
    let base = read_seq(buf.get(0..8)?, false)?;
    let num_bits = read_u32(buf.get(8..12)?, false)?;
    if num_bits > crate::types::sequence::SNSET_MAX_BITS {
        return None;
    }
    let word_count = SequenceNumberSet::word_count_for_bits(num_bits);
    let needed = 12 + word_count * 4;
    if buf.len() < needed {
        return None;
    }
    let mut words = Vec::with_capacity(word_count);
    for i in 0..word_count {
        words.push(read_u32(buf.get(12 + i * 4..16 + i * 4)?, false)?);
    }
    let set = SequenceNumberSet::from_raw(base, num_bits, &words)?;
    Some((set, needed))
}
