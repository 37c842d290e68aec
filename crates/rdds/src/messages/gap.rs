// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! GAP submessage (RTPS v2.3 Sec.8.3.7.4).
//!
//! The writer declares sequences the reader will never receive: the
//! contiguous run `[gap_start, gap_list.base)` plus every set bit of
//! `gap_list`. The reader marks them LOST and stops requesting them.

use super::{begin_submessage, end_submessage, read_seq, read_u32, SUBMESSAGE_GAP};
use crate::types::sequence::encode_seq_le;
use crate::types::{EntityId, SequenceNumber, SequenceNumberSet};

/// GAP submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// First irrelevant sequence number.
    pub gap_start: SequenceNumber,
    /// Irrelevant sequences at and above `gap_list.base()`.
    pub gap_list: SequenceNumberSet,
}

impl GapSubmessage {
    /// GAP covering the contiguous inclusive range `[start, end]`.
    pub fn contiguous(
        reader_id: EntityId,
        writer_id: EntityId,
        start: SequenceNumber,
        end: SequenceNumber,
    ) -> Option<Self> {
        if start < 1 || end < start {
            return None;
        }
        // Everything in [start, end] is covered by gap_start + the implicit
        // run below base; base = end + 1 with an empty bitmap.
        Some(Self {
            reader_id,
            writer_id,
            gap_start: start,
            gap_list: SequenceNumberSet::empty(end + 1),
        })
    }

    /// GAP for a single irrelevant sequence.
    pub fn single(reader_id: EntityId, writer_id: EntityId, seq: SequenceNumber) -> Option<Self> {
        Self::contiguous(reader_id, writer_id, seq, seq)
    }

    /// Expand into the explicit list of irrelevant sequences, ascending.
    pub fn irrelevant_sequences(&self) -> Vec<SequenceNumber> {
        let mut seqs: Vec<SequenceNumber> = (self.gap_start..self.gap_list.base()).collect();
        seqs.extend(self.gap_list.iter());
        seqs
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let len_at = begin_submessage(buf, SUBMESSAGE_GAP, 0);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        encode_seq_le(self.gap_start, buf);
        self.gap_list.encode_le(buf);
        end_submessage(buf, len_at);
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let reader_id: EntityId = body.get(0..4)?.try_into().ok()?;
        let writer_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let gap_start = read_seq(body.get(8..16)?, le)?;
        if gap_start < 1 {
            return None;
        }
        let (gap_list, _) = decode_sn_set(body.get(16..)?, le)?;
        if gap_list.base() < gap_start {
            return None;
        }
        Some(Self {
            reader_id,
            writer_id,
            gap_start,
            gap_list,
        })
    }
}

fn decode_sn_set(buf: &[u8], le: bool) -> Option<(SequenceNumberSet, usize)> {
    if le {
        SequenceNumberSet::decode_le(buf)
    } else {
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
        Some((SequenceNumberSet::from_raw(base, num_bits, &words)?, needed))
    }
}
