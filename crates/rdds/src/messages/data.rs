// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! DATA and DATA_FRAG submessages (RTPS v2.3 Sec.8.3.7.2-3).
//!
//! Inline QoS is carried as a parameter list; the core only interprets the
//! key hash and status-info parameters (disposal/unregistration) and passes
//! the rest through untouched.

use super::{
    begin_submessage, end_submessage, read_seq, read_u16, read_u32, SUBMESSAGE_DATA,
    SUBMESSAGE_DATA_FRAG,
};
use crate::types::sequence::encode_seq_le;
use crate::types::{EntityId, SequenceNumber};

/// Parameter id terminating a parameter list.
pub const PID_SENTINEL: u16 = 0x0001;
/// Key hash inline-QoS parameter (16 bytes).
pub const PID_KEY_HASH: u16 = 0x0070;
/// Status info inline-QoS parameter (4 bytes, flags in the last octet).
pub const PID_STATUS_INFO: u16 = 0x0071;

/// DATA flag: inline QoS present.
const FLAG_INLINE_QOS: u8 = 0x02;
/// DATA flag: serialized data present.
const FLAG_DATA: u8 = 0x04;
/// DATA flag: serialized key present instead of data.
const FLAG_KEY: u8 = 0x08;

/// One inline-QoS parameter, carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineQosParameter {
    pub pid: u16,
    pub value: Vec<u8>,
}

/// DATA submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub sequence_number: SequenceNumber,
    pub inline_qos: Vec<InlineQosParameter>,
    /// Serialized payload including the CDR encapsulation header. Empty for
    /// a key-only or QoS-only DATA.
    pub payload: Vec<u8>,
    /// True when the payload carries the serialized key, not the data.
    pub key_payload: bool,
}

impl DataSubmessage {
    /// Plain data sample.
    pub fn new(
        reader_id: EntityId,
        writer_id: EntityId,
        sequence_number: SequenceNumber,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            reader_id,
            writer_id,
            sequence_number,
            inline_qos: Vec::new(),
            payload,
            key_payload: false,
        }
    }

    /// Attach an inline-QoS parameter (used for key hash / status info).
    pub fn push_inline_qos(&mut self, pid: u16, value: Vec<u8>) {
        self.inline_qos.push(InlineQosParameter { pid, value });
    }

    /// Key hash parameter, when present.
    pub fn key_hash(&self) -> Option<[u8; 16]> {
        self.inline_qos
            .iter()
            .find(|p| p.pid == PID_KEY_HASH)
            .and_then(|p| p.value.get(0..16))
            .and_then(|v| v.try_into().ok())
    }

    /// Status-info flags (dispose = 0x01, unregister = 0x02), when present.
    ///
    /// Status info is big-endian on the wire; the flags live in the last
    /// octet.
    pub fn status_info(&self) -> Option<u8> {
        self.inline_qos
            .iter()
            .find(|p| p.pid == PID_STATUS_INFO)
            .and_then(|p| p.value.get(3))
            .copied()
    }

    /// Append the encoded submessage.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut flags = 0u8;
        if !self.inline_qos.is_empty() {
            flags |= FLAG_INLINE_QOS;
        }
        if !self.payload.is_empty() {
            flags |= if self.key_payload { FLAG_KEY } else { FLAG_DATA };
        }

        let len_at = begin_submessage(buf, SUBMESSAGE_DATA, flags);
        buf.extend_from_slice(&0u16.to_le_bytes()); // extraFlags
        buf.extend_from_slice(&16u16.to_le_bytes()); // octetsToInlineQos
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        encode_seq_le(self.sequence_number, buf);
        if !self.inline_qos.is_empty() {
            encode_parameter_list(&self.inline_qos, buf);
        }
        buf.extend_from_slice(&self.payload);
        end_submessage(buf, len_at);
    }

    /// Decode from a submessage body.
    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let octets_to_inline_qos = read_u16(body.get(2..4)?, le)? as usize;

        let reader_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let writer_id: EntityId = body.get(8..12)?.try_into().ok()?;
        let sequence_number = read_seq(body.get(12..20)?, le)?;
        if sequence_number < 1 {
            return None;
        }

        // octetsToInlineQos counts from the octet after itself.
        let mut offset = 4 + octets_to_inline_qos;
        let mut inline_qos = Vec::new();
        if flags & FLAG_INLINE_QOS != 0 {
            let consumed = decode_parameter_list(body.get(offset..)?, le, &mut inline_qos)?;
            offset += consumed;
        }

        let has_payload = flags & (FLAG_DATA | FLAG_KEY) != 0;
        let payload = if has_payload {
            body.get(offset..)?.to_vec()
        } else {
            Vec::new()
        };

        Some(Self {
            reader_id,
            writer_id,
            sequence_number,
            inline_qos,
            payload,
            key_payload: flags & FLAG_KEY != 0,
        })
    }
}

/// DATA_FRAG submessage: one slice of a fragmented sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFragSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub sequence_number: SequenceNumber,
    /// First fragment number carried by this submessage (1-based).
    pub fragment_starting_num: u32,
    pub fragments_in_submessage: u16,
    /// Fragment size all fragments of this sample use (last may be shorter).
    pub fragment_size: u16,
    /// Total serialized size of the complete sample.
    pub sample_size: u32,
    pub inline_qos: Vec<InlineQosParameter>,
    pub payload: Vec<u8>,
}

impl DataFragSubmessage {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut flags = 0u8;
        if !self.inline_qos.is_empty() {
            flags |= FLAG_INLINE_QOS;
        }

        let len_at = begin_submessage(buf, SUBMESSAGE_DATA_FRAG, flags);
        buf.extend_from_slice(&0u16.to_le_bytes()); // extraFlags
        buf.extend_from_slice(&28u16.to_le_bytes()); // octetsToInlineQos
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        encode_seq_le(self.sequence_number, buf);
        buf.extend_from_slice(&self.fragment_starting_num.to_le_bytes());
        buf.extend_from_slice(&self.fragments_in_submessage.to_le_bytes());
        buf.extend_from_slice(&self.fragment_size.to_le_bytes());
        buf.extend_from_slice(&self.sample_size.to_le_bytes());
        if !self.inline_qos.is_empty() {
            encode_parameter_list(&self.inline_qos, buf);
        }
        buf.extend_from_slice(&self.payload);
        end_submessage(buf, len_at);
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let octets_to_inline_qos = read_u16(body.get(2..4)?, le)? as usize;

        let reader_id: EntityId = body.get(4..8)?.try_into().ok()?;
        let writer_id: EntityId = body.get(8..12)?.try_into().ok()?;
        let sequence_number = read_seq(body.get(12..20)?, le)?;
        if sequence_number < 1 {
            return None;
        }
        let fragment_starting_num = read_u32(body.get(20..24)?, le)?;
        let fragments_in_submessage = read_u16(body.get(24..26)?, le)?;
        let fragment_size = read_u16(body.get(26..28)?, le)?;
        let sample_size = read_u32(body.get(28..32)?, le)?;
        if fragment_starting_num == 0 || fragment_size == 0 {
            return None;
        }

        let mut offset = 4 + octets_to_inline_qos;
        let mut inline_qos = Vec::new();
        if flags & FLAG_INLINE_QOS != 0 {
            let consumed = decode_parameter_list(body.get(offset..)?, le, &mut inline_qos)?;
            offset += consumed;
        }

        Some(Self {
            reader_id,
            writer_id,
            sequence_number,
            fragment_starting_num,
            fragments_in_submessage,
            fragment_size,
            sample_size,
            inline_qos,
            payload: body.get(offset..)?.to_vec(),
        })
    }
}

// ============================================================================
// Parameter list helpers
// ============================================================================

/// Append `(pid, len, value)` entries plus the sentinel. Values are padded
/// to 4-byte alignment per RTPS v2.3 Sec.9.4.2.11.
fn encode_parameter_list(params: &[InlineQosParameter], buf: &mut Vec<u8>) {
    for param in params {
        let padded = param.value.len().div_ceil(4) * 4;
        buf.extend_from_slice(&param.pid.to_le_bytes());
        buf.extend_from_slice(&(padded as u16).to_le_bytes());
        buf.extend_from_slice(&param.value);
        buf.resize(buf.len() + (padded - param.value.len()), 0);
    }
    buf.extend_from_slice(&PID_SENTINEL.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
}

/// Walk a parameter list until the sentinel; returns consumed bytes.
fn decode_parameter_list(
    buf: &[u8],
    le: bool,
    out: &mut Vec<InlineQosParameter>,
) -> Option<usize> {
    let mut offset = 0usize;
    loop {
        let pid = read_u16(buf.get(offset..offset + 2)?, le)?;
        let len = read_u16(buf.get(offset + 2..offset + 4)?, le)? as usize;
        offset += 4;
        if pid == PID_SENTINEL {
            return Some(offset);
        }
        let value = buf.get(offset..offset + len)?.to_vec();
        out.push(InlineQosParameter { pid, value });
        offset += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SUBMESSAGE_HEADER_LEN;

    fn roundtrip_data(msg: &DataSubmessage) -> DataSubmessage {
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        assert_eq!(buf[0], SUBMESSAGE_DATA);
        let flags = buf[1];
        DataSubmessage::decode(flags, &buf[SUBMESSAGE_HEADER_LEN..]).expect("decode succeeds")
    }

    #[test]
    fn test_data_roundtrip_plain() {
        let msg = DataSubmessage::new(
            [0, 0, 0, 0],
            [0, 0, 1, 0x02],
            7,
            vec![0x00, 0x01, 0x00, 0x00, b'h', b'i'],
        );
        assert_eq!(roundtrip_data(&msg), msg);
    }

    #[test]
    fn test_data_roundtrip_with_inline_qos() {
        let mut msg = DataSubmessage::new([0, 0, 4, 0xC7], [0, 0, 4, 0xC2], 2, Vec::new());
        msg.push_inline_qos(PID_KEY_HASH, vec![9u8; 16]);
        msg.push_inline_qos(PID_STATUS_INFO, vec![0, 0, 0, 0x01]);

        let decoded = roundtrip_data(&msg);
        assert_eq!(decoded.key_hash(), Some([9u8; 16]));
        assert_eq!(decoded.status_info(), Some(0x01));
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_data_rejects_zero_sequence() {
        let msg = DataSubmessage::new([0; 4], [0, 0, 1, 0x02], 1, vec![1, 2, 3, 4]);
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        // Corrupt the sequence number to 0 (bytes 12..20 of the body: high, low).
        let body = &mut buf[SUBMESSAGE_HEADER_LEN..];
        body[12..20].fill(0);
        assert!(DataSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..]).is_none());
    }

    #[test]
    fn test_data_frag_roundtrip() {
        let msg = DataFragSubmessage {
            reader_id: [0; 4],
            writer_id: [0, 0, 1, 0x02],
            sequence_number: 12,
            fragment_starting_num: 3,
            fragments_in_submessage: 1,
            fragment_size: 1400,
            sample_size: 5000,
            inline_qos: Vec::new(),
            payload: vec![0xAB; 1400],
        };
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        assert_eq!(buf[0], SUBMESSAGE_DATA_FRAG);

        let decoded = DataFragSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..])
            .expect("decode succeeds");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_data_frag_rejects_zero_fragment_number() {
        let msg = DataFragSubmessage {
            reader_id: [0; 4],
            writer_id: [0, 0, 1, 0x02],
            sequence_number: 1,
            fragment_starting_num: 1,
            fragments_in_submessage: 1,
            fragment_size: 4,
            sample_size: 4,
            inline_qos: Vec::new(),
            payload: vec![0; 4],
        };
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        let body_start = SUBMESSAGE_HEADER_LEN;
        buf[body_start + 20..body_start + 24].fill(0); // fragmentStartingNum = 0
        assert!(DataFragSubmessage::decode(buf[1], &buf[body_start..]).is_none());
    }

    #[test]
    fn test_parameter_list_truncated_is_error() {
        // Parameter claims 16 bytes but only 4 present, then buffer ends.
        let mut buf = Vec::new();
        buf.extend_from_slice(&PID_KEY_HASH.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        let mut out = Vec::new();
        assert!(decode_parameter_list(&buf, true, &mut out).is_none());
    }
}
