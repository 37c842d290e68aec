// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Datagram walker.
//!
//! Parses the 20-byte RTPS header, then iterates submessages strictly in
//! order, maintaining the per-datagram decoding context (source prefix from
//! the header, timestamp from INFO_TS, destination from INFO_DST). A
//! malformed submessage is dropped and parsing continues at the next
//! submessage boundary; an unknown submessage id is skipped per RTPS v2.3
//! Sec.8.3.4.1.

use super::{
    AckNackSubmessage, DataFragSubmessage, DataSubmessage, GapSubmessage,
    HeartbeatFragSubmessage, HeartbeatSubmessage, InfoDestinationSubmessage,
    InfoTimestampSubmessage, RtpsHeader, FLAG_ENDIANNESS, RTPS_HEADER_LEN, SUBMESSAGE_ACKNACK,
    SUBMESSAGE_DATA, SUBMESSAGE_DATA_FRAG, SUBMESSAGE_GAP, SUBMESSAGE_HEADER_LEN,
    SUBMESSAGE_HEARTBEAT, SUBMESSAGE_HEARTBEAT_FRAG, SUBMESSAGE_INFO_DST, SUBMESSAGE_INFO_TS,
    SUBMESSAGE_NACK_FRAG,
};
use super::NackFragSubmessage;
use crate::types::GuidPrefix;

/// One decoded entity submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submessage {
    Data(DataSubmessage),
    DataFrag(DataFragSubmessage),
    Heartbeat(HeartbeatSubmessage),
    HeartbeatFrag(HeartbeatFragSubmessage),
    AckNack(AckNackSubmessage),
    NackFrag(NackFragSubmessage),
    Gap(GapSubmessage),
}

/// An entity submessage plus the receiver context in effect when it was
/// parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSubmessage {
    pub submessage: Submessage,
    /// Source timestamp from the preceding INFO_TS, if any.
    pub timestamp_ns: Option<u64>,
    /// Destination prefix from the preceding INFO_DST, if any.
    pub dst_prefix: Option<GuidPrefix>,
}

/// A fully parsed datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub source_guid_prefix: GuidPrefix,
    pub source_version: [u8; 2],
    pub source_vendor: [u8; 2],
    pub submessages: Vec<ReceivedSubmessage>,
}

impl ReceivedMessage {
    /// Parse a whole datagram. `None` when the RTPS header is invalid
    /// (not our protocol, not an error worth reporting upward).
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let header = RtpsHeader::decode(datagram)?;

        let mut message = Self {
            source_guid_prefix: header.guid_prefix,
            source_version: header.version,
            source_vendor: header.vendor_id,
            submessages: Vec::new(),
        };

        let mut timestamp_ns: Option<u64> = None;
        let mut dst_prefix: Option<GuidPrefix> = None;
        let mut offset = RTPS_HEADER_LEN;

        while offset + SUBMESSAGE_HEADER_LEN <= datagram.len() {
            let id = datagram[offset];
            let flags = datagram[offset + 1];
            let le = flags & FLAG_ENDIANNESS != 0;
            let declared = {
                let bytes = [datagram[offset + 2], datagram[offset + 3]];
                if le {
                    u16::from_le_bytes(bytes)
                } else {
                    u16::from_be_bytes(bytes)
                }
            } as usize;

            let body_start = offset + SUBMESSAGE_HEADER_LEN;
            // octetsToNextHeader == 0 means "runs to the end of the message"
            // for the last submessage.
            let body_end = if declared == 0 {
                datagram.len()
            } else {
                body_start + declared
            };
            if body_end > datagram.len() {
                log::debug!(
                    "[receiver] submessage 0x{:02x} truncated (claims {} bytes, {} left)",
                    id,
                    declared,
                    datagram.len() - body_start
                );
                break;
            }
            let body = &datagram[body_start..body_end];

            match id {
                SUBMESSAGE_INFO_TS => {
                    match InfoTimestampSubmessage::decode(flags, body) {
                        Some(ts) => timestamp_ns = ts.timestamp_ns,
                        None => log::debug!("[receiver] malformed INFO_TS dropped"),
                    }
                }
                SUBMESSAGE_INFO_DST => match InfoDestinationSubmessage::decode(flags, body) {
                    Some(dst) if dst.is_broadcast() => dst_prefix = None,
                    Some(dst) => dst_prefix = Some(dst.guid_prefix),
                    None => log::debug!("[receiver] malformed INFO_DST dropped"),
                },
                _ => {
                    if let Some(submessage) = Self::decode_entity(id, flags, body) {
                        message.submessages.push(ReceivedSubmessage {
                            submessage,
                            timestamp_ns,
                            dst_prefix,
                        });
                    }
                }
            }

            if declared == 0 {
                break;
            }
            offset = body_end;
        }

        Some(message)
    }

    fn decode_entity(id: u8, flags: u8, body: &[u8]) -> Option<Submessage> {
        let decoded = match id {
            SUBMESSAGE_DATA => DataSubmessage::decode(flags, body).map(Submessage::Data),
            SUBMESSAGE_DATA_FRAG => {
                DataFragSubmessage::decode(flags, body).map(Submessage::DataFrag)
            }
            SUBMESSAGE_HEARTBEAT => {
                HeartbeatSubmessage::decode(flags, body).map(Submessage::Heartbeat)
            }
            SUBMESSAGE_HEARTBEAT_FRAG => {
                HeartbeatFragSubmessage::decode(flags, body).map(Submessage::HeartbeatFrag)
            }
            SUBMESSAGE_ACKNACK => AckNackSubmessage::decode(flags, body).map(Submessage::AckNack),
            SUBMESSAGE_NACK_FRAG => {
                NackFragSubmessage::decode(flags, body).map(Submessage::NackFrag)
            }
            SUBMESSAGE_GAP => GapSubmessage::decode(flags, body).map(Submessage::Gap),
            other => {
                // Unknown ids are legal: skip and keep walking.
                log::trace!("[receiver] skipping unknown submessage 0x{:02x}", other);
                return None;
            }
        };
        if decoded.is_none() {
            log::debug!("[receiver] malformed submessage 0x{:02x} dropped", id);
        }
        decoded
    }
}
