// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! INFO_TS and INFO_DST submessages (RTPS v2.3 Sec.8.3.7.9, 8.3.7.7).
//!
//! Both mutate the per-datagram receiver context: INFO_TS stamps the source
//! timestamp of subsequent DATA submessages, INFO_DST narrows delivery to
//! one destination participant.

use super::{begin_submessage, end_submessage, read_u32, SUBMESSAGE_INFO_DST, SUBMESSAGE_INFO_TS};
use crate::types::GuidPrefix;

/// INFO_TS flag: no timestamp follows, invalidate the current one.
const FLAG_INVALIDATE: u8 = 0x02;

/// INFO_TS submessage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoTimestampSubmessage {
    /// Nanoseconds since the UNIX epoch; `None` invalidates.
    pub timestamp_ns: Option<u64>,
}

impl InfoTimestampSubmessage {
    /// Timestamp of "now".
    pub fn now() -> Self {
        Self {
            timestamp_ns: Some(crate::cache::now_ns()),
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self.timestamp_ns {
            Some(nanos) => {
                let len_at = begin_submessage(buf, SUBMESSAGE_INFO_TS, 0);
                let (seconds, fraction) = nanos_to_rtps_time(nanos);
                buf.extend_from_slice(&seconds.to_le_bytes());
                buf.extend_from_slice(&fraction.to_le_bytes());
                end_submessage(buf, len_at);
            }
            None => {
                let len_at = begin_submessage(buf, SUBMESSAGE_INFO_TS, FLAG_INVALIDATE);
                end_submessage(buf, len_at);
            }
        }
    }

    pub fn decode(flags: u8, body: &[u8]) -> Option<Self> {
        if flags & FLAG_INVALIDATE != 0 {
            return Some(Self { timestamp_ns: None });
        }
        let le = flags & super::FLAG_ENDIANNESS != 0;
        let seconds = read_u32(body.get(0..4)?, le)?;
        let fraction = read_u32(body.get(4..8)?, le)?;
        Some(Self {
            timestamp_ns: Some(rtps_time_to_nanos(seconds, fraction)),
        })
    }
}

/// INFO_DST submessage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoDestinationSubmessage {
    /// Destination participant; all-zero means "every participant".
    pub guid_prefix: GuidPrefix,
}

impl InfoDestinationSubmessage {
    pub fn new(guid_prefix: GuidPrefix) -> Self {
        Self { guid_prefix }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let len_at = begin_submessage(buf, SUBMESSAGE_INFO_DST, 0);
        buf.extend_from_slice(&self.guid_prefix);
        end_submessage(buf, len_at);
    }

    pub fn decode(_flags: u8, body: &[u8]) -> Option<Self> {
        let guid_prefix: GuidPrefix = body.get(0..12)?.try_into().ok()?;
        Some(Self { guid_prefix })
    }

    /// True when the prefix addresses every participant.
    pub fn is_broadcast(&self) -> bool {
        self.guid_prefix.iter().all(|&b| b == 0)
    }
}

/// RTPS Time_t: seconds + fraction where fraction = ns * 2^32 / 1e9.
fn nanos_to_rtps_time(nanos: u64) -> (u32, u32) {
    let seconds = u32::try_from(nanos / 1_000_000_000).unwrap_or(u32::MAX);
    let remainder = nanos % 1_000_000_000;
    let fraction = ((remainder << 32) / 1_000_000_000) as u32;
    (seconds, fraction)
}

fn rtps_time_to_nanos(seconds: u32, fraction: u32) -> u64 {
    let from_fraction = (u64::from(fraction) * 1_000_000_000) >> 32;
    u64::from(seconds) * 1_000_000_000 + from_fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SUBMESSAGE_HEADER_LEN;

    #[test]
    fn test_info_ts_roundtrip() {
        let ts = InfoTimestampSubmessage {
            timestamp_ns: Some(1_700_000_000_123_456_789),
        };
        let mut buf = Vec::new();
        ts.encode(&mut buf);
        assert_eq!(buf[0], SUBMESSAGE_INFO_TS);

        let decoded = InfoTimestampSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..])
            .expect("decodes");
        let roundtripped = decoded.timestamp_ns.expect("timestamp present");
        // Fraction encoding loses sub-nanosecond precision; stay within 1us.
        assert!(roundtripped.abs_diff(1_700_000_000_123_456_789) < 1_000);
    }

    #[test]
    fn test_info_ts_invalidate() {
        let ts = InfoTimestampSubmessage { timestamp_ns: None };
        let mut buf = Vec::new();
        ts.encode(&mut buf);

        let decoded = InfoTimestampSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..])
            .expect("decodes");
        assert_eq!(decoded.timestamp_ns, None);
    }

    #[test]
    fn test_info_dst_roundtrip() {
        let dst = InfoDestinationSubmessage::new([7; 12]);
        let mut buf = Vec::new();
        dst.encode(&mut buf);
        assert_eq!(buf[0], SUBMESSAGE_INFO_DST);

        let decoded = InfoDestinationSubmessage::decode(buf[1], &buf[SUBMESSAGE_HEADER_LEN..])
            .expect("decodes");
        assert_eq!(decoded.guid_prefix, [7; 12]);
        assert!(!decoded.is_broadcast());
        assert!(InfoDestinationSubmessage::new([0; 12]).is_broadcast());
    }
}
