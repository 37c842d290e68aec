// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Outbound datagram builder: RTPS header + submessage train.

use super::{
    AckNackSubmessage, DataFragSubmessage, DataSubmessage, GapSubmessage,
    HeartbeatFragSubmessage, HeartbeatSubmessage, InfoDestinationSubmessage,
    InfoTimestampSubmessage, NackFragSubmessage, RtpsHeader,
};
use crate::types::GuidPrefix;

/// Accumulates one outbound RTPS datagram.
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Start a datagram with this sender's header.
    pub fn new(sender_prefix: GuidPrefix) -> Self {
        let mut buf = Vec::with_capacity(256);
        RtpsHeader::new(sender_prefix).encode(&mut buf);
        Self { buf }
    }

    /// Narrow delivery to one destination participant.
    pub fn info_dst(&mut self, prefix: GuidPrefix) -> &mut Self {
        InfoDestinationSubmessage::new(prefix).encode(&mut self.buf);
        self
    }

    /// Stamp subsequent DATA submessages with a source timestamp.
    pub fn info_ts(&mut self, timestamp_ns: u64) -> &mut Self {
        InfoTimestampSubmessage {
            timestamp_ns: Some(timestamp_ns),
        }
        .encode(&mut self.buf);
        self
    }

    pub fn data(&mut self, msg: &DataSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    pub fn data_frag(&mut self, msg: &DataFragSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    pub fn heartbeat(&mut self, msg: &HeartbeatSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    pub fn heartbeat_frag(&mut self, msg: &HeartbeatFragSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    pub fn acknack(&mut self, msg: &AckNackSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    pub fn nack_frag(&mut self, msg: &NackFragSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    pub fn gap(&mut self, msg: &GapSubmessage) -> &mut Self {
        msg.encode(&mut self.buf);
        self
    }

    /// Bytes accumulated so far (header only = empty message).
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= super::RTPS_HEADER_LEN
    }

    /// Finish and take the datagram.
    pub fn take(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ReceivedMessage;

    #[test]
    fn test_builder_produces_parseable_message() {
        let mut builder = MessageBuilder::new([4; 12]);
        builder.info_dst([8; 12]).info_ts(42_000_000_000);
        builder.data(&DataSubmessage::new(
            [0; 4],
            [0, 0, 1, 0x02],
            1,
            vec![0, 1, 0, 0, 1, 2],
        ));
        builder.heartbeat(&HeartbeatSubmessage::new([0; 4], [0, 0, 1, 0x02], 1, 1, 1));

        let datagram = builder.take();
        let parsed = ReceivedMessage::parse(&datagram).expect("parses");
        assert_eq!(parsed.source_guid_prefix, [4; 12]);
        assert_eq!(parsed.submessages.len(), 2);
        assert_eq!(parsed.submessages[0].dst_prefix, Some([8; 12]));
    }

    #[test]
    fn test_builder_empty_detection() {
        let builder = MessageBuilder::new([0; 12]);
        assert!(builder.is_empty());
    }
}
