// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! RTPS well-known port mapping (OMG DDS-RTPS v2.3 Sec.9.6.1.1).
//!
//! `port = portBase + domainIdGain x domainId + offset + participantIdGain x
//! participantId`, with the participant gain applied to unicast ports only.

use crate::config::{
    DOMAIN_ID_GAIN, OFFSET_D0, OFFSET_D1, OFFSET_D2, OFFSET_D3, PARTICIPANT_ID_GAIN, PORT_BASE,
};
use crate::error::{Error, Result};

/// Well-known ports for one participant in one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// d0: SPDP multicast.
    pub metatraffic_multicast: u16,
    /// d1: discovery unicast.
    pub metatraffic_unicast: u16,
    /// d2: user-traffic multicast.
    pub user_multicast: u16,
    /// d3: user-traffic unicast.
    pub user_unicast: u16,
}

impl PortMapping {
    /// Apply the RTPS port formula. Domain and participant ids are bounded
    /// so every resulting port fits in u16.
    pub fn calculate(domain_id: u32, participant_id: u8) -> Result<Self> {
        if domain_id >= 233 {
            return Err(Error::InvalidArgument("domain_id must be < 233"));
        }
        if participant_id >= 120 {
            return Err(Error::InvalidArgument("participant_id must be < 120"));
        }

        let domain = domain_id as u16;
        let base = PORT_BASE + DOMAIN_ID_GAIN * domain;
        let participant_gain = PARTICIPANT_ID_GAIN * u16::from(participant_id);

        Ok(Self {
            metatraffic_multicast: base + OFFSET_D0,
            metatraffic_unicast: base + OFFSET_D1 + participant_gain,
            user_multicast: base + OFFSET_D2,
            user_unicast: base + OFFSET_D3 + participant_gain,
        })
    }

    /// Find the first participant id whose unicast ports are free.
    ///
    /// The multicast ports are shared via SO_REUSEADDR; only the unicast
    /// pair must be unique per participant on one host.
    pub fn auto_assign(domain_id: u32) -> Result<(Self, u8)> {
        for pid in 0..120u8 {
            let mapping = Self::calculate(domain_id, pid)?;
            if port_available(mapping.metatraffic_unicast) && port_available(mapping.user_unicast)
            {
                log::debug!(
                    "[PortMapping] auto_assign domain={} participant_id={} (ports {}, {})",
                    domain_id,
                    pid,
                    mapping.metatraffic_unicast,
                    mapping.user_unicast
                );
                return Ok((mapping, pid));
            }
        }
        Err(Error::ResourceLimitExceeded(
            "no free participant id in domain".into(),
        ))
    }
}

fn port_available(port: u16) -> bool {
    std::net::UdpSocket::bind(("0.0.0.0", port)).is_ok()
}
