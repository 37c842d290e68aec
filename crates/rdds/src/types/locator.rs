// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! RTPS locator: transport kind + port + 16-byte address.
//!
//! IPv4 addresses occupy the last four bytes of the address field
//! (RTPS v2.3 Sec.9.3.1). Only UDPv4 locators are produced by this crate;
//! unknown kinds are carried opaquely through discovery payloads.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

/// Locator kind for UDP over IPv4.
pub const LOCATOR_KIND_UDPV4: i32 = 1;
/// Locator kind for UDP over IPv6 (parsed but never emitted).
pub const LOCATOR_KIND_UDPV6: i32 = 2;
/// Invalid/unset locator kind.
pub const LOCATOR_KIND_INVALID: i32 = -1;

/// Encoded size of one locator on the wire: kind(4) + port(4) + address(16).
pub const LOCATOR_ENCODED_LEN: usize = 24;

/// Network locator (RTPS v2.3 Sec.8.2.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub kind: i32,
    pub port: u32,
    pub address: [u8; 16],
}

impl Locator {
    /// Invalid locator placeholder.
    pub fn invalid() -> Self {
        Self {
            kind: LOCATOR_KIND_INVALID,
            port: 0,
            address: [0; 16],
        }
    }

    /// UDPv4 locator from address octets and port.
    pub fn udpv4(addr: Ipv4Addr, port: u16) -> Self {
        let mut address = [0u8; 16];
        address[12..16].copy_from_slice(&addr.octets());
        Self {
            kind: LOCATOR_KIND_UDPV4,
            port: u32::from(port),
            address,
        }
    }

    /// Build from a socket address (IPv4 only; IPv6 yields an invalid locator).
    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        match addr.ip() {
            IpAddr::V4(v4) => Self::udpv4(v4, addr.port()),
            IpAddr::V6(_) => Self::invalid(),
        }
    }

    /// Convert to a socket address when the locator is UDPv4.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        if self.kind != LOCATOR_KIND_UDPV4 {
            return None;
        }
        let octets: [u8; 4] = self.address[12..16].try_into().ok()?;
        let port = u16::try_from(self.port).ok()?;
        Some(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::from(octets),
            port,
        )))
    }

    /// True for UDPv4 multicast addresses (224.0.0.0/4).
    pub fn is_multicast(&self) -> bool {
        self.kind == LOCATOR_KIND_UDPV4 && self.address[12] >= 224 && self.address[12] <= 239
    }

    /// Encode as kind(4) + port(4) + address(16), little-endian scalars.
    pub fn encode_le(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf.extend_from_slice(&self.address);
    }

    /// Decode from a 24-byte little-endian wire image.
    pub fn decode_le(buf: &[u8]) -> Option<Self> {
        if buf.len() < LOCATOR_ENCODED_LEN {
            return None;
        }
        let kind = i32::from_le_bytes(buf[0..4].try_into().ok()?);
        let port = u32::from_le_bytes(buf[4..8].try_into().ok()?);
        let mut address = [0u8; 16];
        address.copy_from_slice(&buf[8..24]);
        Some(Self {
            kind,
            port,
            address,
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_socket_addr() {
            Some(addr) => write!(f, "{}", addr),
            None => write!(f, "locator(kind={}, port={})", self.kind, self.port),
        }
    }
}
