// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Multicast group membership and local interface discovery.
//!
//! Interface discovery goes through the `local-ip-address` crate; the
//! loopback address is the fallback so an interface-less host (CI
//! container) still gets a usable unicast locator.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::config::MULTICAST_GROUP;
use crate::types::Locator;

/// Join the RTPS discovery multicast group on the default interface.
///
/// Returns the interface address the membership was bound to.
pub fn join_multicast_group(socket: &UdpSocket) -> io::Result<Ipv4Addr> {
    let group: Ipv4Addr = MULTICAST_GROUP
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad multicast group"))?;

    let iface = primary_interface_ip().unwrap_or(Ipv4Addr::UNSPECIFIED);
    socket.join_multicast_v4(&group, &iface)?;
    socket.set_multicast_loop_v4(true)?;
    log::debug!(
        "[multicast] joined {} on iface {}",
        MULTICAST_GROUP,
        iface
    );
    Ok(iface)
}

/// Primary local IPv4 address, if one exists.
pub fn primary_interface_ip() -> Option<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(v4)) => Some(v4),
        Ok(IpAddr::V6(_)) | Err(_) => None,
    }
}

/// Unicast locators for this host at `port`: every non-loopback IPv4
/// interface, or loopback when none exists.
pub fn default_unicast_locators(port: u16) -> Vec<Locator> {
    let mut locators = Vec::new();
    if let Ok(interfaces) = local_ip_address::list_afinet_netifas() {
        for (_, ip) in interfaces {
            if let IpAddr::V4(v4) = ip {
                if !v4.is_loopback() {
                    locators.push(Locator::udpv4(v4, port));
                }
            }
        }
    }
    if locators.is_empty() {
        locators.push(Locator::udpv4(Ipv4Addr::LOCALHOST, port));
    }
    locators
}
