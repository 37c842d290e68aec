// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! UDPv4 transport: socket construction, multicast membership and the
//! RTPS well-known port mapping.

pub mod multicast;
pub mod ports;
pub mod udp;

pub use multicast::{default_unicast_locators, join_multicast_group, primary_interface_ip};
pub use ports::PortMapping;
pub use udp::{bind_ephemeral_socket, bind_multicast_socket, bind_unicast_socket};
