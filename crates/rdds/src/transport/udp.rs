// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! UDP socket construction via socket2.
//!
//! Multicast listen sockets use SO_REUSEADDR (and SO_REUSEPORT on Unix) so
//! every participant on the host can share the well-known discovery port;
//! unicast ports are exclusive per participant.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};
use crate::transport::multicast::join_multicast_group;

/// Bind the shared multicast listen socket and join the discovery group.
pub fn bind_multicast_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(Error::IoError)?;
    socket.set_reuse_address(true).map_err(Error::IoError)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(Error::IoError)?;

    let addr: SocketAddr = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port).into();
    socket
        .bind(&addr.into())
        .map_err(|e| Error::BindFailed(format!("multicast 0.0.0.0:{}: {}", port, e)))?;

    let socket: UdpSocket = socket.into();
    join_multicast_group(&socket)
        .map_err(|e| Error::MulticastJoinFailed(format!("port {}: {}", port, e)))?;
    Ok(socket)
}

/// Bind an exclusive unicast listen socket.
///
/// No address reuse here: unicast ports identify one participant, and a
/// second bind must fail so `PortMapping::auto_assign` probing stays
/// truthful.
pub fn bind_unicast_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(Error::IoError)?;

    let addr: SocketAddr = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port).into();
    socket
        .bind(&addr.into())
        .map_err(|e| Error::BindFailed(format!("unicast 0.0.0.0:{}: {}", port, e)))?;
    Ok(socket.into())
}

/// Bind the outbound send socket on an OS-assigned ephemeral port.
pub fn bind_ephemeral_socket() -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_multicast_loop_v4(true)?;
    Ok(socket)
}
