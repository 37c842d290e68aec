// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Shared outbound socket sink.
//!
//! Every writer serializes its datagrams through this one socket; the mutex
//! gives the send path its `send_sync` semantics (the caller returns only
//! once the datagram was handed to the kernel).

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::rtps::MessageSender;
use crate::transport::bind_ephemeral_socket;
use crate::types::Locator;

/// Single shared send socket behind a mutex.
pub struct SendResource {
    socket: Mutex<UdpSocket>,
    shutdown: AtomicBool,
}

impl SendResource {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            socket: Mutex::new(bind_ephemeral_socket()?),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Stop sending; later calls are dropped silently.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl MessageSender for SendResource {
    fn send(&self, locator: &Locator, datagram: &[u8]) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let Some(addr) = locator.to_socket_addr() else {
            log::debug!("[SendResource] dropping send to non-UDPv4 locator {}", locator);
            return;
        };
        let socket = self.socket.lock();
        if let Err(e) = socket.send_to(datagram, addr) {
            log::debug!(
                "[SendResource] send to {} failed ({} bytes): {}",
                addr,
                datagram.len(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_send_reaches_local_socket() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind succeeds");
        let port = receiver.local_addr().expect("has addr").port();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .expect("timeout set");

        let resource = SendResource::new().expect("resource created");
        let locator = Locator::udpv4(Ipv4Addr::LOCALHOST, port);
        resource.send(&locator, b"hello rtps");

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).expect("datagram arrives");
        assert_eq!(&buf[..len], b"hello rtps");
    }

    #[test]
    fn test_send_after_shutdown_dropped() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind succeeds");
        let port = receiver.local_addr().expect("has addr").port();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_millis(100)))
            .expect("timeout set");

        let resource = SendResource::new().expect("resource created");
        resource.shutdown();
        resource.send(&Locator::udpv4(Ipv4Addr::LOCALHOST, port), b"late");

        let mut buf = [0u8; 16];
        assert!(receiver.recv_from(&mut buf).is_err(), "nothing was sent");
    }
}
