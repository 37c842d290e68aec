// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Listen resource: one bound UDP socket, one receive thread, a set of
//! weakly-referenced associated endpoints.
//!
//! The thread runs a mio poll loop (socket readiness + a waker for
//! shutdown), drains every available datagram, parses it and dispatches the
//! submessages in arrival order:
//! - DATA / DATAFRAG / HEARTBEAT / HEARTBEAT_FRAG / GAP go to readers whose
//!   entity id matches `reader_id` (ENTITYID_UNKNOWN broadcasts to all
//!   readers),
//! - ACKNACK / NACKFRAG go to writers by `writer_id`.
//!
//! A submessage addressed to an entity nobody owns is silently dropped.
//! Runtime socket errors trigger a rebind with exponential backoff, up to
//! `listen_reopen_max` attempts.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;

use crate::config::{LISTEN_REOPEN_MAX, MAX_DATAGRAM_SIZE};
use crate::error::Result;
use crate::messages::{ReceivedMessage, ReceivedSubmessage, Submessage};
use crate::participant::{EventResource, SendResource};
use crate::rtps::{Endpoint, EndpointRole, ReaderState, WriterState};
use crate::types::{EntityId, GuidPrefix, Locator, ENTITYID_UNKNOWN};

const SOCKET_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Context shared by every listen resource of one participant.
pub struct DispatchContext {
    pub guid_prefix: GuidPrefix,
    pub sender: Arc<SendResource>,
    pub events: Arc<EventResource>,
}

/// One bound socket serving a set of local endpoints.
pub struct ListenResource {
    port: u16,
    multicast: bool,
    endpoints: Arc<Mutex<Vec<Weak<Endpoint>>>>,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ListenResource {
    /// Bind the socket for `locator` and start the receive thread.
    pub fn start(locator: &Locator, ctx: Arc<DispatchContext>) -> Result<Arc<Self>> {
        let multicast = locator.is_multicast();
        let port = locator.port as u16;
        let socket = if multicast {
            crate::transport::bind_multicast_socket(port)?
        } else {
            crate::transport::bind_unicast_socket(port)?
        };
        socket.set_nonblocking(true).map_err(crate::error::Error::IoError)?;

        let poll = Poll::new().map_err(crate::error::Error::IoError)?;
        let waker = Arc::new(
            Waker::new(poll.registry(), WAKER_TOKEN).map_err(crate::error::Error::IoError)?,
        );

        let endpoints: Arc<Mutex<Vec<Weak<Endpoint>>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let resource = Arc::new(Self {
            port,
            multicast,
            endpoints: endpoints.clone(),
            shutdown: shutdown.clone(),
            waker,
            handle: Mutex::new(None),
        });

        let thread = std::thread::Builder::new()
            .name(format!("rdds-listen-{}", port))
            .spawn(move || {
                receive_loop(socket, poll, port, multicast, &endpoints, &shutdown, &ctx);
            })
            .map_err(crate::error::Error::IoError)?;
        *resource.handle.lock() = Some(thread);

        log::debug!(
            "[ListenResource] listening on port {} (multicast={})",
            port,
            multicast
        );
        Ok(resource)
    }

    /// Whether this resource serves the given locator.
    pub fn is_listening_to(&self, locator: &Locator) -> bool {
        locator.port as u16 == self.port && locator.is_multicast() == self.multicast
    }

    pub fn add_endpoint(&self, endpoint: &Arc<Endpoint>) {
        let mut endpoints = self.endpoints.lock();
        let guid = endpoint.guid;
        if endpoints
            .iter()
            .filter_map(Weak::upgrade)
            .any(|e| e.guid == guid)
        {
            return;
        }
        endpoints.push(Arc::downgrade(endpoint));
    }

    pub fn remove_endpoint(&self, endpoint: &Arc<Endpoint>) {
        let guid = endpoint.guid;
        self.endpoints
            .lock()
            .retain(|w| w.upgrade().is_some_and(|e| e.guid != guid));
    }

    /// True while at least one live endpoint is associated.
    pub fn has_endpoints(&self) -> bool {
        self.endpoints
            .lock()
            .iter()
            .any(|w| w.upgrade().is_some())
    }

    /// Stop the receive thread and wait for it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ListenResource {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

// ============================================================================
// Receive thread
// ============================================================================

fn receive_loop(
    socket: UdpSocket,
    mut poll: Poll,
    port: u16,
    multicast: bool,
    endpoints: &Mutex<Vec<Weak<Endpoint>>>,
    shutdown: &AtomicBool,
    ctx: &DispatchContext,
) {
    let mut socket = socket;
    let mut mio_socket = match register(&mut poll, &socket) {
        Ok(s) => s,
        Err(e) => {
            log::error!("[ListenResource] port {} register failed: {}", port, e);
            return;
        }
    };
    let mut events = Events::with_capacity(16);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut reopen_attempts: u32 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = poll.poll(&mut events, Some(Duration::from_millis(500))) {
            if e.kind() == ErrorKind::Interrupted {
                continue;
            }
            log::error!("[ListenResource] port {} poll failed: {}", port, e);
            break;
        }

        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, _src)) => {
                    reopen_attempts = 0;
                    dispatch_datagram(&buf[..len], endpoints, ctx);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::debug!("[ListenResource] port {} recv error: {}", port, e);
                    reopen_attempts += 1;
                    if reopen_attempts > LISTEN_REOPEN_MAX {
                        log::error!(
                            "[ListenResource] port {} giving up after {} rebind attempts",
                            port,
                            LISTEN_REOPEN_MAX
                        );
                        return;
                    }
                    let backoff = Duration::from_millis(50u64 << reopen_attempts.min(6));
                    std::thread::sleep(backoff);
                    // Release the broken socket first so the port is free
                    // to rebind; park an ephemeral placeholder meanwhile.
                    if let Ok(placeholder) = UdpSocket::bind("0.0.0.0:0") {
                        let _ = placeholder.set_nonblocking(true);
                        socket = placeholder;
                    }
                    match rebind(&mut poll, &mut mio_socket, port, multicast) {
                        Ok(new_socket) => socket = new_socket,
                        Err(err) => {
                            log::debug!(
                                "[ListenResource] port {} rebind failed: {}",
                                port,
                                err
                            );
                        }
                    }
                    break;
                }
            }
        }
    }
}

fn register(poll: &mut Poll, socket: &UdpSocket) -> std::io::Result<mio::net::UdpSocket> {
    let mut mio_socket = mio::net::UdpSocket::from_std(socket.try_clone()?);
    poll.registry()
        .register(&mut mio_socket, SOCKET_TOKEN, Interest::READABLE)?;
    Ok(mio_socket)
}

fn rebind(
    poll: &mut Poll,
    mio_socket: &mut mio::net::UdpSocket,
    port: u16,
    multicast: bool,
) -> Result<UdpSocket> {
    let _ = poll.registry().deregister(mio_socket);
    let socket = if multicast {
        crate::transport::bind_multicast_socket(port)?
    } else {
        crate::transport::bind_unicast_socket(port)?
    };
    socket.set_nonblocking(true).map_err(crate::error::Error::IoError)?;
    *mio_socket = register(poll, &socket).map_err(crate::error::Error::IoError)?;
    log::debug!("[ListenResource] port {} rebound after error", port);
    Ok(socket)
}

// ============================================================================
// Dispatch
// ============================================================================

fn dispatch_datagram(datagram: &[u8], endpoints: &Mutex<Vec<Weak<Endpoint>>>, ctx: &DispatchContext) {
    let Some(message) = ReceivedMessage::parse(datagram) else {
        return;
    };
    // Our own multicast loopback comes back to us; nothing here wants it.
    if message.source_guid_prefix == ctx.guid_prefix {
        return;
    }

    // Snapshot the live endpoints once per datagram.
    let live: Vec<Arc<Endpoint>> = endpoints
        .lock()
        .iter()
        .filter_map(Weak::upgrade)
        .collect();
    if live.is_empty() {
        return;
    }

    for rx in &message.submessages {
        if let Some(dst) = rx.dst_prefix {
            if dst != ctx.guid_prefix {
                continue;
            }
        }
        dispatch_submessage(message.source_guid_prefix, rx, &live, ctx);
    }
}

fn dispatch_submessage(
    source_prefix: GuidPrefix,
    rx: &ReceivedSubmessage,
    endpoints: &[Arc<Endpoint>],
    ctx: &DispatchContext,
) {
    match &rx.submessage {
        Submessage::Data(data) => {
            for endpoint in readers_for(endpoints, data.reader_id) {
                let mut role = endpoint.role.lock();
                if let EndpointRole::Reader(reader) = &mut *role {
                    match reader {
                        ReaderState::Stateless(r) => {
                            r.on_data(source_prefix, data, rx.timestamp_ns);
                        }
                        ReaderState::Stateful(r) => {
                            r.on_data(source_prefix, data, rx.timestamp_ns);
                        }
                    }
                }
            }
        }
        Submessage::DataFrag(frag) => {
            for endpoint in readers_for(endpoints, frag.reader_id) {
                let mut role = endpoint.role.lock();
                if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
                    r.on_datafrag(source_prefix, frag, rx.timestamp_ns);
                }
            }
        }
        Submessage::Heartbeat(hb) => {
            for endpoint in readers_for(endpoints, hb.reader_id) {
                let must_respond = {
                    let mut role = endpoint.role.lock();
                    match &mut *role {
                        EndpointRole::Reader(ReaderState::Stateful(r)) => {
                            r.on_heartbeat(source_prefix, hb)
                        }
                        _ => false,
                    }
                };
                if must_respond {
                    schedule_acknack(&endpoint, ctx);
                }
            }
        }
        Submessage::HeartbeatFrag(hbf) => {
            for endpoint in readers_for(endpoints, hbf.reader_id) {
                let mut role = endpoint.role.lock();
                if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
                    r.on_heartbeat_frag(source_prefix, hbf, ctx.sender.as_ref());
                }
            }
        }
        Submessage::Gap(gap) => {
            for endpoint in readers_for(endpoints, gap.reader_id) {
                let mut role = endpoint.role.lock();
                if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
                    r.on_gap(source_prefix, gap);
                }
            }
        }
        Submessage::AckNack(acknack) => {
            for endpoint in writers_for(endpoints, acknack.writer_id) {
                let respond = {
                    let mut role = endpoint.role.lock();
                    match &mut *role {
                        EndpointRole::Writer(WriterState::Stateful(w)) => {
                            w.on_acknack(source_prefix, acknack, ctx.sender.as_ref())
                        }
                        _ => false,
                    }
                };
                if respond {
                    schedule_retransmit(&endpoint, ctx);
                }
            }
        }
        Submessage::NackFrag(nackfrag) => {
            for endpoint in writers_for(endpoints, nackfrag.writer_id) {
                let mut role = endpoint.role.lock();
                if let EndpointRole::Writer(WriterState::Stateful(w)) = &mut *role {
                    w.on_nackfrag(source_prefix, nackfrag, ctx.sender.as_ref());
                }
            }
        }
    }
}

fn readers_for(endpoints: &[Arc<Endpoint>], reader_id: EntityId) -> Vec<Arc<Endpoint>> {
    endpoints
        .iter()
        .filter(|e| {
            e.is_reader() && (reader_id == ENTITYID_UNKNOWN || e.guid.entity_id == reader_id)
        })
        .cloned()
        .collect()
}

fn writers_for(endpoints: &[Arc<Endpoint>], writer_id: EntityId) -> Vec<Arc<Endpoint>> {
    endpoints
        .iter()
        .filter(|e| {
            e.is_writer() && (writer_id == ENTITYID_UNKNOWN || e.guid.entity_id == writer_id)
        })
        .cloned()
        .collect()
}

/// Arm the heartbeat response delay for a stateful reader.
fn schedule_acknack(endpoint: &Arc<Endpoint>, ctx: &DispatchContext) {
    let delay = {
        let role = endpoint.role.lock();
        match &*role {
            EndpointRole::Reader(ReaderState::Stateful(r)) => r.heartbeat_response_delay(),
            _ => return,
        }
    };
    let weak = Arc::downgrade(endpoint);
    let sender = ctx.sender.clone();
    ctx.events.schedule_once(delay, move || {
        if let Some(endpoint) = weak.upgrade() {
            let mut role = endpoint.role.lock();
            if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
                r.send_acknack(sender.as_ref());
            }
        }
    });
}

/// Arm the nack response delay for a stateful writer.
fn schedule_retransmit(endpoint: &Arc<Endpoint>, ctx: &DispatchContext) {
    let delay = {
        let role = endpoint.role.lock();
        match &*role {
            EndpointRole::Writer(WriterState::Stateful(w)) => w.nack_response_delay(),
            _ => return,
        }
    };
    let weak = Arc::downgrade(endpoint);
    let sender = ctx.sender.clone();
    ctx.events.schedule_once(delay, move || {
        if let Some(endpoint) = weak.upgrade() {
            let mut role = endpoint.role.lock();
            if let EndpointRole::Writer(WriterState::Stateful(w)) = &mut *role {
                w.perform_send(sender.as_ref());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DataSubmessage, MessageBuilder};
    use crate::qos::QosProfile;
    use crate::rtps::{StatelessReader, WriterProxy};
    use crate::types::Guid;
    use std::net::Ipv4Addr;

    fn test_ctx(prefix: GuidPrefix) -> Arc<DispatchContext> {
        Arc::new(DispatchContext {
            guid_prefix: prefix,
            sender: Arc::new(SendResource::new().expect("send resource")),
            events: Arc::new(EventResource::new()),
        })
    }

    fn stateless_reader_endpoint(prefix: GuidPrefix, entity: EntityId) -> Arc<Endpoint> {
        let guid = Guid::new(prefix, entity);
        Arc::new(Endpoint::new(
            guid,
            Default::default(),
            false,
            EndpointRole::Reader(ReaderState::Stateless(StatelessReader::new(
                guid,
                QosProfile::best_effort(),
            ))),
        ))
    }

    #[test]
    fn test_unicast_listen_and_dispatch() {
        let local_prefix = [1u8; 12];
        let remote_prefix = [2u8; 12];
        let ctx = test_ctx(local_prefix);

        let locator = Locator::udpv4(Ipv4Addr::LOCALHOST, 17520);
        let resource = ListenResource::start(&locator, ctx).expect("starts");

        let reader = stateless_reader_endpoint(local_prefix, [0, 0, 1, 0x07]);
        resource.add_endpoint(&reader);

        // Send a DATA datagram to the bound port.
        let mut builder = MessageBuilder::new(remote_prefix);
        builder.data(&DataSubmessage::new(
            [0, 0, 1, 0x07],
            [0, 0, 1, 0x02],
            1,
            vec![0, 1, 0, 0, 7],
        ));
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket
            .send_to(&builder.take(), ("127.0.0.1", 17520))
            .expect("send");

        // Wait for the listen thread to deliver.
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            {
                let role = reader.role.lock();
                if let EndpointRole::Reader(ReaderState::Stateless(r)) = &*role {
                    if r.history().len() == 1 {
                        break;
                    }
                }
            }
            assert!(std::time::Instant::now() < deadline, "datagram not delivered");
            std::thread::sleep(Duration::from_millis(10));
        }

        resource.stop();
    }

    #[test]
    fn test_unknown_entity_silently_dropped() {
        let local_prefix = [1u8; 12];
        let ctx = test_ctx(local_prefix);
        let locator = Locator::udpv4(Ipv4Addr::LOCALHOST, 17522);
        let resource = ListenResource::start(&locator, ctx).expect("starts");

        let reader = stateless_reader_endpoint(local_prefix, [0, 0, 1, 0x07]);
        resource.add_endpoint(&reader);

        // DATA addressed to an entity nobody owns.
        let mut builder = MessageBuilder::new([2u8; 12]);
        builder.data(&DataSubmessage::new(
            [0, 0, 9, 0x07],
            [0, 0, 1, 0x02],
            1,
            vec![0, 1, 0, 0],
        ));
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket
            .send_to(&builder.take(), ("127.0.0.1", 17522))
            .expect("send");

        std::thread::sleep(Duration::from_millis(200));
        {
            let role = reader.role.lock();
            if let EndpointRole::Reader(ReaderState::Stateless(r)) = &*role {
                assert_eq!(r.history().len(), 0);
            }
        }
        resource.stop();
    }

    #[test]
    fn test_own_prefix_filtered() {
        let local_prefix = [1u8; 12];
        let ctx = test_ctx(local_prefix);
        let locator = Locator::udpv4(Ipv4Addr::LOCALHOST, 17524);
        let resource = ListenResource::start(&locator, ctx).expect("starts");

        let reader = stateless_reader_endpoint(local_prefix, [0, 0, 1, 0x07]);
        resource.add_endpoint(&reader);

        // A datagram carrying our own prefix must be ignored.
        let mut builder = MessageBuilder::new(local_prefix);
        builder.data(&DataSubmessage::new(
            [0, 0, 1, 0x07],
            [0, 0, 1, 0x02],
            1,
            vec![0, 1, 0, 0],
        ));
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket
            .send_to(&builder.take(), ("127.0.0.1", 17524))
            .expect("send");

        std::thread::sleep(Duration::from_millis(200));
        {
            let role = reader.role.lock();
            if let EndpointRole::Reader(ReaderState::Stateless(r)) = &*role {
                assert_eq!(r.history().len(), 0);
            }
        }
        resource.stop();
    }

    #[test]
    fn test_endpoint_association_lifecycle() {
        let ctx = test_ctx([1u8; 12]);
        let locator = Locator::udpv4(Ipv4Addr::LOCALHOST, 17526);
        let resource = ListenResource::start(&locator, ctx).expect("starts");
        assert!(!resource.has_endpoints());

        let reader = stateless_reader_endpoint([1u8; 12], [0, 0, 1, 0x07]);
        resource.add_endpoint(&reader);
        resource.add_endpoint(&reader); // duplicate ignored
        assert!(resource.has_endpoints());

        resource.remove_endpoint(&reader);
        assert!(!resource.has_endpoints());

        // INFO_DST narrowing is exercised in the stateful tests; here just
        // verify a stateful reader proxy can be associated too.
        let guid = Guid::new([1u8; 12], [0, 0, 2, 0x07]);
        let mut stateful = crate::rtps::StatefulReader::new(guid, QosProfile::reliable());
        stateful.matched_writer_add(WriterProxy::new(
            Guid::new([9u8; 12], [0, 0, 1, 0x02]),
            Vec::new(),
            Vec::new(),
        ));
        let endpoint = Arc::new(Endpoint::new(
            guid,
            Default::default(),
            false,
            EndpointRole::Reader(ReaderState::Stateful(stateful)),
        ));
        resource.add_endpoint(&endpoint);
        assert!(resource.has_endpoints());

        resource.stop();
    }
}
