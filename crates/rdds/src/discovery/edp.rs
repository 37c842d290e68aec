// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! SEDP: Simple Endpoint Discovery Protocol.
//!
//! Two reliable, transient-local writer/reader pairs exchange
//! `WriterProxyData` / `ReaderProxyData` for every user endpoint. Matching
//! requires equal topic and type names plus the request-vs-offered QoS
//! matrix (reliability and durability of the reader at or below the writer,
//! deadline at or above, ownership equal).
//!
//! With static discovery (`use_static`), nothing is published on the wire;
//! remote endpoints are registered by `user_defined_id` instead and
//! activated through
//! [`Edp::new_remote_endpoint_discovered`].

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::ChangeKind;
use crate::discovery::data::{ParticipantProxyData, ReaderProxyData, WriterProxyData};
use crate::participant::SendResource;
use crate::rtps::{
    Endpoint, EndpointRole, ReaderProxy, ReaderState, StatefulReader, StatefulWriter, WriterProxy,
    WriterState,
};
use crate::types::{
    Guid, GuidPrefix, Locator, ENTITYID_SEDP_PUB_READER, ENTITYID_SEDP_PUB_WRITER,
    ENTITYID_SEDP_SUB_READER, ENTITYID_SEDP_SUB_WRITER,
};

use super::data::{
    BUILTIN_PUBLICATIONS_ANNOUNCER, BUILTIN_PUBLICATIONS_DETECTOR,
    BUILTIN_SUBSCRIPTIONS_ANNOUNCER, BUILTIN_SUBSCRIPTIONS_DETECTOR,
};

/// A statically declared remote endpoint (static EDP mode).
#[derive(Debug, Clone)]
pub struct StaticEndpointInfo {
    pub user_defined_id: i16,
    pub is_writer: bool,
    pub writer_data: Option<WriterProxyData>,
    pub reader_data: Option<ReaderProxyData>,
}

/// Endpoint discovery state shared across threads.
pub struct Edp {
    use_static: bool,
    pub_writer: Arc<Endpoint>,
    pub_reader: Arc<Endpoint>,
    sub_writer: Arc<Endpoint>,
    sub_reader: Arc<Endpoint>,
    local_writers: DashMap<Guid, (Arc<Endpoint>, WriterProxyData)>,
    local_readers: DashMap<Guid, (Arc<Endpoint>, ReaderProxyData)>,
    remote_writers: DashMap<Guid, WriterProxyData>,
    remote_readers: DashMap<Guid, ReaderProxyData>,
    /// Fallback locators per remote participant (from SPDP).
    remote_default_locators: DashMap<GuidPrefix, Vec<Locator>>,
    /// Statically declared remote endpoints, keyed by user id.
    static_remotes: DashMap<i16, StaticEndpointInfo>,
    sender: Arc<SendResource>,
}

impl Edp {
    pub fn new(
        use_static: bool,
        pub_writer: Arc<Endpoint>,
        pub_reader: Arc<Endpoint>,
        sub_writer: Arc<Endpoint>,
        sub_reader: Arc<Endpoint>,
        sender: Arc<SendResource>,
    ) -> Self {
        Self {
            use_static,
            pub_writer,
            pub_reader,
            sub_writer,
            sub_reader,
            local_writers: DashMap::new(),
            local_readers: DashMap::new(),
            remote_writers: DashMap::new(),
            remote_readers: DashMap::new(),
            remote_default_locators: DashMap::new(),
            static_remotes: DashMap::new(),
            sender,
        }
    }

    pub fn use_static(&self) -> bool {
        self.use_static
    }

    // ========================================================================
    // Local endpoint lifecycle
    // ========================================================================

    /// A user writer was created: advertise it and match what we already
    /// know.
    pub fn local_writer_added(&self, endpoint: Arc<Endpoint>, data: WriterProxyData) {
        if !self.use_static {
            self.publish(&self.pub_writer, ChangeKind::Alive, data.guid, data.encode());
        }
        self.local_writers
            .insert(data.guid, (endpoint.clone(), data.clone()));

        for remote in self.remote_readers.iter() {
            if endpoints_match(&data, remote.value()) {
                self.match_writer_to_reader(&endpoint, remote.value());
            }
        }
    }

    /// A user reader was created: advertise it and match known writers.
    pub fn local_reader_added(&self, endpoint: Arc<Endpoint>, data: ReaderProxyData) {
        if !self.use_static {
            self.publish(&self.sub_writer, ChangeKind::Alive, data.guid, data.encode());
        }
        self.local_readers
            .insert(data.guid, (endpoint.clone(), data.clone()));

        for remote in self.remote_writers.iter() {
            if endpoints_match(remote.value(), &data) {
                self.match_reader_to_writer(&endpoint, remote.value());
            }
        }
    }

    /// A user writer is going away: withdraw its advertisement.
    pub fn local_writer_removed(&self, guid: Guid) {
        if self.local_writers.remove(&guid).is_some() && !self.use_static {
            self.publish(
                &self.pub_writer,
                ChangeKind::NotAliveDisposed,
                guid,
                Vec::new(),
            );
        }
    }

    /// A user reader is going away: withdraw its advertisement.
    pub fn local_reader_removed(&self, guid: Guid) {
        if self.local_readers.remove(&guid).is_some() && !self.use_static {
            self.publish(
                &self.sub_writer,
                ChangeKind::NotAliveDisposed,
                guid,
                Vec::new(),
            );
        }
    }

    // ========================================================================
    // Remote endpoint handling (wire SEDP)
    // ========================================================================

    /// SEDP publications sample: a remote writer exists.
    pub fn on_remote_writer(&self, data: WriterProxyData) {
        log::debug!(
            "[Edp] discovered writer {} topic={} type={}",
            data.guid,
            data.topic_name,
            data.type_name
        );
        self.remote_writers.insert(data.guid, data.clone());

        for local in self.local_readers.iter() {
            let (endpoint, reader_data) = local.value();
            if endpoints_match(&data, reader_data) {
                self.match_reader_to_writer(endpoint, &data);
            }
        }
    }

    /// SEDP subscriptions sample: a remote reader exists.
    pub fn on_remote_reader(&self, data: ReaderProxyData) {
        log::debug!(
            "[Edp] discovered reader {} topic={} type={}",
            data.guid,
            data.topic_name,
            data.type_name
        );
        self.remote_readers.insert(data.guid, data.clone());

        for local in self.local_writers.iter() {
            let (endpoint, writer_data) = local.value();
            if endpoints_match(writer_data, &data) {
                self.match_writer_to_reader(endpoint, &data);
            }
        }
    }

    /// SEDP disposal: a remote endpoint was deleted.
    pub fn on_remote_endpoint_disposed(&self, guid: Guid, is_writer: bool) {
        if is_writer {
            if self.remote_writers.remove(&guid).is_some() {
                for local in self.local_readers.iter() {
                    let (endpoint, _) = local.value();
                    with_stateful_reader(endpoint, |r| {
                        r.matched_writer_remove(&guid);
                    });
                }
            }
        } else if self.remote_readers.remove(&guid).is_some() {
            for local in self.local_writers.iter() {
                let (endpoint, _) = local.value();
                with_stateful_writer(endpoint, |w| {
                    w.matched_reader_remove(&guid);
                });
            }
        }
    }

    // ========================================================================
    // Participant lifecycle (driven by PDP)
    // ========================================================================

    /// A new participant appeared: wire up the builtin SEDP endpoint pairs
    /// according to its advertised builtin endpoint set. The transient-local
    /// SEDP writers then replay every local endpoint advertisement.
    pub fn participant_discovered(&self, data: &ParticipantProxyData) {
        self.remote_default_locators
            .insert(data.guid.prefix, data.default_unicast_locators.clone());

        let meta_unicast = data.metatraffic_unicast_locators.clone();
        let meta_multicast = data.metatraffic_multicast_locators.clone();
        let prefix = data.guid.prefix;
        let bits = data.builtin_endpoints;

        if bits & BUILTIN_PUBLICATIONS_DETECTOR != 0 {
            let proxy = ReaderProxy::new(
                Guid::new(prefix, ENTITYID_SEDP_PUB_READER),
                true,
                meta_unicast.clone(),
                meta_multicast.clone(),
            );
            with_stateful_writer(&self.pub_writer, |w| {
                w.matched_reader_add(proxy);
                w.perform_send(self.sender.as_ref());
            });
        }
        if bits & BUILTIN_PUBLICATIONS_ANNOUNCER != 0 {
            let proxy = WriterProxy::new(
                Guid::new(prefix, ENTITYID_SEDP_PUB_WRITER),
                meta_unicast.clone(),
                meta_multicast.clone(),
            );
            with_stateful_reader(&self.pub_reader, |r| r.matched_writer_add(proxy));
        }
        if bits & BUILTIN_SUBSCRIPTIONS_DETECTOR != 0 {
            let proxy = ReaderProxy::new(
                Guid::new(prefix, ENTITYID_SEDP_SUB_READER),
                true,
                meta_unicast.clone(),
                meta_multicast.clone(),
            );
            with_stateful_writer(&self.sub_writer, |w| {
                w.matched_reader_add(proxy);
                w.perform_send(self.sender.as_ref());
            });
        }
        if bits & BUILTIN_SUBSCRIPTIONS_ANNOUNCER != 0 {
            let proxy = WriterProxy::new(
                Guid::new(prefix, ENTITYID_SEDP_SUB_WRITER),
                meta_unicast,
                meta_multicast,
            );
            with_stateful_reader(&self.sub_reader, |r| r.matched_writer_add(proxy));
        }
    }

    /// A participant's lease expired: drop its SEDP proxies, its endpoints
    /// and every match that depended on them.
    pub fn participant_removed(&self, prefix: GuidPrefix) {
        self.remote_default_locators.remove(&prefix);

        with_stateful_writer(&self.pub_writer, |w| {
            w.matched_reader_remove(&Guid::new(prefix, ENTITYID_SEDP_PUB_READER));
        });
        with_stateful_writer(&self.sub_writer, |w| {
            w.matched_reader_remove(&Guid::new(prefix, ENTITYID_SEDP_SUB_READER));
        });
        with_stateful_reader(&self.pub_reader, |r| {
            r.matched_writer_remove(&Guid::new(prefix, ENTITYID_SEDP_PUB_WRITER));
        });
        with_stateful_reader(&self.sub_reader, |r| {
            r.matched_writer_remove(&Guid::new(prefix, ENTITYID_SEDP_SUB_WRITER));
        });

        let gone_writers: Vec<Guid> = self
            .remote_writers
            .iter()
            .filter(|e| e.key().prefix == prefix)
            .map(|e| *e.key())
            .collect();
        for guid in gone_writers {
            self.on_remote_endpoint_disposed(guid, true);
        }

        let gone_readers: Vec<Guid> = self
            .remote_readers
            .iter()
            .filter(|e| e.key().prefix == prefix)
            .map(|e| *e.key())
            .collect();
        for guid in gone_readers {
            self.on_remote_endpoint_disposed(guid, false);
        }
    }

    // ========================================================================
    // Static EDP
    // ========================================================================

    /// Declare a remote endpoint for static discovery.
    pub fn register_static_remote(&self, info: StaticEndpointInfo) {
        self.static_remotes.insert(info.user_defined_id, info);
    }

    /// Activate a statically declared remote endpoint for a participant.
    ///
    /// Returns false when static discovery is off or the id is unknown.
    pub fn new_remote_endpoint_discovered(
        &self,
        participant_prefix: GuidPrefix,
        user_defined_id: i16,
        is_writer: bool,
    ) -> bool {
        if !self.use_static {
            log::debug!("[Edp] static endpoint activation without static discovery");
            return false;
        }
        let Some(info) = self.static_remotes.get(&user_defined_id) else {
            return false;
        };
        if info.is_writer != is_writer {
            return false;
        }

        if is_writer {
            if let Some(mut data) = info.writer_data.clone() {
                data.guid.prefix = participant_prefix;
                self.on_remote_writer(data);
                return true;
            }
        } else if let Some(mut data) = info.reader_data.clone() {
            data.guid.prefix = participant_prefix;
            self.on_remote_reader(data);
            return true;
        }
        false
    }

    // ========================================================================
    // Matching
    // ========================================================================

    fn match_writer_to_reader(&self, writer_endpoint: &Arc<Endpoint>, reader: &ReaderProxyData) {
        let locators = self.resolve_locators(&reader.guid.prefix, &reader.unicast_locators);
        let reliable = reader.qos.reliability == crate::qos::Reliability::Reliable;

        let mut role = writer_endpoint.role.lock();
        match &mut *role {
            EndpointRole::Writer(WriterState::Stateful(w)) => {
                if !w.is_matched_to(&reader.guid) {
                    w.matched_reader_add(ReaderProxy::new(
                        reader.guid,
                        reliable,
                        locators,
                        reader.multicast_locators.clone(),
                    ));
                    w.perform_send(self.sender.as_ref());
                }
            }
            EndpointRole::Writer(WriterState::Stateless(w)) => {
                for locator in locators.iter().chain(reader.multicast_locators.iter()) {
                    w.reader_locator_add(*locator);
                }
            }
            EndpointRole::Reader(_) => {}
        }
    }

    fn match_reader_to_writer(&self, reader_endpoint: &Arc<Endpoint>, writer: &WriterProxyData) {
        let locators = self.resolve_locators(&writer.guid.prefix, &writer.unicast_locators);

        let mut role = reader_endpoint.role.lock();
        if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
            if !r.is_matched_to(&writer.guid) {
                r.matched_writer_add(WriterProxy::new(
                    writer.guid,
                    locators,
                    writer.multicast_locators.clone(),
                ));
            }
        }
        // Stateless readers accept matching writers without proxy state.
    }

    /// Endpoint locators, falling back to the participant defaults learned
    /// from SPDP.
    fn resolve_locators(&self, prefix: &GuidPrefix, endpoint_locators: &[Locator]) -> Vec<Locator> {
        if !endpoint_locators.is_empty() {
            return endpoint_locators.to_vec();
        }
        self.remote_default_locators
            .get(prefix)
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    fn publish(&self, via: &Arc<Endpoint>, kind: ChangeKind, guid: Guid, payload: Vec<u8>) {
        let key: [u8; 16] = guid.as_bytes();
        with_stateful_writer(via, |w| {
            if let Err(e) = w.new_change(kind, key, payload) {
                log::debug!("[Edp] discovery publish failed: {}", e);
            }
            w.perform_send(self.sender.as_ref());
        });
    }
}

fn endpoints_match(writer: &WriterProxyData, reader: &ReaderProxyData) -> bool {
    writer.topic_name == reader.topic_name
        && writer.type_name == reader.type_name
        && writer.qos.is_compatible(&reader.qos)
}

fn with_stateful_writer<R>(endpoint: &Endpoint, f: impl FnOnce(&mut StatefulWriter) -> R) -> Option<R> {
    let mut role = endpoint.role.lock();
    match &mut *role {
        EndpointRole::Writer(WriterState::Stateful(w)) => Some(f(w)),
        _ => None,
    }
}

fn with_stateful_reader<R>(endpoint: &Endpoint, f: impl FnOnce(&mut StatefulReader) -> R) -> Option<R> {
    let mut role = endpoint.role.lock();
    match &mut *role {
        EndpointRole::Reader(ReaderState::Stateful(r)) => Some(f(r)),
        _ => None,
    }
}
