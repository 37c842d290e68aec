// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Built-in discovery: SPDP participant discovery, SEDP endpoint discovery
//! and the discovery-server ack-status database.
//!
//! Discovery reuses the regular RTPS machinery: SPDP is a best-effort
//! stateless writer/reader pair on well-known entity ids and the well-known
//! multicast locator; SEDP is two reliable, transient-local stateful pairs.
//! Special listeners feed what those readers deliver into the participant
//! table and the endpoint matcher.

pub mod data;
pub mod database;
pub mod edp;
pub mod pdp;

pub use data::{ParticipantProxyData, ReaderProxyData, WriterProxyData};
pub use database::{DiscoveryDatabase, ParticipantsAckStatus};
pub use edp::{Edp, StaticEndpointInfo};
pub use pdp::{ParticipantListener, Pdp, SedpListener, SpdpListener};

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ParticipantAttributes, MULTICAST_GROUP};
use crate::error::Result;
use crate::participant::{EventId, EventOutcome, EventResource, ListenResource, SendResource};
use crate::qos::{Durability, History, QosProfile, ResourceLimits};
use crate::rtps::{
    Endpoint, EndpointAttributes, EndpointRole, ReaderState, StatefulReader, StatefulWriter,
    StatelessReader, StatelessWriter, TopicKind, WriterState,
};
use crate::transport::PortMapping;
use crate::types::{
    trusted_writer, Guid, GuidPrefix, Locator, ENTITYID_PARTICIPANT, ENTITYID_SEDP_PUB_READER,
    ENTITYID_SEDP_PUB_WRITER, ENTITYID_SEDP_SUB_READER, ENTITYID_SEDP_SUB_WRITER,
    ENTITYID_SPDP_READER, ENTITYID_SPDP_WRITER,
};

/// Lease sweep cadence.
const LEASE_SWEEP_PERIOD: Duration = Duration::from_millis(500);

/// Inputs the builtin protocols need from the participant.
pub struct BuiltinConfig {
    pub guid_prefix: GuidPrefix,
    pub attributes: ParticipantAttributes,
    pub ports: PortMapping,
    pub metatraffic_unicast_locators: Vec<Locator>,
    pub default_unicast_locators: Vec<Locator>,
}

/// The wired-up discovery stack of one participant.
pub struct BuiltinProtocols {
    pub pdp: Arc<Pdp>,
    pub edp: Arc<Edp>,
    endpoints: Vec<Arc<Endpoint>>,
    events: Arc<EventResource>,
    announce_event: parking_lot::Mutex<Option<EventId>>,
    lease_event: EventId,
    announcement_period: Duration,
}

impl BuiltinProtocols {
    /// Create the six builtin endpoints, wire the listeners, attach the
    /// endpoints to the metatraffic listen resources and start the
    /// announcement and lease timers.
    pub fn start(
        config: BuiltinConfig,
        sender: Arc<SendResource>,
        events: Arc<EventResource>,
        metatraffic_resources: &[Arc<ListenResource>],
    ) -> Result<Self> {
        let prefix = config.guid_prefix;
        let spdp_multicast = spdp_multicast_locator(&config.ports);

        // --- SPDP pair (best-effort, stateless) ---
        let spdp_writer_guid = Guid::new(prefix, ENTITYID_SPDP_WRITER);
        let mut spdp_writer_state = StatelessWriter::new(spdp_writer_guid, spdp_qos());
        spdp_writer_state.reader_locator_add(spdp_multicast);
        let spdp_writer = Arc::new(Endpoint::new(
            spdp_writer_guid,
            builtin_attributes("DCPSParticipant", &config, true),
            true,
            EndpointRole::Writer(WriterState::Stateless(spdp_writer_state)),
        ));

        let spdp_reader_guid = Guid::new(prefix, ENTITYID_SPDP_READER);
        let mut spdp_reader_state = StatelessReader::new(spdp_reader_guid, spdp_qos());
        spdp_reader_state.set_trusted_writer(trusted_writer(ENTITYID_SPDP_READER));
        let spdp_reader = Arc::new(Endpoint::new(
            spdp_reader_guid,
            builtin_attributes("DCPSParticipant", &config, true),
            true,
            EndpointRole::Reader(ReaderState::Stateless(spdp_reader_state)),
        ));

        // --- SEDP pairs (reliable, transient-local, stateful) ---
        let pub_writer = sedp_writer_endpoint(prefix, ENTITYID_SEDP_PUB_WRITER, "DCPSPublications", &config);
        let pub_reader = sedp_reader_endpoint(prefix, ENTITYID_SEDP_PUB_READER, "DCPSPublications", &config);
        let sub_writer = sedp_writer_endpoint(prefix, ENTITYID_SEDP_SUB_WRITER, "DCPSSubscriptions", &config);
        let sub_reader = sedp_reader_endpoint(prefix, ENTITYID_SEDP_SUB_READER, "DCPSSubscriptions", &config);

        let edp = Arc::new(Edp::new(
            config.attributes.use_static_edp,
            pub_writer.clone(),
            pub_reader.clone(),
            sub_writer.clone(),
            sub_reader.clone(),
            sender.clone(),
        ));

        let local_data = ParticipantProxyData {
            guid: Guid::new(prefix, ENTITYID_PARTICIPANT),
            protocol_version: crate::config::PROTOCOL_VERSION,
            vendor_id: crate::config::VENDOR_ID,
            domain_id: config.attributes.domain_id,
            expects_inline_qos: false,
            builtin_endpoints: data::BUILTIN_ENDPOINT_SET_DEFAULT,
            metatraffic_unicast_locators: config.metatraffic_unicast_locators.clone(),
            metatraffic_multicast_locators: vec![spdp_multicast],
            default_unicast_locators: config.default_unicast_locators.clone(),
            default_multicast_locators: Vec::new(),
            lease_duration: config.attributes.lease_duration,
        };
        let pdp = Arc::new(Pdp::new(
            local_data,
            spdp_writer.clone(),
            edp.clone(),
            sender.clone(),
        ));

        // Wire the discovery listeners now that the shared state exists.
        {
            let mut role = spdp_reader.role.lock();
            if let EndpointRole::Reader(ReaderState::Stateless(r)) = &mut *role {
                r.set_listener(Arc::new(SpdpListener::new(Arc::downgrade(&pdp))));
            }
        }
        {
            let mut role = pub_reader.role.lock();
            if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
                r.set_listener(Arc::new(SedpListener::publications(Arc::downgrade(&edp))));
            }
        }
        {
            let mut role = sub_reader.role.lock();
            if let EndpointRole::Reader(ReaderState::Stateful(r)) = &mut *role {
                r.set_listener(Arc::new(SedpListener::subscriptions(Arc::downgrade(&edp))));
            }
        }

        let endpoints = vec![
            spdp_writer,
            spdp_reader,
            pub_writer.clone(),
            pub_reader,
            sub_writer.clone(),
            sub_reader,
        ];
        for resource in metatraffic_resources {
            for endpoint in &endpoints {
                resource.add_endpoint(endpoint);
            }
        }

        // Reliability heartbeats for the SEDP writers.
        crate::participant::schedule_writer_heartbeat(&pub_writer, &events, &sender);
        crate::participant::schedule_writer_heartbeat(&sub_writer, &events, &sender);

        // Announcement period: first announce immediately, then periodic.
        pdp.announce();
        let announcement_period = config.attributes.announcement_period;
        let announce_event =
            Self::arm_announcement(&events, &pdp, announcement_period);

        let lease_pdp = Arc::downgrade(&pdp);
        let lease_event = events.schedule_periodic(LEASE_SWEEP_PERIOD, move || {
            match lease_pdp.upgrade() {
                Some(pdp) => {
                    pdp.check_leases();
                    EventOutcome::Again
                }
                None => EventOutcome::Done,
            }
        });

        Ok(Self {
            pdp,
            edp,
            endpoints,
            events,
            announce_event: parking_lot::Mutex::new(Some(announce_event)),
            lease_event,
            announcement_period,
        })
    }

    fn arm_announcement(
        events: &EventResource,
        pdp: &Arc<Pdp>,
        period: Duration,
    ) -> EventId {
        let weak = Arc::downgrade(pdp);
        events.schedule_periodic(period, move || match weak.upgrade() {
            Some(pdp) => {
                pdp.announce();
                EventOutcome::Again
            }
            None => EventOutcome::Done,
        })
    }

    /// The builtin endpoints (for listen-resource accounting).
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Register a freshly created user writer with endpoint discovery.
    pub fn add_local_writer(&self, endpoint: &Arc<Endpoint>) {
        let data = WriterProxyData {
            guid: endpoint.guid,
            topic_name: endpoint.attributes.topic_name.clone(),
            type_name: endpoint.attributes.type_name.clone(),
            qos: endpoint.attributes.qos.clone(),
            unicast_locators: endpoint.attributes.unicast_locators.clone(),
            multicast_locators: endpoint.attributes.multicast_locators.clone(),
        };
        self.edp.local_writer_added(endpoint.clone(), data);
    }

    /// Register a freshly created user reader with endpoint discovery.
    pub fn add_local_reader(&self, endpoint: &Arc<Endpoint>) {
        let data = ReaderProxyData {
            guid: endpoint.guid,
            topic_name: endpoint.attributes.topic_name.clone(),
            type_name: endpoint.attributes.type_name.clone(),
            qos: endpoint.attributes.qos.clone(),
            expects_inline_qos: false,
            unicast_locators: endpoint.attributes.unicast_locators.clone(),
            multicast_locators: endpoint.attributes.multicast_locators.clone(),
        };
        self.edp.local_reader_added(endpoint.clone(), data);
    }

    /// Withdraw a user endpoint's discovery advertisement.
    pub fn remove_local_endpoint(&self, endpoint: &Arc<Endpoint>) {
        if endpoint.is_writer() {
            self.edp.local_writer_removed(endpoint.guid);
        } else {
            self.edp.local_reader_removed(endpoint.guid);
        }
    }

    /// Send the participant announcement now.
    pub fn announce_participant_state(&self) {
        self.pdp.announce();
    }

    /// Pause periodic announcements.
    pub fn stop_participant_announcement(&self) {
        if let Some(id) = self.announce_event.lock().take() {
            self.events.cancel(id);
        }
    }

    /// Publish a fresh announcement and restart the periodic timer.
    pub fn reset_participant_announcement(&self) {
        self.stop_participant_announcement();
        self.pdp.reset_announcement();
        let id = Self::arm_announcement(&self.events, &self.pdp, self.announcement_period);
        *self.announce_event.lock() = Some(id);
    }

    /// Cancel all discovery timers.
    pub fn shutdown(&self) {
        self.stop_participant_announcement();
        self.events.cancel(self.lease_event);
    }
}

// ============================================================================
// Builtin endpoint construction
// ============================================================================

fn spdp_multicast_locator(ports: &PortMapping) -> Locator {
    let group: Ipv4Addr = MULTICAST_GROUP.parse().unwrap_or(Ipv4Addr::new(239, 255, 0, 1));
    Locator::udpv4(group, ports.metatraffic_multicast)
}

fn spdp_qos() -> QosProfile {
    QosProfile {
        history: History::KeepLast(1),
        ..QosProfile::best_effort()
    }
}

/// SEDP endpoints keep the latest advertisement per endpoint instance and
/// replay it to late-discovered participants.
fn sedp_qos() -> QosProfile {
    QosProfile {
        durability: Durability::TransientLocal,
        history: History::KeepLast(1),
        resource_limits: ResourceLimits {
            max_samples: 5000,
            max_instances: 5000,
            max_samples_per_instance: 1,
        },
        ..QosProfile::reliable()
    }
}

fn builtin_attributes(topic: &str, config: &BuiltinConfig, keyed: bool) -> EndpointAttributes {
    EndpointAttributes {
        topic_name: topic.into(),
        type_name: format!("{}ProxyData", topic),
        topic_kind: if keyed {
            TopicKind::WithKey
        } else {
            TopicKind::NoKey
        },
        qos: QosProfile::default(),
        unicast_locators: config.metatraffic_unicast_locators.clone(),
        multicast_locators: vec![spdp_multicast_locator(&config.ports)],
        user_defined_id: 0,
    }
}

fn sedp_writer_endpoint(
    prefix: GuidPrefix,
    entity: crate::types::EntityId,
    topic: &str,
    config: &BuiltinConfig,
) -> Arc<Endpoint> {
    let guid = Guid::new(prefix, entity);
    Arc::new(Endpoint::new(
        guid,
        builtin_attributes(topic, config, true),
        true,
        EndpointRole::Writer(WriterState::Stateful(StatefulWriter::new(guid, sedp_qos()))),
    ))
}

fn sedp_reader_endpoint(
    prefix: GuidPrefix,
    entity: crate::types::EntityId,
    topic: &str,
    config: &BuiltinConfig,
) -> Arc<Endpoint> {
    let guid = Guid::new(prefix, entity);
    let mut reader = StatefulReader::new(guid, sedp_qos());
    reader.set_trusted_writer(trusted_writer(entity));
    Arc::new(Endpoint::new(
        guid,
        builtin_attributes(topic, config, true),
        true,
        EndpointRole::Reader(ReaderState::Stateful(reader)),
    ))
}
