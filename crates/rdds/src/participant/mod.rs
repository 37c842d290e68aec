// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! The RTPS participant: endpoint factory, listen-resource management,
//! GUID allocation and the shared send/event resources.
//!
//! Ownership is strictly top-down: the participant owns `Arc<Endpoint>`s
//! and `Arc<ListenResource>`s; listen resources refer to endpoints through
//! `Weak`. Deleting an endpoint withdraws its discovery advertisement,
//! cancels its timers and detaches it from every listen resource before the
//! `Arc` drops; listen resources whose association set became empty are
//! stopped and garbage-collected.

pub mod event_resource;
pub mod listen_resource;
pub mod send_resource;

pub use event_resource::{EventId, EventOutcome, EventResource};
pub use listen_resource::{DispatchContext, ListenResource};
pub use send_resource::SendResource;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::ChangeKind;
use crate::config::{ParticipantAttributes, VENDOR_ID};
use crate::discovery::{BuiltinConfig, BuiltinProtocols, ParticipantListener};
use crate::error::{Error, Result};
use crate::rtps::{
    Endpoint, EndpointAttributes, EndpointRole, ReaderListener, ReaderState, StatefulReader,
    StatefulWriter, StatelessReader, StatelessWriter, TopicKind, WriterListener, WriterState,
};
use crate::transport::{default_unicast_locators, PortMapping};
use crate::types::{EntityId, Guid, GuidPrefix, InstanceHandle, Locator, SequenceNumber};

/// Entity kind octets for user endpoints (RTPS v2.3 Table 9.1).
const KIND_WRITER_WITH_KEY: u8 = 0x02;
const KIND_WRITER_NO_KEY: u8 = 0x03;
const KIND_READER_NO_KEY: u8 = 0x04;
const KIND_READER_WITH_KEY: u8 = 0x07;

/// One RTPS participant and everything it owns.
pub struct RtpsParticipant {
    guid_prefix: GuidPrefix,
    attributes: ParticipantAttributes,
    ports: PortMapping,
    endpoints: Mutex<Vec<Arc<Endpoint>>>,
    listen_resources: Mutex<Vec<Arc<ListenResource>>>,
    send_resource: Arc<SendResource>,
    events: Arc<EventResource>,
    dispatch_ctx: Arc<DispatchContext>,
    builtin: BuiltinProtocols,
    id_counter: AtomicU32,
    heartbeat_events: Mutex<HashMap<Guid, EventId>>,
    default_unicast: Vec<Locator>,
    default_multicast: Vec<Locator>,
}

impl RtpsParticipant {
    /// Create a participant: bind the metatraffic sockets, start the event
    /// thread and bring up builtin discovery. A bind failure on a
    /// configured locator is fatal.
    pub fn new(mut attributes: ParticipantAttributes) -> Result<Arc<Self>> {
        let (ports, participant_id) = if attributes.participant_id == 0 {
            PortMapping::auto_assign(attributes.domain_id)?
        } else {
            (
                PortMapping::calculate(attributes.domain_id, attributes.participant_id)?,
                attributes.participant_id,
            )
        };
        attributes.participant_id = participant_id;

        let guid_prefix = generate_guid_prefix(attributes.domain_id, participant_id);

        // Default user locators: when the caller configured neither list,
        // synthesize unicast locators from the local interface addresses.
        if attributes.default_unicast_locators.is_empty()
            && attributes.default_multicast_locators.is_empty()
        {
            attributes.default_unicast_locators = default_unicast_locators(ports.user_unicast);
            log::debug!(
                "[RtpsParticipant] no default locators configured, synthesized {:?}",
                attributes.default_unicast_locators
            );
        }
        let default_unicast = attributes.default_unicast_locators.clone();
        let default_multicast = attributes.default_multicast_locators.clone();
        let metatraffic_unicast = default_unicast_locators(ports.metatraffic_unicast);

        let send_resource = Arc::new(SendResource::new()?);
        let events = Arc::new(EventResource::new());
        let dispatch_ctx = Arc::new(DispatchContext {
            guid_prefix,
            sender: send_resource.clone(),
            events: events.clone(),
        });

        // Metatraffic listen resources exist for the participant lifetime.
        let group: Ipv4Addr = crate::config::MULTICAST_GROUP
            .parse()
            .unwrap_or(Ipv4Addr::new(239, 255, 0, 1));
        let meta_multicast_resource = ListenResource::start(
            &Locator::udpv4(group, ports.metatraffic_multicast),
            dispatch_ctx.clone(),
        )?;
        let meta_unicast_resource = ListenResource::start(
            &Locator::udpv4(Ipv4Addr::UNSPECIFIED, ports.metatraffic_unicast),
            dispatch_ctx.clone(),
        )?;
        let metatraffic_resources = vec![meta_multicast_resource, meta_unicast_resource];

        let builtin = BuiltinProtocols::start(
            BuiltinConfig {
                guid_prefix,
                attributes: attributes.clone(),
                ports,
                metatraffic_unicast_locators: metatraffic_unicast,
                default_unicast_locators: default_unicast.clone(),
            },
            send_resource.clone(),
            events.clone(),
            &metatraffic_resources,
        )?;

        log::debug!(
            "[RtpsParticipant] \"{}\" up: domain={} participant_id={} prefix={:02x?}",
            attributes.name,
            attributes.domain_id,
            participant_id,
            guid_prefix
        );

        Ok(Arc::new(Self {
            guid_prefix,
            attributes,
            ports,
            endpoints: Mutex::new(Vec::new()),
            listen_resources: Mutex::new(metatraffic_resources),
            send_resource,
            events,
            dispatch_ctx,
            builtin,
            id_counter: AtomicU32::new(0),
            heartbeat_events: Mutex::new(HashMap::new()),
            default_unicast,
            default_multicast,
        }))
    }

    pub fn guid_prefix(&self) -> GuidPrefix {
        self.guid_prefix
    }

    pub fn guid(&self) -> Guid {
        Guid::new(self.guid_prefix, crate::types::ENTITYID_PARTICIPANT)
    }

    pub fn attributes(&self) -> &ParticipantAttributes {
        &self.attributes
    }

    pub fn ports(&self) -> PortMapping {
        self.ports
    }

    pub fn builtin(&self) -> &BuiltinProtocols {
        &self.builtin
    }

    /// Attach the user-facing discovery listener.
    pub fn set_participant_listener(&self, listener: Arc<dyn ParticipantListener>) {
        self.builtin.pdp.set_listener(listener);
    }

    // ========================================================================
    // Endpoint factory
    // ========================================================================

    /// Create a user writer. RELIABLE QoS yields a stateful writer,
    /// BEST_EFFORT a stateless one.
    pub fn create_writer(
        &self,
        mut attributes: EndpointAttributes,
        listener: Option<Arc<dyn WriterListener>>,
    ) -> Result<Arc<Endpoint>> {
        self.validate_endpoint_attributes(&attributes)?;
        let keyed = attributes.topic_kind == TopicKind::WithKey;
        let entity_id = self.allocate_entity_id(
            attributes.user_defined_id,
            if keyed {
                KIND_WRITER_WITH_KEY
            } else {
                KIND_WRITER_NO_KEY
            },
        )?;
        let guid = Guid::new(self.guid_prefix, entity_id);
        self.inherit_default_locators(&mut attributes);

        let reliable = attributes.qos.reliability == crate::qos::Reliability::Reliable;
        let role = if reliable {
            let mut writer = StatefulWriter::new(guid, attributes.qos.clone());
            if let Some(listener) = listener {
                writer.set_listener(listener);
            }
            EndpointRole::Writer(WriterState::Stateful(writer))
        } else {
            EndpointRole::Writer(WriterState::Stateless(StatelessWriter::new(
                guid,
                attributes.qos.clone(),
            )))
        };

        let endpoint = Arc::new(Endpoint::new(guid, attributes, false, role));
        self.assign_endpoint_listen_resources(&endpoint)?;
        if reliable {
            if let Some(id) =
                schedule_writer_heartbeat(&endpoint, &self.events, &self.send_resource)
            {
                self.heartbeat_events.lock().insert(guid, id);
            }
        }

        self.endpoints.lock().push(endpoint.clone());
        self.builtin.add_local_writer(&endpoint);
        log::debug!("[RtpsParticipant] created writer {}", guid);
        Ok(endpoint)
    }

    /// Create a user reader. RELIABLE QoS yields a stateful reader,
    /// BEST_EFFORT a stateless one.
    pub fn create_reader(
        &self,
        mut attributes: EndpointAttributes,
        listener: Option<Arc<dyn ReaderListener>>,
    ) -> Result<Arc<Endpoint>> {
        self.validate_endpoint_attributes(&attributes)?;
        let keyed = attributes.topic_kind == TopicKind::WithKey;
        let entity_id = self.allocate_entity_id(
            attributes.user_defined_id,
            if keyed {
                KIND_READER_WITH_KEY
            } else {
                KIND_READER_NO_KEY
            },
        )?;
        let guid = Guid::new(self.guid_prefix, entity_id);
        self.inherit_default_locators(&mut attributes);

        let role = if attributes.qos.reliability == crate::qos::Reliability::Reliable {
            let mut reader = StatefulReader::new(guid, attributes.qos.clone());
            if let Some(listener) = listener {
                reader.set_listener(listener);
            }
            EndpointRole::Reader(ReaderState::Stateful(reader))
        } else {
            let mut reader = StatelessReader::new(guid, attributes.qos.clone());
            if let Some(listener) = listener {
                reader.set_listener(listener);
            }
            EndpointRole::Reader(ReaderState::Stateless(reader))
        };

        let endpoint = Arc::new(Endpoint::new(guid, attributes, false, role));
        self.assign_endpoint_listen_resources(&endpoint)?;

        self.endpoints.lock().push(endpoint.clone());
        self.builtin.add_local_reader(&endpoint);
        log::debug!("[RtpsParticipant] created reader {}", guid);
        Ok(endpoint)
    }

    /// Tear an endpoint down: withdraw its advertisement, cancel its
    /// timers, detach it from every listen resource and collect resources
    /// left without endpoints.
    pub fn delete_endpoint(&self, endpoint: &Arc<Endpoint>) -> Result<()> {
        {
            let mut endpoints = self.endpoints.lock();
            let before = endpoints.len();
            endpoints.retain(|e| e.guid != endpoint.guid);
            if endpoints.len() == before {
                return Err(Error::InvalidArgument("endpoint not owned by participant"));
            }
        }

        self.builtin.remove_local_endpoint(endpoint);

        if let Some(id) = self.heartbeat_events.lock().remove(&endpoint.guid) {
            self.events.cancel(id);
        }

        let mut resources = self.listen_resources.lock();
        for resource in resources.iter() {
            resource.remove_endpoint(endpoint);
        }
        // Collect resources whose association set became empty.
        let (keep, idle): (Vec<_>, Vec<_>) =
            resources.drain(..).partition(|r| r.has_endpoints());
        *resources = keep;
        for resource in idle {
            log::debug!("[RtpsParticipant] stopping idle listen resource");
            resource.stop();
        }

        log::debug!("[RtpsParticipant] deleted endpoint {}", endpoint.guid);
        Ok(())
    }

    // ========================================================================
    // Data path helpers
    // ========================================================================

    /// Write one sample through a writer endpoint and push it out.
    pub fn write_sample(
        &self,
        endpoint: &Arc<Endpoint>,
        kind: ChangeKind,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
    ) -> Result<SequenceNumber> {
        let mut role = endpoint.role.lock();
        match &mut *role {
            EndpointRole::Writer(WriterState::Stateful(w)) => {
                let seq = w.new_change(kind, instance_handle, payload)?;
                w.perform_send(self.send_resource.as_ref());
                Ok(seq)
            }
            EndpointRole::Writer(WriterState::Stateless(w)) => {
                w.write(kind, instance_handle, payload, self.send_resource.as_ref())
            }
            EndpointRole::Reader(_) => Err(Error::InvalidArgument("endpoint is not a writer")),
        }
    }

    /// Activate a statically declared remote endpoint (static EDP only).
    pub fn new_remote_endpoint_discovered(
        &self,
        participant_guid: Guid,
        user_defined_id: i16,
        is_writer: bool,
    ) -> bool {
        if !self.attributes.use_static_edp {
            log::debug!(
                "[RtpsParticipant] remote endpoints can only be activated with static discovery"
            );
            return false;
        }
        self.builtin.edp.new_remote_endpoint_discovered(
            participant_guid.prefix,
            user_defined_id,
            is_writer,
        )
    }

    /// Send the SPDP announcement now.
    pub fn announce_participant_state(&self) {
        self.builtin.announce_participant_state();
    }

    /// Pause periodic SPDP announcements.
    pub fn stop_participant_announcement(&self) {
        self.builtin.stop_participant_announcement();
    }

    /// Publish a fresh announcement and restart the periodic timer.
    pub fn reset_participant_announcement(&self) {
        self.builtin.reset_participant_announcement();
    }

    /// Stop every thread this participant owns. Idempotent.
    pub fn shutdown(&self) {
        self.builtin.shutdown();
        self.send_resource.shutdown();
        let resources: Vec<_> = self.listen_resources.lock().drain(..).collect();
        for resource in resources {
            resource.stop();
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn validate_endpoint_attributes(&self, attributes: &EndpointAttributes) -> Result<()> {
        if attributes.topic_name.is_empty() {
            return Err(Error::InvalidArgument("empty topic name"));
        }
        if attributes.type_name.is_empty() {
            return Err(Error::InvalidArgument("empty type name"));
        }
        attributes.qos.validate().map_err(Error::InvalidArgument)?;
        if self.attributes.use_static_edp && attributes.user_defined_id <= 0 {
            return Err(Error::InvalidArgument(
                "static discovery requires user_defined_id > 0",
            ));
        }
        Ok(())
    }

    /// Allocate an entity id: a caller-supplied id > 0 wins, otherwise the
    /// monotonic counter. The id number fills octets 0..2, the kind octet
    /// is octet 3. Collision with an existing endpoint of the same kind
    /// class (writer vs reader) is an error; first insertion wins.
    fn allocate_entity_id(&self, user_defined_id: i16, kind: u8) -> Result<EntityId> {
        let idnum: u32 = if user_defined_id > 0 {
            user_defined_id as u32
        } else {
            self.id_counter.fetch_add(1, Ordering::SeqCst) + 1
        };

        let bytes = idnum.to_le_bytes();
        let entity_id: EntityId = [bytes[2], bytes[1], bytes[0], kind];

        let is_writer_kind = matches!(kind, KIND_WRITER_WITH_KEY | KIND_WRITER_NO_KEY);
        if self.exists_entity_id(entity_id, is_writer_kind) {
            log::debug!(
                "[RtpsParticipant] entity id {:02x?} already exists",
                entity_id
            );
            return Err(Error::DuplicateEntityId);
        }
        Ok(entity_id)
    }

    /// Uniqueness check against endpoints of the *same* kind class.
    fn exists_entity_id(&self, entity_id: EntityId, writer: bool) -> bool {
        self.endpoints.lock().iter().any(|e| {
            e.guid.entity_id == entity_id
                && if writer {
                    e.is_writer()
                } else {
                    e.is_reader()
                }
        })
    }

    /// User endpoints with neither unicast nor multicast locators inherit
    /// the participant defaults.
    fn inherit_default_locators(&self, attributes: &mut EndpointAttributes) {
        if attributes.unicast_locators.is_empty() && attributes.multicast_locators.is_empty() {
            attributes.unicast_locators = self.default_unicast.clone();
            attributes.multicast_locators = self.default_multicast.clone();
        }
    }

    /// Attach the endpoint to a listen resource per locator, creating
    /// resources for locators nobody listens on yet.
    fn assign_endpoint_listen_resources(&self, endpoint: &Arc<Endpoint>) -> Result<()> {
        let locators: Vec<Locator> = endpoint.locators().copied().collect();
        let mut resources = self.listen_resources.lock();

        for locator in &locators {
            if let Some(existing) = resources.iter().find(|r| r.is_listening_to(locator)) {
                existing.add_endpoint(endpoint);
                continue;
            }
            let resource = ListenResource::start(locator, self.dispatch_ctx.clone())?;
            resource.add_endpoint(endpoint);
            resources.push(resource);
        }
        Ok(())
    }
}

impl Drop for RtpsParticipant {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodic reliability heartbeats for a stateful writer endpoint.
/// Returns `None` for non-stateful writers.
pub(crate) fn schedule_writer_heartbeat(
    endpoint: &Arc<Endpoint>,
    events: &Arc<EventResource>,
    sender: &Arc<SendResource>,
) -> Option<EventId> {
    let period = {
        let role = endpoint.role.lock();
        match &*role {
            EndpointRole::Writer(WriterState::Stateful(w)) => w.heartbeat_period(),
            _ => return None,
        }
    };

    let weak = Arc::downgrade(endpoint);
    let sender = sender.clone();
    Some(events.schedule_periodic(period, move || match weak.upgrade() {
        Some(endpoint) => {
            let mut role = endpoint.role.lock();
            if let EndpointRole::Writer(WriterState::Stateful(w)) = &mut *role {
                let gave_up = w.on_heartbeat_period(sender.as_ref());
                for reader in gave_up {
                    log::debug!(
                        "[RtpsParticipant] writer {} dropped unresponsive reader {}",
                        endpoint.guid,
                        reader
                    );
                }
            }
            EventOutcome::Again
        }
        None => EventOutcome::Done,
    }))
}

/// GUID prefix: vendor id + host address + process id + time/participant
/// entropy. Unique within a domain with overwhelming probability and stable
/// for the participant's lifetime.
fn generate_guid_prefix(domain_id: u32, participant_id: u8) -> GuidPrefix {
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut prefix = [0u8; 12];
    prefix[0..2].copy_from_slice(&VENDOR_ID);

    let host = crate::transport::primary_interface_ip()
        .unwrap_or(Ipv4Addr::LOCALHOST)
        .octets();
    prefix[2..6].copy_from_slice(&host);

    let pid = std::process::id().to_le_bytes();
    prefix[6..10].copy_from_slice(&pid);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u32)
        .unwrap_or(0);
    prefix[10] = (nanos ^ u32::from(participant_id) ^ domain_id) as u8;
    prefix[11] = (nanos >> 8) as u8 ^ participant_id;
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::QosProfile;

    fn attributes(domain: u32) -> ParticipantAttributes {
        ParticipantAttributes {
            domain_id: domain,
            name: "test-participant".into(),
            ..Default::default()
        }
    }

    fn writer_attrs() -> EndpointAttributes {
        EndpointAttributes {
            topic_name: "Chat".into(),
            type_name: "String".into(),
            qos: QosProfile::reliable(),
            ..Default::default()
        }
    }

    #[test]
    fn test_participant_creation() {
        let participant =
            RtpsParticipant::new(attributes(210)).expect("participant creation succeeds");
        assert_ne!(participant.guid_prefix(), [0u8; 12]);
        assert_eq!(participant.attributes().domain_id, 210);
        participant.shutdown();
    }

    #[test]
    fn test_guid_prefix_uniqueness() {
        let a = generate_guid_prefix(0, 1);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = generate_guid_prefix(0, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_create_writer_allocates_distinct_ids() {
        let participant =
            RtpsParticipant::new(attributes(211)).expect("participant creation succeeds");

        let w1 = participant
            .create_writer(writer_attrs(), None)
            .expect("writer 1 created");
        let w2 = participant
            .create_writer(writer_attrs(), None)
            .expect("writer 2 created");

        assert_ne!(w1.guid, w2.guid);
        assert_eq!(w1.guid.entity_id[3], KIND_WRITER_NO_KEY);
        participant.shutdown();
    }

    #[test]
    fn test_duplicate_user_id_rejected() {
        let participant =
            RtpsParticipant::new(attributes(212)).expect("participant creation succeeds");

        let mut attrs = writer_attrs();
        attrs.user_defined_id = 7;
        participant
            .create_writer(attrs.clone(), None)
            .expect("first writer created");

        let err = participant
            .create_writer(attrs.clone(), None)
            .expect_err("second writer with same id fails");
        assert!(matches!(err, Error::DuplicateEntityId));

        // A reader with the same id number is a different kind class: fine.
        participant
            .create_reader(attrs, None)
            .expect("reader with same user id succeeds");
        participant.shutdown();
    }

    #[test]
    fn test_static_edp_rejects_zero_user_id() {
        let mut att = attributes(213);
        att.use_static_edp = true;
        let participant = RtpsParticipant::new(att).expect("participant creation succeeds");

        let err = participant
            .create_writer(writer_attrs(), None)
            .expect_err("user_defined_id=0 must fail under static discovery");
        assert!(matches!(err, Error::InvalidArgument(_)));

        let mut attrs = writer_attrs();
        attrs.user_defined_id = 1;
        participant
            .create_writer(attrs, None)
            .expect("positive user id succeeds");
        participant.shutdown();
    }

    #[test]
    fn test_endpoint_inherits_default_locators() {
        let participant =
            RtpsParticipant::new(attributes(214)).expect("participant creation succeeds");
        let writer = participant
            .create_writer(writer_attrs(), None)
            .expect("writer created");
        assert!(
            !writer.attributes.unicast_locators.is_empty(),
            "empty locator lists inherit participant defaults"
        );
        participant.shutdown();
    }

    #[test]
    fn test_delete_endpoint() {
        let participant =
            RtpsParticipant::new(attributes(215)).expect("participant creation succeeds");
        let writer = participant
            .create_writer(writer_attrs(), None)
            .expect("writer created");

        participant
            .delete_endpoint(&writer)
            .expect("delete succeeds");
        let err = participant
            .delete_endpoint(&writer)
            .expect_err("double delete fails");
        assert!(matches!(err, Error::InvalidArgument(_)));
        participant.shutdown();
    }

    #[test]
    fn test_validation_rejects_empty_names() {
        let participant =
            RtpsParticipant::new(attributes(216)).expect("participant creation succeeds");

        let mut attrs = writer_attrs();
        attrs.type_name.clear();
        assert!(participant.create_writer(attrs, None).is_err());

        let mut attrs = writer_attrs();
        attrs.topic_name.clear();
        assert!(participant.create_reader(attrs, None).is_err());
        participant.shutdown();
    }

    #[test]
    fn test_write_sample_through_handle() {
        let participant =
            RtpsParticipant::new(attributes(217)).expect("participant creation succeeds");
        let writer = participant
            .create_writer(writer_attrs(), None)
            .expect("writer created");

        let seq = participant
            .write_sample(&writer, ChangeKind::Alive, [0; 16], vec![0, 1, 0, 0, 1])
            .expect("write succeeds");
        assert_eq!(seq, 1);

        let err = participant
            .write_sample(
                &participant
                    .create_reader(writer_attrs(), None)
                    .expect("reader created"),
                ChangeKind::Alive,
                [0; 16],
                Vec::new(),
            )
            .expect_err("writing through a reader fails");
        assert!(matches!(err, Error::InvalidArgument(_)));
        participant.shutdown();
    }
}
