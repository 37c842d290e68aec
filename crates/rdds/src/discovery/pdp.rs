// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! PDP: Simple Participant Discovery Protocol.
//!
//! A best-effort stateless writer multicasts this participant's
//! `ParticipantProxyData` on the well-known metatraffic locator every
//! announcement period; the matching stateless reader feeds the participant
//! table. Every remote participant carries a lease: when it is not
//! refreshed in time the participant is removed and every dependent
//! endpoint match is torn down through EDP.

use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::{CacheChange, ChangeKind};
use crate::discovery::data::ParticipantProxyData;
use crate::discovery::edp::Edp;
use crate::participant::SendResource;
use crate::rtps::{Endpoint, EndpointRole, ReaderListener, WriterState};
use crate::types::GuidPrefix;

/// User-facing discovery callbacks.
pub trait ParticipantListener: Send + Sync {
    fn on_participant_discovered(&self, _data: &ParticipantProxyData) {}
    fn on_participant_removed(&self, _guid_prefix: GuidPrefix) {}
}

/// One discovered remote participant.
pub struct DiscoveredParticipant {
    pub data: ParticipantProxyData,
    pub last_seen: Instant,
}

/// Participant discovery state shared across threads.
pub struct Pdp {
    local_data: Mutex<ParticipantProxyData>,
    spdp_writer: Arc<Endpoint>,
    participants: DashMap<GuidPrefix, DiscoveredParticipant>,
    edp: Arc<Edp>,
    sender: Arc<SendResource>,
    listener: Mutex<Option<Arc<dyn ParticipantListener>>>,
}

impl Pdp {
    pub fn new(
        local_data: ParticipantProxyData,
        spdp_writer: Arc<Endpoint>,
        edp: Arc<Edp>,
        sender: Arc<SendResource>,
    ) -> Self {
        Self {
            local_data: Mutex::new(local_data),
            spdp_writer,
            participants: DashMap::new(),
            edp,
            sender,
            listener: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: Arc<dyn ParticipantListener>) {
        *self.listener.lock() = Some(listener);
    }

    pub fn local_data(&self) -> ParticipantProxyData {
        self.local_data.lock().clone()
    }

    /// Periodic announcement: publish the participant data as a fresh
    /// change.
    ///
    /// Every announcement carries a new sequence number so peers behind
    /// the max-seq-monotonic filter of a best-effort reader still see it
    /// and refresh our lease; KEEP_LAST(1) keeps the writer history at one
    /// cached announcement.
    pub fn announce(&self) {
        let (guid_bytes, payload) = {
            let local = self.local_data.lock();
            (local.guid.as_bytes(), local.encode())
        };
        let mut role = self.spdp_writer.role.lock();
        let EndpointRole::Writer(WriterState::Stateless(writer)) = &mut *role else {
            return;
        };
        if let Err(e) = writer.write(
            ChangeKind::Alive,
            guid_bytes,
            payload,
            self.sender.as_ref(),
        ) {
            log::debug!("[Pdp] announce write failed: {}", e);
        }
    }

    /// Re-advertise after a local change (locators, lease).
    pub fn reset_announcement(&self) {
        self.announce();
    }

    /// Inbound participant data from the SPDP reader.
    pub fn on_remote_participant(&self, data: ParticipantProxyData) {
        let prefix = data.guid.prefix;
        if prefix == self.local_data.lock().guid.prefix {
            return;
        }

        let is_new = !self.participants.contains_key(&prefix);
        self.participants.insert(
            prefix,
            DiscoveredParticipant {
                data: data.clone(),
                last_seen: Instant::now(),
            },
        );

        if is_new {
            log::debug!(
                "[Pdp] discovered participant {} lease={:?}",
                data.guid,
                data.lease_duration
            );
            self.edp.participant_discovered(&data);
            if let Some(listener) = self.listener.lock().clone() {
                listener.on_participant_discovered(&data);
            }
        }
    }

    /// Explicit removal (dispose received or lease expired).
    pub fn remove_participant(&self, prefix: GuidPrefix) {
        if self.participants.remove(&prefix).is_none() {
            return;
        }
        log::debug!("[Pdp] removing participant {:02x?}", prefix);
        self.edp.participant_removed(prefix);
        if let Some(listener) = self.listener.lock().clone() {
            listener.on_participant_removed(prefix);
        }
    }

    /// Lease sweep: drop every participant whose lease ran out.
    pub fn check_leases(&self) {
        let expired: Vec<GuidPrefix> = self
            .participants
            .iter()
            .filter(|p| p.last_seen.elapsed() > p.data.lease_duration)
            .map(|p| *p.key())
            .collect();
        for prefix in expired {
            log::debug!("[Pdp] lease expired for {:02x?}", prefix);
            self.remove_participant(prefix);
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn has_participant(&self, prefix: &GuidPrefix) -> bool {
        self.participants.contains_key(prefix)
    }

    pub fn lookup_participant(&self, prefix: &GuidPrefix) -> Option<ParticipantProxyData> {
        self.participants.get(prefix).map(|p| p.data.clone())
    }
}

/// Feeds the SPDP reader into the participant table.
pub struct SpdpListener {
    pdp: Weak<Pdp>,
}

impl SpdpListener {
    pub fn new(pdp: Weak<Pdp>) -> Self {
        Self { pdp }
    }
}

impl ReaderListener for SpdpListener {
    fn on_data_available(&self, change: &CacheChange) {
        let Some(pdp) = self.pdp.upgrade() else {
            return;
        };
        match change.kind {
            ChangeKind::Alive => match ParticipantProxyData::decode(&change.payload) {
                Some(data) => pdp.on_remote_participant(data),
                None => {
                    log::debug!("[Pdp] undecodable SPDP payload ({} bytes)", change.payload.len());
                }
            },
            _ => {
                // Disposal: the key hash carries the participant GUID.
                let mut prefix = [0u8; 12];
                prefix.copy_from_slice(&change.instance_handle[0..12]);
                pdp.remove_participant(prefix);
            }
        }
    }
}

/// Feeds the SEDP publications/subscriptions readers into EDP.
pub struct SedpListener {
    edp: Weak<Edp>,
    publications: bool,
}

impl SedpListener {
    pub fn publications(edp: Weak<Edp>) -> Self {
        Self {
            edp,
            publications: true,
        }
    }

    pub fn subscriptions(edp: Weak<Edp>) -> Self {
        Self {
            edp,
            publications: false,
        }
    }
}

impl ReaderListener for SedpListener {
    fn on_data_available(&self, change: &CacheChange) {
        let Some(edp) = self.edp.upgrade() else {
            return;
        };
        match change.kind {
            ChangeKind::Alive => {
                if self.publications {
                    match crate::discovery::data::WriterProxyData::decode(&change.payload) {
                        Some(data) => edp.on_remote_writer(data),
                        None => log::debug!("[Edp] undecodable publication payload"),
                    }
                } else {
                    match crate::discovery::data::ReaderProxyData::decode(&change.payload) {
                        Some(data) => edp.on_remote_reader(data),
                        None => log::debug!("[Edp] undecodable subscription payload"),
                    }
                }
            }
            _ => {
                let guid = crate::types::Guid::from_bytes(change.instance_handle);
                edp.on_remote_endpoint_disposed(guid, self.publications);
            }
        }
    }
}
