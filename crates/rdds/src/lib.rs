// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! # RDDS - RTPS participant core in pure Rust
//!
//! The in-process runtime of an RTPS (Real-Time Publish-Subscribe)
//! participant: history caches and the reliability state machine,
//! participant/endpoint lifecycle, UDP listen resources, and the two-tier
//! built-in discovery (SPDP + SEDP) with the ack-status bookkeeping a
//! discovery server builds on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rdds::{CacheChange, ChangeKind, EndpointAttributes, ParticipantAttributes,
//!     QosProfile, ReaderListener, Result, RtpsParticipant};
//!
//! struct Print;
//! impl ReaderListener for Print {
//!     fn on_data_available(&self, change: &CacheChange) {
//!         println!("sample seq={}", change.sequence_number);
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let participant = RtpsParticipant::new(ParticipantAttributes::default())?;
//!
//!     let writer = participant.create_writer(
//!         EndpointAttributes {
//!             topic_name: "sensors/temperature".into(),
//!             type_name: "Temperature".into(),
//!             qos: QosProfile::reliable(),
//!             ..Default::default()
//!         },
//!         None,
//!     )?;
//!
//!     participant.write_sample(&writer, ChangeKind::Alive, [0; 16],
//!         vec![0x00, 0x01, 0x00, 0x00, 42])?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        RtpsParticipant                             |
//! |   endpoint factory | GUID allocation | listen-resource table       |
//! +--------------------------------------------------------------------+
//! |                      Behavior (rtps module)                        |
//! |   Stateless/Stateful Writer/Reader | ReaderProxy | WriterProxy     |
//! +--------------------------------------------------------------------+
//! |   HistoryCache & CacheChange       |   Builtin discovery           |
//! |   (bounded, QoS-driven eviction)   |   SPDP + SEDP + ack database  |
//! +--------------------------------------------------------------------+
//! |   Wire codecs (messages module)    |   UDPv4 transport             |
//! |   DATA/HEARTBEAT/ACKNACK/GAP/...   |   ports, multicast, sockets   |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Three thread classes run per participant: listen threads (one per bound
//! socket), one event thread (heartbeats, acknack delays, leases,
//! announcements) and the callers' own threads on the send path, which
//! serialize through the shared send resource.
//!
//! ## See Also
//!
//! - [DDS-RTPS Specification](https://www.omg.org/spec/DDSI-RTPS/2.3/)

/// Cache changes and per-endpoint history caches.
pub mod cache;
/// Protocol constants and participant attributes.
pub mod config;
/// Built-in discovery (SPDP, SEDP, discovery database).
pub mod discovery;
/// Crate-wide error type.
pub mod error;
/// RTPS submessage wire codecs.
pub mod messages;
/// Participant, listen/send/event resources.
pub mod participant;
/// QoS policies and the request-vs-offered matrix.
pub mod qos;
/// Endpoint behavior: writers, readers, proxies.
pub mod rtps;
/// UDPv4 transport and port mapping.
pub mod transport;
/// Opaque type support contract.
pub mod typesupport;
/// GUIDs, locators, sequence numbers.
pub mod types;

pub use cache::{CacheChange, ChangeKind, HistoryCache, WriteParams};
pub use config::ParticipantAttributes;
pub use discovery::{
    DiscoveryDatabase, ParticipantListener, ParticipantProxyData, ParticipantsAckStatus,
    ReaderProxyData, WriterProxyData,
};
pub use error::{Error, Result};
pub use participant::RtpsParticipant;
pub use qos::{Durability, History, Ownership, QosProfile, Reliability, ResourceLimits};
pub use rtps::{
    Endpoint, EndpointAttributes, ReaderListener, TopicKind, WriterListener,
};
pub use types::{EntityId, Guid, GuidPrefix, InstanceHandle, Locator, SequenceNumber};
pub use typesupport::TypeSupport;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
