// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Endpoint: the participant-owned unit the listen resources dispatch to.
//!
//! Ownership is strictly one-way: the participant owns `Arc<Endpoint>`,
//! listen resources hold `Weak` references. Destroying an endpoint detaches
//! it from every listen resource before the `Arc` is dropped, so no dispatch
//! path can observe a dangling endpoint.

use parking_lot::Mutex;

use crate::qos::QosProfile;
use crate::rtps::{StatefulReader, StatefulWriter, StatelessReader, StatelessWriter};
use crate::types::{Guid, Locator};

/// Keyed or keyless topic. Decides the kind octet of allocated entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicKind {
    #[default]
    NoKey,
    WithKey,
}

/// Attributes fixed at endpoint creation.
#[derive(Debug, Clone, Default)]
pub struct EndpointAttributes {
    pub topic_name: String,
    pub type_name: String,
    pub topic_kind: TopicKind,
    pub qos: QosProfile,
    /// Listening locators. Empty lists inherit the participant defaults
    /// (user endpoints only).
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    /// Entity id requested by the caller (> 0 wins over the counter).
    /// Mandatory (> 0) when static endpoint discovery is enabled.
    pub user_defined_id: i16,
}

/// Writer behavior variant.
pub enum WriterState {
    Stateless(StatelessWriter),
    Stateful(StatefulWriter),
}

/// Reader behavior variant.
pub enum ReaderState {
    Stateless(StatelessReader),
    Stateful(StatefulReader),
}

/// Writer-or-reader behavior of one endpoint.
pub enum EndpointRole {
    Writer(WriterState),
    Reader(ReaderState),
}

impl EndpointRole {
    pub fn is_writer(&self) -> bool {
        matches!(self, EndpointRole::Writer(_))
    }

    pub fn is_reader(&self) -> bool {
        matches!(self, EndpointRole::Reader(_))
    }
}

/// One RTPS endpoint.
///
/// The role mutex is the per-endpoint lock of the concurrency model: user
/// calls and event/listen-thread handlers serialize on it. Lock order is
/// Participant > Endpoint > (proxies are interior to the role state).
pub struct Endpoint {
    pub guid: Guid,
    pub attributes: EndpointAttributes,
    pub is_builtin: bool,
    pub role: Mutex<EndpointRole>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("guid", &self.guid)
            .field("attributes", &self.attributes)
            .field("is_builtin", &self.is_builtin)
            .finish()
    }
}

impl Endpoint {
    pub fn new(
        guid: Guid,
        attributes: EndpointAttributes,
        is_builtin: bool,
        role: EndpointRole,
    ) -> Self {
        Self {
            guid,
            attributes,
            is_builtin,
            role: Mutex::new(role),
        }
    }

    /// All locators this endpoint listens on.
    pub fn locators(&self) -> impl Iterator<Item = &Locator> {
        self.attributes
            .unicast_locators
            .iter()
            .chain(self.attributes.multicast_locators.iter())
    }

    pub fn is_writer(&self) -> bool {
        self.role.lock().is_writer()
    }

    pub fn is_reader(&self) -> bool {
        self.role.lock().is_reader()
    }
}
