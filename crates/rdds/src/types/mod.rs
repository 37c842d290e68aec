// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Core RTPS value types.
//!
//! GUIDs, locators and sequence numbers are the identity and ordering
//! vocabulary of the whole protocol; everything above this module speaks in
//! these types.

pub mod guid;
pub mod locator;
pub mod sequence;

pub use guid::{
    trusted_writer, EntityId, Guid, GuidPrefix, ENTITYID_PARTICIPANT, ENTITYID_READER_LIVELINESS,
    ENTITYID_SEDP_PUB_READER, ENTITYID_SEDP_PUB_WRITER, ENTITYID_SEDP_SUB_READER,
    ENTITYID_SEDP_SUB_WRITER, ENTITYID_SPDP_READER, ENTITYID_SPDP_WRITER, ENTITYID_UNKNOWN,
    ENTITYID_WRITER_LIVELINESS,
};
pub use locator::{Locator, LOCATOR_ENCODED_LEN, LOCATOR_KIND_UDPV4};
pub use sequence::{
    FragmentNumberSet, SequenceNumber, SequenceNumberSet, SEQUENCE_NUMBER_UNKNOWN,
};

/// Instance handle for keyed topics (MD5-style 16-byte key hash).
///
/// Unkeyed topics use the all-zero handle.
pub type InstanceHandle = [u8; 16];

/// The all-zero instance handle used by unkeyed topics.
pub const INSTANCE_HANDLE_UNKNOWN: InstanceHandle = [0u8; 16];
