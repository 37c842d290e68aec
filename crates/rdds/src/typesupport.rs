// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Opaque type support.
//!
//! Typed (de)serialization and IDL codegen live outside the participant core.
//! The core only needs four operations: serialize into CDR bytes, deserialize
//! back, derive the 16-byte instance key and bound the payload size.

use crate::error::Result;
use crate::types::InstanceHandle;

/// Contract between the participant core and an externally generated type.
///
/// Implementations must prefix serialized payloads with the 4-byte CDR
/// encapsulation header; the core treats payload bytes as opaque beyond that.
pub trait TypeSupport: Send + Sync {
    /// Registered type name (must be non-empty).
    fn type_name(&self) -> &str;

    /// True when the type declares a key (keyed topic).
    fn has_key(&self) -> bool;

    /// Serialize one sample into CDR bytes (including encapsulation header).
    fn serialize(&self, sample: &[u8]) -> Result<Vec<u8>>;

    /// Deserialize CDR bytes back into the caller's representation.
    fn deserialize(&self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Compute the instance key hash for a serialized sample.
    fn compute_key(&self, payload: &[u8]) -> Result<InstanceHandle>;

    /// Upper bound on the serialized payload size (must be > 0).
    fn max_payload_size(&self) -> usize;
}
