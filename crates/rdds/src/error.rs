// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Crate-wide error type.
//!
//! Protocol-level faults (malformed submessages) never surface here; they are
//! dropped and logged where they occur. This enum covers what the API caller
//! can actually act on.

use std::fmt;

/// Errors surfaced by the participant core API.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Argument / configuration errors
    // ========================================================================
    /// Bad argument combination (zero type size, empty type name, invalid
    /// static-EDP user id, oversize payload, bad QoS combination).
    InvalidArgument(&'static str),
    /// Entity id collision inside one participant.
    DuplicateEntityId,
    /// The topic's type was never registered with the participant.
    TypeNotRegistered,

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// History cache refused the sample (KEEP_ALL and full).
    HistoryFull,
    /// A configured resource limit was exceeded.
    ResourceLimitExceeded(String),
    /// Socket bind failed for a configured locator.
    BindFailed(String),
    /// Multicast group join failed.
    MulticastJoinFailed(String),
    /// Underlying I/O failure.
    IoError(std::io::Error),

    // ========================================================================
    // Protocol / lifecycle errors
    // ========================================================================
    /// Malformed inbound data that could not be recovered locally.
    ProtocolViolation(&'static str),
    /// Reliable operation gave up (lease expired, retransmit cap reached).
    Timeout,
    /// The participant is shutting down.
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::DuplicateEntityId => write!(f, "An endpoint with this entity id already exists"),
            Error::TypeNotRegistered => write!(f, "Type not registered"),
            Error::HistoryFull => write!(f, "History cache full"),
            Error::ResourceLimitExceeded(msg) => write!(f, "Resource limit exceeded: {}", msg),
            Error::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            Error::MulticastJoinFailed(msg) => write!(f, "Multicast join failed: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Shutdown => write!(f, "Participant is shutting down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Convenient alias for results using the crate `Error`.
pub type Result<T> = core::result::Result<T, Error>;
