// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! QoS policies consumed by the participant core.
//!
//! The core receives already-validated profiles from the caller; `validate`
//! exists for the factories' fail-fast checks. The request-vs-offered matrix
//! in [`QosProfile::is_compatible`] is what SEDP uses to decide endpoint
//! matching.

/// Reliability policy. Ordering matters: `BestEffort < Reliable` in the
/// request-vs-offered comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Reliability {
    /// Fire-and-forget, no ACKs, no retransmission.
    #[default]
    BestEffort,
    /// NACK-driven retransmission with writer-side history.
    Reliable,
}

/// Durability policy. Ordering matters for the compatibility matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Durability {
    /// Samples exist only while in flight.
    #[default]
    Volatile,
    /// Writer keeps its history for late-joining readers.
    TransientLocal,
}

/// Ownership policy. Must be equal on both sides to match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Shared,
    Exclusive,
}

/// History policy: bounded queue or keep-everything-within-limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep the newest N samples per instance, evicting the oldest.
    KeepLast(u32),
    /// Keep all samples; inserts fail once `ResourceLimits` are reached.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(10)
    }
}

/// Deadline policy: maximum expected period between samples, in
/// nanoseconds. `u64::MAX` means "no deadline".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    pub period_ns: u64,
}

impl Default for Deadline {
    fn default() -> Self {
        Self {
            period_ns: u64::MAX,
        }
    }
}

/// Resource limits bounding the history cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: usize,
    pub max_instances: usize,
    pub max_samples_per_instance: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: 5000,
            max_instances: 10,
            max_samples_per_instance: 500,
        }
    }
}

/// QoS profile for one endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct QosProfile {
    pub reliability: Reliability,
    pub durability: Durability,
    pub ownership: Ownership,
    pub history: History,
    pub deadline: Deadline,
    pub resource_limits: ResourceLimits,
}

impl QosProfile {
    /// Reliable profile shortcut.
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..Default::default()
        }
    }

    /// Best-effort profile shortcut.
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..Default::default()
        }
    }

    /// Validate the profile (fail-fast at endpoint creation).
    pub fn validate(&self) -> Result<(), &'static str> {
        match self.history {
            History::KeepLast(0) => return Err("History::KeepLast(n) requires n > 0"),
            History::KeepAll if self.resource_limits.max_samples == 0 => {
                return Err("History::KeepAll requires ResourceLimits.max_samples > 0");
            }
            _ => {}
        }

        let rl = &self.resource_limits;
        if rl.max_samples < rl.max_samples_per_instance {
            return Err("max_samples must be >= max_samples_per_instance");
        }
        if self.deadline.period_ns == 0 {
            return Err("Deadline period must be > 0");
        }
        Ok(())
    }

    /// Request-vs-offered compatibility: does writer QoS `self` satisfy
    /// reader QoS `requested`?
    ///
    /// Matrix (DDS v1.4 Sec.2.2.3): requested reliability <= offered,
    /// requested durability <= offered, requested deadline >= offered,
    /// ownership equal.
    pub fn is_compatible(&self, requested: &QosProfile) -> bool {
        requested.reliability <= self.reliability
            && requested.durability <= self.durability
            && requested.deadline.period_ns >= self.deadline.period_ns
            && requested.ownership == self.ownership
    }
}
