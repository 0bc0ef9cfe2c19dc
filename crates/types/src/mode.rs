//! Acquisition modes and resource pairing rules.

use crate::{ResourceId, WorkerId};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which acquisition policy a phase runs under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquisitionMode {
    /// Lock order depends on worker parity. Can deadlock.
    #[default]
    Unordered,

    /// Locks are always taken in ascending resource order. Cannot deadlock.
    TotalOrder,
}

impl AcquisitionMode {
    /// Both modes, unordered first.
    pub const ALL: [AcquisitionMode; 2] = [AcquisitionMode::Unordered, AcquisitionMode::TotalOrder];

    /// Whether this mode is free of circular waits.
    pub fn is_deadlock_free(self) -> bool {
        matches!(self, AcquisitionMode::TotalOrder)
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionMode::Unordered => write!(f, "unordered"),
            AcquisitionMode::TotalOrder => write!(f, "total-order"),
        }
    }
}

/// Error parsing a mode or pairing rule from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseModeError {
    #[error("Unknown acquisition mode: {0} (expected unordered or total-order)")]
    UnknownMode(String),

    #[error("Unknown pairing rule: {0} (expected paired or adjacent)")]
    UnknownPairing(String),
}

impl FromStr for AcquisitionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unordered" | "unsafe" => Ok(AcquisitionMode::Unordered),
            "total-order" | "totalorder" | "ordered" | "safe" => Ok(AcquisitionMode::TotalOrder),
            _ => Err(ParseModeError::UnknownMode(s.to_string())),
        }
    }
}

/// Deterministic rule mapping a worker to the two resources it contends for.
///
/// Both rules are pure functions of the worker index, so a given
/// configuration always produces the same contention pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingRule {
    /// Workers `2k` and `2k+1` share the pair `(k mod R, (k+1) mod R)`.
    ///
    /// Under the unordered policy the two workers of each couple take the
    /// pair in opposite order, so every couple is a potential 2-cycle.
    #[default]
    Paired,

    /// Worker `i` takes `(i mod R, (i+1) mod R)`.
    ///
    /// Neighbouring workers share one resource. A 2-cycle only appears when
    /// `W > R` and two workers of opposite parity land on the same pair.
    Adjacent,
}

impl PairingRule {
    /// Choose the two resources for a worker.
    ///
    /// The returned ids are always distinct when `resources >= 2`.
    ///
    /// # Panics
    ///
    /// Panics if `resources` is zero.
    pub fn choose(self, worker: WorkerId, resources: usize) -> (ResourceId, ResourceId) {
        assert!(resources > 0, "resource pool must not be empty");
        let base = match self {
            PairingRule::Paired => worker.index() / 2,
            PairingRule::Adjacent => worker.index(),
        };
        (
            ResourceId(base % resources),
            ResourceId((base + 1) % resources),
        )
    }
}

impl fmt::Display for PairingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingRule::Paired => write!(f, "paired"),
            PairingRule::Adjacent => write!(f, "adjacent"),
        }
    }
}

impl FromStr for PairingRule {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paired" | "pairs" => Ok(PairingRule::Paired),
            "adjacent" | "ring" => Ok(PairingRule::Adjacent),
            _ => Err(ParseModeError::UnknownPairing(s.to_string())),
        }
    }
}
