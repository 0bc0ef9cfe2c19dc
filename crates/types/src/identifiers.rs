//! Domain-specific identifier types.

use serde::Serialize;
use std::fmt;

/// Resource identifier: the index of a lock in the resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(pub usize);

impl ResourceId {
    /// Get the raw index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Worker identifier.
///
/// Parity matters: the unordered acquisition policy reverses the lock order
/// for odd workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// Get the raw index.
    pub fn index(self) -> usize {
        self.0
    }

    /// Whether this worker has an odd index.
    pub fn is_odd(self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{:02}", self.0)
    }
}
