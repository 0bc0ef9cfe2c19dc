//! Core traits: how workers order their locks, and what they do while
//! holding them.

use gridlock_types::{AcquisitionMode, ResourceId, WorkerId};
use rand::RngCore;
use std::fmt;

/// Decides the order in which a worker takes its two resources.
///
/// This is the only place deadlock avoidance lives. The pool itself hands
/// resources out in whatever order requests arrive.
///
/// # Example
///
/// ```ignore
/// let (first, second) = policy.order(worker, a, b);
/// let g1 = slot.acquire(&pool, first);
/// let g2 = slot.acquire(&pool, second);
/// ```
pub trait AcquisitionPolicy: fmt::Debug + Send + Sync {
    /// The mode this policy implements.
    fn mode(&self) -> AcquisitionMode;

    /// Order a pair of distinct resources for acquisition.
    ///
    /// # Arguments
    ///
    /// * `worker` - The acquiring worker
    /// * `a` - First resource chosen by the worker
    /// * `b` - Second resource chosen by the worker
    ///
    /// # Returns
    ///
    /// `(first, second)`: the worker locks `first`, then `second`.
    fn order(&self, worker: WorkerId, a: ResourceId, b: ResourceId) -> (ResourceId, ResourceId);
}

/// Work performed while a worker holds both of its resources.
///
/// The harness only needs the duration to be bounded; the payload itself is
/// opaque to the pool, the policy and the monitor.
pub trait CriticalSection: Send + Sync {
    /// Run one critical section.
    ///
    /// # Arguments
    ///
    /// * `worker` - The worker holding the resources
    /// * `held` - The two resources, in acquisition order
    /// * `rng` - The worker's random source
    fn run(&self, worker: WorkerId, held: (ResourceId, ResourceId), rng: &mut dyn RngCore);
}
