//! Fixed-size pool of exclusive resources.

use gridlock_types::ResourceId;
use parking_lot::{Mutex, MutexGuard};

/// A fixed array of exclusive locks, indexed `0..R`.
///
/// The pool makes no attempt to avoid deadlock: waiters on the same
/// resource are woken in whatever order the underlying lock chooses, and
/// acquisition order across resources is entirely up to the caller's
/// policy.
///
/// Acquisition is crate-private. Outside this crate the only way to take a
/// resource is [`WorkerSlot::acquire`](crate::WorkerSlot::acquire), which
/// needs a worker's own slot. Code that only holds a pool reference cannot
/// lock anything:
///
/// ```compile_fail
/// use gridlock_core::ResourcePool;
/// use gridlock_types::ResourceId;
///
/// let pool = ResourcePool::new(2);
/// let _guard = pool.acquire(ResourceId(0));
/// ```
#[derive(Debug)]
pub struct ResourcePool {
    resources: Box<[Mutex<()>]>,
}

impl ResourcePool {
    /// Create a pool of `count` free resources.
    pub fn new(count: usize) -> Self {
        Self {
            resources: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of resources in the pool.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether a resource is currently held by anyone.
    ///
    /// Racy by nature; only useful for diagnostics and tests.
    pub fn is_held(&self, id: ResourceId) -> bool {
        self.resources
            .get(id.index())
            .is_some_and(|lock| lock.is_locked())
    }

    /// Block until the resource is free, then hold it.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the pool.
    pub(crate) fn acquire(&self, id: ResourceId) -> ResourceGuard<'_> {
        ResourceGuard {
            id,
            _lock: self.resources[id.index()].lock(),
        }
    }
}

/// Ownership of one resource. Dropping the guard releases the resource and
/// wakes at most one waiter.
#[derive(Debug)]
#[must_use = "dropping the guard releases the resource immediately"]
pub struct ResourceGuard<'p> {
    id: ResourceId,
    _lock: MutexGuard<'p, ()>,
}

impl ResourceGuard<'_> {
    /// The resource this guard holds.
    pub fn id(&self) -> ResourceId {
        self.id
    }
}
