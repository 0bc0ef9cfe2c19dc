//! Test fixtures shared across gridlock crates.
//!
//! - [`ForcedCycle`]: two worker threads guaranteed to deadlock on two
//!   resources, for exercising the monitor without timing luck.
//! - [`OccupancyProbe`]: a critical section that records every time two
//!   workers are inside the same resource at once.

use gridlock_core::{CriticalSection, ResourcePool, WorkerBoard};
use gridlock_types::{ResourceId, WorkerId};
use rand::{Rng, RngCore};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Two workers, two resources, opposite lock order, synchronised so both
/// hold their first resource before either requests its second.
///
/// The worker threads never return. They are detached and live until the
/// test process exits.
pub struct ForcedCycle {
    board: Arc<WorkerBoard>,
    pool: Arc<ResourcePool>,
}

impl ForcedCycle {
    /// Spawn the two workers. Worker 0 holds R0 and waits for R1; worker 1
    /// holds R1 and waits for R0.
    pub fn spawn() -> Self {
        let pool = Arc::new(ResourcePool::new(2));
        let (board, slots) = WorkerBoard::new(2);
        let both_hold = Arc::new(Barrier::new(2));

        for mut slot in slots {
            let pool = Arc::clone(&pool);
            let both_hold = Arc::clone(&both_hold);
            let first = ResourceId(slot.worker().index());
            let second = ResourceId(1 - slot.worker().index());
            thread::spawn(move || {
                let _first = slot.acquire(&pool, first);
                both_hold.wait();
                let _second = slot.acquire(&pool, second);
                unreachable!("{} escaped a circular wait", slot.worker());
            });
        }

        Self { board, pool }
    }

    /// Board of the two deadlocked workers.
    pub fn board(&self) -> &Arc<WorkerBoard> {
        &self.board
    }

    /// Pool holding the two contended resources.
    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// Poll until both workers are annotated as waiting, or `timeout`
    /// elapses. Returns whether both were seen blocked.
    pub fn wait_until_blocked(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let blocked = self
                .board
                .snapshot_all()
                .iter()
                .filter(|s| s.is_hold_and_wait())
                .count();
            if blocked == 2 {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

/// Critical section that checks mutual exclusion from the inside.
///
/// Each resource has an occupancy cell. On entry the worker claims the
/// cells of both held resources; finding one already claimed is a
/// violation.
pub struct OccupancyProbe {
    /// worker index + 1 per resource, 0 when free
    occupants: Box<[AtomicUsize]>,
    violations: AtomicU64,
    entries: AtomicU64,
    max_hold: Duration,
}

impl OccupancyProbe {
    /// Create a probe for a pool of `resources`, holding each critical
    /// section for a random time up to `max_hold`.
    pub fn new(resources: usize, max_hold: Duration) -> Self {
        Self {
            occupants: (0..resources).map(|_| AtomicUsize::new(0)).collect(),
            violations: AtomicU64::new(0),
            entries: AtomicU64::new(0),
            max_hold,
        }
    }

    /// Number of times a resource was found occupied on entry.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::SeqCst)
    }

    /// Number of critical sections entered.
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }

    fn claim(&self, resource: ResourceId, worker: WorkerId) {
        let tag = worker.index() + 1;
        if self.occupants[resource.index()]
            .compare_exchange(0, tag, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn vacate(&self, resource: ResourceId, worker: WorkerId) {
        let tag = worker.index() + 1;
        if self.occupants[resource.index()]
            .compare_exchange(tag, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl CriticalSection for OccupancyProbe {
    fn run(&self, worker: WorkerId, held: (ResourceId, ResourceId), rng: &mut dyn RngCore) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        self.claim(held.0, worker);
        self.claim(held.1, worker);

        let max_micros = u64::try_from(self.max_hold.as_micros()).unwrap_or(u64::MAX);
        thread::sleep(Duration::from_micros(rng.gen_range(0..=max_micros)));

        self.vacate(held.1, worker);
        self.vacate(held.0, worker);
    }
}
