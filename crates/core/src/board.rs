//! Per-worker lock state, kept for diagnosis.
//!
//! Every worker owns exactly one [`WorkerSlot`] and is the only writer of
//! its record. The [`WorkerBoard`] is the read side: anyone holding the
//! board can snapshot any worker, but nobody can write through it.
//!
//! # Staleness
//!
//! Fields are independent atomics and a snapshot reads them one at a time
//! without stopping the worker. A snapshot of a worker that is still making
//! progress can therefore mix values from adjacent instants. That is
//! accepted: snapshots are taken once the phase has stalled, when the
//! records of blocked workers are frozen. Reading a record never takes a
//! lock.
//!
//! # Write ordering
//!
//! - `awaiting` is published before the blocking lock call and cleared only
//!   after the resource has been recorded in `held`, so a worker that is
//!   blocked always shows what it is blocked on.
//! - A resource is added to `held` after the lock is taken and removed
//!   before it is released, so two records never claim the same resource.

use crate::pool::{ResourceGuard, ResourcePool};
use gridlock_types::{Held, ResourceId, WorkerId, WorkerSnapshot};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Sentinel for an empty resource slot.
const EMPTY: usize = usize::MAX;

fn decode(raw: usize) -> Option<ResourceId> {
    (raw != EMPTY).then_some(ResourceId(raw))
}

/// Lock state of one worker.
#[derive(Debug)]
struct WorkerState {
    /// First held resource, in acquisition order.
    held_first: AtomicUsize,
    /// Second held resource.
    held_second: AtomicUsize,
    /// Resource the worker is blocked on.
    awaiting: AtomicUsize,
    /// Nanoseconds since the board epoch at the last completed cycle.
    last_progress_nanos: AtomicU64,
    /// Completed cycles.
    completed_ops: AtomicU64,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            held_first: AtomicUsize::new(EMPTY),
            held_second: AtomicUsize::new(EMPTY),
            awaiting: AtomicUsize::new(EMPTY),
            last_progress_nanos: AtomicU64::new(0),
            completed_ops: AtomicU64::new(0),
        }
    }

    fn held(&self) -> Held {
        Held::from_slots(
            decode(self.held_first.load(Ordering::Acquire)),
            decode(self.held_second.load(Ordering::Acquire)),
        )
    }
}

/// Read side of all worker records in a phase.
#[derive(Debug)]
pub struct WorkerBoard {
    /// Reference point for `last_progress_nanos`.
    epoch: Instant,
    states: Box<[WorkerState]>,
}

impl WorkerBoard {
    /// Create a board for `workers` workers and hand out one slot per worker.
    ///
    /// The slots are the only write capability; each must be moved into the
    /// worker it belongs to.
    pub fn new(workers: usize) -> (Arc<Self>, Vec<WorkerSlot>) {
        let board = Arc::new(Self {
            epoch: Instant::now(),
            states: (0..workers).map(|_| WorkerState::new()).collect(),
        });
        let slots = (0..workers)
            .map(|i| WorkerSlot {
                board: Arc::clone(&board),
                worker: WorkerId(i),
            })
            .collect();
        (board, slots)
    }

    /// Number of workers on the board.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if the board has no workers.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Snapshot a single worker, or `None` if the id is not on the board.
    pub fn snapshot(&self, worker: WorkerId) -> Option<WorkerSnapshot> {
        self.snapshot_at(worker, Instant::now())
    }

    /// Snapshot every worker against a single capture instant.
    pub fn snapshot_all(&self) -> Vec<WorkerSnapshot> {
        let now = Instant::now();
        (0..self.states.len())
            .filter_map(|i| self.snapshot_at(WorkerId(i), now))
            .collect()
    }

    /// Sum of per-worker completed cycles.
    pub fn completed_ops_sum(&self) -> u64 {
        self.states
            .iter()
            .map(|s| s.completed_ops.load(Ordering::Acquire))
            .sum()
    }

    /// Per-worker completed cycles, indexed by worker.
    pub fn completed_ops_by_worker(&self) -> Vec<u64> {
        self.states
            .iter()
            .map(|s| s.completed_ops.load(Ordering::Acquire))
            .collect()
    }

    fn snapshot_at(&self, worker: WorkerId, now: Instant) -> Option<WorkerSnapshot> {
        let state = self.states.get(worker.index())?;
        let last_progress =
            self.epoch + Duration::from_nanos(state.last_progress_nanos.load(Ordering::Acquire));
        Some(WorkerSnapshot {
            worker,
            held: state.held(),
            awaiting: decode(state.awaiting.load(Ordering::Acquire)),
            seconds_since_last_progress: now.saturating_duration_since(last_progress).as_secs_f64(),
            completed_ops: state.completed_ops.load(Ordering::Acquire),
        })
    }
}

/// Write capability for one worker's record.
///
/// Not `Clone`, and only [`WorkerBoard::new`] can create one, so a component
/// handed just the board (the progress monitor) can neither annotate nor
/// acquire:
///
/// ```compile_fail
/// use gridlock_core::{WorkerBoard, WorkerSlot};
/// use gridlock_types::WorkerId;
///
/// fn forge(board: std::sync::Arc<WorkerBoard>) -> WorkerSlot {
///     WorkerSlot { board, worker: WorkerId(0) }
/// }
/// ```
#[derive(Debug)]
pub struct WorkerSlot {
    board: Arc<WorkerBoard>,
    worker: WorkerId,
}

impl WorkerSlot {
    /// The worker this slot belongs to.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Current held set as recorded on the board.
    pub fn held(&self) -> Held {
        self.state().held()
    }

    fn state(&self) -> &WorkerState {
        &self.board.states[self.worker.index()]
    }

    /// Acquire a resource, publishing the intent before blocking.
    ///
    /// Sequence: `awaiting = id`, blocking lock, record `id` in `held`,
    /// `awaiting = none`.
    pub fn acquire<'p>(&mut self, pool: &'p ResourcePool, id: ResourceId) -> ResourceGuard<'p> {
        let state = self.state();
        debug_assert!(
            state.held_second.load(Ordering::Relaxed) == EMPTY,
            "{} already holds two resources",
            self.worker
        );

        state.awaiting.store(id.index(), Ordering::Release);
        trace!(worker = %self.worker, resource = %id, "Waiting for resource");

        let guard = pool.acquire(id);

        if state.held_first.load(Ordering::Relaxed) == EMPTY {
            state.held_first.store(id.index(), Ordering::Release);
        } else {
            state.held_second.store(id.index(), Ordering::Release);
        }
        state.awaiting.store(EMPTY, Ordering::Release);
        trace!(worker = %self.worker, resource = %id, "Acquired resource");

        guard
    }

    /// Release a resource previously acquired through this slot.
    ///
    /// The record is cleared before the lock is dropped.
    pub fn release(&mut self, guard: ResourceGuard<'_>) {
        let id = guard.id();
        let state = self.state();
        let first = state.held_first.load(Ordering::Relaxed);
        let second = state.held_second.load(Ordering::Relaxed);

        if second == id.index() {
            state.held_second.store(EMPTY, Ordering::Release);
        } else {
            debug_assert_eq!(
                first,
                id.index(),
                "{} released {} it never recorded",
                self.worker,
                id
            );
            // Keep acquisition order: the remaining resource moves up.
            state.held_first.store(second, Ordering::Release);
            state.held_second.store(EMPTY, Ordering::Release);
        }

        drop(guard);
        trace!(worker = %self.worker, resource = %id, "Released resource");
    }

    /// Record one completed cycle. Returns this worker's new total.
    pub fn record_completion(&mut self) -> u64 {
        let state = self.state();
        let since_epoch = self.board.epoch.elapsed().as_nanos();
        state
            .last_progress_nanos
            .store(u64::try_from(since_epoch).unwrap_or(u64::MAX), Ordering::Release);
        state.completed_ops.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_new_board_is_idle() {
        let (board, slots) = WorkerBoard::new(3);
        assert_eq!(board.len(), 3);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[2].worker(), WorkerId(2));

        for snap in board.snapshot_all() {
            assert_eq!(snap.held, Held::None);
            assert_eq!(snap.awaiting, None);
            assert_eq!(snap.completed_ops, 0);
        }
        assert!(board.snapshot(WorkerId(3)).is_none());
    }

    #[test]
    fn test_acquire_release_keeps_order() {
        let pool = ResourcePool::new(4);
        let (board, mut slots) = WorkerBoard::new(1);
        let slot = &mut slots[0];

        let g3 = slot.acquire(&pool, ResourceId(3));
        assert_eq!(slot.held(), Held::One(ResourceId(3)));
        let g1 = slot.acquire(&pool, ResourceId(1));
        assert_eq!(slot.held(), Held::Two(ResourceId(3), ResourceId(1)));
        assert_eq!(board.snapshot(WorkerId(0)).unwrap().awaiting, None);

        // Releasing the first moves the second up.
        slot.release(g3);
        assert_eq!(slot.held(), Held::One(ResourceId(1)));
        assert!(!pool.is_held(ResourceId(3)));

        slot.release(g1);
        assert_eq!(slot.held(), Held::None);
        assert!(!pool.is_held(ResourceId(1)));
    }

    #[test]
    fn test_record_completion() {
        let (board, mut slots) = WorkerBoard::new(2);
        assert_eq!(slots[0].record_completion(), 1);
        assert_eq!(slots[0].record_completion(), 2);
        assert_eq!(slots[1].record_completion(), 1);

        assert_eq!(board.completed_ops_sum(), 3);
        assert_eq!(board.completed_ops_by_worker(), vec![2, 1]);

        let snap = board.snapshot(WorkerId(0)).unwrap();
        assert!(snap.seconds_since_last_progress < 1.0);
    }

    #[test]
    fn test_blocked_worker_shows_awaiting() {
        let pool = Arc::new(ResourcePool::new(2));
        let (board, slots) = WorkerBoard::new(2);
        let mut slots = slots.into_iter();
        let mut holder = slots.next().unwrap();
        let mut waiter = slots.next().unwrap();

        let held = holder.acquire(&pool, ResourceId(0));
        let ready = Arc::new(Barrier::new(2));

        let handle = {
            let pool = Arc::clone(&pool);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                let own = waiter.acquire(&pool, ResourceId(1));
                ready.wait();
                let contended = waiter.acquire(&pool, ResourceId(0));
                waiter.release(contended);
                waiter.release(own);
                waiter
            })
        };

        ready.wait();
        // Wait for the annotation to appear; it is written before blocking.
        let mut snap = board.snapshot(WorkerId(1)).unwrap();
        for _ in 0..100 {
            if snap.awaiting.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
            snap = board.snapshot(WorkerId(1)).unwrap();
        }
        assert_eq!(snap.awaiting, Some(ResourceId(0)));
        assert_eq!(snap.held, Held::One(ResourceId(1)));
        assert!(snap.is_hold_and_wait());

        holder.release(held);
        let waiter = handle.join().unwrap();
        assert_eq!(waiter.held(), Held::None);
        assert_eq!(board.snapshot(WorkerId(1)).unwrap().awaiting, None);
    }
}
