//! The worker loop.

use crate::config::{PhaseConfig, WorkloadConfig};
use gridlock_core::{AcquisitionPolicy, CriticalSection, PhaseSignals, ResourcePool, WorkerSlot};
use gridlock_types::{PairingRule, WorkerId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info_span, trace};

/// One worker: repeatedly takes its two resources, runs the critical
/// section and lets them go, until the phase asks it to stop.
///
/// Stop is checked between cycles and right after each acquire returns. A
/// worker blocked inside an acquire is never interrupted; if it is part of
/// a circular wait it stays blocked and the phase abandons it.
pub struct Worker {
    slot: WorkerSlot,
    pool: Arc<ResourcePool>,
    signals: Arc<PhaseSignals>,
    policy: Arc<dyn AcquisitionPolicy>,
    section: Arc<dyn CriticalSection>,
    pairing: PairingRule,
    delays: WorkloadConfig,
    rng: ChaCha8Rng,
}

impl Worker {
    /// Create a worker for `slot`.
    ///
    /// The random stream is derived from the phase seed and the worker id,
    /// so a given seed always yields the same delay sequence per worker.
    pub fn new(
        slot: WorkerSlot,
        pool: Arc<ResourcePool>,
        signals: Arc<PhaseSignals>,
        policy: Arc<dyn AcquisitionPolicy>,
        section: Arc<dyn CriticalSection>,
        config: &PhaseConfig,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        rng.set_stream(slot.worker().index() as u64);
        Self {
            slot,
            pool,
            signals,
            policy,
            section,
            pairing: config.pairing,
            delays: config.workload.clone(),
            rng,
        }
    }

    /// The worker's id.
    pub fn id(&self) -> WorkerId {
        self.slot.worker()
    }

    /// Run the loop on a dedicated thread. The thread returns the number of
    /// cycles this worker completed.
    pub fn spawn(self) -> io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name(format!("gridlock-worker-{}", self.id().index()))
            .spawn(move || self.run())
    }

    /// Run the loop on the current thread until stop is requested.
    pub fn run(mut self) -> u64 {
        let span = info_span!("worker", id = %self.id());
        let _enter = span.enter();

        let (a, b) = self.pairing.choose(self.id(), self.pool.len());
        debug!(
            mode = %self.policy.mode(),
            pairing = %self.pairing,
            a = %a,
            b = %b,
            "Worker started"
        );

        let mut completed = 0;
        while !self.signals.is_stop_requested() {
            match self.cycle() {
                Some(ops) => completed = ops,
                None => break,
            }
        }

        debug!(ops = completed, "Worker exiting");
        completed
    }

    /// One acquire, work, release, rest cycle.
    ///
    /// Returns this worker's completed count, or `None` if stop was seen
    /// while holding resources and the cycle was abandoned.
    fn cycle(&mut self) -> Option<u64> {
        let worker = self.slot.worker();
        let (a, b) = self.pairing.choose(worker, self.pool.len());
        thread::sleep(self.delays.think.sample(&mut self.rng));

        let (first, second) = self.policy.order(worker, a, b);
        let first_guard = self.slot.acquire(&self.pool, first);
        if self.signals.is_stop_requested() {
            self.slot.release(first_guard);
            return None;
        }

        thread::sleep(self.delays.gap.sample(&mut self.rng));
        let second_guard = self.slot.acquire(&self.pool, second);
        if self.signals.is_stop_requested() {
            self.slot.release(second_guard);
            self.slot.release(first_guard);
            return None;
        }

        self.section.run(worker, (first, second), &mut self.rng);

        let ops = self.slot.record_completion();
        let total = self.signals.record_completed_op();
        trace!(ops, total, "Cycle complete");

        self.slot.release(second_guard);
        self.slot.release(first_guard);

        thread::sleep(self.delays.rest.sample(&mut self.rng));
        Some(ops)
    }
}
