use crate::config::DelayRange;
use gridlock_core::CriticalSection;
use gridlock_types::{ResourceId, WorkerId};
use rand::RngCore;
use std::thread;
use tracing::trace;

/// Holds the resources for a random time drawn from a [`DelayRange`].
#[derive(Debug, Clone, Copy)]
pub struct SleepWork {
    duration: DelayRange,
}

impl SleepWork {
    /// Create a workload sleeping for a duration drawn from `duration`.
    pub fn new(duration: DelayRange) -> Self {
        Self { duration }
    }
}

impl CriticalSection for SleepWork {
    fn run(&self, worker: WorkerId, held: (ResourceId, ResourceId), rng: &mut dyn RngCore) {
        let pause = self.duration.sample(rng);
        trace!(worker = %worker, first = %held.0, second = %held.1, ?pause, "Critical section");
        thread::sleep(pause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::{Duration, Instant};

    #[test]
    fn test_sleep_work_is_bounded() {
        let work = SleepWork::new(DelayRange::millis(1, 2));
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let start = Instant::now();
        work.run(WorkerId(0), (ResourceId(0), ResourceId(1)), &mut rng);
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(1));
        assert!(elapsed < Duration::from_secs(1));
    }
}
