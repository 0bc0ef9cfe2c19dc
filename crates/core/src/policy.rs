//! The two acquisition policies.

use crate::traits::AcquisitionPolicy;
use gridlock_types::{AcquisitionMode, ResourceId, WorkerId};
use std::sync::Arc;

/// Parity-dependent lock order.
///
/// Even workers take `(a, b)`, odd workers take `(b, a)`. Two workers of
/// opposite parity that chose the same pair can each end up holding one
/// resource while waiting for the other. This is the negative control and
/// must not be "fixed".
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered;

impl AcquisitionPolicy for Unordered {
    fn mode(&self) -> AcquisitionMode {
        AcquisitionMode::Unordered
    }

    fn order(&self, worker: WorkerId, a: ResourceId, b: ResourceId) -> (ResourceId, ResourceId) {
        if worker.is_odd() {
            (b, a)
        } else {
            (a, b)
        }
    }
}

/// Ascending resource order.
///
/// Every worker takes `(min, max)`. A worker blocked on resource `r` holds
/// at most one resource, and that one is strictly lower than `r`. Along any
/// chain of wait-for edges the awaited index therefore strictly increases,
/// so the chain cannot return to its start: the wait-for graph is acyclic
/// for every `R >= 2` and `W >= 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalOrder;

impl AcquisitionPolicy for TotalOrder {
    fn mode(&self) -> AcquisitionMode {
        AcquisitionMode::TotalOrder
    }

    fn order(&self, _worker: WorkerId, a: ResourceId, b: ResourceId) -> (ResourceId, ResourceId) {
        (a.min(b), a.max(b))
    }
}

/// Build the policy for a mode.
pub fn policy_for(mode: AcquisitionMode) -> Arc<dyn AcquisitionPolicy> {
    match mode {
        AcquisitionMode::Unordered => Arc::new(Unordered),
        AcquisitionMode::TotalOrder => Arc::new(TotalOrder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlock_types::PairingRule;

    #[test]
    fn test_unordered_flips_odd_workers() {
        let (a, b) = (ResourceId(0), ResourceId(1));
        assert_eq!(Unordered.order(WorkerId(0), a, b), (a, b));
        assert_eq!(Unordered.order(WorkerId(1), a, b), (b, a));
        assert_eq!(Unordered.order(WorkerId(2), a, b), (a, b));
        assert_eq!(Unordered.order(WorkerId(3), a, b), (b, a));
    }

    #[test]
    fn test_total_order_is_ascending() {
        for worker in 0..6 {
            let w = WorkerId(worker);
            assert_eq!(
                TotalOrder.order(w, ResourceId(4), ResourceId(2)),
                (ResourceId(2), ResourceId(4))
            );
            assert_eq!(
                TotalOrder.order(w, ResourceId(2), ResourceId(4)),
                (ResourceId(2), ResourceId(4))
            );
        }
    }

    #[test]
    fn test_policy_for_mode() {
        for mode in AcquisitionMode::ALL {
            assert_eq!(policy_for(mode).mode(), mode);
        }
    }

    #[test]
    fn test_paired_couples_conflict_only_when_unordered() {
        // Workers 0 and 1 share a pair; unordered puts them in opposite order.
        let rule = PairingRule::Paired;
        let (a0, b0) = rule.choose(WorkerId(0), 5);
        let (a1, b1) = rule.choose(WorkerId(1), 5);

        let u0 = Unordered.order(WorkerId(0), a0, b0);
        let u1 = Unordered.order(WorkerId(1), a1, b1);
        assert_eq!(u0, (u1.1, u1.0));

        let t0 = TotalOrder.order(WorkerId(0), a0, b0);
        let t1 = TotalOrder.order(WorkerId(1), a1, b1);
        assert_eq!(t0, t1);
    }

    #[test]
    fn test_total_order_chains_strictly_increase() {
        // Each worker's second lock is above its first, for every pairing.
        for rule in [PairingRule::Paired, PairingRule::Adjacent] {
            for resources in 2..=8 {
                for worker in 0..20 {
                    let w = WorkerId(worker);
                    let (a, b) = rule.choose(w, resources);
                    let (first, second) = TotalOrder.order(w, a, b);
                    assert!(first < second);
                }
            }
        }
    }
}
