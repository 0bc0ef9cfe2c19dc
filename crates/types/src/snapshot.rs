//! Point-in-time views of per-worker lock state.

use crate::{ResourceId, WorkerId};
use serde::Serialize;
use std::fmt;

/// Resources a worker currently owns, in acquisition order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "Vec<ResourceId>")]
pub enum Held {
    /// Nothing held.
    #[default]
    None,
    /// One resource held.
    One(ResourceId),
    /// Two resources held, first acquired first.
    Two(ResourceId, ResourceId),
}

impl Held {
    /// Build from the two raw slots, skipping empty ones.
    pub fn from_slots(first: Option<ResourceId>, second: Option<ResourceId>) -> Self {
        match (first, second) {
            (Some(a), Some(b)) => Held::Two(a, b),
            (Some(a), None) | (None, Some(a)) => Held::One(a),
            (None, None) => Held::None,
        }
    }

    /// Number of resources held (0..=2).
    pub fn len(&self) -> usize {
        match self {
            Held::None => 0,
            Held::One(_) => 1,
            Held::Two(_, _) => 2,
        }
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        matches!(self, Held::None)
    }

    /// Whether the given resource is held.
    pub fn contains(&self, resource: ResourceId) -> bool {
        self.iter().any(|r| r == resource)
    }

    /// Iterate held resources in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = ResourceId> {
        let (first, second) = match *self {
            Held::None => (None, None),
            Held::One(a) => (Some(a), None),
            Held::Two(a, b) => (Some(a), Some(b)),
        };
        first.into_iter().chain(second)
    }
}

impl From<Held> for Vec<ResourceId> {
    fn from(held: Held) -> Self {
        held.iter().collect()
    }
}

impl fmt::Display for Held {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Held::None => write!(f, "(-,-)"),
            Held::One(a) => write!(f, "({},-)", a.0),
            Held::Two(a, b) => write!(f, "({},{})", a.0, b.0),
        }
    }
}

/// Diagnostic record for one worker.
///
/// Taken without synchronising with the worker, so the fields may be
/// mutually stale by a few microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    /// Worker this record describes.
    pub worker: WorkerId,
    /// Resources held at capture time.
    pub held: Held,
    /// Resource the worker was blocked on, if any.
    pub awaiting: Option<ResourceId>,
    /// Seconds since the worker last completed a full cycle.
    pub seconds_since_last_progress: f64,
    /// Cycles completed by this worker.
    pub completed_ops: u64,
}

impl WorkerSnapshot {
    /// Whether the worker holds something and waits for something else.
    pub fn is_hold_and_wait(&self) -> bool {
        !self.held.is_empty() && self.awaiting.is_some()
    }
}

impl fmt::Display for WorkerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let awaiting = match self.awaiting {
            Some(r) => r.0.to_string(),
            None => "-".to_string(),
        };
        write!(
            f,
            "{}: hold={} wait={} last_prog={:.2}s ops={}",
            self.worker, self.held, awaiting, self.seconds_since_last_progress, self.completed_ops
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_from_slots() {
        assert_eq!(Held::from_slots(None, None), Held::None);
        assert_eq!(
            Held::from_slots(Some(ResourceId(2)), None),
            Held::One(ResourceId(2))
        );
        assert_eq!(
            Held::from_slots(None, Some(ResourceId(4))),
            Held::One(ResourceId(4))
        );
        let two = Held::from_slots(Some(ResourceId(3)), Some(ResourceId(1)));
        assert_eq!(two, Held::Two(ResourceId(3), ResourceId(1)));
        assert_eq!(two.len(), 2);
        assert!(two.contains(ResourceId(1)));
        assert!(!two.contains(ResourceId(0)));
        assert_eq!(two.iter().collect::<Vec<_>>(), vec![ResourceId(3), ResourceId(1)]);
    }

    #[test]
    fn test_snapshot_display_and_json() {
        let snap = WorkerSnapshot {
            worker: WorkerId(1),
            held: Held::One(ResourceId(1)),
            awaiting: Some(ResourceId(0)),
            seconds_since_last_progress: 3.2,
            completed_ops: 17,
        };
        assert!(snap.is_hold_and_wait());
        assert_eq!(
            snap.to_string(),
            "W01: hold=(1,-) wait=0 last_prog=3.20s ops=17"
        );

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["held"], serde_json::json!([1]));
        assert_eq!(json["awaiting"], serde_json::json!(0));
        assert_eq!(json["worker"], serde_json::json!(1));
    }
}
