//! Wait-for graph built from worker snapshots.
//!
//! Each worker waits for at most one resource and each resource has at most
//! one owner, so every worker has at most one outgoing edge
//! (`waiter -> owner of the awaited resource`). A cycle in that graph is a
//! set of workers that can never make progress again.

use gridlock_types::{ResourceId, WorkerId, WorkerSnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Ownership and blocking relations derived from one snapshot.
///
/// Maintains both directions so blame can be read either way:
///
/// 1. Given a resource, who owns it and who is queued on it?
/// 2. Given a worker, whom is it waiting for?
#[derive(Debug, Default)]
pub struct WaitForGraph {
    /// resource -> worker holding it
    owners: HashMap<ResourceId, WorkerId>,
    /// worker -> resource it is blocked on
    awaiting: BTreeMap<WorkerId, ResourceId>,
    /// Reverse index: resource -> workers blocked on it
    waiters: HashMap<ResourceId, BTreeSet<WorkerId>>,
}

impl WaitForGraph {
    /// Build the graph from snapshots.
    ///
    /// If stale snapshots disagree about who owns a resource, the lower
    /// worker id is kept.
    pub fn from_snapshots(snapshots: &[WorkerSnapshot]) -> Self {
        let mut graph = Self::default();
        for snap in snapshots {
            for resource in snap.held.iter() {
                graph.owners.entry(resource).or_insert(snap.worker);
            }
            if let Some(resource) = snap.awaiting {
                graph.awaiting.insert(snap.worker, resource);
                graph
                    .waiters
                    .entry(resource)
                    .or_default()
                    .insert(snap.worker);
            }
        }
        graph
    }

    /// Worker holding a resource.
    pub fn owner_of(&self, resource: ResourceId) -> Option<WorkerId> {
        self.owners.get(&resource).copied()
    }

    /// Workers blocked on a resource.
    pub fn waiters_on(&self, resource: ResourceId) -> Option<&BTreeSet<WorkerId>> {
        self.waiters.get(&resource)
    }

    /// Worker that `worker` is waiting for, if it is blocked on an owned
    /// resource held by somebody else.
    pub fn blocked_on(&self, worker: WorkerId) -> Option<WorkerId> {
        let resource = self.awaiting.get(&worker)?;
        self.owner_of(*resource).filter(|owner| *owner != worker)
    }

    /// Number of wait-for edges.
    pub fn edge_count(&self) -> usize {
        self.awaiting
            .keys()
            .filter(|w| self.blocked_on(**w).is_some())
            .count()
    }

    /// All cycles, each rotated to start at its lowest worker id and listed
    /// in wait-for order.
    pub fn cycles(&self) -> Vec<Vec<WorkerId>> {
        // 0 = unvisited, 1 = on the current walk, 2 = finished
        let mut mark: HashMap<WorkerId, u8> = HashMap::new();
        let mut cycles = Vec::new();

        for &start in self.awaiting.keys() {
            if mark.contains_key(&start) {
                continue;
            }
            let mut walk = Vec::new();
            let mut current = Some(start);
            while let Some(worker) = current {
                match mark.get(&worker).copied().unwrap_or(0) {
                    0 => {
                        mark.insert(worker, 1);
                        walk.push(worker);
                        current = self.blocked_on(worker);
                    }
                    1 => {
                        // Closed a loop within this walk.
                        if let Some(pos) = walk.iter().position(|w| *w == worker) {
                            cycles.push(rotate_to_min(&walk[pos..]));
                        }
                        break;
                    }
                    _ => break,
                }
            }
            for worker in walk {
                mark.insert(worker, 2);
            }
        }

        cycles.sort();
        cycles
    }

    /// Whether the graph contains a cycle of exactly two workers.
    pub fn has_two_cycle(&self) -> bool {
        self.cycles().iter().any(|c| c.len() == 2)
    }
}

fn rotate_to_min(cycle: &[WorkerId]) -> Vec<WorkerId> {
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, w)| **w)
        .map_or(0, |(i, _)| i);
    cycle[min_pos..]
        .iter()
        .chain(&cycle[..min_pos])
        .copied()
        .collect()
}
