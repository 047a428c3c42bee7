//! Arbitration between the snapshots of several datacenters.

use crate::{balancer::Balancer, Instance};
use parking_lot::Mutex;

/// Latest snapshot per datacenter, slot 0 being the most preferred.
///
/// The active set is the first non-empty slot. Every read-decide-write step
/// runs under one lock, including the resulting balancer update, so watchers
/// of different datacenters cannot apply updates out of order.
#[derive(Debug)]
pub(crate) struct PriorityTable {
    slots: Mutex<Vec<Vec<Instance>>>,
}

impl PriorityTable {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new(vec![Vec::new(); len]),
        }
    }

    /// Stores `snapshot` at `priority` and hands the balancer the new active
    /// set if it changed. Returns whether the balancer was updated.
    ///
    /// A change at a priority shadowed by a non-empty higher-priority slot
    /// does not touch the balancer. If every slot is empty the balancer is
    /// given an empty list.
    pub(crate) fn arbitrate(
        &self,
        priority: usize,
        mut snapshot: Vec<Instance>,
        balancer: &dyn Balancer,
    ) -> bool {
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        let mut slots = self.slots.lock();
        if slots[priority] == snapshot {
            return false;
        }
        slots[priority] = snapshot;

        let targets = match slots.iter().position(|slot| !slot.is_empty()) {
            Some(active) if active < priority => return false,
            Some(active) => slots[active].clone(),
            None => Vec::new(),
        };

        #[cfg(feature = "log")]
        tracing::debug!(priority, targets = targets.len(), "active instance set changed");
        balancer.update_targets(targets);
        true
    }
}
