use super::{Balancer, SelectError};
use crate::Instance;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through the targets in order.
///
/// The cursor survives target updates, so the starting offset after an
/// update is arbitrary.
#[derive(Debug, Default)]
pub struct RoundRobin {
    targets: ArcSwap<Vec<Instance>>,
    next: AtomicUsize,
}

impl RoundRobin {
    /// Creates a balancer with no targets.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobin {
    fn select(&self) -> Result<Instance, SelectError> {
        let targets = self.targets.load();
        if targets.is_empty() {
            return Err(SelectError::NoTargets);
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % targets.len();
        Ok(targets[idx].clone())
    }

    fn update_targets(&self, targets: Vec<Instance>) {
        self.targets.store(targets.into());
    }
}
