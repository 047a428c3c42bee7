//! Target selection strategies.
//!
//! A [`Balancer`] is handed the active instance set by a resolver whenever it
//! changes and picks one instance per request. Selection must never block:
//! many callers select concurrently while a single watcher replaces targets.

use crate::Instance;

mod round_robin;
pub use round_robin::RoundRobin;

mod tag_aware;
pub use tag_aware::TagAware;

/// Reasons a [`Balancer`] could not produce a target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// The target list is empty
    #[error("unable to select target from empty list")]
    NoTargets,
    /// No target carries any of the preferred tags and fallback is disabled
    #[error("no targets found matching tags {tags:?}")]
    NoTagMatch {
        /// The preferred tags, in order.
        tags: Vec<String>,
    },
}

/// Strategy for picking a target out of the active instance set.
pub trait Balancer: Send + Sync + 'static {
    /// Picks a target. Must return promptly, failing rather than waiting when
    /// no target is viable.
    fn select(&self) -> Result<Instance, SelectError>;

    /// Replaces the set of targets `select` may choose from.
    fn update_targets(&self, targets: Vec<Instance>);
}

impl<B: Balancer + ?Sized> Balancer for std::sync::Arc<B> {
    fn select(&self) -> Result<Instance, SelectError> {
        (**self).select()
    }

    fn update_targets(&self, targets: Vec<Instance>) {
        (**self).update_targets(targets)
    }
}
