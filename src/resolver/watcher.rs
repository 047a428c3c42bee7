//! Background polling of one datacenter.

use super::{backoff::ExponentialBackoff, Shared};
use crate::directory::{Directory, Query};
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Blocking-query index of the last snapshot a watcher saw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueryCursor {
    last_index: u64,
}

impl QueryCursor {
    pub(crate) fn index(&self) -> u64 {
        self.last_index
    }

    /// Moves the cursor to the index a query returned. An index older than
    /// the one sent means the directory's history restarted, so the next
    /// query goes out non-blocking.
    pub(crate) fn advance(&mut self, returned: u64) {
        self.last_index = if returned < self.last_index {
            0
        } else {
            returned.max(1)
        };
    }
}

/// Polls the directory for one (service, datacenter) pair until the
/// resolver's cancellation fires.
pub(crate) struct Watcher<D> {
    pub(crate) directory: Arc<D>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) datacenter: Option<String>,
    pub(crate) priority: usize,
    pub(crate) shutdown: CancellationToken,
}

impl<D: Directory> Watcher<D> {
    pub(crate) async fn run(self) {
        let options = &self.shared.options;
        let mut throttle = time::interval(options.query_interval);
        throttle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = ExponentialBackoff::new(options.max_backoff, options.max_elapsed);
        let mut cursor = QueryCursor::default();

        'watch: loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'watch,
                _ = throttle.tick() => {}
            }

            backoff.reset();
            loop {
                let result = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break 'watch,
                    result = self.poll(&mut cursor) => result,
                };
                let Err(error) = result else {
                    break;
                };

                let Some(delay) = backoff.next_backoff() else {
                    #[cfg(feature = "log")]
                    tracing::error!(
                        service = %self.shared.spec.name,
                        datacenter = self.datacenter.as_deref().unwrap_or("local"),
                        %error,
                        "failure querying directory, giving up until next poll"
                    );
                    break;
                };

                #[cfg(feature = "log")]
                tracing::warn!(
                    service = %self.shared.spec.name,
                    datacenter = self.datacenter.as_deref().unwrap_or("local"),
                    ?delay,
                    %error,
                    "failure querying directory, retrying"
                );
                #[cfg(not(feature = "log"))]
                let _ = error;

                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break 'watch,
                    _ = time::sleep(delay) => {}
                }
            }
        }

        #[cfg(feature = "log")]
        tracing::debug!(
            service = %self.shared.spec.name,
            datacenter = self.datacenter.as_deref().unwrap_or("local"),
            "resolver cancelled, stopping directory watcher"
        );
    }

    /// Runs one blocking query and feeds its snapshot into arbitration.
    async fn poll(&self, cursor: &mut QueryCursor) -> Result<(), D::Error> {
        let spec = &self.shared.spec;
        let query = Query {
            service: &spec.name,
            tags: &spec.tags,
            healthy_only: !spec.include_unhealthy,
            datacenter: self.datacenter.as_deref(),
            wait_index: cursor.index(),
            wait_time: self.shared.options.wait_time,
            allow_stale: self.shared.options.allow_stale,
        };
        let snapshot = self.directory.query(&query).await?;
        cursor.advance(snapshot.index);

        self.shared.table.arbitrate(
            self.priority,
            snapshot.instances,
            self.shared.balancer.as_ref(),
        );
        self.shared.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        Ok(())
    }
}
