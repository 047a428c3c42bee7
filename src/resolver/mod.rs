//! Service resolvers backed by a [`Directory`].

use crate::{
    balancer::{Balancer, RoundRobin},
    directory::Directory,
    ConfigError, Error, ServiceAddress,
};
use async_trait::async_trait;
use std::{fmt, iter, sync::Arc, time::Duration};
use tokio::{runtime::Handle, sync::watch};
use tokio_util::sync::CancellationToken;

mod backoff;

mod priority;
use priority::PriorityTable;

mod watcher;
use watcher::Watcher;

/// Anything that can produce an address for a named service.
///
/// [`RoutingTransport`](crate::RoutingTransport) routes requests through
/// implementors of this trait, keyed by [`Resolve::service_name`].
#[async_trait]
pub trait Resolve: Send + Sync + 'static {
    /// Resolves a single address for the service.
    async fn resolve(&self) -> Result<ServiceAddress, Error>;

    /// Name of the service addresses are resolved for. Requests whose host
    /// does not match this name are not routed through the resolver.
    fn service_name(&self) -> &str;
}

/// Which instances of a service to discover, and how to address them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    name: String,
    port: Option<u16>,
    tags: Vec<String>,
    include_unhealthy: bool,
}

impl ServiceSpec {
    /// Creates a spec for the service registered as `name`.
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            port: None,
            tags: Vec::new(),
            include_unhealthy: false,
        }
    }

    /// Overrides the port discovered in the directory. Zero keeps the
    /// discovered port.
    pub fn port(self, port: u16) -> Self {
        Self {
            port: (port > 0).then_some(port),
            ..self
        }
    }

    /// Only discovers instances carrying all of `tags`.
    pub fn tags<I, T>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Also discovers instances failing their health checks.
    pub fn include_unhealthy(self, include_unhealthy: bool) -> Self {
        Self {
            include_unhealthy,
            ..self
        }
    }

    /// Name of the service.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn address_of(&self, instance: &crate::Instance) -> ServiceAddress {
        ServiceAddress {
            host: instance.host().to_string(),
            port: self.port.unwrap_or(instance.port),
        }
    }
}

#[derive(Debug, Clone)]
struct Options {
    query_interval: Duration,
    max_backoff: Duration,
    max_elapsed: Option<Duration>,
    wait_time: Option<Duration>,
    allow_stale: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            query_interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_elapsed: None,
            wait_time: None,
            allow_stale: false,
        }
    }
}

/// Configuration for a [`ServiceResolver`].
pub struct ResolverConfig<D> {
    directory: Option<Arc<D>>,
    spec: ServiceSpec,
    balancer: Option<Arc<dyn Balancer>>,
    fallback_datacenters: Vec<String>,
    options: Options,
}

impl<D> ResolverConfig<D> {
    /// Creates a configuration for resolving `spec`.
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            directory: None,
            spec,
            balancer: None,
            fallback_datacenters: Vec::new(),
            options: Options::default(),
        }
    }

    /// Sets the directory instances are discovered from. Required.
    pub fn directory(self, directory: Arc<D>) -> Self {
        Self {
            directory: Some(directory),
            ..self
        }
    }

    /// Sets the balancer targets are selected with. Defaults to [`RoundRobin`].
    pub fn balancer(self, balancer: impl Balancer) -> Self {
        Self {
            balancer: Some(Arc::new(balancer)),
            ..self
        }
    }

    /// Datacenters to fail over to, in order, when the local datacenter has
    /// no instances.
    pub fn fallback_datacenters<I, T>(self, datacenters: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            fallback_datacenters: datacenters.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Minimum time between two queries of one datacenter. Defaults to one
    /// second; clamped to at least one millisecond.
    pub fn query_interval(mut self, interval: Duration) -> Self {
        self.options.query_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Upper bound on the delay between retries of a failing query. Defaults
    /// to 30 seconds.
    pub fn max_backoff_interval(mut self, interval: Duration) -> Self {
        self.options.max_backoff = interval;
        self
    }

    /// How long to keep retrying a failing query before giving up until the
    /// next poll. Defaults to retrying forever.
    pub fn max_elapsed_time(mut self, max_elapsed: Option<Duration>) -> Self {
        self.options.max_elapsed = max_elapsed;
        self
    }

    /// How long the directory may hold a blocking query open. Defaults to
    /// the directory's own limit.
    pub fn wait_time(mut self, wait: Duration) -> Self {
        self.options.wait_time = Some(wait);
        self
    }

    /// Lets any directory server answer queries, not only the leader.
    pub fn allow_stale(mut self, allow_stale: bool) -> Self {
        self.options.allow_stale = allow_stale;
        self
    }
}

/// State shared by a resolver and its watchers.
pub(crate) struct Shared {
    spec: ServiceSpec,
    options: Options,
    table: PriorityTable,
    balancer: Arc<dyn Balancer>,
    /// Flips to `true` once, on the first successful query of any watcher.
    ready: watch::Sender<bool>,
}

/// Resolves a service to the address of one of its live instances.
///
/// On construction a watcher task is spawned per datacenter: the local one
/// first, then each fallback datacenter in order of preference. Watchers keep
/// the balancer fed with the instances of the most preferred datacenter that
/// has any, and run until the `shutdown` token passed to
/// [`ServiceResolver::new`] fires. After that the resolver is stale and every
/// [`resolve`](ServiceResolver::resolve) fails.
///
/// Must be created from within a Tokio runtime; watchers run on that runtime.
#[derive(Clone)]
pub struct ServiceResolver {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl fmt::Debug for ServiceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceResolver")
            .field("spec", &self.shared.spec)
            .field("ready", &*self.shared.ready.borrow())
            .field("stale", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl ServiceResolver {
    /// Validates `config` and starts watching the directory.
    pub fn new<D: Directory>(
        config: ResolverConfig<D>,
        shutdown: CancellationToken,
    ) -> Result<Self, Error> {
        let directory = config.directory.ok_or(ConfigError::MissingDirectory)?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        if config.spec.name.is_empty() {
            return Err(ConfigError::EmptyServiceName.into());
        }
        let balancer: Arc<dyn Balancer> = match config.balancer {
            Some(balancer) => balancer,
            None => Arc::new(RoundRobin::new()),
        };

        let datacenters: Vec<Option<String>> = iter::once(None)
            .chain(config.fallback_datacenters.into_iter().map(Some))
            .collect();

        let shared = Arc::new(Shared {
            spec: config.spec,
            options: config.options,
            table: PriorityTable::new(datacenters.len()),
            balancer,
            ready: watch::channel(false).0,
        });

        for (priority, datacenter) in datacenters.into_iter().enumerate() {
            let watcher = Watcher {
                directory: directory.clone(),
                shared: shared.clone(),
                datacenter,
                priority,
                shutdown: shutdown.clone(),
            };
            runtime.spawn(watcher.run());
        }

        Ok(Self { shared, shutdown })
    }

    /// Name of the service being resolved.
    pub fn service_name(&self) -> &str {
        &self.shared.spec.name
    }

    /// Whether any watcher has completed a query yet.
    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    /// Resolves the address of one instance picked by the balancer.
    ///
    /// Waits until the first query of any datacenter has succeeded. Dropping
    /// the returned future abandons the wait without affecting the watchers.
    /// The advertised instance address is preferred over its node address,
    /// and the spec's port override over the discovered port.
    pub async fn resolve(&self) -> Result<ServiceAddress, Error> {
        let mut ready = self.shared.ready.subscribe();
        let wait = async move { ready.wait_for(|ready| *ready).await.map(drop) };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(self.stale()),
            res = wait => res.map_err(|_| self.stale())?,
        }

        let instance = self
            .shared
            .balancer
            .select()
            .map_err(|source| Error::Selection {
                service: self.shared.spec.name.clone(),
                source,
            })?;
        Ok(self.shared.spec.address_of(&instance))
    }

    fn stale(&self) -> Error {
        Error::Stale {
            service: self.shared.spec.name.clone(),
        }
    }
}

#[async_trait]
impl Resolve for ServiceResolver {
    async fn resolve(&self) -> Result<ServiceAddress, Error> {
        ServiceResolver::resolve(self).await
    }

    fn service_name(&self) -> &str {
        ServiceResolver::service_name(self)
    }
}
