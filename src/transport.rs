//! Request routing through service resolvers.

use crate::{ConfigError, Error, Resolve, ServiceAddress};
use futures_util::future::BoxFuture;
use http::{
    header::{HeaderValue, HOST},
    uri::{Authority, Scheme},
    Request, Uri,
};
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

/// Errors returned by a [`RoutingTransport`].
#[derive(Debug, thiserror::Error)]
pub enum RoutingError<E> {
    /// The request's service could not be resolved and fallback is disabled
    #[error(transparent)]
    Resolve(Error),
    /// The resolved address could not be written into the request
    #[error("rewriting request target: {0}")]
    Rewrite(#[from] http::Error),
    /// The downstream transport failed
    #[error("downstream transport error")]
    Downstream(#[source] E),
}

/// Configuration for a [`RoutingTransport`].
#[derive(Default)]
pub struct TransportConfig {
    resolvers: Vec<Arc<dyn Resolve>>,
    net_resolver_fallback: bool,
}

impl TransportConfig {
    /// Creates an empty configuration. At least one resolver must be added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes requests whose host equals `resolver`'s service name through it.
    pub fn resolver(mut self, resolver: impl Resolve) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// On resolution failure, sends the request unmodified so the downstream
    /// transport resolves the host itself (e.g. through DNS).
    pub fn net_resolver_fallback(self, net_resolver_fallback: bool) -> Self {
        Self {
            net_resolver_fallback,
            ..self
        }
    }

    fn build(self) -> Result<Routes, ConfigError> {
        if self.resolvers.is_empty() {
            return Err(ConfigError::NoResolvers);
        }

        let mut resolvers = HashMap::with_capacity(self.resolvers.len());
        for resolver in self.resolvers {
            let name = resolver.service_name().to_string();
            if resolvers.contains_key(&name) {
                return Err(ConfigError::DuplicateService(name));
            }
            resolvers.insert(name, resolver);
        }

        Ok(Routes {
            resolvers,
            fallback: self.net_resolver_fallback,
        })
    }
}

struct Routes {
    resolvers: HashMap<String, Arc<dyn Resolve>>,
    fallback: bool,
}

impl Routes {
    /// Picks the resolver by the `Host` header, port stripped, or by the URI
    /// host when the header is absent.
    fn lookup<B>(&self, req: &Request<B>) -> Option<Arc<dyn Resolve>> {
        let host = match req.headers().get(HOST) {
            Some(header) => header.to_str().ok()?.split(':').next()?,
            None => req.uri().host()?,
        };
        self.resolvers.get(host).cloned()
    }
}

impl Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        services.sort_unstable();
        f.debug_struct("Routes")
            .field("services", &services)
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Outbound transport that rewrites requests addressed to a known service
/// name so they target an instance picked by that service's resolver.
///
/// The service is taken from the `Host` header, or from the URI when no
/// `Host` header is set. Requests for hosts with no registered resolver are
/// passed through untouched. The rewritten request keeps the service name as
/// its `Host` header.
pub struct RoutingTransport<S> {
    routes: Arc<Routes>,
    inner: S,
}

impl<S: Clone> Clone for RoutingTransport<S> {
    fn clone(&self) -> Self {
        Self {
            routes: self.routes.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S: Debug> Debug for RoutingTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTransport")
            .field("routes", &self.routes)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S> RoutingTransport<S> {
    /// Wraps the `inner` transport.
    pub fn new(config: TransportConfig, inner: S) -> Result<Self, Error> {
        Ok(Self {
            routes: Arc::new(config.build()?),
            inner,
        })
    }
}

/// Pooling HTTP client used as the default downstream transport.
#[cfg(feature = "client")]
pub type PooledClient<B> = hyper_util::client::legacy::Client<
    hyper_util::client::legacy::connect::HttpConnector,
    B,
>;

#[cfg(feature = "client")]
impl<B> RoutingTransport<PooledClient<B>>
where
    B: hyper::body::Body + Send,
    B::Data: Send,
{
    /// Routes over a pooling `hyper` client.
    pub fn with_pooled_client(config: TransportConfig) -> Result<Self, Error> {
        let client = hyper_util::client::legacy::Client::builder(
            hyper_util::rt::TokioExecutor::new(),
        )
        .build_http();
        Self::new(config, client)
    }
}

impl<S, B> Service<Request<B>> for RoutingTransport<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = RoutingError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RoutingError::Downstream)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Use the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let routes = self.routes.clone();

        Box::pin(async move {
            let Some(resolver) = routes.lookup(&req) else {
                #[cfg(feature = "log")]
                tracing::debug!(uri = %req.uri(), "no resolver found for host");
                return inner.call(req).await.map_err(RoutingError::Downstream);
            };

            let req = match resolver.resolve().await {
                Ok(addr) => retarget(req, &addr)?,
                Err(e) => {
                    #[cfg(feature = "log")]
                    tracing::warn!(
                        service = resolver.service_name(),
                        error = %e,
                        "failed resolving target"
                    );
                    if !routes.fallback {
                        return Err(RoutingError::Resolve(e));
                    }
                    #[cfg(feature = "log")]
                    tracing::info!(
                        service = resolver.service_name(),
                        "falling back to default resolver"
                    );
                    req
                }
            };
            inner.call(req).await.map_err(RoutingError::Downstream)
        })
    }
}

/// Points `req` at `addr`, keeping everything but the URI authority.
fn retarget<B>(req: Request<B>, addr: &ServiceAddress) -> Result<Request<B>, http::Error> {
    let (mut head, body) = req.into_parts();

    if !head.headers.contains_key(HOST) {
        if let Some(authority) = head.uri.authority() {
            let host = HeaderValue::from_str(authority.as_str())?;
            head.headers.insert(HOST, host);
        }
    }

    let mut parts = head.uri.into_parts();
    parts.authority = Some(addr.to_string().parse::<Authority>()?);
    if parts.scheme.is_none() {
        parts.scheme = Some(Scheme::HTTP);
    }
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some("/".parse()?);
    }
    head.uri = Uri::from_parts(parts)?;

    Ok(Request::from_parts(head, body))
}

/// [`Layer`] wrapping services in a [`RoutingTransport`].
#[derive(Clone, Debug)]
pub struct RoutingLayer {
    routes: Arc<Routes>,
}

impl RoutingLayer {
    /// Creates a layer routing through the resolvers in `config`.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            routes: Arc::new(config.build()?),
        })
    }
}

impl<S> Layer<S> for RoutingLayer {
    type Service = RoutingTransport<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RoutingTransport {
            routes: self.routes.clone(),
            inner,
        }
    }
}
