//! Errors surfaced to callers of this crate.

use crate::balancer::SelectError;

/// Invalid construction input. Returned synchronously and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No directory handle was supplied to a resolver.
    #[error("directory client must be set")]
    MissingDirectory,
    /// The service name was empty.
    #[error("service name must not be empty")]
    EmptyServiceName,
    /// A transport was built without any resolvers.
    #[error("no resolver provided")]
    NoResolvers,
    /// Two resolvers were registered for the same service name.
    #[error("more than one resolver registered for service {0}")]
    DuplicateService(String),
    /// A resolver was created outside of a Tokio runtime.
    #[error("resolver must be created within a tokio runtime")]
    NoRuntime,
}

/// Errors produced while resolving a service address.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The balancer had no viable target to offer
    #[error("failed to resolve address for service {service}")]
    Selection {
        /// Service the lookup was for.
        service: String,
        /// Why the balancer failed.
        #[source]
        source: SelectError,
    },
    /// The resolver's governing cancellation has fired
    #[error("resolver for service {service} has been shut down")]
    Stale {
        /// Service the resolver was watching.
        service: String,
    },
}
