#![deny(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

/*!
Client-side service discovery and load balancing over a directory service
such as Consul.

# Introduction

Application code addresses services by name, e.g. `http://orders/checkout`.
A [`ServiceResolver`] keeps track of the healthy instances of one such
service by continuously running blocking queries against a [`Directory`],
and a [`RoutingTransport`] rewrites outbound requests for that name so they
target an instance picked by the resolver:

```text
Directory ──► watchers (one per datacenter) ──► priority arbitration
          ──► Balancer ──► ServiceResolver::resolve ──► RoutingTransport
```

Instances in the local datacenter are always preferred. A resolver may be
given fallback datacenters, which are only used while every more preferred
datacenter has no instances at all.

# Target Selection

Which instance serves a request is decided by a [`Balancer`]. Two are
provided:

- [`RoundRobin`] (the default) cycles through all instances.
- [`TagAware`] prefers instances carrying the earliest of an ordered list of
  tags, optionally falling back to round-robin when none match.

Other strategies can be plugged in by implementing [`Balancer`].

# Directory Backends

Any type implementing [`Directory`] can feed a resolver. The provided backends
are enabled by the following features:

- `consul` (via [`ConsulDirectory`](directory::consul::ConsulDirectory))

The `client` feature adds [`RoutingTransport::with_pooled_client`], routing
over a pooling `hyper` client. Logging through `tracing` is controlled by the
`log` feature, enabled by default.

[`Directory`]: directory::Directory
[`Balancer`]: balancer::Balancer
[`RoundRobin`]: balancer::RoundRobin
[`TagAware`]: balancer::TagAware
*/

pub mod balancer;

pub mod directory;

mod error;
pub use error::{ConfigError, Error};

mod instance;
pub use instance::{Instance, ServiceAddress};

mod resolver;
pub use resolver::{Resolve, ResolverConfig, ServiceResolver, ServiceSpec};

mod transport;
#[cfg(feature = "client")]
pub use transport::PooledClient;
pub use transport::{RoutingError, RoutingLayer, RoutingTransport, TransportConfig};
