//! Discovered service instances.

use std::fmt::{self, Display};

/// One addressable endpoint of a service, as reported by a [`Directory`].
///
/// Instances are replaced wholesale on every poll and never patched in place.
///
/// [`Directory`]: crate::directory::Directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instance {
    /// Stable identity of the instance within the directory.
    pub id: String,
    /// Address advertised by the service itself. May be empty.
    pub address: String,
    /// Address of the node the instance runs on.
    pub node_address: String,
    /// Port advertised by the service.
    pub port: u16,
    /// Tags attached to the instance.
    pub tags: Vec<String>,
    /// Datacenter the instance was discovered in.
    pub datacenter: String,
}

impl Instance {
    /// Creates an instance with the given identity and advertised address.
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            node_address: String::new(),
            port,
            tags: Vec::new(),
            datacenter: String::new(),
        }
    }

    /// Sets the node address used when the advertised address is empty.
    pub fn with_node_address(mut self, node_address: impl Into<String>) -> Self {
        self.node_address = node_address.into();
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the datacenter.
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = datacenter.into();
        self
    }

    /// Whether the instance carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Host to dial: the advertised address, or the node address if the
    /// service did not advertise one.
    pub fn host(&self) -> &str {
        if self.address.is_empty() {
            &self.node_address
        } else {
            &self.address
        }
    }
}

/// A resolved `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAddress {
    /// Host name or IP literal.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bare IPv6 literals need brackets to form a valid authority.
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
