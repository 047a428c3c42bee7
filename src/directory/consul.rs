//! Directory backed by the Consul health HTTP API.

use super::{Directory, Query, Snapshot};
use crate::Instance;
use async_trait::async_trait;
use serde::Deserialize;

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Errors encountered talking to Consul.
#[derive(Debug, thiserror::Error)]
pub enum ConsulError {
    /// Transport failures and non-success status codes
    #[error("consul request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The response did not carry a usable blocking-query index
    #[error("consul response carried no valid X-Consul-Index header")]
    MissingIndex,
}

/// [`Directory`] querying `/v1/health/service/:service` on a Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulDirectory {
    http: reqwest::Client,
    address: String,
    token: Option<String>,
}

impl ConsulDirectory {
    /// Creates a directory talking to the agent at `address`, e.g.
    /// `http://127.0.0.1:8500`.
    pub fn new(address: impl ToString) -> Self {
        Self {
            http: reqwest::Client::new(),
            address: address.to_string().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Sets the ACL token sent with every query.
    pub fn token(self, token: impl ToString) -> Self {
        Self {
            token: Some(token.to_string()),
            ..self
        }
    }

    /// Sets the HTTP client used for queries.
    pub fn http_client(self, http: reqwest::Client) -> Self {
        Self { http, ..self }
    }

    fn params(query: &Query<'_>) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if query.healthy_only {
            params.push(("passing", String::from("true")));
        }
        for tag in query.tags {
            params.push(("tag", tag.clone()));
        }
        if let Some(dc) = query.datacenter {
            params.push(("dc", dc.to_string()));
        }
        if query.wait_index > 0 {
            params.push(("index", query.wait_index.to_string()));
        }
        if let Some(wait) = query.wait_time {
            params.push(("wait", format!("{}ms", wait.as_millis())));
        }
        if query.allow_stale {
            params.push(("stale", String::new()));
        }
        params
    }
}

#[async_trait]
impl Directory for ConsulDirectory {
    type Error = ConsulError;

    async fn query(&self, query: &Query<'_>) -> Result<Snapshot, Self::Error> {
        let url = format!("{}/v1/health/service/{}", self.address, query.service);
        let mut request = self.http.get(url).query(&Self::params(query));
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?.error_for_status()?;
        let index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or(ConsulError::MissingIndex)?;
        let entries: Vec<ServiceEntry> = response.json().await?;

        Ok(Snapshot {
            instances: entries.into_iter().map(Instance::from).collect(),
            index,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    node: Node,
    service: AgentService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Node {
    #[serde(default)]
    address: String,
    #[serde(default)]
    datacenter: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl From<ServiceEntry> for Instance {
    fn from(entry: ServiceEntry) -> Self {
        Instance {
            id: entry.service.id,
            address: entry.service.address,
            node_address: entry.node.address,
            port: entry.service.port,
            tags: entry.service.tags.unwrap_or_default(),
            datacenter: entry.node.datacenter,
        }
    }
}
