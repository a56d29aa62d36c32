//! Cluster directory resolution from the central management endpoint
//!
//! Prism Central exposes its registered clusters through three API schemas.
//! The schema is selected once at startup; each resolve issues one list
//! request, decodes it through the schema's typed response structures, and
//! adapts the result into a `name -> https://{ip}:9440` mapping.
//!
//! A resolve either yields the complete mapping or one error. Individual
//! entries may be dropped (unnamed, no external IPv4, outside the configured
//! prefix) and such drops are logged, but a transport failure or a response
//! that does not match the schema aborts the whole resolution.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::client::ApiTransport;
use crate::error::Error;
use crate::MANAGEMENT_PORT;

/// Deadline for one complete resolve-and-decode operation
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Page size of the single v3 list request
///
/// The v3 listing is intentionally single-page: clusters beyond the first
/// 100 entries are not discovered. The cap is enforced locally as well so the
/// behavior is the same whatever the upstream returns.
pub const V3_PAGE_SIZE: usize = 100;

/// Cluster name Prism Central reports for unconfigured entries
const UNNAMED_SENTINEL: &str = "Unnamed";

const V3_LIST_PATH: &str = "/api/nutanix/v3/clusters/list";
const V4_LIST_PATH: &str = "/api/clustermgmt/v4.0/config/clusters";
const V4_BETA1_LIST_PATH: &str = "/api/clustermgmt/v4.0.b1/config/clusters";

/// Central API schema used for cluster discovery
///
/// Fixed per process; selected through configuration at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SchemaVersion {
    /// Legacy v3 list API (POST, single page of 100 entries)
    V3,
    /// Stable v4 cluster management API
    #[default]
    V4,
    /// v4 beta 1 cluster management API (same response shape as v4)
    V4Beta1,
}

impl SchemaVersion {
    /// Stable identifier used in logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V3 => "v3",
            Self::V4 => "v4",
            Self::V4Beta1 => "v4-beta1",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Typed response schemas
// ---------------------------------------------------------------------------
// Per-entry fields are optional: a malformed entry is dropped, while a
// missing top-level collection means the response as a whole does not match
// the schema and resolution fails.

#[derive(Debug, Deserialize)]
struct V3ListResponse {
    entities: Vec<V3Entity>,
}

#[derive(Debug, Deserialize)]
struct V3Entity {
    #[serde(default)]
    spec: Option<V3Spec>,
    #[serde(default)]
    status: Option<V3Status>,
}

#[derive(Debug, Deserialize)]
struct V3Spec {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V3Status {
    #[serde(default)]
    resources: Option<V3Resources>,
}

#[derive(Debug, Deserialize)]
struct V3Resources {
    #[serde(default)]
    network: Option<V3Network>,
}

#[derive(Debug, Deserialize)]
struct V3Network {
    #[serde(default)]
    external_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V4ListResponse {
    data: Vec<V4Entry>,
}

#[derive(Debug, Deserialize)]
struct V4Entry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    network: Option<V4Network>,
}

#[derive(Debug, Deserialize)]
struct V4Network {
    #[serde(rename = "externalAddress", default)]
    external_address: Option<V4ExternalAddress>,
}

#[derive(Debug, Deserialize)]
struct V4ExternalAddress {
    #[serde(default)]
    ipv4: Option<V4Ipv4>,
}

#[derive(Debug, Deserialize)]
struct V4Ipv4 {
    #[serde(default)]
    value: Option<String>,
}

/// One discovered cluster before filtering
struct Candidate {
    name: Option<String>,
    ip: Option<String>,
}

/// Resolve the cluster directory from the central endpoint
///
/// Returns the complete `name -> endpoint URL` mapping, or a single error if
/// the request, decode, or schema adaptation fails. The whole operation is
/// bounded by [`RESOLVE_TIMEOUT`].
pub async fn resolve(
    api: &dyn ApiTransport,
    version: SchemaVersion,
    prefix: Option<&str>,
) -> crate::Result<BTreeMap<String, String>> {
    tokio::time::timeout(RESOLVE_TIMEOUT, resolve_inner(api, version, prefix))
        .await
        .map_err(|_| Error::timeout("cluster directory resolution"))?
}

async fn resolve_inner(
    api: &dyn ApiTransport,
    version: SchemaVersion,
    prefix: Option<&str>,
) -> crate::Result<BTreeMap<String, String>> {
    let candidates = match version {
        SchemaVersion::V3 => {
            let payload = json!({
                "kind": "cluster",
                "length": V3_PAGE_SIZE,
                "offset": 0,
            });
            let raw = api.post_json(V3_LIST_PATH, payload).await?;
            let response: V3ListResponse = serde_json::from_value(raw)
                .map_err(|e| Error::schema(format!("unexpected v3 cluster list shape: {e}")))?;

            let mut entities = response.entities;
            entities.truncate(V3_PAGE_SIZE);
            entities
                .into_iter()
                .map(|entity| Candidate {
                    name: entity.spec.and_then(|s| s.name),
                    ip: entity
                        .status
                        .and_then(|s| s.resources)
                        .and_then(|r| r.network)
                        .and_then(|n| n.external_ip),
                })
                .collect::<Vec<_>>()
        }
        SchemaVersion::V4 | SchemaVersion::V4Beta1 => {
            let path = match version {
                SchemaVersion::V4 => V4_LIST_PATH,
                _ => V4_BETA1_LIST_PATH,
            };
            let raw = api.get_json(path).await?;
            let response: V4ListResponse = serde_json::from_value(raw).map_err(|e| {
                Error::schema(format!(
                    "unexpected {} cluster list shape: {e}",
                    version.as_str()
                ))
            })?;

            response
                .data
                .into_iter()
                .map(|entry| Candidate {
                    name: entry.name,
                    ip: entry
                        .network
                        .and_then(|n| n.external_address)
                        .and_then(|a| a.ipv4)
                        .and_then(|i| i.value),
                })
                .collect()
        }
    };

    let mut endpoints = BTreeMap::new();
    for candidate in candidates {
        let Some(name) = candidate.name else {
            debug!(schema = version.as_str(), "skipping entry without a name");
            continue;
        };
        if name == UNNAMED_SENTINEL {
            debug!(schema = version.as_str(), "skipping unnamed cluster entry");
            continue;
        }
        let Some(ip) = candidate.ip else {
            debug!(cluster = %name, "skipping cluster without a resolvable external IPv4");
            continue;
        };
        if let Some(prefix) = prefix {
            if !prefix.is_empty() && !name.starts_with(prefix) {
                info!(cluster = %name, prefix, "skipping cluster outside configured prefix");
                continue;
            }
        }

        let endpoint = format!("https://{ip}:{MANAGEMENT_PORT}");
        info!(cluster = %name, endpoint = %endpoint, "discovered cluster");
        endpoints.insert(name, endpoint);
    }

    Ok(endpoints)
}
