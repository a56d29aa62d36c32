//! Declarative field-mapping collectors
//!
//! Each cluster carries one collector per [`CollectorKind`]. A collector is
//! driven by an externally supplied mapping file: it names the cluster API
//! endpoint to query, the label the entity name is exported under, and the
//! numeric fields to lift into gauges. Gauges are registered into the owning
//! cluster's isolated registry at construction; `collect` refreshes them on
//! every scrape.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use prometheus::{GaugeVec, Opts, Registry};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::client::ApiTransport;
use crate::error::Error;

/// Namespace prefix of every exported metric
pub const METRIC_NAMESPACE: &str = "nutanix";

/// The fixed set of collector kinds built for every cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    /// Storage container capacity and I/O metrics
    StorageContainer,
    /// Cluster-wide capacity and load metrics
    Cluster,
    /// Per-host hardware and hypervisor metrics
    Host,
    /// Per-VM allocation and usage metrics
    Vm,
}

impl CollectorKind {
    /// Every collector kind, in registration order
    pub const ALL: [CollectorKind; 4] = [
        CollectorKind::StorageContainer,
        CollectorKind::Cluster,
        CollectorKind::Host,
        CollectorKind::Vm,
    ];

    /// File name of this kind's mapping file inside the mapping directory
    pub fn mapping_file(&self) -> &'static str {
        match self {
            Self::StorageContainer => "storage_container.yaml",
            Self::Cluster => "cluster.yaml",
            Self::Host => "host.yaml",
            Self::Vm => "vm.yaml",
        }
    }

    /// Metric subsystem this kind exports under
    pub fn subsystem(&self) -> &'static str {
        match self {
            Self::StorageContainer => "storage_container",
            Self::Cluster => "cluster",
            Self::Host => "host",
            Self::Vm => "vm",
        }
    }
}

/// A unit querying one cluster API and refreshing gauges in that cluster's
/// isolated registry
#[async_trait]
pub trait Collector: Send + Sync {
    /// Short name of this collector for logs
    fn name(&self) -> &'static str;

    /// Query the cluster API and refresh the registered gauges
    async fn collect(&self) -> crate::Result<()>;
}

/// One declarative metric: gauge name, help text, and where its value lives
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MetricMapping {
    /// Exported metric name (without namespace/subsystem)
    pub name: String,
    /// Help text attached to the gauge
    pub help: String,
    /// Nested map holding the field (`stats`, `usage_stats`); top-level when
    /// absent
    #[serde(default)]
    pub source: Option<String>,
    /// JSON field to read; defaults to the metric name
    #[serde(default)]
    pub field: Option<String>,
}

impl MetricMapping {
    /// JSON field the value is read from
    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.name)
    }
}

/// Parsed mapping file driving one collector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MappingFile {
    /// Cluster API endpoint to query
    pub endpoint: String,
    /// Label the entity name is exported under
    pub entity_label: String,
    /// Entity field holding the entity name
    pub name_field: String,
    /// Metrics lifted from each entity
    #[serde(default)]
    pub metrics: Vec<MetricMapping>,
}

impl MappingFile {
    /// Load and parse a mapping file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::mapping(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::mapping(format!("invalid mapping file {}: {e}", path.display())))
    }
}

/// Collector that lifts declaratively mapped fields into gauges
pub struct FieldMappingCollector {
    kind: CollectorKind,
    api: Arc<dyn ApiTransport>,
    endpoint: String,
    name_field: String,
    gauges: Vec<(MetricMapping, GaugeVec)>,
}

impl std::fmt::Debug for FieldMappingCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMappingCollector")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("name_field", &self.name_field)
            .field("gauges", &self.gauges)
            .finish()
    }
}

impl FieldMappingCollector {
    /// Build a collector from a mapping file, registering its gauges
    pub fn from_file(
        kind: CollectorKind,
        api: Arc<dyn ApiTransport>,
        registry: &Registry,
        path: &Path,
    ) -> crate::Result<Self> {
        let mapping = MappingFile::load(path)?;
        Self::new(kind, api, registry, mapping)
    }

    /// Build a collector from an already-parsed mapping, registering its
    /// gauges into the given registry
    pub fn new(
        kind: CollectorKind,
        api: Arc<dyn ApiTransport>,
        registry: &Registry,
        mapping: MappingFile,
    ) -> crate::Result<Self> {
        let mut gauges = Vec::with_capacity(mapping.metrics.len());
        for metric in mapping.metrics {
            let opts = Opts::new(metric.name.as_str(), metric.help.as_str())
                .namespace(METRIC_NAMESPACE)
                .subsystem(kind.subsystem());
            let gauge = GaugeVec::new(opts, &[mapping.entity_label.as_str()])?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.push((metric, gauge));
        }

        Ok(Self {
            kind,
            api,
            endpoint: mapping.endpoint,
            name_field: mapping.name_field,
            gauges,
        })
    }
}

#[async_trait]
impl Collector for FieldMappingCollector {
    fn name(&self) -> &'static str {
        self.kind.subsystem()
    }

    async fn collect(&self) -> crate::Result<()> {
        let raw = self.api.get_json(&self.endpoint).await?;
        let entities = entity_list(raw);

        for entity in &entities {
            let Some(entity_name) = entity.get(&self.name_field).and_then(Value::as_str) else {
                debug!(collector = self.name(), "skipping entity without a name");
                continue;
            };

            for (metric, gauge) in &self.gauges {
                let value = match &metric.source {
                    Some(source) => entity.get(source).and_then(|m| m.get(metric.field_name())),
                    None => entity.get(metric.field_name()),
                };
                let Some(value) = value.and_then(numeric_value) else {
                    continue;
                };
                // Negative stats are the API's marker for an unavailable sample.
                if value < 0.0 {
                    continue;
                }
                gauge.with_label_values(&[entity_name]).set(value);
            }
        }

        Ok(())
    }
}

/// Normalize a cluster API response into a list of entities
///
/// List endpoints wrap entities in an `entities` array; singleton endpoints
/// (the cluster itself) return the entity as the top-level object.
fn entity_list(raw: Value) -> Vec<Value> {
    match raw {
        Value::Object(mut map) => match map.remove("entities") {
            Some(Value::Array(entities)) => entities,
            Some(_) => Vec::new(),
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    }
}

/// Read a numeric sample from a JSON value
///
/// The v2 APIs report some counters as numbers and some as numeric strings.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
