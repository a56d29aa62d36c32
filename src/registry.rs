//! Cluster handles, directory generations, and the registry service
//!
//! Every refresh builds a complete new [`ClusterDirectory`] off the hot path
//! and swaps it into the [`RegistryService`] with a single atomic pointer
//! store. Scrape handlers load the current generation lock-free, so a reader
//! racing a refresh sees either the whole old directory or the whole new one.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::PrismClient;
use crate::collector::{Collector, CollectorKind, FieldMappingCollector};
use crate::credentials::{CredentialHandle, CredentialStore};
use crate::error::Error;

/// One managed cluster: its bound API client, isolated metrics registry, and
/// fixed collector set
///
/// A handle is owned by the generation that built it; rebuilding the
/// directory builds fresh handles.
pub struct ClusterHandle {
    name: String,
    client: Arc<PrismClient>,
    registry: Registry,
    collectors: Vec<Box<dyn Collector>>,
    last_credential_refresh: Mutex<Instant>,
}

impl ClusterHandle {
    /// Build a handle for one resolved cluster
    ///
    /// Fetches the cluster's credentials from the current credential handle,
    /// binds an API client to the endpoint, and registers the fixed collector
    /// kinds into a fresh isolated registry.
    pub async fn build(
        name: &str,
        endpoint: &str,
        credentials: &CredentialHandle,
        mapping_dir: &Path,
    ) -> crate::Result<Self> {
        let creds = credentials.credentials_for(name).await?;
        let client = Arc::new(PrismClient::new(endpoint, creds)?);

        let registry = Registry::new();
        let mut collectors: Vec<Box<dyn Collector>> = Vec::with_capacity(CollectorKind::ALL.len());
        for kind in CollectorKind::ALL {
            let path = mapping_dir.join(kind.mapping_file());
            let collector =
                FieldMappingCollector::from_file(kind, client.clone(), &registry, &path)?;
            collectors.push(Box::new(collector));
        }

        Ok(Self::from_parts(name, client, registry, collectors))
    }

    /// Assemble a handle from already-constructed parts
    pub fn from_parts(
        name: &str,
        client: Arc<PrismClient>,
        registry: Registry,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            client,
            registry,
            collectors,
            last_credential_refresh: Mutex::new(Instant::now()),
        }
    }

    /// Name of the cluster this handle serves
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-fetch this cluster's credentials when the last refresh is older
    /// than `max_age`
    ///
    /// Called opportunistically from the scrape path; a no-op when the
    /// credentials are still fresh.
    pub async fn refresh_credentials_if_stale(
        &self,
        store: &CredentialStore,
        max_age: Duration,
    ) -> crate::Result<()> {
        let mut last = self.last_credential_refresh.lock().await;
        if last.elapsed() < max_age {
            return Ok(());
        }

        let creds = store.handle().credentials_for(&self.name).await?;
        self.client.set_credentials(creds);
        *last = Instant::now();
        info!(cluster = %self.name, "refreshed cluster credentials");
        Ok(())
    }

    /// Run every collector and return the registry's text exposition
    ///
    /// A failing collector is logged and skipped; the remaining collectors
    /// still run, and whatever samples the registry holds are exposed.
    pub async fn scrape(&self) -> crate::Result<String> {
        for collector in &self.collectors {
            if let Err(e) = collector.collect().await {
                warn!(
                    cluster = %self.name,
                    collector = collector.name(),
                    error = %e,
                    "collector scrape failed"
                );
            }
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::collector(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::collector(format!("metrics are not valid UTF-8: {e}")))
    }
}

/// One complete, immutable generation of the cluster directory
pub struct ClusterDirectory {
    generation: u64,
    clusters: BTreeMap<String, Arc<ClusterHandle>>,
}

impl ClusterDirectory {
    /// Create a directory from a complete cluster map
    pub fn new(generation: u64, clusters: BTreeMap<String, Arc<ClusterHandle>>) -> Self {
        Self {
            generation,
            clusters,
        }
    }

    /// Sequence number of this generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Look up a cluster handle by name
    pub fn get(&self, name: &str) -> Option<&Arc<ClusterHandle>> {
        self.clusters.get(name)
    }

    /// Number of clusters in this generation
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether this generation holds no clusters
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster names in this generation, in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }
}

/// Build one directory generation from resolved endpoints
///
/// A cluster whose handle construction fails is skipped with a warning; its
/// siblings still become reachable. Construction happens entirely before any
/// swap, so the previous generation keeps serving while this one is built.
pub async fn build_generation(
    generation: u64,
    endpoints: &BTreeMap<String, String>,
    credentials: &CredentialHandle,
    mapping_dir: &Path,
) -> ClusterDirectory {
    let mut clusters = BTreeMap::new();
    for (name, endpoint) in endpoints {
        match ClusterHandle::build(name, endpoint, credentials, mapping_dir).await {
            Ok(handle) => {
                info!(cluster = %name, endpoint = %endpoint, "registered cluster collectors");
                clusters.insert(name.clone(), Arc::new(handle));
            }
            Err(e) => {
                warn!(cluster = %name, error = %e, "skipping cluster: handle construction failed");
            }
        }
    }

    ClusterDirectory::new(generation, clusters)
}

/// Concurrency-safe holder of the current directory generation
///
/// Readers load the current generation without locking; the directory
/// refresh loop is the single writer and replaces the generation wholesale.
pub struct RegistryService {
    current: ArcSwap<ClusterDirectory>,
}

impl RegistryService {
    /// Create a service around the initial generation
    pub fn new(initial: ClusterDirectory) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// The current directory generation
    pub fn current(&self) -> Arc<ClusterDirectory> {
        self.current.load_full()
    }

    /// Look up a cluster handle in the current generation
    pub fn lookup(&self, name: &str) -> Option<Arc<ClusterHandle>> {
        self.current.load().get(name).cloned()
    }

    /// Atomically replace the current generation
    pub fn replace(&self, next: ClusterDirectory) {
        let generation = next.generation();
        let clusters = next.len();
        self.current.store(Arc::new(next));
        info!(generation, clusters, "cluster directory replaced");
    }
}
