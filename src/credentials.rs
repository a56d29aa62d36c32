//! Credential issuance and the process-wide credential store
//!
//! Clusters authenticate with basic auth. Credentials are looked up per
//! cluster through an opaque [`CredentialSource`] handle issued by a
//! [`CredentialBroker`]; the deployment renders a credentials file keyed by
//! cluster name with a `default` fallback section, and reissuing the handle
//! re-reads that file.
//!
//! The current handle lives in a [`CredentialStore`] and is replaced
//! wholesale by the credential refresh loop. Readers load the handle through
//! an atomic pointer swap, so a scrape racing a refresh always observes a
//! complete handle.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::Error;

/// Credentials file section used when a cluster has no dedicated section
pub const DEFAULT_SECTION: &str = "default";

/// Basic-auth credentials for one cluster API
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Username presented to the cluster API
    pub username: String,
    /// Password presented to the cluster API
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves credentials for a named cluster
///
/// Implementations fall back to the [`DEFAULT_SECTION`] when the cluster has
/// no dedicated entry.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Look up credentials for the named cluster
    async fn credentials_for(&self, cluster: &str) -> crate::Result<BasicCredentials>;
}

/// Issues fresh credential handles; may fail
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Issue a new credential handle
    async fn issue(&self) -> crate::Result<CredentialHandle>;
}

/// One issued credential handle: a source plus its issue time
pub struct CredentialHandle {
    source: Arc<dyn CredentialSource>,
    issued_at: Instant,
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl CredentialHandle {
    /// Wrap a source into a handle issued now
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            issued_at: Instant::now(),
        }
    }

    /// Look up credentials for the named cluster
    pub async fn credentials_for(&self, cluster: &str) -> crate::Result<BasicCredentials> {
        self.source.credentials_for(cluster).await
    }

    /// Time elapsed since this handle was issued
    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }
}

/// Source backed by an in-memory section map
///
/// The file broker parses the rendered credentials file into this.
pub struct SectionCredentialSource {
    sections: HashMap<String, BasicCredentials>,
}

impl SectionCredentialSource {
    /// Create a source from a section map
    pub fn new(sections: HashMap<String, BasicCredentials>) -> Self {
        Self { sections }
    }
}

#[async_trait]
impl CredentialSource for SectionCredentialSource {
    async fn credentials_for(&self, cluster: &str) -> crate::Result<BasicCredentials> {
        self.sections
            .get(cluster)
            .or_else(|| self.sections.get(DEFAULT_SECTION))
            .cloned()
            .ok_or_else(|| {
                Error::credentials(format!(
                    "no credentials section for cluster '{cluster}' and no '{DEFAULT_SECTION}' section"
                ))
            })
    }
}

/// Broker that re-reads a rendered credentials file on every issue
///
/// The file is a JSON object mapping section names to
/// `{"username": ..., "password": ...}` entries. An external secret agent
/// keeps the file current; reissuing the handle picks up rotated secrets.
pub struct FileCredentialBroker {
    path: PathBuf,
}

impl FileCredentialBroker {
    /// Create a broker reading from the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the credentials file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialBroker for FileCredentialBroker {
    async fn issue(&self) -> crate::Result<CredentialHandle> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::credentials(format!(
                "failed to read credentials file {}: {e}",
                self.path.display()
            ))
        })?;

        let sections: HashMap<String, BasicCredentials> =
            serde_json::from_str(&raw).map_err(|e| {
                Error::credentials(format!(
                    "invalid credentials file {}: {e}",
                    self.path.display()
                ))
            })?;

        info!(
            path = %self.path.display(),
            sections = sections.len(),
            "issued credential handle"
        );
        Ok(CredentialHandle::new(Arc::new(SectionCredentialSource::new(
            sections,
        ))))
    }
}

/// Process-wide holder of the current credential handle
///
/// The handle is replaced wholesale by the credential refresh loop and read
/// by scrape handlers and generation builds. Replacement is a single atomic
/// pointer swap.
pub struct CredentialStore {
    current: ArcSwap<CredentialHandle>,
}

impl CredentialStore {
    /// Issue the first handle from the broker; failure here is fatal to startup
    pub async fn issue_initial(broker: &dyn CredentialBroker) -> crate::Result<Self> {
        let handle = broker.issue().await?;
        Ok(Self {
            current: ArcSwap::from_pointee(handle),
        })
    }

    /// Create a store around an already-issued handle
    pub fn new(handle: CredentialHandle) -> Self {
        Self {
            current: ArcSwap::from_pointee(handle),
        }
    }

    /// The current credential handle
    pub fn handle(&self) -> Arc<CredentialHandle> {
        self.current.load_full()
    }

    /// Reissue the handle through the broker and swap it in
    pub async fn refresh(&self, broker: &dyn CredentialBroker) -> crate::Result<()> {
        let handle = broker.issue().await?;
        let previous = self.current.swap(Arc::new(handle));
        info!(
            previous_age_secs = previous.age().as_secs(),
            "credential handle reissued"
        );
        Ok(())
    }
}
