//! Prism Gateway - pull-based metrics gateway for a fleet of managed clusters
//!
//! The gateway discovers Prism Element clusters registered in a Prism Central
//! endpoint, keeps a periodically-refreshed directory of per-cluster metric
//! collectors, and exposes each cluster's metrics on its own scrape path.
//!
//! # Architecture
//!
//! - The cluster directory is resolved from Prism Central through one of
//!   three API schemas and rebuilt wholesale on every refresh
//! - Each discovered cluster gets its own API client, its own isolated
//!   Prometheus registry, and a fixed set of declarative collectors
//! - Directory generations are replaced atomically; scrape handlers always
//!   observe a complete generation
//! - Two independent background loops drive credential reissue (fatal on
//!   failure) and directory refresh (retried on the next tick)
//!
//! # Modules
//!
//! - [`config`] - process configuration (flags backed by environment variables)
//! - [`credentials`] - credential broker/source traits and the swappable store
//! - [`client`] - authenticated HTTP transport bound to one cluster endpoint
//! - [`resolver`] - multi-schema cluster directory resolution
//! - [`registry`] - cluster handles, directory generations, and the registry service
//! - [`collector`] - declarative field-mapping collectors
//! - [`scheduler`] - periodic refresh tasks with an explicit failure policy
//! - [`server`] - HTTP front door (landing page + per-cluster metrics)
//! - [`error`] - error types for the gateway

#![deny(missing_docs)]

pub mod client;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod server;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// These constants define the well-known ports the gateway relies on.
// Centralizing them here keeps the server, resolver, and test fixtures in sync.

/// Port the HTTP front door listens on
pub const LISTEN_PORT: u16 = 9408;

/// Management port every discovered cluster serves its API on
///
/// Cluster discovery only yields an IP per cluster; the management API is
/// always reachable at `https://{ip}:9440`.
pub const MANAGEMENT_PORT: u16 = 9440;
