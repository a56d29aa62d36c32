//! Process configuration
//!
//! Every option is a long flag backed by an environment variable; there are
//! no positional arguments. The central cluster name and URL are required,
//! everything else has a default. Refresh intervals are given in seconds and
//! a non-positive value disables the corresponding loop.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::resolver::SchemaVersion;

/// Prism Gateway - per-cluster metrics exposition for a managed fleet
#[derive(Parser, Debug)]
#[command(name = "prism-gateway", version, about, long_about = None)]
pub struct GatewayConfig {
    /// Name of the central management cluster (used for its credential lookup)
    #[arg(long, env = "PC_CLUSTER_NAME")]
    pub pc_name: String,

    /// Base URL of the central management endpoint
    #[arg(long, env = "PC_CLUSTER_URL")]
    pub pc_url: String,

    /// Central API schema used for cluster discovery
    #[arg(long, env = "PC_API_VERSION", value_enum, default_value_t = SchemaVersion::V4)]
    pub api_version: SchemaVersion,

    /// Only serve clusters whose name starts with this prefix
    #[arg(long, env = "CLUSTER_PREFIX")]
    pub cluster_prefix: Option<String>,

    /// Seconds between directory refreshes; non-positive disables the loop
    #[arg(
        long,
        env = "CLUSTER_REFRESH_INTERVAL",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub cluster_refresh_interval: i64,

    /// Seconds between credential reissues; non-positive disables the loop
    #[arg(
        long,
        env = "CREDENTIAL_REFRESH_INTERVAL",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub credential_refresh_interval: i64,

    /// Seconds a cluster's credentials may age before a scrape re-fetches them
    #[arg(long, env = "CREDENTIAL_MAX_AGE", default_value_t = 900)]
    pub credential_max_age: u64,

    /// Path to the rendered credentials file
    #[arg(long, env = "CREDENTIALS_FILE", default_value = "configs/credentials.json")]
    pub credentials_file: PathBuf,

    /// Directory holding the per-collector field mapping files
    #[arg(long, env = "MAPPING_DIR", default_value = "configs")]
    pub mapping_dir: PathBuf,
}

impl GatewayConfig {
    /// Directory refresh period, or `None` when the loop is disabled
    pub fn cluster_refresh_period(&self) -> Option<Duration> {
        period_from_secs(self.cluster_refresh_interval)
    }

    /// Credential refresh period, or `None` when the loop is disabled
    pub fn credential_refresh_period(&self) -> Option<Duration> {
        period_from_secs(self.credential_refresh_interval)
    }

    /// Maximum cluster credential age before the scrape path re-fetches them
    pub fn credential_max_age(&self) -> Duration {
        Duration::from_secs(self.credential_max_age)
    }
}

fn period_from_secs(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GatewayConfig {
        GatewayConfig::try_parse_from(
            std::iter::once("prism-gateway").chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn required_flags_and_defaults() {
        let config = parse(&["--pc-name", "pc", "--pc-url", "https://pc:9440"]);
        assert_eq!(config.pc_name, "pc");
        assert_eq!(config.api_version, SchemaVersion::V4);
        assert_eq!(config.cluster_prefix, None);
        assert_eq!(config.cluster_refresh_period(), None);
        assert_eq!(config.credential_refresh_period(), None);
        assert_eq!(config.credential_max_age(), Duration::from_secs(900));
        assert_eq!(config.mapping_dir, PathBuf::from("configs"));
    }

    #[test]
    fn credential_max_age_is_overridable() {
        let config = parse(&[
            "--pc-name", "pc",
            "--pc-url", "https://pc:9440",
            "--credential-max-age", "60",
        ]);
        assert_eq!(config.credential_max_age(), Duration::from_secs(60));
    }

    #[test]
    fn missing_required_flag_is_an_error() {
        let result = GatewayConfig::try_parse_from(["prism-gateway", "--pc-name", "pc"]);
        assert!(result.is_err());
    }

    #[test]
    fn schema_version_values() {
        let config = parse(&[
            "--pc-name", "pc",
            "--pc-url", "https://pc:9440",
            "--api-version", "v3",
        ]);
        assert_eq!(config.api_version, SchemaVersion::V3);

        let config = parse(&[
            "--pc-name", "pc",
            "--pc-url", "https://pc:9440",
            "--api-version", "v4-beta1",
        ]);
        assert_eq!(config.api_version, SchemaVersion::V4Beta1);
    }

    #[test]
    fn positive_intervals_enable_the_loops() {
        let config = parse(&[
            "--pc-name", "pc",
            "--pc-url", "https://pc:9440",
            "--cluster-refresh-interval", "300",
            "--credential-refresh-interval", "3600",
        ]);
        assert_eq!(
            config.cluster_refresh_period(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            config.credential_refresh_period(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn non_positive_intervals_disable_the_loops() {
        let config = parse(&[
            "--pc-name", "pc",
            "--pc-url", "https://pc:9440",
            "--cluster-refresh-interval", "0",
            "--credential-refresh-interval", "-5",
        ]);
        assert_eq!(config.cluster_refresh_period(), None);
        assert_eq!(config.credential_refresh_period(), None);
    }
}
