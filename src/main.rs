//! Prism Gateway - per-cluster metrics exposition for a managed fleet

use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prism_gateway::client::PrismClient;
use prism_gateway::config::GatewayConfig;
use prism_gateway::credentials::{CredentialBroker, CredentialStore, FileCredentialBroker};
use prism_gateway::registry::{self, RegistryService};
use prism_gateway::resolver;
use prism_gateway::scheduler::{self, FailurePolicy};
use prism_gateway::server::{self, GatewayState};
use prism_gateway::Error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::parse();
    run_gateway(config).await
}

/// Wire up the gateway and serve until the process exits
///
/// Startup is strict: credential issuance, the central client, and the first
/// directory generation must all succeed before the front door opens.
async fn run_gateway(config: GatewayConfig) -> anyhow::Result<()> {
    info!(path = %config.credentials_file.display(), "issuing initial credentials");
    let broker: Arc<dyn CredentialBroker> =
        Arc::new(FileCredentialBroker::new(&config.credentials_file));
    let store = Arc::new(CredentialStore::issue_initial(broker.as_ref()).await?);

    info!(
        endpoint = %config.pc_url,
        schema = config.api_version.as_str(),
        "connecting to central management endpoint"
    );
    let pc_credentials = store.handle().credentials_for(&config.pc_name).await?;
    let pc_client = Arc::new(PrismClient::new(&config.pc_url, pc_credentials)?);

    info!("building initial cluster directory");
    let endpoints = resolver::resolve(
        pc_client.as_ref(),
        config.api_version,
        config.cluster_prefix.as_deref(),
    )
    .await?;
    let directory =
        registry::build_generation(1, &endpoints, &store.handle(), &config.mapping_dir).await;
    if directory.is_empty() {
        warn!("no clusters discovered; serving an empty directory");
    }
    let service = Arc::new(RegistryService::new(directory));

    // Stale credentials are unrecoverable without a restart, so a failed
    // reissue stops the process.
    let credential_task = {
        let store = store.clone();
        let broker = broker.clone();
        scheduler::spawn_refresh(
            "credential-refresh",
            config.credential_refresh_period(),
            FailurePolicy::Fatal,
            move || {
                let store = store.clone();
                let broker = broker.clone();
                async move { store.refresh(broker.as_ref()).await }
            },
        )
    };

    // A failed directory refresh keeps the previous generation live and is
    // retried on the next tick.
    {
        let service = service.clone();
        let store = store.clone();
        let pc_client = pc_client.clone();
        let api_version = config.api_version;
        let prefix = config.cluster_prefix.clone();
        let mapping_dir = config.mapping_dir.clone();
        scheduler::spawn_refresh(
            "directory-refresh",
            config.cluster_refresh_period(),
            FailurePolicy::Continue,
            move || {
                let service = service.clone();
                let store = store.clone();
                let pc_client = pc_client.clone();
                let prefix = prefix.clone();
                let mapping_dir = mapping_dir.clone();
                async move {
                    let endpoints =
                        resolver::resolve(pc_client.as_ref(), api_version, prefix.as_deref())
                            .await?;
                    let generation = service.current().generation() + 1;
                    let directory =
                        registry::build_generation(generation, &endpoints, &store.handle(), &mapping_dir)
                            .await;
                    service.replace(directory);
                    Ok(())
                }
            },
        );
    }

    let state = Arc::new(
        GatewayState::new(service, store).with_credential_max_age(config.credential_max_age()),
    );
    tokio::select! {
        result = server::serve(state) => result.map_err(Into::into),
        error = fatal_task_failure(credential_task) => Err(error.into()),
    }
}

/// Resolve when a fatal background task dies; pends forever when the task is
/// disabled
async fn fatal_task_failure(handle: Option<JoinHandle<prism_gateway::Result<()>>>) -> Error {
    match handle {
        Some(handle) => match handle.await {
            Ok(Err(e)) => e,
            Ok(Ok(())) => Error::credentials("credential refresh task stopped unexpectedly"),
            Err(e) => Error::credentials(format!("credential refresh task panicked: {e}")),
        },
        None => std::future::pending::<Error>().await,
    }
}
