//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup,
//! Kubernetes client and reconciler context.

use crate::config::ControllerConfig;
use crate::controller::reconciler::probe::GiteaProber;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::Gitea;
use crate::observability;
use crate::store::KubeStore;
use anyhow::{Context, Result};
use kube::{api::Api, Client};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// Gitea resources in the watched namespace, or all namespaces
    pub giteas: Api<Gitea>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Scope an API to `WATCH_NAMESPACE` when it is set
pub fn scoped_api<K>(client: Client, config: &ControllerConfig) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match config.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    }
}

/// Initialize the controller runtime.
///
/// # Errors
///
/// Fails when the crypto provider, metrics, prober or Kubernetes client
/// cannot be set up.
pub async fn initialize() -> Result<InitializationResult> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitea_operator=info".into()),
        )
        .init();

    info!("Starting Gitea Operator v{}", env!("CARGO_PKG_VERSION"));

    let config = ControllerConfig::from_env();
    info!(
        "Configuration: namespace={}, steady_state={}s, retry={}s..{}s, retry_budget={}",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.steady_state_requeue_secs,
        config.retry_initial_secs,
        config.retry_max_secs,
        config.retry_budget
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let giteas: Api<Gitea> = scoped_api(client.clone(), &config);

    let prober = GiteaProber::new(config.probe_timeout()).context("Failed to build HTTP prober")?;
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(prober),
        config.requeue_policy(),
        config.default_image.clone(),
        config.attempt_timeout(),
    ));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        giteas,
        reconciler,
        server_state,
        config,
    })
}
