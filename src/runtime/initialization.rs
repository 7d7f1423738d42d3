//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use tracing::{error, info, warn};

use crate::auth::{AuthManager, CredentialCache, ProviderCache};
use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::DopplerSecret;
use crate::observability::metrics;
use crate::provider::doppler::DopplerClient;
use crate::provider::{CredentialExchanger, SecretStoreProvider};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the DopplerSecret CRD across all namespaces
    pub resources: Api<DopplerSecret>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub controller_config: Arc<ControllerConfig>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Doppler client, credential cache and reconciler setup
pub async fn initialize(
    controller_config: ControllerConfig,
    server_config: ServerConfig,
) -> Result<InitializationResult> {
    // Must happen before anything touches rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doppler_secrets_controller=info".into()),
        )
        .init();

    info!("Starting Doppler Secrets Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Readiness probes should pass before the first reconcile
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    match controller_config.controller_namespace.as_deref() {
        Some(namespace) => info!("Controller namespace: {}", namespace),
        None => warn!(
            "Controller namespace is unknown (set POD_NAMESPACE); DopplerSecrets will be requeued until it is"
        ),
    }

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let resources: Api<DopplerSecret> = Api::all(client.clone());

    let doppler = Arc::new(DopplerClient::new(controller_config.api_timeout_duration())?);
    let store: Arc<dyn SecretStoreProvider> = Arc::<DopplerClient>::clone(&doppler);
    let exchanger: Arc<dyn CredentialExchanger> = doppler;

    let cache: Arc<ProviderCache> = Arc::new(CredentialCache::with_eviction_hook(
        controller_config.oidc_cache_size,
        |key, _provider| {
            info!(identity = %key.identity, "Evicted auth provider from cache");
            metrics::increment_cache_evictions();
        },
    ));
    info!(
        capacity = cache.capacity(),
        "Credential cache ready"
    );

    let auth = AuthManager::new(
        client.clone(),
        exchanger,
        cache,
        controller_config.operator_service_account.clone(),
    );

    let controller_config = Arc::new(controller_config);
    let reconciler = Arc::new(Reconciler::new(
        client.clone(),
        store,
        auth,
        Arc::clone(&controller_config),
    ));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        resources,
        reconciler,
        server_state,
        controller_config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
