//! # Doppler Secrets Controller
//!
//! A Kubernetes controller that keeps Kubernetes Secrets in sync with Doppler
//! configs.
//!
//! ## Overview
//!
//! For every `DopplerSecret` resource the controller:
//!
//! 1. **Authenticates** - with a service token from a Kubernetes Secret, or by
//!    exchanging a service-account token for a short-lived Doppler credential
//! 2. **Downloads** - the config's secrets, skipping unchanged configs via ETag
//! 3. **Writes** - the managed Kubernetes Secret, applying value processors
//! 4. **Reloads** - opted-in Deployments that consume the managed secret
//! 5. **Reports** - `SecretSyncReady` and `DeploymentReloadReady` conditions
//!
//! Prometheus metrics and health probes are served on `METRICS_PORT`.

use anyhow::Result;
use clap::Parser;
use doppler_secrets_controller::config::{ControllerConfig, ServerConfig};
use doppler_secrets_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

/// Doppler Secrets Controller
///
/// Flags override the matching environment variables.
#[derive(Parser, Debug)]
#[command(name = "doppler-secrets-controller", version, about, long_about = None)]
struct Cli {
    /// Port for `/metrics`, `/healthz` and `/readyz` (env: `METRICS_PORT`)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Number of identity-exchange auth providers to keep cached (env: `OIDC_CACHE_SIZE`)
    #[arg(long)]
    oidc_cache_size: Option<usize>,

    /// Namespace the controller runs in (env: `POD_NAMESPACE`)
    #[arg(long)]
    namespace: Option<String>,
}

impl Cli {
    fn apply(self, controller: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(port) = self.metrics_port {
            server.metrics_port = port;
        }
        if let Some(size) = self.oidc_cache_size {
            controller.oidc_cache_size = size;
        }
        if let Some(namespace) = self.namespace.filter(|ns| !ns.is_empty()) {
            controller.controller_namespace = Some(namespace);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut controller_config = ControllerConfig::from_env();
    let mut server_config = ServerConfig::from_env();
    cli.apply(&mut controller_config, &mut server_config);

    let init = initialize(controller_config, server_config).await?;

    run_watch_loop(
        init.resources,
        init.reconciler,
        init.server_state,
        init.controller_config,
    )
    .await
}
