//! # Watch Loop
//!
//! Controller watch loop that monitors `DopplerSecret` resources and triggers
//! reconciliation when changes are detected.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{watcher, Controller};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::DopplerSecret;
use crate::runtime::error_policy::{error_policy, handle_watch_stream_error};

/// Run the controller watch loop
///
/// Handles graceful shutdown and restarts the controller when the watch
/// stream ends.
pub async fn run_watch_loop(
    resources: Api<DopplerSecret>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: Arc<ControllerConfig>,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");

        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let restart_delay = config.watch_restart_delay_duration();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        let _watch_guard = watch_span.enter();

        Controller::new(resources.clone(), watcher::Config::default().any_semantic())
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::clone(&reconciler))
            .filter_map(move |x| async move {
                match &x {
                    Ok((obj, action)) => {
                        debug!(resource = %obj.name, action = ?action, "watch.event.reconciled");
                        Some(x)
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(&error_string, restart_delay)
                            .await
                            .map(|()| x)
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
