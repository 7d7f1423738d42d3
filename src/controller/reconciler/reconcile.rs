//! # Reconciliation Logic
//!
//! One pass over a `DopplerSecret`:
//! `validate scope -> sync -> sync condition -> reload -> reload condition -> requeue`.
//!
//! Errors are returned to `error_policy()`, which owns the retry schedule.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{error, info, warn, Instrument};

use super::deployments::reconcile_deployments;
use super::scope::{managed_secret_namespace, validate_scope};
use super::status::{apply_reload_result, apply_sync_result, persist_status};
use super::sync::{update_secret, SyncOutcome};
use super::types::{Reconciler, ReconcilerError, ReloadError, SyncError};
use crate::crd::{DopplerSecret, DopplerSecretSpec, DopplerSecretStatus};
use crate::observability::metrics;

/// Delay before retrying when the controller namespace is unknown
const UNKNOWN_NAMESPACE_REQUEUE: Duration = Duration::from_secs(60);

/// Time until the next pass, from `resyncSeconds` or the controller default
pub fn requeue_interval(spec: &DopplerSecretSpec, default: Duration) -> Duration {
    if spec.resync_seconds == 0 {
        default
    } else {
        Duration::from_secs(spec.resync_seconds)
    }
}

/// Main reconciliation function
pub async fn reconcile(
    resource: Arc<DopplerSecret>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let span = tracing::info_span!(
        "reconcile",
        resource.name = %resource.name_any(),
        resource.namespace = %resource.namespace().unwrap_or_default(),
        resource.kind = "DopplerSecret"
    );
    reconcile_internal(resource, ctx).instrument(span).await
}

async fn reconcile_internal(
    resource: Arc<DopplerSecret>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    reconcile_pass(
        &resource,
        ctx.config.controller_namespace.as_deref(),
        ctx.config.default_resync_duration(),
        ctx.as_ref(),
    )
    .await
}

/// Cluster and Doppler side effects of a pass
#[async_trait]
pub trait ReconcileSteps: Send + Sync {
    async fn sync_secret(
        &self,
        resource: &DopplerSecret,
        operator_namespace: &str,
    ) -> Result<SyncOutcome, SyncError>;

    async fn reload_deployments(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<usize, ReloadError>;

    async fn write_status(
        &self,
        resource: &DopplerSecret,
        status: DopplerSecretStatus,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl ReconcileSteps for Reconciler {
    async fn sync_secret(
        &self,
        resource: &DopplerSecret,
        operator_namespace: &str,
    ) -> Result<SyncOutcome, SyncError> {
        update_secret(self, resource, operator_namespace).await
    }

    async fn reload_deployments(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<usize, ReloadError> {
        reconcile_deployments(&self.client, namespace, secret_name).await
    }

    async fn write_status(
        &self,
        resource: &DopplerSecret,
        status: DopplerSecretStatus,
    ) -> anyhow::Result<()> {
        persist_status(&self.client, resource, status).await
    }
}

/// Run one pass over `resource`
///
/// `operator_namespace` is `None` when the controller could not determine
/// where it runs; the pass is then retried later without touching anything.
pub async fn reconcile_pass(
    resource: &DopplerSecret,
    operator_namespace: Option<&str>,
    default_resync: Duration,
    steps: &dyn ReconcileSteps,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();
    info!("🔄 Reconciling DopplerSecret");

    let Some(operator_namespace) = operator_namespace else {
        error!("Unable to determine the controller namespace, retrying later");
        metrics::increment_requeues_total("unknown_namespace");
        return Ok(Action::requeue(UNKNOWN_NAMESPACE_REQUEUE));
    };

    if let Err(e) = validate_scope(resource, operator_namespace) {
        error!(error = %e, "Namespace scope violation");
        return Ok(Action::await_change());
    }

    if resource.metadata.deletion_timestamp.is_some() {
        info!("DopplerSecret is being deleted, leaving managed secret in place");
        return Ok(Action::await_change());
    }

    let interval = requeue_interval(&resource.spec, default_resync);
    let mut status = resource.status.clone().unwrap_or_default();

    let outcome = match steps.sync_secret(resource, operator_namespace).await {
        Ok(outcome) => {
            apply_sync_result(&mut status, None);
            outcome
        }
        Err(e) => {
            apply_sync_result(&mut status, Some(&e));
            if let Err(status_err) = steps.write_status(resource, status).await {
                warn!(error = %status_err, "Unable to update dopplersecret status");
            }
            return Err(e.into());
        }
    };
    if outcome != SyncOutcome::NotModified {
        info!(outcome = ?outcome, "Synced managed secret");
    }

    let managed_namespace = managed_secret_namespace(resource);
    let reload_result = steps
        .reload_deployments(&managed_namespace, &resource.spec.managed_secret.name)
        .await;
    apply_reload_result(&mut status, reload_result.as_ref().err());
    if let Err(status_err) = steps.write_status(resource, status).await {
        warn!(error = %status_err, "Unable to update dopplersecret status");
    }
    let reloaded = reload_result?;
    if reloaded > 0 {
        info!(deployments = reloaded, "Reloaded dependent deployments");
    }

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    metrics::increment_requeues_total("resync");
    info!(
        requeue_secs = interval.as_secs(),
        "✅ Finished reconciling DopplerSecret"
    );
    Ok(Action::requeue(interval))
}
