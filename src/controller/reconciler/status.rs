//! # Status Management
//!
//! Maps sync and reload results onto the two status conditions and writes
//! them back to the DopplerSecret.

use anyhow::{Context, Result};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use super::types::{ReloadError, SyncError};
use crate::constants::{
    DEPLOYMENT_RELOAD_READY_CONDITION, FIELD_MANAGER, SECRET_SYNC_READY_CONDITION,
};
use crate::crd::{Condition, DopplerSecret, DopplerSecretStatus};

fn condition(condition_type: &str, ok: bool, reason: &str, message: String) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: if ok { "True" } else { "False" }.to_string(),
        last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message),
    }
}

/// Record the outcome of the sync step
///
/// A failed sync also stops deployment reloads so workloads are never rolled
/// against a stale managed secret.
pub fn apply_sync_result(status: &mut DopplerSecretStatus, error: Option<&SyncError>) {
    match error {
        None => status.set_condition(condition(
            SECRET_SYNC_READY_CONDITION,
            true,
            "OK",
            "Controller is continuously syncing secrets".to_string(),
        )),
        Some(e) => {
            status.set_condition(condition(
                SECRET_SYNC_READY_CONDITION,
                false,
                "Error",
                format!("Unable to update dopplersecret: {e}"),
            ));
            status.set_condition(condition(
                DEPLOYMENT_RELOAD_READY_CONDITION,
                false,
                "Stopped",
                "Deployment reload has been stopped due to secrets sync failure".to_string(),
            ));
        }
    }
}

/// Record the outcome of the reload step
pub fn apply_reload_result(status: &mut DopplerSecretStatus, error: Option<&ReloadError>) {
    let condition = match error {
        None => condition(
            DEPLOYMENT_RELOAD_READY_CONDITION,
            true,
            "OK",
            "Controller is ready to reload deployments".to_string(),
        ),
        Some(e) => condition(
            DEPLOYMENT_RELOAD_READY_CONDITION,
            false,
            "Error",
            format!("Unable to reconcile deployments: {e}"),
        ),
    };
    status.set_condition(condition);
}

/// Whether `status` differs from what the resource already reports
///
/// `lastReconcileTime` is ignored; it only moves together with a real change.
pub fn status_changed(current: Option<&DopplerSecretStatus>, status: &DopplerSecretStatus) -> bool {
    current.is_none_or(|current| {
        current.conditions != status.conditions
            || current.observed_generation != status.observed_generation
    })
}

/// Write `status` to the resource's status subresource
///
/// Both conditions are re-evaluated every pass, but the status is only written
/// when a condition or `observedGeneration` differs from what the resource
/// already reports. Every write is a watch event, so writing unconditionally
/// would start another pass immediately and never settle.
pub async fn persist_status(
    client: &Client,
    resource: &DopplerSecret,
    mut status: DopplerSecretStatus,
) -> Result<()> {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    status.observed_generation = resource.metadata.generation;

    if !status_changed(resource.status.as_ref(), &status) {
        debug!(resource = %name, "Skipping status update - conditions unchanged");
        return Ok(());
    }
    status.last_reconcile_time = Some(chrono::Utc::now().to_rfc3339());

    let api: Api<DopplerSecret> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({
        "status": status
    });

    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to update status of {namespace}/{name}"))?;

    debug!(resource = %name, "Updated status");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;

    #[test]
    fn test_successful_sync_sets_ready() {
        let mut status = DopplerSecretStatus::default();
        apply_sync_result(&mut status, None);

        let sync = status.condition(SECRET_SYNC_READY_CONDITION).unwrap();
        assert_eq!(sync.status, "True");
        assert_eq!(sync.reason.as_deref(), Some("OK"));
        assert!(status.condition(DEPLOYMENT_RELOAD_READY_CONDITION).is_none());
    }

    #[test]
    fn test_failed_sync_stops_reload() {
        let mut status = DopplerSecretStatus::default();
        apply_reload_result(&mut status, None);
        apply_sync_result(
            &mut status,
            Some(&SyncError::Auth(AuthError::ConflictingTokenFields)),
        );

        let sync = status.condition(SECRET_SYNC_READY_CONDITION).unwrap();
        assert_eq!(sync.status, "False");
        assert_eq!(sync.reason.as_deref(), Some("Error"));
        assert!(sync
            .message
            .as_deref()
            .unwrap()
            .starts_with("Unable to update dopplersecret: Failed to get auth provider: "));

        let reload = status.condition(DEPLOYMENT_RELOAD_READY_CONDITION).unwrap();
        assert_eq!(reload.status, "False");
        assert_eq!(reload.reason.as_deref(), Some("Stopped"));
        assert_eq!(status.conditions.len(), 2);
    }

    #[test]
    fn test_status_changed_only_on_real_change() {
        let mut current = DopplerSecretStatus::default();
        apply_sync_result(&mut current, None);
        apply_reload_result(&mut current, None);
        current.observed_generation = Some(2);
        current.last_reconcile_time = Some("2024-01-01T00:00:00Z".to_string());

        // Same outcome again keeps transition times, only the reconcile time differs
        let mut next = current.clone();
        next.last_reconcile_time = None;
        apply_sync_result(&mut next, None);
        apply_reload_result(&mut next, None);
        assert!(!status_changed(Some(&current), &next));

        let mut bumped = next.clone();
        bumped.observed_generation = Some(3);
        assert!(status_changed(Some(&current), &bumped));

        let mut failed = next.clone();
        apply_sync_result(
            &mut failed,
            Some(&SyncError::TypeChange {
                existing: "Opaque".to_string(),
                desired: "kubernetes.io/tls".to_string(),
            }),
        );
        assert!(status_changed(Some(&current), &failed));

        assert!(status_changed(None, &next));
    }

    #[test]
    fn test_reload_recovers_after_stop() {
        let mut status = DopplerSecretStatus::default();
        apply_sync_result(
            &mut status,
            Some(&SyncError::TypeChange {
                existing: "Opaque".to_string(),
                desired: "kubernetes.io/tls".to_string(),
            }),
        );
        apply_sync_result(&mut status, None);
        apply_reload_result(&mut status, None);

        let reload = status.condition(DEPLOYMENT_RELOAD_READY_CONDITION).unwrap();
        assert_eq!(reload.status, "True");
        assert_eq!(
            reload.message.as_deref(),
            Some("Controller is ready to reload deployments")
        );
    }
}
