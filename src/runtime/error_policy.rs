//! # Error Policy
//!
//! Requeue decisions for failed reconciliations and classification of watch
//! stream errors.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{error, warn};

use crate::controller::reconciler::{requeue_interval, Reconciler, ReconcilerError};
use crate::crd::DopplerSecret;
use crate::observability::metrics;

/// Requeue a failed reconciliation
///
/// Failed passes retry on the resource's normal resync interval. Rate-limit
/// responses are logged as warnings since the next pass usually succeeds.
pub fn error_policy(obj: Arc<DopplerSecret>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    if error.is_rate_limited() {
        warn!("Doppler API rate limit reached for {}/{}: {}", namespace, name, error);
    } else if error.is_configuration_error() {
        error!("DopplerSecret {}/{} needs attention: {}", namespace, name, error);
    } else {
        error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    }
    metrics::increment_reconciliation_errors();

    let interval = requeue_interval(&obj.spec, ctx.config.default_resync_duration());
    metrics::increment_requeues_total("error");
    Action::requeue(interval)
}

/// What the watch loop should do with a stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version too old
    Expired,
    /// 429: API server storage reinitializing
    Throttled,
    /// 404: CRD missing or resource deleted
    NotFound,
    Other,
}

impl WatchErrorKind {
    pub fn classify(error_string: &str) -> Self {
        // 404s can surface with "WatchFailed" in the chain, so check them before 401
        let is_not_found = error_string.contains("ObjectNotFound")
            || error_string.contains("404")
            || error_string.contains("not found");
        if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found
        {
            return Self::Unauthorized;
        }
        if error_string.contains("410")
            || error_string.contains("too old resource version")
            || error_string.contains("Expired")
            || error_string.contains("Gone")
        {
            return Self::Expired;
        }
        if error_string.contains("429")
            || error_string.contains("storage is (re)initializing")
            || error_string.contains("TooManyRequests")
        {
            return Self::Throttled;
        }
        if is_not_found {
            return Self::NotFound;
        }
        Self::Other
    }
}

/// Handle a watch stream error
///
/// Returns `None` to drop the event and let the stream restart, or `Some(())`
/// to keep it.
pub async fn handle_watch_stream_error(
    error_string: &str,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorKind::classify(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("   Verify the controller ServiceAccount can still list dopplersecrets:");
            error!(
                "      kubectl auth can-i list dopplersecrets.secrets.doppler.com --as=system:serviceaccount:<namespace>:doppler-operator-controller-manager --all-namespaces"
            );
            warn!(
                "⏳ Waiting {}s before retrying watch...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorKind::Throttled => {
            warn!(
                "API server storage reinitializing (429), backing off for {}s before restart...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - the DopplerSecret CRD may be missing. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            WatchErrorKind::classify("ApiError: Unauthorized (401)"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            WatchErrorKind::classify("WatchFailed: invalid type: integer `404`"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            WatchErrorKind::classify("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            WatchErrorKind::classify("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            WatchErrorKind::classify("connection reset by peer"),
            WatchErrorKind::Other
        );
    }

    #[tokio::test]
    async fn test_not_found_keeps_event() {
        assert_eq!(
            handle_watch_stream_error("ObjectNotFound", Duration::ZERO).await,
            Some(())
        );
        assert_eq!(
            handle_watch_stream_error("Gone", Duration::ZERO).await,
            None
        );
    }
}
