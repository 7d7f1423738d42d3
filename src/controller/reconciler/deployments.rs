//! # Deployment Reload
//!
//! Deployments opting in with `secrets.doppler.com/reload: "true"` that consume
//! the managed secret get a per-secret marker annotation on the Deployment and
//! its pod template. Changing the template annotation rolls the Deployment.

use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use super::types::ReloadError;
use crate::constants::{
    FIELD_MANAGER, RELOAD_ANNOTATION, SECRETS_UPDATE_ANNOTATION_PREFIX, VERSION_ANNOTATION,
};
use crate::observability::metrics;

const MAX_ANNOTATION_NAME_LEN: usize = 63;
const MARKER_HASH_LEN: usize = 8;

/// Whether the Deployment asked to be restarted on secret changes
pub fn reload_enabled(deployment: &Deployment) -> bool {
    deployment
        .annotations()
        .get(RELOAD_ANNOTATION)
        .is_some_and(|v| v == "true")
}

/// Whether any container reads `secret_name` via envFrom, env or a volume
pub fn deployment_uses_secret(deployment: &Deployment, secret_name: &str) -> bool {
    let Some(pod_spec) = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
    else {
        return false;
    };

    let in_volumes = pod_spec.volumes.iter().flatten().any(|volume| {
        volume
            .secret
            .as_ref()
            .and_then(|s| s.secret_name.as_deref())
            == Some(secret_name)
    });
    if in_volumes {
        return true;
    }

    pod_spec.containers.iter().any(|container| {
        let in_env_from = container.env_from.iter().flatten().any(|source| {
            source.secret_ref.as_ref().map(|r| r.name.as_str()) == Some(secret_name)
        });
        let in_env = container.env.iter().flatten().any(|var| {
            var.value_from
                .as_ref()
                .and_then(|v| v.secret_key_ref.as_ref())
                .map(|r| r.name.as_str())
                == Some(secret_name)
        });
        in_env_from || in_env
    })
}

/// Annotation key carrying the marker for one managed secret
///
/// The name part of an annotation key is capped at 63 characters. Longer
/// secret names are cut and suffixed with a hash of the full name so distinct
/// secrets keep distinct keys.
pub fn marker_key(secret_name: &str) -> String {
    let key = format!("{SECRETS_UPDATE_ANNOTATION_PREFIX}.{secret_name}");
    let name_len = key.len() - key.find('/').map_or(0, |i| i + 1);
    if name_len <= MAX_ANNOTATION_NAME_LEN {
        return key;
    }

    let digest = format!("{:x}", Sha256::digest(secret_name.as_bytes()));
    let hash = &digest[..MARKER_HASH_LEN];
    let keep = secret_name.len() - (name_len - MAX_ANNOTATION_NAME_LEN) - MARKER_HASH_LEN - 1;
    let truncated: String = secret_name.chars().take(keep).collect();
    format!("{SECRETS_UPDATE_ANNOTATION_PREFIX}.{truncated}-{hash}")
}

/// `<namespace>-<name>-<version>` of the managed secret as currently stored
pub fn marker_value(secret: &Secret) -> String {
    let version = secret
        .annotations()
        .get(VERSION_ANNOTATION)
        .map_or("", String::as_str);
    format!(
        "{}-{}-{}",
        secret.namespace().unwrap_or_default(),
        secret.name_any(),
        version
    )
}

/// True unless both the Deployment and its pod template already carry `value`
pub fn needs_reload(deployment: &Deployment, key: &str, value: &str) -> bool {
    let on_deployment = deployment.annotations().get(key).map(String::as_str);
    let on_template = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(key))
        .map(String::as_str);
    on_deployment != Some(value) || on_template != Some(value)
}

/// Kubernetes access needed to reload dependent Deployments
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, kube::Error>;
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, kube::Error>;
    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), kube::Error>;
}

#[async_trait]
impl DeploymentStore for Client {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, kube::Error> {
        Api::<Deployment>::namespaced(self.clone(), namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, kube::Error> {
        Api::<Secret>::namespaced(self.clone(), namespace)
            .get(name)
            .await
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), kube::Error> {
        Api::<Deployment>::namespaced(self.clone(), namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map(|_| ())
    }
}

/// Stamp the current marker onto every dependent Deployment in `namespace`
///
/// Returns how many Deployments were patched. Patch failures for individual
/// Deployments are logged and do not fail the pass.
pub async fn reconcile_deployments(
    store: &dyn DeploymentStore,
    namespace: &str,
    secret_name: &str,
) -> Result<usize, ReloadError> {
    let deployments = store
        .list_deployments(namespace)
        .await
        .map_err(ReloadError::ListDeployments)?;

    let secret = store
        .get_secret(namespace, secret_name)
        .await
        .map_err(ReloadError::FetchManagedSecret)?;

    let key = marker_key(secret_name);
    let value = marker_value(&secret);

    let candidates: Vec<&Deployment> = deployments
        .iter()
        .filter(|d| reload_enabled(d) && deployment_uses_secret(d, secret_name))
        .filter(|d| needs_reload(d, &key, &value))
        .collect();

    if candidates.is_empty() {
        debug!(secret = secret_name, "No deployments need reloading");
        return Ok(0);
    }

    let results = join_all(
        candidates
            .iter()
            .map(|d| reload_deployment(store, namespace, d, &key, &value)),
    )
    .await;

    let reloaded = results.into_iter().filter(|ok| *ok).count();
    Ok(reloaded)
}

async fn reload_deployment(
    store: &dyn DeploymentStore,
    namespace: &str,
    deployment: &Deployment,
    key: &str,
    value: &str,
) -> bool {
    let name = deployment.name_any();
    let patch = json!({
        "metadata": { "annotations": { key: value } },
        "spec": { "template": { "metadata": { "annotations": { key: value } } } }
    });

    match store.patch_deployment(namespace, &name, &patch).await {
        Ok(()) => {
            metrics::increment_deployments_reloaded();
            info!(deployment = %name, "Updated deployment");
            true
        }
        Err(e) => {
            error!(deployment = %name, error = %e, "Unable to reload deployment");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("request failed: {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    /// In-memory Deployments and managed secret, recording every call
    struct FakeCluster {
        deployments: Vec<Deployment>,
        secret: Secret,
        failing: Vec<&'static str>,
        list_fails: bool,
        calls: Mutex<Vec<String>>,
        patched: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl FakeCluster {
        fn new(deployments: Vec<Deployment>) -> Self {
            Self {
                deployments,
                secret: serde_json::from_value(json!({
                    "metadata": {
                        "name": "app-secrets",
                        "namespace": "apps",
                        "annotations": { "secrets.doppler.com/version": "etag-2" }
                    }
                }))
                .unwrap(),
                failing: Vec::new(),
                list_fails: false,
                calls: Mutex::new(Vec::new()),
                patched: Mutex::new(Vec::new()),
            }
        }

        fn patched_names(&self) -> Vec<String> {
            let mut names: Vec<_> = self
                .patched
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect();
            names.sort();
            names
        }
    }

    #[async_trait]
    impl DeploymentStore for FakeCluster {
        async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, kube::Error> {
            self.calls.lock().unwrap().push(format!("list {namespace}"));
            if self.list_fails {
                return Err(api_error(403, "Forbidden"));
            }
            Ok(self.deployments.clone())
        }

        async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, kube::Error> {
            self.calls.lock().unwrap().push(format!("get {namespace}/{name}"));
            Ok(self.secret.clone())
        }

        async fn patch_deployment(
            &self,
            namespace: &str,
            name: &str,
            patch: &serde_json::Value,
        ) -> Result<(), kube::Error> {
            self.calls.lock().unwrap().push(format!("patch {namespace}/{name}"));
            if self.failing.iter().any(|failing| *failing == name) {
                return Err(api_error(409, "Conflict"));
            }
            self.patched
                .lock()
                .unwrap()
                .push((name.to_string(), patch.clone()));
            Ok(())
        }
    }

    /// Opted-in Deployment reading `secret` through envFrom, optionally already marked
    fn consumer(name: &str, secret: &str, marker: Option<&str>) -> Deployment {
        let marked = marker.map(|v| json!({ marker_key("app-secrets"): v }));
        let mut annotations = json!({ "secrets.doppler.com/reload": "true" });
        if let Some(v) = marker {
            annotations[marker_key("app-secrets")] = json!(v);
        }
        deployment(json!({
            "metadata": { "name": name, "namespace": "apps", "annotations": annotations },
            "spec": {
                "selector": {},
                "template": {
                    "metadata": { "annotations": marked },
                    "spec": { "containers": [{
                        "name": "app",
                        "envFrom": [{ "secretRef": { "name": secret } }]
                    }] }
                }
            }
        }))
    }

    #[tokio::test]
    async fn test_failed_patch_does_not_stop_other_reloads() {
        let mut cluster = FakeCluster::new(vec![
            consumer("api", "app-secrets", None),
            consumer("web", "app-secrets", None),
            consumer("worker", "app-secrets", None),
        ]);
        cluster.failing = vec!["web"];

        let reloaded = reconcile_deployments(&cluster, "apps", "app-secrets")
            .await
            .unwrap();

        assert_eq!(reloaded, 2);
        assert_eq!(cluster.patched_names(), vec!["api", "worker"]);
        assert!(cluster
            .calls
            .lock()
            .unwrap()
            .contains(&"patch apps/web".to_string()));

        let key = marker_key("app-secrets");
        let patched = cluster.patched.lock().unwrap();
        let (_, patch) = &patched[0];
        assert_eq!(patch["metadata"]["annotations"][&key], "apps-app-secrets-etag-2");
        assert_eq!(
            patch["spec"]["template"]["metadata"]["annotations"][&key],
            "apps-app-secrets-etag-2"
        );
    }

    #[tokio::test]
    async fn test_only_stale_opted_in_consumers_are_patched() {
        let mut not_opted_in = consumer("batch", "app-secrets", None);
        not_opted_in.metadata.annotations = None;
        let cluster = FakeCluster::new(vec![
            consumer("current", "app-secrets", Some("apps-app-secrets-etag-2")),
            consumer("other", "other-secrets", None),
            not_opted_in,
            consumer("stale", "app-secrets", Some("apps-app-secrets-etag-1")),
        ]);

        let reloaded = reconcile_deployments(&cluster, "apps", "app-secrets")
            .await
            .unwrap();

        assert_eq!(reloaded, 1);
        assert_eq!(cluster.patched_names(), vec!["stale"]);
    }

    #[tokio::test]
    async fn test_up_to_date_deployments_get_no_patch() {
        let cluster = FakeCluster::new(vec![consumer(
            "current",
            "app-secrets",
            Some("apps-app-secrets-etag-2"),
        )]);

        let reloaded = reconcile_deployments(&cluster, "apps", "app-secrets")
            .await
            .unwrap();

        assert_eq!(reloaded, 0);
        assert_eq!(
            *cluster.calls.lock().unwrap(),
            vec!["list apps".to_string(), "get apps/app-secrets".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_failure_is_reported() {
        let mut cluster = FakeCluster::new(vec![consumer("api", "app-secrets", None)]);
        cluster.list_fails = true;

        let err = reconcile_deployments(&cluster, "apps", "app-secrets")
            .await
            .unwrap_err();

        assert!(matches!(err, ReloadError::ListDeployments(_)));
        assert!(cluster.patched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_long_secret_names_fit_the_annotation_limit() {
        let long = "a".repeat(40) + "-payments-backend-production-secrets";
        let key = marker_key(&long);
        let (prefix, name) = key.split_once('/').unwrap();

        assert_eq!(prefix, "secrets.doppler.com");
        assert_eq!(name.len(), 63);
        assert!(name.starts_with(&format!("secretsupdate.{}", "a".repeat(40))));
        assert!(name.ends_with(|c: char| c.is_ascii_alphanumeric()));
        assert_eq!(marker_key(&long), key);

        let sibling = "a".repeat(40) + "-payments-backend-staging-secrets";
        assert_ne!(marker_key(&sibling), key);

        let fits = "b".repeat(49);
        assert_eq!(
            marker_key(&fits),
            format!("secrets.doppler.com/secretsupdate.{fits}")
        );
    }

    fn deployment(value: serde_json::Value) -> Deployment {
        serde_json::from_value(value).unwrap()
    }

    fn with_container(container: serde_json::Value) -> Deployment {
        deployment(json!({
            "metadata": {
                "name": "web",
                "namespace": "default",
                "annotations": { "secrets.doppler.com/reload": "true" }
            },
            "spec": {
                "selector": {},
                "template": { "spec": { "containers": [container] } }
            }
        }))
    }

    #[test]
    fn test_env_from_reference_matches() {
        let d = with_container(json!({
            "name": "app",
            "envFrom": [{ "secretRef": { "name": "app-secrets" } }]
        }));
        assert!(deployment_uses_secret(&d, "app-secrets"));
        assert!(!deployment_uses_secret(&d, "other-secrets"));
        assert!(reload_enabled(&d));
    }

    #[test]
    fn test_env_secret_key_reference_matches() {
        let d = with_container(json!({
            "name": "app",
            "env": [
                { "name": "PLAIN", "value": "x" },
                { "name": "KEY", "valueFrom": { "secretKeyRef": { "name": "app-secrets", "key": "KEY" } } }
            ]
        }));
        assert!(deployment_uses_secret(&d, "app-secrets"));
    }

    #[test]
    fn test_volume_reference_matches() {
        let d = deployment(json!({
            "metadata": { "name": "web" },
            "spec": {
                "selector": {},
                "template": { "spec": {
                    "containers": [{ "name": "app" }],
                    "volumes": [{ "name": "certs", "secret": { "secretName": "app-secrets" } }]
                } }
            }
        }));
        assert!(deployment_uses_secret(&d, "app-secrets"));
        assert!(!reload_enabled(&d));
    }

    #[test]
    fn test_reload_annotation_must_be_true() {
        let d = deployment(json!({
            "metadata": { "name": "web", "annotations": { "secrets.doppler.com/reload": "yes" } }
        }));
        assert!(!reload_enabled(&d));
        assert!(!deployment_uses_secret(&d, "app-secrets"));
    }

    #[test]
    fn test_marker_key_and_value() {
        let secret: Secret = serde_json::from_value(json!({
            "metadata": {
                "name": "app-secrets",
                "namespace": "default",
                "annotations": { "secrets.doppler.com/version": "W/\"abc\"" }
            }
        }))
        .unwrap();

        assert_eq!(
            marker_key("app-secrets"),
            "secrets.doppler.com/secretsupdate.app-secrets"
        );
        assert_eq!(marker_value(&secret), "default-app-secrets-W/\"abc\"");
    }

    #[test]
    fn test_needs_reload_requires_both_levels() {
        let key = marker_key("app-secrets");
        let marked = |top: Option<&str>, template: Option<&str>| {
            deployment(json!({
                "metadata": { "name": "web", "annotations": top.map(|v| json!({ key.clone(): v })) },
                "spec": {
                    "selector": {},
                    "template": {
                        "metadata": { "annotations": template.map(|v| json!({ key.clone(): v })) },
                        "spec": { "containers": [] }
                    }
                }
            }))
        };

        assert!(!needs_reload(&marked(Some("v1"), Some("v1")), &key, "v1"));
        assert!(needs_reload(&marked(Some("v1"), None), &key, "v1"));
        assert!(needs_reload(&marked(None, Some("v1")), &key, "v1"));
        assert!(needs_reload(&marked(Some("v0"), Some("v0")), &key, "v1"));
    }
}
