//! # Managed Secret Sync
//!
//! One pass of the synchronizer:
//!
//! 1. Resolve the auth provider and acquire a Doppler credential
//! 2. Look up the existing managed secret (absent means create)
//! 3. Decide whether the cached ETag may be sent
//! 4. Download; "not modified" ends the pass without writes
//! 5. Create or replace the managed secret
//!
//! The secret type is fixed at creation. A mismatch with an existing secret is
//! reported and nothing is written.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use super::scope::managed_secret_namespace;
use super::secrets::{
    build_annotations, build_labels, build_secret_data, dashboard_link, plan_fetch,
    processors_version,
};
use super::types::{Reconciler, SyncError};
use crate::crd::DopplerSecret;
use crate::observability::metrics;
use crate::provider::{ApiContext, SecretStoreProvider, SecretsFilter, SecretsSnapshot};

/// What the pass did to the managed secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    NotModified,
    Created,
    Updated,
}

/// Reads and writes of managed secrets
#[async_trait]
pub trait ManagedSecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;
    async fn create(&self, namespace: &str, secret: &Secret) -> Result<(), kube::Error>;
    async fn replace(&self, namespace: &str, name: &str, secret: &Secret)
        -> Result<(), kube::Error>;
}

#[async_trait]
impl ManagedSecretStore for Client {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Api::<Secret>::namespaced(self.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<(), kube::Error> {
        Api::<Secret>::namespaced(self.clone(), namespace)
            .create(&PostParams::default(), secret)
            .await
            .map(|_| ())
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<(), kube::Error> {
        Api::<Secret>::namespaced(self.clone(), namespace)
            .replace(name, &PostParams::default(), secret)
            .await
            .map(|_| ())
    }
}

/// Resolve auth for `resource` and converge its managed secret
pub async fn update_secret(
    ctx: &Reconciler,
    resource: &DopplerSecret,
    operator_namespace: &str,
) -> Result<SyncOutcome, SyncError> {
    let provider = ctx.auth.resolve(resource, operator_namespace).await?;
    let context = provider.acquire_credential().await?;
    sync_managed_secret(&ctx.client, ctx.store.as_ref(), &context, resource).await
}

/// Converge the managed secret with the current Doppler config
pub async fn sync_managed_secret(
    secrets: &dyn ManagedSecretStore,
    store: &dyn SecretStoreProvider,
    context: &ApiContext,
    resource: &DopplerSecret,
) -> Result<SyncOutcome, SyncError> {
    let spec = &resource.spec;
    let namespace = managed_secret_namespace(resource);
    let name = spec.managed_secret.name.as_str();

    let existing = secrets
        .get(&namespace, name)
        .await
        .map_err(SyncError::FetchManagedSecret)?;

    if let Some(existing) = &existing {
        let existing_type = existing.type_.as_deref().unwrap_or("Opaque");
        let desired_type = spec.managed_secret.secret_type.as_str();
        if existing_type != desired_type {
            return Err(SyncError::TypeChange {
                existing: existing_type.to_string(),
                desired: desired_type.to_string(),
            });
        }
    }

    let current_processors_version =
        processors_version(&spec.processors).map_err(SyncError::ProcessorsVersion)?;
    let plan = plan_fetch(existing.as_ref(), spec, &current_processors_version);
    if !plan.changes.is_empty() {
        info!(changes = ?plan.changes, "Attributes have changed, reloading secrets");
    }

    debug!(host = %context.host, "Fetching Doppler secrets");
    let filter = SecretsFilter {
        project: spec.project.clone(),
        config: spec.config.clone(),
        secrets: spec.secrets.clone(),
        name_transformer: spec.name_transformer,
        format: spec.format,
    };
    let snapshot = store
        .fetch_secrets(context, plan.last_etag.as_deref(), &filter)
        .await?;

    if !snapshot.modified {
        info!("Doppler secrets not modified");
        return Ok(SyncOutcome::NotModified);
    }

    info!(
        old_version = plan.last_etag.as_deref().unwrap_or_default(),
        new_version = %snapshot.etag,
        "Secrets have been modified"
    );

    let desired = desired_secret(resource, &namespace, &snapshot, &current_processors_version)?;

    match existing {
        None => {
            secrets
                .create(&namespace, &desired)
                .await
                .map_err(SyncError::Create)?;
            metrics::increment_secret_writes("create");
            info!(secret = name, namespace = %namespace, "Successfully created new Kubernetes secret");
            Ok(SyncOutcome::Created)
        }
        Some(mut current) => {
            current.data = desired.data;
            current.string_data = None;
            current.metadata.annotations = desired.metadata.annotations;
            current.metadata.labels = desired.metadata.labels;
            secrets
                .replace(&namespace, name, &current)
                .await
                .map_err(SyncError::Update)?;
            metrics::increment_secret_writes("update");
            info!(secret = name, namespace = %namespace, "Successfully updated existing Kubernetes secret");
            Ok(SyncOutcome::Updated)
        }
    }
}

/// The managed secret as it should look for `snapshot`
fn desired_secret(
    resource: &DopplerSecret,
    namespace: &str,
    snapshot: &SecretsSnapshot,
    processors_version: &str,
) -> Result<Secret, SyncError> {
    let managed = &resource.spec.managed_secret;
    let data = build_secret_data(&snapshot.secrets, &resource.spec.processors, managed.secret_type)?;
    let link = dashboard_link(&snapshot.secrets, resource.spec.name_transformer);

    debug!(
        resource = %resource.name_any(),
        keys = data.len(),
        "Built managed secret data"
    );

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(managed.name.clone()),
            namespace: Some(namespace.to_string()),
            annotations: Some(build_annotations(
                &managed.annotations,
                &snapshot.etag,
                &link,
                processors_version,
                resource.spec.format,
            )),
            labels: Some(build_labels(&managed.labels)),
            ..Default::default()
        },
        type_: Some(managed.secret_type.as_str().to_string()),
        data: Some(data),
        ..Default::default()
    })
}
