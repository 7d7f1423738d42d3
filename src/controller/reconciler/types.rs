//! # Types
//!
//! Core types for the reconciler.

use std::fmt;
use std::sync::Arc;

use kube::Client;
use thiserror::Error;

use crate::auth::{AuthError, AuthManager};
use crate::config::ControllerConfig;
use crate::controller::processors::ProcessorError;
use crate::provider::{ApiError, SecretStoreProvider};

/// Failure to converge the managed secret
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to get auth provider: {0}")]
    Auth(#[from] AuthError),
    #[error("Failed to fetch managed secret reference: {0}")]
    FetchManagedSecret(#[source] kube::Error),
    #[error("Cannot change existing managed secret type from {existing} to {desired}. Delete the managed secret and re-apply the DopplerSecret.")]
    TypeChange { existing: String, desired: String },
    #[error("Failed to compute processors version: {0}")]
    ProcessorsVersion(#[source] serde_json::Error),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("Failed to build Kubernetes secret data: {0}")]
    Processor(#[from] ProcessorError),
    #[error("Failed to create Kubernetes secret: {0}")]
    Create(#[source] kube::Error),
    #[error("Failed to update Kubernetes secret: {0}")]
    Update(#[source] kube::Error),
}

impl SyncError {
    /// Errors that retrying cannot fix until the resource changes
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_configuration_error(),
            Self::TypeChange { .. } => true,
            Self::Processor(ProcessorError::UnknownProcessor(_)) => true,
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_rate_limited(),
            Self::Api(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}

/// Failure to look up the workloads that depend on the managed secret
///
/// Failures patching an individual Deployment are logged and never surface here.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("Unable to fetch deployments: {0}")]
    ListDeployments(#[source] kube::Error),
    #[error("Unable to fetch Kubernetes secret to update deployment: {0}")]
    FetchManagedSecret(#[source] kube::Error),
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Unable to update dopplersecret: {0}")]
    Sync(#[from] SyncError),
    #[error("Failed to update deployments: {0}")]
    Reload(#[from] ReloadError),
}

impl ReconcilerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Sync(e) if e.is_rate_limited())
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Sync(e) if e.is_configuration_error())
    }
}

/// Shared context handed to every reconcile pass
pub struct Reconciler {
    pub client: Client,
    pub store: Arc<dyn SecretStoreProvider>,
    pub auth: AuthManager,
    pub config: Arc<ControllerConfig>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("auth", &self.auth)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Client,
        store: Arc<dyn SecretStoreProvider>,
        auth: AuthManager,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            client,
            store,
            auth,
            config,
        }
    }
}
