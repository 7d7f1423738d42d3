//! # Reconciler
//!
//! Core reconciliation logic for `DopplerSecret` resources.
//!
//! The reconciler:
//! - Watches `DopplerSecret` resources across all namespaces
//! - Resolves a Doppler credential from a token secret or identity exchange
//! - Downloads the config's secrets, sending the last ETag when it can
//! - Creates or updates the managed Kubernetes Secret
//! - Stamps dependent Deployments so they roll on changes
//! - Updates resource status conditions
//!
//! ## Reconciliation Flow
//!
//! 1. Validate namespace scope
//! 2. Sync the managed secret (`sync`)
//! 3. Record `SecretSyncReady`
//! 4. Reload dependent Deployments (`deployments`)
//! 5. Record `DeploymentReloadReady`
//! 6. Requeue after `resyncSeconds`

pub mod deployments;
pub mod reconcile;
pub mod scope;
pub mod secrets;
pub mod status;
pub mod sync;
pub mod types;

// Re-export public API
pub use deployments::{reconcile_deployments, DeploymentStore};
pub use reconcile::{reconcile, reconcile_pass, requeue_interval, ReconcileSteps};
pub use scope::{validate_scope, ScopeGrant, ScopeViolation};
pub use sync::{sync_managed_secret, ManagedSecretStore, SyncOutcome};
pub use types::{Reconciler, ReconcilerError, ReloadError, SyncError};
