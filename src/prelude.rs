//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use doppler_secrets_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (`DopplerSecret`, `ManagedSecretType`, etc.)
//! - Provider traits (`SecretStoreProvider`, `CredentialExchanger`)
//! - Reconciler types (`Reconciler`, `ReconcilerError`, etc.)
//! - Config types (`ControllerConfig`, `ServerConfig`)

// CRD types - most commonly used
pub use crate::crd::*;

// Provider traits and the Doppler client
pub use crate::provider::doppler::DopplerClient;
pub use crate::provider::{
    ApiContext, ApiError, CredentialExchanger, SecretStoreProvider, SecretsFilter,
    SecretsSnapshot,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError, SyncOutcome};

// Auth
pub use crate::auth::{AuthError, AuthManager, AuthProvider, ExchangeProvider, ExchangeSettings};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, ServerConfig};
