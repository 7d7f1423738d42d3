//! # Custom Resource Definitions
//!
//! CRD types for the Doppler Secrets Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `DopplerSecret` specification, references and default values
//! - `types.rs` - secret type, download format and name transformer enums
//! - `status.rs` - status and condition types

mod spec;
mod status;
mod types;

// Re-export all public types
pub use spec::{
    default_host, default_processor_type, default_resync_seconds, default_true, DopplerSecret,
    DopplerSecretSpec, ManagedSecretReference, SecretProcessor, SecretProcessors,
    TokenSecretReference,
};
pub use status::{Condition, DopplerSecretStatus};
pub use types::{ManagedSecretType, NameTransformer, SecretsFormat};
