//! Doppler Secrets Controller Library
//!
//! Syncs secrets from Doppler configs into Kubernetes Secrets and rolls the
//! Deployments that consume them.
//!
//! ## Quick Start
//!
//! ```rust
//! use doppler_secrets_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod auth;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
