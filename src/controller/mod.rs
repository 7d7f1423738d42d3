//! # Controller
//!
//! Core controller modules for the Doppler Secrets Controller.
//!
//! - `processors`: value transformations applied before secrets are stored
//! - `transformers`: local versions of Doppler's name transformers
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks
//!
//! The `crdgen` binary lives alongside these modules but is not part of the library.

pub mod processors;
pub mod reconciler;
pub mod server;
pub mod transformers;
