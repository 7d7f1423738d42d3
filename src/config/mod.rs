//! # Configuration
//!
//! Process-level configuration read once at startup.
//!
//! - `controller.rs` - reconciliation, auth cache and watch settings
//! - `server.rs` - metrics/probe HTTP server settings
//!
//! Per-resource settings live on the `DopplerSecret` spec, not here.

mod controller;
mod server;

use std::fmt::Display;
use std::str::FromStr;

use tracing::warn;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Read environment variable or return default value
///
/// Values that do not parse are logged and replaced by the default.
fn env_var_or_default<T: FromStr + Display>(key: &str, default: T) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(
            key = key,
            value = %raw,
            default = %default,
            "Invalid value for environment variable, using default"
        );
        default
    })
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a non-empty environment variable
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
