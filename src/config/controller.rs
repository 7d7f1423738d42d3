//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

use crate::constants::{
    DEFAULT_API_TIMEOUT_SECS, DEFAULT_OIDC_CACHE_SIZE, DEFAULT_OPERATOR_SERVICE_ACCOUNT,
    DEFAULT_RESYNC_SECONDS, DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
    DEFAULT_WATCH_RESTART_DELAY_SECS, SERVICE_ACCOUNT_NAMESPACE_PATH,
};

use super::{env_var_opt, env_var_or_default, env_var_or_default_str};

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the controller runs in
    /// `None` when neither `POD_NAMESPACE` nor the service account mount provide one;
    /// every pass then requeues until the namespace becomes known.
    pub controller_namespace: Option<String>,
    /// Capacity of the exchange-based auth provider cache (0 disables caching)
    pub oidc_cache_size: usize,
    /// Service account used for identity token requests
    pub operator_service_account: String,
    /// Requeue interval for resources that do not set `resyncSeconds`
    pub default_resync_secs: u64,
    /// Timeout for Doppler API and exchange calls (seconds)
    pub api_timeout_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_namespace: None,
            oidc_cache_size: DEFAULT_OIDC_CACHE_SIZE,
            operator_service_account: DEFAULT_OPERATOR_SERVICE_ACCOUNT.to_string(),
            default_resync_secs: DEFAULT_RESYNC_SECONDS,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            controller_namespace: env_var_opt("POD_NAMESPACE").or_else(read_service_account_namespace),
            oidc_cache_size: env_var_or_default("OIDC_CACHE_SIZE", DEFAULT_OIDC_CACHE_SIZE),
            operator_service_account: env_var_or_default_str(
                "OPERATOR_SERVICE_ACCOUNT",
                DEFAULT_OPERATOR_SERVICE_ACCOUNT,
            ),
            default_resync_secs: env_var_or_default("DEFAULT_RESYNC_SECONDS", DEFAULT_RESYNC_SECONDS),
            api_timeout_secs: env_var_or_default("API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
        }
    }

    /// Get default resync duration
    pub fn default_resync_duration(&self) -> Duration {
        Duration::from_secs(self.default_resync_secs)
    }

    /// Get Doppler API timeout duration
    pub fn api_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

fn read_service_account_namespace() -> Option<String> {
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_PATH)
        .ok()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
}
