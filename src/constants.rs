//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Defaults here can be overridden via environment variables where the
//! [`crate::config`] module reads them. The `secrets.doppler.com/*` keys are part
//! of the on-cluster contract and must not change between releases.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Requeue interval when a resource does not set `resyncSeconds`
pub const DEFAULT_RESYNC_SECONDS: u64 = 60;

/// Timeout applied to every Doppler API call (connect and full request)
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Number of exchange-based auth providers kept alive between passes
pub const DEFAULT_OIDC_CACHE_SIZE: usize = 100;

/// Lifetime requested for the local service-account token used in the exchange
pub const DEFAULT_TOKEN_EXPIRATION_SECONDS: i64 = 600;

/// A cached exchanged credential is reused only while it has more than this left
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Service account the controller requests identity tokens for
pub const DEFAULT_OPERATOR_SERVICE_ACCOUNT: &str = "doppler-operator-controller-manager";

/// Fallback location of the controller namespace inside a pod
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Field manager used for status and workload patches
pub const FIELD_MANAGER: &str = "doppler-secrets-controller";

// Doppler API

pub const DEFAULT_DOPPLER_HOST: &str = "https://api.doppler.com";
pub const SECRETS_DOWNLOAD_PATH: &str = "/v3/configs/config/secrets/download";
pub const OIDC_EXCHANGE_PATH: &str = "/v3/auth/oidc";

/// Key holding the whole payload when secrets are downloaded in a file format
pub const SECRETS_FILE_KEY: &str = "DOPPLER_SECRETS_FILE";

pub const DASHBOARD_BASE_URL: &str = "https://dashboard.doppler.com/workplace";
pub const PROJECT_MARKER_KEY: &str = "DOPPLER_PROJECT";
pub const CONFIG_MARKER_KEY: &str = "DOPPLER_CONFIG";

// Managed secret metadata

pub const VERSION_ANNOTATION: &str = "secrets.doppler.com/version";
pub const PROCESSORS_VERSION_ANNOTATION: &str = "secrets.doppler.com/processor-version";
pub const FORMAT_ANNOTATION: &str = "secrets.doppler.com/format";
pub const DASHBOARD_LINK_ANNOTATION: &str = "secrets.doppler.com/dashboard-link";

/// Annotations written by the controller; everything else is user supplied
pub const BUILT_IN_ANNOTATIONS: [&str; 4] = [
    VERSION_ANNOTATION,
    PROCESSORS_VERSION_ANNOTATION,
    FORMAT_ANNOTATION,
    DASHBOARD_LINK_ANNOTATION,
];

pub const SUBTYPE_LABEL: &str = "secrets.doppler.com/subtype";
pub const SUBTYPE_LABEL_VALUE: &str = "dopplerSecret";

// Credential-bearing secret fields

pub const SERVICE_TOKEN_KEY: &str = "serviceToken";
pub const IDENTITY_KEY: &str = "identity";
pub const EXPIRATION_SECONDS_KEY: &str = "expirationSeconds";

// Deployments

/// Deployments opt in to restarts with `secrets.doppler.com/reload: "true"`
pub const RELOAD_ANNOTATION: &str = "secrets.doppler.com/reload";

/// Prefix of the per-managed-secret change marker annotation
pub const SECRETS_UPDATE_ANNOTATION_PREFIX: &str = "secrets.doppler.com/secretsupdate";

// Status conditions

pub const SECRET_SYNC_READY_CONDITION: &str = "secrets.doppler.com/SecretSyncReady";
pub const DEPLOYMENT_RELOAD_READY_CONDITION: &str = "secrets.doppler.com/DeploymentReloadReady";
