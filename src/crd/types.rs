//! Enumerations shared by the CRD and the Doppler client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kubernetes Secret types a managed secret may have
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum ManagedSecretType {
    #[default]
    Opaque,
    #[serde(rename = "kubernetes.io/tls")]
    Tls,
    #[serde(rename = "kubernetes.io/service-account-token")]
    ServiceAccountToken,
    #[serde(rename = "kubernetes.io/dockercfg")]
    Dockercfg,
    #[serde(rename = "kubernetes.io/dockerconfigjson")]
    DockerConfigJson,
    #[serde(rename = "kubernetes.io/basic-auth")]
    BasicAuth,
    #[serde(rename = "kubernetes.io/ssh-auth")]
    SshAuth,
    #[serde(rename = "bootstrap.kubernetes.io/token")]
    BootstrapToken,
}

impl ManagedSecretType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opaque => "Opaque",
            Self::Tls => "kubernetes.io/tls",
            Self::ServiceAccountToken => "kubernetes.io/service-account-token",
            Self::Dockercfg => "kubernetes.io/dockercfg",
            Self::DockerConfigJson => "kubernetes.io/dockerconfigjson",
            Self::BasicAuth => "kubernetes.io/basic-auth",
            Self::SshAuth => "kubernetes.io/ssh-auth",
            Self::BootstrapToken => "bootstrap.kubernetes.io/token",
        }
    }

    /// Opaque secrets take every downloaded key unless told otherwise.
    /// Typed secrets only take keys with an explicit `asName`.
    pub fn includes_secrets_by_default(self) -> bool {
        self == Self::Opaque
    }
}

impl fmt::Display for ManagedSecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Doppler download formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SecretsFormat {
    Json,
    DotnetJson,
    Env,
    Yaml,
    Docker,
}

impl SecretsFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::DotnetJson => "dotnet-json",
            Self::Env => "env",
            Self::Yaml => "yaml",
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for SecretsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment-variable friendly name transformers supported by Doppler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NameTransformer {
    UpperCamel,
    Camel,
    LowerSnake,
    TfVar,
    DotnetEnv,
}

impl NameTransformer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpperCamel => "upper-camel",
            Self::Camel => "camel",
            Self::LowerSnake => "lower-snake",
            Self::TfVar => "tf-var",
            Self::DotnetEnv => "dotnet-env",
        }
    }
}

impl fmt::Display for NameTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
