//! # Managed Secret Contents
//!
//! Pure builders for the data, labels and annotations of the managed secret,
//! and the decision whether the next download must ignore the cached ETag.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use sha2::{Digest, Sha256};

use crate::constants::{
    BUILT_IN_ANNOTATIONS, CONFIG_MARKER_KEY, DASHBOARD_BASE_URL, DASHBOARD_LINK_ANNOTATION,
    FORMAT_ANNOTATION, PROCESSORS_VERSION_ANNOTATION, PROJECT_MARKER_KEY, SUBTYPE_LABEL,
    SUBTYPE_LABEL_VALUE, VERSION_ANNOTATION,
};
use crate::controller::processors::{self, ProcessorError};
use crate::crd::{
    DopplerSecretSpec, ManagedSecretType, NameTransformer, SecretProcessor, SecretProcessors,
    SecretsFormat,
};
use crate::provider::RemoteSecret;

/// SHA-256 of the processors map as JSON, or `""` when there are none
pub fn processors_version(processors: &SecretProcessors) -> Result<String, serde_json::Error> {
    if processors.is_empty() {
        return Ok(String::new());
    }
    let json = serde_json::to_vec(processors)?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}

/// Secret data for the downloaded entries
///
/// Entries without a processor use `plain`. Types other than `Opaque` only
/// receive entries whose processor names an output key with `asName`.
pub fn build_secret_data(
    secrets: &[RemoteSecret],
    processors: &SecretProcessors,
    secret_type: ManagedSecretType,
) -> Result<BTreeMap<String, ByteString>, ProcessorError> {
    let default_processor = SecretProcessor::default();
    let mut data = BTreeMap::new();

    for secret in secrets {
        let processor = processors.get(&secret.name).unwrap_or(&default_processor);

        let key = match &processor.as_name {
            Some(as_name) if !as_name.is_empty() => as_name.clone(),
            _ if secret_type.includes_secrets_by_default() => secret.name.clone(),
            _ => continue,
        };

        let value = processors::process(&processor.processor_type, &secret.value)?;
        data.insert(key, ByteString(value));
    }

    Ok(data)
}

/// Custom labels plus the subtype marker
pub fn build_labels(custom: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = custom.clone();
    labels.insert(SUBTYPE_LABEL.to_string(), SUBTYPE_LABEL_VALUE.to_string());
    labels
}

/// Custom annotations plus the built-in markers, which win on conflict
pub fn build_annotations(
    custom: &BTreeMap<String, String>,
    etag: &str,
    dashboard_link: &str,
    processors_version: &str,
    format: Option<SecretsFormat>,
) -> BTreeMap<String, String> {
    let mut annotations = custom.clone();
    annotations.insert(VERSION_ANNOTATION.to_string(), etag.to_string());
    annotations.insert(
        DASHBOARD_LINK_ANNOTATION.to_string(),
        dashboard_link.to_string(),
    );
    if !processors_version.is_empty() {
        annotations.insert(
            PROCESSORS_VERSION_ANNOTATION.to_string(),
            processors_version.to_string(),
        );
    }
    if let Some(format) = format {
        annotations.insert(FORMAT_ANNOTATION.to_string(), format.as_str().to_string());
    }
    annotations
}

/// Annotations on an existing secret that the controller did not write
pub fn custom_annotations(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    annotations
        .iter()
        .filter(|(key, _)| !BUILT_IN_ANNOTATIONS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Dashboard deep link from the project and config marker entries
///
/// `transformer` is the name transformer Doppler applied to the payload, so the
/// markers are looked up under their transformed names.
pub fn dashboard_link(secrets: &[RemoteSecret], transformer: Option<NameTransformer>) -> String {
    let marker = |key: &str| transformer.map_or_else(|| key.to_string(), |t| t.apply(key));
    let project_key = marker(PROJECT_MARKER_KEY);
    let config_key = marker(CONFIG_MARKER_KEY);

    let find = |key: &str| {
        secrets
            .iter()
            .find(|s| s.name == key)
            .map(|s| s.value.as_str())
            .filter(|v| !v.is_empty())
    };

    match (find(&project_key), find(&config_key)) {
        (Some(project), Some(config)) => {
            format!("{DASHBOARD_BASE_URL}/projects/{project}/configs/{config}")
        }
        _ => DASHBOARD_BASE_URL.to_string(),
    }
}

/// What the next download should send as `If-None-Match`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// `None` forces a full download
    pub last_etag: Option<String>,
    /// Derived settings that changed since the managed secret was written
    pub changes: Vec<&'static str>,
}

/// Compare the managed secret against the current spec
///
/// Processors, format, labels and custom annotations are all derived from the
/// spec; a change to any of them forces a full download so the secret is
/// rebuilt even if the Doppler config itself did not change.
pub fn plan_fetch(
    existing: Option<&Secret>,
    spec: &DopplerSecretSpec,
    current_processors_version: &str,
) -> FetchPlan {
    let empty = BTreeMap::new();
    let existing_annotations = existing
        .and_then(|s| s.metadata.annotations.as_ref())
        .unwrap_or(&empty);
    let existing_labels = existing
        .and_then(|s| s.metadata.labels.as_ref())
        .unwrap_or(&empty);
    let recorded = |key: &str| existing_annotations.get(key).map_or("", String::as_str);

    let mut changes = Vec::new();
    if recorded(PROCESSORS_VERSION_ANNOTATION) != current_processors_version {
        changes.push("processors");
    }
    if recorded(FORMAT_ANNOTATION) != spec.format.map_or("", SecretsFormat::as_str) {
        changes.push("format");
    }
    if *existing_labels != build_labels(&spec.managed_secret.labels) {
        changes.push("labels");
    }
    if custom_annotations(existing_annotations) != spec.managed_secret.annotations {
        changes.push("annotations");
    }

    let last_etag = Some(recorded(VERSION_ANNOTATION))
        .filter(|etag| !etag.is_empty() && changes.is_empty())
        .map(str::to_string);

    FetchPlan { last_etag, changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn spec(value: serde_json::Value) -> DopplerSecretSpec {
        serde_json::from_value(value).unwrap()
    }

    fn base_spec() -> DopplerSecretSpec {
        spec(serde_json::json!({
            "tokenSecret": { "name": "doppler-token" },
            "managedSecret": { "name": "app-secrets" }
        }))
    }

    fn secret(annotations: &[(&str, &str)], labels: &[(&str, &str)]) -> Secret {
        let map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        Secret {
            metadata: ObjectMeta {
                name: Some("app-secrets".to_string()),
                annotations: Some(map(annotations)),
                labels: Some(map(labels)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn in_sync_secret() -> Secret {
        secret(
            &[
                (VERSION_ANNOTATION, "W/\"etag1\""),
                (DASHBOARD_LINK_ANNOTATION, DASHBOARD_BASE_URL),
            ],
            &[(SUBTYPE_LABEL, SUBTYPE_LABEL_VALUE)],
        )
    }

    #[test]
    fn test_base64_processor_and_default_plain() {
        let processors: SecretProcessors = serde_json::from_value(serde_json::json!({
            "API_KEY": { "type": "base64" }
        }))
        .unwrap();
        let secrets = vec![
            RemoteSecret::new("API_KEY", "c2VjcmV0"),
            RemoteSecret::new("OTHER", "x"),
        ];

        let data = build_secret_data(&secrets, &processors, ManagedSecretType::Opaque).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data["API_KEY"].0, b"secret");
        assert_eq!(data["OTHER"].0, b"x");
    }

    #[test]
    fn test_non_opaque_secret_only_gets_renamed_entries() {
        let processors: SecretProcessors = serde_json::from_value(serde_json::json!({
            "TLS_CERT": { "type": "plain", "asName": "tls.crt" },
            "TLS_KEY": { "type": "plain", "asName": "tls.key" }
        }))
        .unwrap();
        let secrets = vec![
            RemoteSecret::new("DOPPLER_PROJECT", "backend"),
            RemoteSecret::new("TLS_CERT", "cert"),
            RemoteSecret::new("TLS_KEY", "key"),
        ];

        let data = build_secret_data(&secrets, &processors, ManagedSecretType::Tls).unwrap();

        let keys: Vec<_> = data.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tls.crt", "tls.key"]);
    }

    #[test]
    fn test_unknown_processor_fails_whole_build() {
        let processors: SecretProcessors = serde_json::from_value(serde_json::json!({
            "B": { "type": "gzip" }
        }))
        .unwrap();
        let secrets = vec![RemoteSecret::new("A", "a"), RemoteSecret::new("B", "b")];

        let err = build_secret_data(&secrets, &processors, ManagedSecretType::Opaque).unwrap_err();
        assert!(matches!(err, ProcessorError::UnknownProcessor(t) if t == "gzip"));
    }

    #[test]
    fn test_processors_version() {
        assert_eq!(processors_version(&SecretProcessors::new()).unwrap(), "");

        let processors: SecretProcessors = serde_json::from_value(serde_json::json!({
            "API_KEY": { "type": "base64" }
        }))
        .unwrap();
        let version = processors_version(&processors).unwrap();
        let expected = format!(
            "{:x}",
            Sha256::digest(br#"{"API_KEY":{"type":"base64"}}"#)
        );
        assert_eq!(version, expected);
        assert_eq!(version.len(), 64);
    }

    #[test]
    fn test_annotations_and_labels() {
        let custom = BTreeMap::from([
            ("team".to_string(), "payments".to_string()),
            (VERSION_ANNOTATION.to_string(), "spoofed".to_string()),
        ]);
        let annotations = build_annotations(
            &custom,
            "etag-2",
            DASHBOARD_BASE_URL,
            "",
            Some(SecretsFormat::Env),
        );

        assert_eq!(annotations["team"], "payments");
        assert_eq!(annotations[VERSION_ANNOTATION], "etag-2");
        assert_eq!(annotations[FORMAT_ANNOTATION], "env");
        assert!(!annotations.contains_key(PROCESSORS_VERSION_ANNOTATION));

        let labels = build_labels(&BTreeMap::from([("app".to_string(), "api".to_string())]));
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[SUBTYPE_LABEL], SUBTYPE_LABEL_VALUE);
    }

    #[test]
    fn test_dashboard_link() {
        let secrets = vec![
            RemoteSecret::new("DOPPLER_CONFIG", "prd"),
            RemoteSecret::new("DOPPLER_PROJECT", "backend"),
        ];
        assert_eq!(
            dashboard_link(&secrets, None),
            "https://dashboard.doppler.com/workplace/projects/backend/configs/prd"
        );
        assert_eq!(
            dashboard_link(&secrets[..1], None),
            "https://dashboard.doppler.com/workplace"
        );

        let camel = vec![
            RemoteSecret::new("dopplerConfig", "dev"),
            RemoteSecret::new("dopplerProject", "web"),
        ];
        assert_eq!(
            dashboard_link(&camel, Some(NameTransformer::Camel)),
            "https://dashboard.doppler.com/workplace/projects/web/configs/dev"
        );
    }

    #[test]
    fn test_plan_fetch_reuses_etag_when_in_sync() {
        let plan = plan_fetch(Some(&in_sync_secret()), &base_spec(), "");
        assert!(plan.changes.is_empty());
        assert_eq!(plan.last_etag.as_deref(), Some("W/\"etag1\""));
    }

    #[test]
    fn test_plan_fetch_without_existing_secret() {
        let plan = plan_fetch(None, &base_spec(), "");
        assert_eq!(plan.last_etag, None);
        assert_eq!(plan.changes, vec!["labels"]);
    }

    #[test]
    fn test_plan_fetch_processors_change() {
        let plan = plan_fetch(Some(&in_sync_secret()), &base_spec(), "abc123");
        assert_eq!(plan.changes, vec!["processors"]);
        assert_eq!(plan.last_etag, None);
    }

    #[test]
    fn test_plan_fetch_format_change() {
        let mut spec = base_spec();
        spec.format = Some(SecretsFormat::Json);
        let plan = plan_fetch(Some(&in_sync_secret()), &spec, "");
        assert_eq!(plan.changes, vec!["format"]);
        assert_eq!(plan.last_etag, None);
    }

    #[test]
    fn test_plan_fetch_label_change() {
        let mut spec = base_spec();
        spec.managed_secret
            .labels
            .insert("tier".to_string(), "backend".to_string());
        let plan = plan_fetch(Some(&in_sync_secret()), &spec, "");
        assert_eq!(plan.changes, vec!["labels"]);
        assert_eq!(plan.last_etag, None);
    }

    #[test]
    fn test_plan_fetch_annotation_change() {
        let mut spec = base_spec();
        spec.managed_secret
            .annotations
            .insert("owner".to_string(), "sre".to_string());
        let plan = plan_fetch(Some(&in_sync_secret()), &spec, "");
        assert_eq!(plan.changes, vec!["annotations"]);
        assert_eq!(plan.last_etag, None);
    }

    #[test]
    fn test_plan_fetch_ignores_built_in_annotations() {
        let existing = secret(
            &[
                (VERSION_ANNOTATION, "etag1"),
                (DASHBOARD_LINK_ANNOTATION, DASHBOARD_BASE_URL),
                (FORMAT_ANNOTATION, "env"),
            ],
            &[(SUBTYPE_LABEL, SUBTYPE_LABEL_VALUE)],
        );
        let mut spec = base_spec();
        spec.format = Some(SecretsFormat::Env);

        let plan = plan_fetch(Some(&existing), &spec, "");
        assert!(plan.changes.is_empty());
        assert_eq!(plan.last_etag.as_deref(), Some("etag1"));
    }
}
