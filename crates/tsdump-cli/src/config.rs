//! Configuration management for tsdb-dump
//!
//! Storage settings come from an optional TOML file (`--config`) and are then
//! overridden by individual flags.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tsdump_core::{Error, Label};
use tsdump_storage::StorageConfig;

/// Flag values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct StorageOverrides {
    pub request_timeout_secs: Option<u64>,
    pub first_segment_file: Option<u32>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

/// Load a `StorageConfig` from `path`, or defaults, then apply `overrides`.
pub fn load_storage_config(path: Option<&Path>, overrides: &StorageOverrides) -> Result<StorageConfig> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))?
        }
        None => StorageConfig::default(),
    };

    if let Some(secs) = overrides.request_timeout_secs {
        config.request_timeout_secs = secs;
    }
    if let Some(first) = overrides.first_segment_file {
        config.first_segment_file = first;
    }
    if let Some(endpoint) = &overrides.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(region) = &overrides.region {
        config.region = Some(region.clone());
    }
    Ok(config)
}

/// Parse `--external-labels`: a JSON object whose values are all strings.
///
/// Labels come out sorted by name.
pub fn parse_external_labels(json: &str) -> tsdump_core::Result<Vec<Label>> {
    let map: BTreeMap<String, String> = serde_json::from_str(json)
        .map_err(|e| Error::InvalidLabels(format!("external labels {:?}: {}", json, e)))?;
    Ok(map.into_iter().map(|(k, v)| Label::new(k, v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tsdump_core::ErrorKind;

    #[test]
    fn test_external_labels() {
        let labels = parse_external_labels(r#"{"region":"eu","cluster":"c1"}"#).unwrap();
        assert_eq!(
            labels,
            vec![Label::new("cluster", "c1"), Label::new("region", "eu")]
        );
        assert!(parse_external_labels("{}").unwrap().is_empty());
    }

    #[test]
    fn test_external_labels_rejects_non_objects() {
        for bad in ["", "[]", r#"{"a":1}"#, r#"{"a":null}"#, "not json"] {
            let err = parse_external_labels(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "input {:?}", bad);
        }
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load_storage_config(None, &StorageOverrides::default()).unwrap();
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_secs = 10").unwrap();
        writeln!(file, "first_segment_file = 1").unwrap();
        writeln!(file, "endpoint = \"http://localhost:9000\"").unwrap();

        let overrides = StorageOverrides {
            request_timeout_secs: Some(3),
            ..Default::default()
        };
        let config = load_storage_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.first_segment_file, 1);
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_region_flag_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "region = \"us-west-2\"").unwrap();

        let from_file = load_storage_config(Some(file.path()), &StorageOverrides::default()).unwrap();
        assert_eq!(from_file.region.as_deref(), Some("us-west-2"));

        let overrides = StorageOverrides {
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        let config = load_storage_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_secs = \"soon\"").unwrap();
        assert!(load_storage_config(Some(file.path()), &StorageOverrides::default()).is_err());

        let missing = Path::new("/nonexistent/tsdb-dump.toml");
        assert!(load_storage_config(Some(missing), &StorageOverrides::default()).is_err());
    }
}
