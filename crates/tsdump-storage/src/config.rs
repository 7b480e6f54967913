//! Storage Configuration
//!
//! Settings for opening a block, shared by local and remote backends.
//!
//! ## StorageConfig
//!
//! - **request_timeout_secs**: Deadline for every remote HEAD/GET (default: 300 s)
//! - **region**: S3 region (default: unset; see below)
//! - **endpoint**: Optional custom S3 endpoint (for MinIO/localstack)
//! - **allow_http**: Allow plain-HTTP endpoints (default: false)
//! - **first_segment_file**: File number of segment id 0 (default: 0)
//!
//! ## Region
//!
//! First match wins:
//!
//! 1. `region` here (config file or flag)
//! 2. `AWS_REGION`, then `AWS_DEFAULT_REGION`
//! 3. With a custom `endpoint`: the client default (`us-east-1`)
//! 4. Otherwise: asked from S3 for the bucket, within `request_timeout`
//!
//! ## Usage
//!
//! ```ignore
//! use tsdump_storage::StorageConfig;
//!
//! // Prometheus-written block on MinIO
//! let config = StorageConfig {
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     allow_http: true,
//!     first_segment_file: 1,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Deadline in seconds for each remote request (default: 5 minutes)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// S3 region; unset means environment or bucket lookup
    #[serde(default)]
    pub region: Option<String>,

    /// Optional S3 endpoint (for MinIO/localstack)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Allow `http://` endpoints
    #[serde(default)]
    pub allow_http: bool,

    /// Number of the segment file holding segment id 0. Blocks written by
    /// Prometheus start at `000001`.
    #[serde(default)]
    pub first_segment_file: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            region: None,
            endpoint: None,
            allow_http: false,
            first_segment_file: 0,
        }
    }
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    300 // 5 minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.endpoint, None);
        assert_eq!(config.region, None);
        assert!(!config.allow_http);
        assert_eq!(config.first_segment_file, 0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: StorageConfig = toml::from_str(
            r#"
            endpoint = "http://localhost:9000"
            allow_http = true
            first_segment_file = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.allow_http);
        assert_eq!(config.first_segment_file, 1);
        assert_eq!(config.request_timeout_secs, 300);
        assert_eq!(config.region, None);
    }

    #[test]
    fn test_region_from_file() {
        let config: StorageConfig = toml::from_str(r#"region = "eu-west-1""#).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_timeout_override() {
        let config: StorageConfig = toml::from_str("request_timeout_secs = 5").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }
}
