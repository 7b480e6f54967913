//! Block Locations
//!
//! A block is addressed either by a filesystem path or by an object-store
//! URL. The location is parsed once and the backend never changes after
//! that.
//!
//! ```text
//! /data/01HXYZ               → Local("/data/01HXYZ")
//! file:///data/01HXYZ        → Local("/data/01HXYZ")
//! s3://metrics/blocks/01HXYZ → Remote { bucket: "metrics", prefix: "blocks/01HXYZ" }
//! gs://...                   → UnsupportedScheme
//! ```

use std::fmt;
use std::path::PathBuf;

use tsdump_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockLocation {
    Local(PathBuf),
    Remote { bucket: String, prefix: String },
}

impl BlockLocation {
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(Error::Config("block location is empty".to_string()));
        }

        let Some((scheme, rest)) = location.split_once("://") else {
            return Ok(BlockLocation::Local(PathBuf::from(location)));
        };

        match scheme {
            "file" => Ok(BlockLocation::Local(PathBuf::from(rest))),
            "s3" => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(Error::Config(format!("missing bucket in {}", location)));
                }
                Ok(BlockLocation::Remote {
                    bucket: bucket.to_string(),
                    prefix: prefix.trim_matches('/').to_string(),
                })
            }
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }

    /// Object key or relative path of `name` inside the block.
    pub fn key(&self, name: &str) -> String {
        match self {
            BlockLocation::Local(dir) => dir.join(name).display().to_string(),
            BlockLocation::Remote { prefix, .. } if prefix.is_empty() => name.to_string(),
            BlockLocation::Remote { prefix, .. } => format!("{}/{}", prefix, name),
        }
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockLocation::Local(dir) => write!(f, "{}", dir.display()),
            BlockLocation::Remote { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsdump_core::ErrorKind;

    #[test]
    fn test_local_paths() {
        assert_eq!(
            BlockLocation::parse("/data/block").unwrap(),
            BlockLocation::Local(PathBuf::from("/data/block"))
        );
        assert_eq!(
            BlockLocation::parse("file:///data/block").unwrap(),
            BlockLocation::Local(PathBuf::from("/data/block"))
        );
        assert_eq!(
            BlockLocation::parse("relative/block").unwrap(),
            BlockLocation::Local(PathBuf::from("relative/block"))
        );
    }

    #[test]
    fn test_s3_urls() {
        let loc = BlockLocation::parse("s3://metrics/blocks/01HXYZ/").unwrap();
        assert_eq!(
            loc,
            BlockLocation::Remote {
                bucket: "metrics".to_string(),
                prefix: "blocks/01HXYZ".to_string()
            }
        );
        assert_eq!(loc.key("chunks/000001"), "blocks/01HXYZ/chunks/000001");
        assert_eq!(loc.to_string(), "s3://metrics/blocks/01HXYZ");

        let root = BlockLocation::parse("s3://metrics").unwrap();
        assert_eq!(root.key("index"), "index");
    }

    #[test]
    fn test_rejects_other_schemes() {
        let err = BlockLocation::parse("gs://bucket/block").unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(ref s) if s == "gs"));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        assert!(BlockLocation::parse("s3:///block").is_err());
        assert!(BlockLocation::parse("  ").is_err());
    }
}
