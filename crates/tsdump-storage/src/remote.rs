//! Remote Object Sources
//!
//! Reads byte ranges of objects in S3-compatible storage without downloading
//! them.
//!
//! ## Request Pattern
//!
//! ```text
//! RemoteObject::open(key)      HEAD key                    → size
//! source.range(3, 8)           GET key  Range: bytes=3-7   → 5 bytes
//! source.range(8, 8)           (no request)                → empty
//! ```
//!
//! Every request is bounded by the configured deadline. An expired deadline
//! surfaces as [`Error::Timeout`], the only retryable error; anything else
//! the backend reports is [`Error::Transport`]. Nothing is retried or cached
//! here.
//!
//! ## Sync Over Async
//!
//! [`ObjectClient`] is async because `object_store` is. [`RemoteObject`]
//! exposes the synchronous [`RangedByteSource`] API by driving each request
//! to completion on a private current-thread runtime shared by one block
//! session. Calling it from inside another tokio runtime panics in
//! `block_on`, so callers on an async executor must use `spawn_blocking`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{resolve_bucket_region, AmazonS3Builder, AmazonS3ConfigKey};
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore};
use tokio::runtime::Runtime;
use tracing::{debug, info};
use tsdump_core::source::check_range;
use tsdump_core::{Error, RangedByteSource, Result};

use crate::config::StorageConfig;

/// Half-open byte range `[start, end)` of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// HTTP `Range` header value; the end bound is inclusive on the wire.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Minimal object-store surface the block reader needs.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Size of the object in bytes.
    async fn head(&self, key: &str) -> Result<u64>;

    /// Bytes of `range` within the object.
    async fn get_range(&self, key: &str, range: ByteRange) -> Result<Bytes>;
}

/// Where an S3 client's region comes from, in order of precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSource {
    /// `region` from the config file or a flag
    Configured(String),
    /// `AWS_REGION` or `AWS_DEFAULT_REGION`, as read by the builder
    Environment(String),
    /// Custom endpoint and no region: the builder default applies
    EndpointDefault,
    /// Looked up from the bucket itself
    Bucket,
}

impl RegionSource {
    pub fn pick(config: &StorageConfig, from_env: Option<String>) -> Self {
        if let Some(region) = &config.region {
            RegionSource::Configured(region.clone())
        } else if let Some(region) = from_env {
            RegionSource::Environment(region)
        } else if config.endpoint.is_some() {
            RegionSource::EndpointDefault
        } else {
            RegionSource::Bucket
        }
    }
}

/// [`ObjectClient`] backed by any `object_store` implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// S3 client for `bucket`, picking up credentials from the environment.
    ///
    /// Without a configured or environment region, the bucket's region is
    /// resolved on `runtime` within the request timeout.
    pub fn s3(bucket: &str, config: &StorageConfig, runtime: &Runtime) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_allow_http(config.allow_http);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let from_env = builder.get_config_value(&AmazonS3ConfigKey::Region);
        match RegionSource::pick(config, from_env) {
            RegionSource::Configured(region) => builder = builder.with_region(region),
            RegionSource::Environment(_) | RegionSource::EndpointDefault => {}
            RegionSource::Bucket => {
                let region = resolve_region(runtime, bucket, config.request_timeout())?;
                builder = builder.with_region(region);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::Config(format!("S3 client for bucket {}: {}", bucket, e)))?;
        Ok(Self::new(Arc::new(store)))
    }
}

#[async_trait]
impl ObjectClient for ObjectStoreClient {
    async fn head(&self, key: &str) -> Result<u64> {
        let meta = self
            .store
            .head(&Path::from(key))
            .await
            .map_err(|e| Error::transport(format!("HEAD {}", key), e))?;
        Ok(meta.size as u64)
    }

    async fn get_range(&self, key: &str, range: ByteRange) -> Result<Bytes> {
        self.store
            .get_range(&Path::from(key), range.start as usize..range.end as usize)
            .await
            .map_err(|e| Error::transport(format!("GET {} {}", key, range.header_value()), e))
    }
}

/// Runtime used to drive object-store requests from synchronous code.
pub fn new_runtime() -> Result<Arc<Runtime>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::io("tokio runtime", e))?;
    Ok(Arc::new(runtime))
}

fn resolve_region(runtime: &Runtime, bucket: &str, deadline: Duration) -> Result<String> {
    let context = || format!("resolve region of bucket {}", bucket);
    debug!(bucket, "resolving bucket region");
    let region = run_bounded(runtime, deadline, context, async {
        resolve_bucket_region(bucket, &ClientOptions::new())
            .await
            .map_err(|e| Error::transport(context(), e))
    })?;
    info!(bucket, region = %region, "resolved bucket region");
    Ok(region)
}

/// Run `fut` to completion, failing with [`Error::Timeout`] after `deadline`.
fn run_bounded<T>(
    runtime: &Runtime,
    deadline: Duration,
    context: impl FnOnce() -> String,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    runtime
        .block_on(async { tokio::time::timeout(deadline, fut).await })
        .map_err(|_| Error::Timeout {
            context: context(),
            after: deadline,
        })?
}

/// A remote object read lazily through ranged GETs.
pub struct RemoteObject {
    client: Arc<dyn ObjectClient>,
    key: String,
    len: u64,
    runtime: Arc<Runtime>,
    timeout: Duration,
}

impl RemoteObject {
    /// Issue the HEAD that sizes the object. No data is fetched.
    pub fn open(
        client: Arc<dyn ObjectClient>,
        key: impl Into<String>,
        runtime: Arc<Runtime>,
        timeout: Duration,
    ) -> Result<Self> {
        let key = key.into();
        debug!(key = %key, "HEAD");
        let len = run_bounded(&runtime, timeout, || format!("HEAD {}", key), client.head(&key))?;

        Ok(Self {
            client,
            key,
            len,
            runtime,
            timeout,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("key", &self.key)
            .field("len", &self.len)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RangedByteSource for RemoteObject {
    fn len(&self) -> u64 {
        self.len
    }

    fn range(&self, start: u64, end: u64) -> Result<Bytes> {
        check_range(|| self.key.clone(), start, end, self.len)?;
        let range = ByteRange::new(start, end);
        if range.is_empty() {
            return Ok(Bytes::new());
        }

        debug!(key = %self.key, start, end, "GET");
        let data = run_bounded(
            &self.runtime,
            self.timeout,
            || format!("GET {} {}", self.key, range.header_value()),
            self.client.get_range(&self.key, range),
        )?;

        if data.len() as u64 != range.len() {
            return Err(Error::Truncated {
                context: format!("GET {} {}", self.key, range.header_value()),
                expected: range.len(),
                available: data.len() as u64,
            });
        }
        Ok(data)
    }

    fn describe(&self) -> String {
        self.key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tsdump_core::ErrorKind;

    /// Serves a fixed object and records every request it sees.
    #[derive(Default)]
    struct RecordingClient {
        data: Bytes,
        requests: Mutex<Vec<String>>,
        stall: Option<Duration>,
    }

    impl RecordingClient {
        fn new(data: &'static [u8]) -> Self {
            Self {
                data: Bytes::from_static(data),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectClient for RecordingClient {
        async fn head(&self, key: &str) -> Result<u64> {
            self.requests.lock().unwrap().push(format!("HEAD {}", key));
            Ok(self.data.len() as u64)
        }

        async fn get_range(&self, key: &str, range: ByteRange) -> Result<Bytes> {
            self.requests
                .lock()
                .unwrap()
                .push(format!("GET {} {}", key, range.header_value()));
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            Ok(self
                .data
                .slice(range.start as usize..range.end as usize))
        }
    }

    #[test]
    fn test_region_precedence() {
        let env = || Some("eu-west-1".to_string());
        let configured = StorageConfig {
            region: Some("ap-south-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            RegionSource::pick(&configured, env()),
            RegionSource::Configured("ap-south-1".to_string())
        );

        let defaults = StorageConfig::default();
        assert_eq!(
            RegionSource::pick(&defaults, env()),
            RegionSource::Environment("eu-west-1".to_string())
        );
        assert_eq!(RegionSource::pick(&defaults, None), RegionSource::Bucket);

        let minio = StorageConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        assert_eq!(RegionSource::pick(&minio, None), RegionSource::EndpointDefault);
        assert_eq!(
            RegionSource::pick(&minio, env()),
            RegionSource::Environment("eu-west-1".to_string())
        );
    }

    #[test]
    fn test_default_region_env_reaches_builder() {
        // what from_env does with only AWS_DEFAULT_REGION set
        let builder = AmazonS3Builder::new()
            .with_config(AmazonS3ConfigKey::DefaultRegion, "eu-west-1");
        let from_env = builder.get_config_value(&AmazonS3ConfigKey::Region);
        assert_eq!(
            RegionSource::pick(&StorageConfig::default(), from_env),
            RegionSource::Environment("eu-west-1".to_string())
        );
    }

    #[test]
    fn test_header_value_is_inclusive() {
        assert_eq!(ByteRange::new(3, 8).header_value(), "bytes=3-7");
        assert_eq!(ByteRange::new(0, 1).header_value(), "bytes=0-0");
        assert_eq!(ByteRange::new(3, 8).len(), 5);
    }

    #[test]
    fn test_head_once_then_ranged_gets() {
        let client = Arc::new(RecordingClient::new(b"0123456789"));
        let obj = RemoteObject::open(
            client.clone(),
            "blk/chunks/000000",
            new_runtime().unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(obj.len(), 10);
        assert_eq!(client.requests(), vec!["HEAD blk/chunks/000000"]);

        assert_eq!(&obj.range(3, 8).unwrap()[..], b"34567");
        assert!(obj.range(8, 8).unwrap().is_empty());
        assert_eq!(
            client.requests(),
            vec!["HEAD blk/chunks/000000", "GET blk/chunks/000000 bytes=3-7"]
        );
    }

    #[test]
    fn test_out_of_bounds_sends_no_request() {
        let client = Arc::new(RecordingClient::new(b"0123456789"));
        let obj = RemoteObject::open(client.clone(), "k", new_runtime().unwrap(), Duration::from_secs(5))
            .unwrap();

        let err = obj.range(5, 11).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(client.requests().len(), 1);
    }

    #[test]
    fn test_slow_get_times_out_as_retryable() {
        let client = Arc::new(RecordingClient {
            data: Bytes::from_static(b"0123456789"),
            stall: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let obj = RemoteObject::open(client, "k", new_runtime().unwrap(), Duration::from_millis(20))
            .unwrap();

        let err = obj.range(0, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("bytes=0-3"));
    }

    #[test]
    fn test_in_memory_store() {
        let runtime = new_runtime().unwrap();
        let store = Arc::new(object_store::memory::InMemory::new());
        runtime
            .block_on(store.put(&Path::from("blk/index"), Bytes::from_static(b"abcdefgh")))
            .unwrap();

        let client: Arc<dyn ObjectClient> = Arc::new(ObjectStoreClient::new(store));
        let obj = RemoteObject::open(client, "blk/index", runtime, Duration::from_secs(5)).unwrap();
        assert_eq!(obj.len(), 8);
        assert_eq!(&obj.range(2, 5).unwrap()[..], b"cde");
    }

    #[test]
    fn test_missing_object_is_not_retryable() {
        let runtime = new_runtime().unwrap();
        let client: Arc<dyn ObjectClient> = Arc::new(ObjectStoreClient::new(Arc::new(
            object_store::memory::InMemory::new(),
        )));

        let err = RemoteObject::open(client, "missing", runtime, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("HEAD missing"));
    }
}
