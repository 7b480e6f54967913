//! Block Sessions
//!
//! A [`Block`] binds one block location to its index reader and segment
//! chunk store. The backend is chosen once, from the parsed
//! [`BlockLocation`], and both halves share it.
//!
//! ## Usage
//!
//! ```ignore
//! let location = BlockLocation::parse("s3://metrics/blocks/01HXYZ")?;
//! let mut block = Block::open(&location, &StorageConfig::default())?;
//!
//! let (index, chunks) = block.parts();
//! for series in index.postings("__name__", "up")? {
//!     let (labels, metas) = index.series(series)?;
//!     let record = chunks.chunk(metas[0].chunk_ref)?;
//! }
//!
//! block.close();
//! ```

use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::info;
use tsdump_core::{IndexSource, RangedByteSource, Result};

use crate::chunks::{SegmentChunkStore, SegmentNaming};
use crate::config::StorageConfig;
use crate::index::IndexReader;
use crate::local::LocalFile;
use crate::location::BlockLocation;
use crate::remote::{new_runtime, ObjectClient, ObjectStoreClient, RemoteObject};

/// Index reader over whichever backend the block lives on.
pub type BlockIndex = IndexReader<Box<dyn RangedByteSource>>;

pub struct Block {
    location: BlockLocation,
    index: BlockIndex,
    chunks: SegmentChunkStore,
}

impl Block {
    /// Open the index of the block at `location`. Segments open on first use.
    pub fn open(location: &BlockLocation, config: &StorageConfig) -> Result<Self> {
        match location {
            BlockLocation::Local(dir) => {
                let source: Box<dyn RangedByteSource> =
                    Box::new(LocalFile::open(dir.join("index"))?);
                let index = IndexReader::open(source)?;
                let chunks = SegmentChunkStore::local(
                    dir.clone(),
                    SegmentNaming::new(config.first_segment_file),
                );
                info!(block = %location, "opened local block");
                Ok(Self {
                    location: location.clone(),
                    index,
                    chunks,
                })
            }
            BlockLocation::Remote { bucket, .. } => {
                let runtime = new_runtime()?;
                let client = Arc::new(ObjectStoreClient::s3(bucket, config, &runtime)?);
                Self::open_remote_on(location, client, config, runtime)
            }
        }
    }

    /// Open a remote block through an explicit client.
    pub fn open_remote(
        location: &BlockLocation,
        client: Arc<dyn ObjectClient>,
        config: &StorageConfig,
    ) -> Result<Self> {
        Self::open_remote_on(location, client, config, new_runtime()?)
    }

    fn open_remote_on(
        location: &BlockLocation,
        client: Arc<dyn ObjectClient>,
        config: &StorageConfig,
        runtime: Arc<Runtime>,
    ) -> Result<Self> {
        let prefix = match location {
            BlockLocation::Remote { prefix, .. } => prefix.clone(),
            BlockLocation::Local(dir) => dir.display().to_string(),
        };
        let timeout = config.request_timeout();

        let source: Box<dyn RangedByteSource> = Box::new(RemoteObject::open(
            client.clone(),
            location.key("index"),
            runtime.clone(),
            timeout,
        )?);
        let index = IndexReader::open(source)?;
        let chunks = SegmentChunkStore::remote(
            client,
            prefix,
            runtime,
            timeout,
            SegmentNaming::new(config.first_segment_file),
        );

        info!(block = %location, timeout_secs = timeout.as_secs(), "opened remote block");
        Ok(Self {
            location: location.clone(),
            index,
            chunks,
        })
    }

    pub fn location(&self) -> &BlockLocation {
        &self.location
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn chunks(&mut self) -> &mut SegmentChunkStore {
        &mut self.chunks
    }

    /// Borrow the index and the chunk store together.
    pub fn parts(&mut self) -> (&BlockIndex, &mut SegmentChunkStore) {
        (&self.index, &mut self.chunks)
    }

    /// Release the index and every open segment. Idempotent.
    pub fn close(&mut self) {
        self.chunks.close();
        self.index.close();
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::BlockBuilder;
    use tsdump_core::{ChunkStore, ErrorKind, METRIC_NAME};

    fn fixture() -> crate::fixtures::BuiltBlock {
        BlockBuilder::new()
            .series(
                &[(METRIC_NAME, "up"), ("instance", "a")],
                vec![vec![(1000, 1.0), (2000, 1.0)]],
            )
            .build()
    }

    #[test]
    fn test_open_local_block() {
        let dir = tempfile::tempdir().unwrap();
        let built = fixture();
        built.write_to_dir(dir.path()).unwrap();

        let location = BlockLocation::Local(dir.path().to_path_buf());
        let mut block = Block::open(&location, &StorageConfig::default()).unwrap();

        let (index, chunks) = block.parts();
        let refs = index.postings(METRIC_NAME, "up").unwrap();
        let (_, metas) = index.series(refs[0]).unwrap();
        let record = chunks.chunk(metas[0].chunk_ref).unwrap();
        assert_eq!(record.encoding, 1);

        block.close();
        block.close();
    }

    #[test]
    fn test_missing_index_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let location = BlockLocation::Local(dir.path().to_path_buf());
        let err = Block::open(&location, &StorageConfig::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_open_remote_block_in_memory() {
        let store = Arc::new(object_store::memory::InMemory::new());
        let built = BlockBuilder::new()
            .first_segment_file(1)
            .series(&[(METRIC_NAME, "up")], vec![vec![(5, 0.5)]])
            .build();
        new_runtime()
            .unwrap()
            .block_on(built.upload(store.as_ref(), "blocks/b1"))
            .unwrap();

        let location = BlockLocation::parse("s3://metrics/blocks/b1").unwrap();
        let config = StorageConfig {
            first_segment_file: 1,
            ..Default::default()
        };
        let client: Arc<dyn ObjectClient> = Arc::new(ObjectStoreClient::new(store));
        let mut block = Block::open_remote(&location, client, &config).unwrap();

        let (index, chunks) = block.parts();
        let refs = index.postings(METRIC_NAME, "up").unwrap();
        let (_, metas) = index.series(refs[0]).unwrap();
        assert!(chunks.chunk(metas[0].chunk_ref).is_ok());
        assert_eq!(chunks.open_segments(), 1);
    }
}
