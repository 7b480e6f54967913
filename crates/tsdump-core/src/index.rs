//! Index Access
//!
//! The block index maps label pairs to sorted series references and series
//! references to their labels and chunk metadata. Query code only sees this
//! trait; the on-disk reader lives in `tsdump-storage`.

use crate::chunk_ref::{ChunkMeta, SeriesRef};
use crate::error::Result;
use crate::labels::LabelSet;

pub trait IndexSource {
    /// Series carrying `name=value`, sorted ascending. Unknown pairs yield an
    /// empty list, not an error.
    fn postings(&self, name: &str, value: &str) -> Result<Vec<SeriesRef>>;

    /// Labels and chunk metadata of one series.
    fn series(&self, series: SeriesRef) -> Result<(LabelSet, Vec<ChunkMeta>)>;

    /// The sentinel pair whose postings list every series.
    fn all_postings_key(&self) -> (String, String) {
        (String::new(), String::new())
    }

    /// Release underlying handles. Idempotent.
    fn close(&mut self) {}
}

impl<I: IndexSource + ?Sized> IndexSource for Box<I> {
    fn postings(&self, name: &str, value: &str) -> Result<Vec<SeriesRef>> {
        (**self).postings(name, value)
    }

    fn series(&self, series: SeriesRef) -> Result<(LabelSet, Vec<ChunkMeta>)> {
        (**self).series(series)
    }

    fn all_postings_key(&self) -> (String, String) {
        (**self).all_postings_key()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
