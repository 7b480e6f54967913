//! Postings Composition
//!
//! Turns a label filter into the ordered stream of series to dump.
//!
//! ## Semantics
//!
//! ```text
//! key = "instance", values = [a, b], metric = "up"
//!
//!   restriction = postings(__name__, up)          resolved once, up front
//!   emit  postings(instance, a) ∩ restriction     in index order
//!   emit  postings(instance, b) ∩ restriction     then the next value
//! ```
//!
//! - OR across values of one label, AND against the metric name
//! - An empty key means every series, via the index's match-all pair
//! - Results are concatenated per value and never deduplicated: a series
//!   carrying two of the requested values is emitted twice
//! - The first error ends the stream

use std::vec;

use tracing::{debug, info};
use tsdump_core::{IndexSource, Result, SeriesRef, METRIC_NAME};

/// A label filter over one block's index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsQuery {
    label_key: String,
    label_values: Vec<String>,
    metric_name: String,
}

impl PostingsQuery {
    /// `metric_name` may be empty for no restriction.
    pub fn new(
        label_key: impl Into<String>,
        label_values: Vec<String>,
        metric_name: impl Into<String>,
    ) -> Self {
        Self {
            label_key: label_key.into(),
            label_values,
            metric_name: metric_name.into(),
        }
    }

    /// Every series in the block.
    pub fn all() -> Self {
        Self::default()
    }

    /// Start resolving against `index`. The metric-name restriction, if any,
    /// is looked up here; per-value postings are read as the stream advances.
    pub fn resolve<'a, I: IndexSource + ?Sized>(&self, index: &'a I) -> Result<SeriesRefs<'a, I>> {
        let (key, values) = if self.label_key.is_empty() {
            let (key, value) = index.all_postings_key();
            (key, vec![value])
        } else {
            (self.label_key.clone(), self.label_values.clone())
        };

        let restriction = if self.metric_name.is_empty() {
            None
        } else {
            Some(index.postings(METRIC_NAME, &self.metric_name)?)
        };

        info!(
            label_key = %key,
            values = values.len(),
            metric_name = %self.metric_name,
            restricted = restriction.as_ref().map_or(0, Vec::len),
            "resolving postings"
        );

        Ok(SeriesRefs {
            index,
            key,
            values: values.into_iter(),
            restriction,
            current: Vec::new().into_iter(),
            done: false,
        })
    }
}

/// Lazy stream of series references; fused after the first error.
pub struct SeriesRefs<'a, I: ?Sized> {
    index: &'a I,
    key: String,
    values: vec::IntoIter<String>,
    restriction: Option<Vec<SeriesRef>>,
    current: vec::IntoIter<SeriesRef>,
    done: bool,
}

impl<I: IndexSource + ?Sized> Iterator for SeriesRefs<'_, I> {
    type Item = Result<SeriesRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(r) = self.current.next() {
                return Some(Ok(r));
            }

            let Some(value) = self.values.next() else {
                self.done = true;
                return None;
            };

            match self.index.postings(&self.key, &value) {
                Ok(refs) => {
                    let refs = match &self.restriction {
                        Some(restriction) => intersect(&refs, restriction),
                        None => refs,
                    };
                    debug!(key = %self.key, value = %value, count = refs.len(), "postings");
                    self.current = refs.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<I: IndexSource + ?Sized> std::iter::FusedIterator for SeriesRefs<'_, I> {}

/// Intersection of two ascending reference lists.
pub fn intersect(a: &[SeriesRef], b: &[SeriesRef]) -> Vec<SeriesRef> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Split a comma-separated value list, trimming blanks and dropping empties.
pub fn parse_label_values(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
