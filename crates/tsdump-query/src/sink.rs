//! Sample sinks: where materialized samples go.

use tsdump_core::{LabelSet, Result};

/// Receives filtered samples, one call per (series, chunk).
///
/// `timestamps` and `values` are never empty and always the same length.
pub trait SampleSink {
    fn write(&mut self, labels: &LabelSet, timestamps: &[i64], values: &[f64]) -> Result<()>;

    /// Called once after the last write of a successful dump.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn write(&mut self, labels: &LabelSet, timestamps: &[i64], values: &[f64]) -> Result<()> {
        (**self).write(labels, timestamps, values)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn write(&mut self, labels: &LabelSet, timestamps: &[i64], values: &[f64]) -> Result<()> {
        (**self).write(labels, timestamps, values)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkWrite {
    pub labels: LabelSet,
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

/// Sink that keeps every write in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub writes: Vec<SinkWrite>,
    pub flushed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleSink for MemorySink {
    fn write(&mut self, labels: &LabelSet, timestamps: &[i64], values: &[f64]) -> Result<()> {
        self.writes.push(SinkWrite {
            labels: labels.clone(),
            timestamps: timestamps.to_vec(),
            values: values.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}
