//! Output formatting for tsdb-dump
//!
//! Supports two sample formats:
//! - VictoriaMetrics: one JSON object per (series, chunk), as accepted by
//!   `/api/v1/import` (default)
//! - CSV: one row per sample
//!
//! plus the JSON line written per series by `--dump-index`.

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tsdump_core::{ChunkMeta, Error, LabelSet, Result, METRIC_NAME};
use tsdump_query::SampleSink;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    VictoriaMetrics,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "victoriametrics" => Ok(OutputFormat::VictoriaMetrics),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(Error::Config(format!("unsupported output format: {}", other))),
        }
    }
}

impl OutputFormat {
    /// Build the sink for this format over `out`.
    pub fn sink<'w, W: Write + 'w>(self, out: W) -> Box<dyn SampleSink + 'w> {
        match self {
            OutputFormat::VictoriaMetrics => Box::new(VictoriaMetricsSink::new(out)),
            OutputFormat::Csv => Box::new(CsvSink::new(out)),
        }
    }
}

fn sink_error(e: impl std::fmt::Display) -> Error {
    Error::Sink(e.to_string())
}

/// Label set as a JSON object; the last duplicate name wins.
fn metric_object(labels: &LabelSet) -> BTreeMap<&str, &str> {
    labels
        .iter()
        .map(|l| (l.name.as_str(), l.value.as_str()))
        .collect()
}

#[derive(Serialize)]
struct VictoriaMetricsLine<'a> {
    metric: BTreeMap<&'a str, &'a str>,
    values: &'a [f64],
    timestamps: &'a [i64],
}

/// JSON-lines sink in the VictoriaMetrics import format.
pub struct VictoriaMetricsSink<W: Write> {
    out: W,
}

impl<W: Write> VictoriaMetricsSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> SampleSink for VictoriaMetricsSink<W> {
    fn write(&mut self, labels: &LabelSet, timestamps: &[i64], values: &[f64]) -> Result<()> {
        let line = VictoriaMetricsLine {
            metric: metric_object(labels),
            values,
            timestamps,
        };
        serde_json::to_writer(&mut self.out, &line).map_err(sink_error)?;
        self.out.write_all(b"\n").map_err(sink_error)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(sink_error)
    }
}

/// CSV sink: `name, timestamp, value, <other label values by label name>`.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_writer(out),
        }
    }
}

impl<W: Write> SampleSink for CsvSink<W> {
    fn write(&mut self, labels: &LabelSet, timestamps: &[i64], values: &[f64]) -> Result<()> {
        let name = labels.metric_name().unwrap_or_default();
        let mut other: Vec<_> = labels.iter().filter(|l| l.name != METRIC_NAME).collect();
        other.sort_by(|a, b| a.name.cmp(&b.name));

        for (t, v) in timestamps.iter().zip(values) {
            let mut row = Vec::with_capacity(3 + other.len());
            row.push(name.to_string());
            row.push(t.to_string());
            row.push(v.to_string());
            row.extend(other.iter().map(|l| l.value.clone()));
            self.writer.write_record(&row).map_err(sink_error)?;
        }
        // hand the rows to the outer writer so none sit in the csv buffer
        self.writer.flush().map_err(sink_error)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(sink_error)
    }
}

#[derive(Serialize)]
struct IndexLine<'a> {
    labels: BTreeMap<&'a str, &'a str>,
    chunks: &'a [ChunkMeta],
}

/// Write one `--dump-index` line for a series.
pub fn write_index_line<W: Write>(out: &mut W, labels: &LabelSet, metas: &[ChunkMeta]) -> Result<()> {
    let line = IndexLine {
        labels: metric_object(labels),
        chunks: metas,
    };
    serde_json::to_writer(&mut *out, &line).map_err(sink_error)?;
    out.write_all(b"\n").map_err(sink_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsdump_core::{ChunkRef, ErrorKind};

    fn labels() -> LabelSet {
        [(METRIC_NAME, "up"), ("job", "node"), ("instance", "a")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(
            "victoriametrics".parse::<OutputFormat>().unwrap(),
            OutputFormat::VictoriaMetrics
        );
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);

        let err = "parquet".parse::<OutputFormat>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_victoriametrics_line() {
        let mut buf = Vec::new();
        let mut sink = VictoriaMetricsSink::new(&mut buf);
        sink.write(&labels(), &[1000, 3000], &[1.0, 0.5]).unwrap();
        sink.flush().unwrap();

        let out = String::from_utf8(buf).unwrap();
        assert_eq!(
            out,
            "{\"metric\":{\"__name__\":\"up\",\"instance\":\"a\",\"job\":\"node\"},\
             \"values\":[1.0,0.5],\"timestamps\":[1000,3000]}\n"
        );
    }

    #[test]
    fn test_victoriametrics_last_duplicate_wins() {
        let mut set = labels();
        set.push(tsdump_core::Label::new("instance", "override"));

        let mut buf = Vec::new();
        VictoriaMetricsSink::new(&mut buf).write(&set, &[1], &[1.0]).unwrap();

        let out = String::from_utf8(buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(parsed["metric"]["instance"], "override");
    }

    #[test]
    fn test_csv_rows() {
        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf);
            sink.write(&labels(), &[1000, 2000], &[1.0, 0.25]).unwrap();
            sink.flush().unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(out, "up,1000,1,a,node\nup,2000,0.25,a,node\n");
    }

    #[test]
    fn test_csv_rows_leave_sink_per_write() {
        let mut buf = Vec::new();
        let mut sink = CsvSink::new(&mut buf);
        sink.write(&labels(), &[1000], &[1.0]).unwrap();
        // dropping the sink must not be what delivers the rows
        std::mem::forget(sink);
        assert_eq!(String::from_utf8(buf).unwrap(), "up,1000,1,a,node\n");
    }

    #[test]
    fn test_csv_quotes_values() {
        let set: LabelSet = [(METRIC_NAME, "up"), ("path", "a,b")].into_iter().collect();
        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf);
            sink.write(&set, &[1], &[2.0]).unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "up,1,2,\"a,b\"\n");
    }

    #[test]
    fn test_index_line() {
        let metas = [
            ChunkMeta::new(ChunkRef::new(0, 8), 1000, 2000),
            ChunkMeta::new(ChunkRef::new(1, 8), 2001, 3000),
        ];
        let mut out = Vec::new();
        write_index_line(&mut out, &labels(), &metas).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(String::from_utf8(out).unwrap().trim()).unwrap();
        assert_eq!(parsed["labels"]["job"], "node");
        assert_eq!(parsed["chunks"][0]["ref"], 8);
        assert_eq!(parsed["chunks"][1]["ref"], (1u64 << 32) | 8);
        assert_eq!(parsed["chunks"][1]["minTime"], 2001);
        assert_eq!(parsed["chunks"][1]["maxTime"], 3000);
    }
}
