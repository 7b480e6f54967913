//! tsdb-dump
//!
//! Dumps samples out of a single Prometheus-style TSDB block, stored either
//! on local disk or in S3.
//!
//! ## Overview
//!
//! `tsdb-dump` opens one block, selects series by label, filters samples by
//! time range and writes them out:
//! - **Sample dump** (default): VictoriaMetrics JSON lines or CSV
//! - **Index dump** (`--dump-index`): labels and chunk metadata per series,
//!   without reading any chunk data
//!
//! ## Quick Start
//!
//! ```bash
//! # Everything in a local block
//! tsdb-dump --block ./data/01HF3M2Q7ZJ0V5
//!
//! # `up` series of two jobs from S3, as CSV
//! tsdb-dump --block s3://metrics/blocks/01HF3M2Q7ZJ0V5 \
//!     --label-key job --label-value node,blackbox --metric-name up --format csv
//!
//! # Re-import into VictoriaMetrics with an extra label
//! tsdb-dump --block ./data/01HF3M2Q7ZJ0V5 --external-labels '{"cluster":"eu-1"}' \
//!     | curl -X POST --data-binary @- http://localhost:8428/api/v1/import
//! ```
//!
//! ## Configuration
//!
//! - `TSDB_DUMP_BLOCK`: block location (same as `--block`)
//! - `RUST_LOG`: log filter (default: `info`); logs go to stderr
//! - `AWS_*`: S3 credentials and region, read by the object store client;
//!   with no region anywhere, the bucket's own region is looked up
//!
//! Storage settings can also come from a TOML file via `--config`; flags
//! override it.
//!
//! ## Error Handling
//!
//! Invalid flags are rejected before any I/O. The first error of a dump
//! stops it, is printed with its full context chain, and the process exits
//! non-zero. Output still pending at that point is dropped: an `--output`
//! file is only created by a dump that succeeds.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tsdump_core::XorDecoder;
use tsdump_query::{
    dump_index, dump_samples, parse_label_values, DumpRequest, PostingsQuery, SampleFilter,
};
use tsdump_storage::{Block, BlockLocation};

mod config;
mod format;
mod output;

use config::{load_storage_config, parse_external_labels, StorageOverrides};
use format::{write_index_line, OutputFormat};
use output::DumpOutput;

#[derive(Parser, Debug)]
#[command(name = "tsdb-dump")]
#[command(about = "Dump samples from a local or S3-hosted TSDB block", long_about = None)]
struct Args {
    /// Block location: a directory, file:///path or s3://bucket/prefix
    #[arg(long, env = "TSDB_DUMP_BLOCK")]
    block: String,

    /// Write to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Label to select series by (empty: every series)
    #[arg(long, default_value = "")]
    label_key: String,

    /// Comma-separated values of --label-key
    #[arg(long, default_value = "")]
    label_value: String,

    /// Only dump series of this metric (__name__)
    #[arg(long, default_value = "")]
    metric_name: String,

    /// Labels added to every dumped series, as a JSON object
    #[arg(long, default_value = "{}")]
    external_labels: String,

    /// Earliest sample timestamp to dump (unix ms, inclusive)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    min_timestamp: i64,

    /// Latest sample timestamp to dump (unix ms, inclusive)
    #[arg(long, default_value_t = i64::MAX, allow_negative_numbers = true)]
    max_timestamp: i64,

    /// Output format: victoriametrics or csv
    #[arg(long, default_value = "victoriametrics")]
    format: String,

    /// Dump index information as JSON lines and exit
    #[arg(long)]
    dump_index: bool,

    /// Storage settings file (TOML)
    #[arg(long, env = "TSDB_DUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Deadline for each S3 request, in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Number of the first segment file (1 for Prometheus-written blocks)
    #[arg(long)]
    first_segment_file: Option<u32>,

    /// Custom S3 endpoint (MinIO, localstack)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint: Option<String>,

    /// S3 region (default: AWS_REGION, AWS_DEFAULT_REGION, else the bucket's)
    #[arg(long)]
    region: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(args)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<()> {
    // Validate everything before touching storage or the output file
    let location = BlockLocation::parse(&args.block).context("invalid --block")?;
    let query = PostingsQuery::new(
        args.label_key.as_str(),
        parse_label_values(&args.label_value),
        args.metric_name.as_str(),
    );
    let overrides = StorageOverrides {
        request_timeout_secs: args.request_timeout_secs,
        first_segment_file: args.first_segment_file,
        endpoint: args.endpoint.clone(),
        region: args.region.clone(),
    };
    let storage = load_storage_config(args.config.as_deref(), &overrides)?;

    let request = if args.dump_index {
        None
    } else {
        let format: OutputFormat = args.format.parse().context("invalid --format")?;
        let request = DumpRequest {
            query: query.clone(),
            filter: SampleFilter::new(args.min_timestamp, args.max_timestamp)
                .context("invalid timestamp range")?,
            static_labels: parse_external_labels(&args.external_labels)
                .context("invalid --external-labels")?,
        };
        Some((format, request))
    };

    let mut out = open_output(args.output.as_deref())?;

    debug!(?query, dump_index = args.dump_index, format = %args.format, "query plan");
    let mut block = Block::open(&location, &storage)
        .with_context(|| format!("open block {}", location))?;

    // On error `out` is dropped uncommitted and its pending bytes discarded
    match request {
        None => {
            let (index, _) = block.parts();
            dump_index(index, &query, |_, labels, metas| {
                write_index_line(&mut out, labels, metas)
            })
            .context("dump index")?;
        }
        Some((format, request)) => {
            let (index, chunks) = block.parts();
            let mut sink = format.sink(&mut out);
            dump_samples(index, chunks, XorDecoder, &request, &mut sink).context("dump samples")?;
        }
    }
    out.commit().context("write output")?;

    block.close();
    Ok(())
}

fn open_output(path: Option<&Path>) -> Result<DumpOutput> {
    match path {
        Some(path) => DumpOutput::file(path)
            .with_context(|| format!("create output {}", path.display())),
        None => Ok(DumpOutput::stdout()),
    }
}
