//! lasstream
//!
//! Streams a LAS point cloud into position/color attribute buffers in
//! concurrent batches and reports throughput.

mod app;

use app::{Backend, LoggingConfig, RunConfig};
use clap::{Parser, ValueEnum};
use lasstream_data::CoordinateFrame;
use lasstream_ingest::{FailurePolicy, IngestConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Abort,
    BestEffort,
}

impl From<Policy> for FailurePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Abort => FailurePolicy::Abort,
            Policy::BestEffort => FailurePolicy::BestEffort,
        }
    }
}

/// lasstream - streaming LAS ingest
#[derive(Parser, Debug)]
#[command(name = "lasstream")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the LAS file to load
    file: PathBuf,

    /// JSON file with ingest settings; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Points per batch
    #[arg(short, long)]
    batch_size: Option<u32>,

    /// Batches in flight (transfer buffer count)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// What to do when a batch fails
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// Decode on the CPU instead of the GPU
    #[arg(long)]
    cpu: bool,

    /// Apply the header offset (georeferenced coordinates)
    #[arg(long)]
    world_coordinates: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also send spans to Tracy (needs the `tracy` feature)
    #[arg(long)]
    tracy: bool,
}

impl Args {
    fn ingest_config(&self) -> Result<IngestConfig, lasstream_ingest::ConfigError> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::from_json_file(path)?,
            None => IngestConfig::default(),
        };
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(policy) = self.policy {
            config.failure_policy = policy.into();
        }
        if self.world_coordinates {
            config.coordinates = CoordinateFrame::World;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    let logging = LoggingConfig {
        level: args.log_level.clone(),
        enable_tracy: args.tracy,
    };
    app::init_logging(&logging);

    let ingest = match args.ingest_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let config = RunConfig {
        path: args.file,
        ingest,
        backend: if args.cpu { Backend::Cpu } else { Backend::Gpu },
    };

    match app::run(&config) {
        Ok(report) => {
            println!(
                "Loaded {} points in {} batches in {:.3}s ({:.1}M points/s)",
                report.points_loaded,
                report.batches_completed,
                report.elapsed.as_secs_f64(),
                report.points_per_second() / 1_000_000.0
            );
            for failure in &report.failures {
                eprintln!("  {}", failure);
            }
            if report.cancelled {
                eprintln!("Ingest was cancelled");
            }
        }
        Err(e) => {
            eprintln!("Application error: {}", e);
            std::process::exit(1);
        }
    }
}
