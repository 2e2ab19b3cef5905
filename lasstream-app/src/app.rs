//! Runs one ingest session from the command line.

use indicatif::{ProgressBar, ProgressStyle};
use lasstream_gpu::{DecodeSubmitError, Renderer, RendererError};
use lasstream_ingest::{
    ByteSource, ConfigError, CpuAttributeStore, CpuDecoder, GpuDecoder, IngestConfig,
    IngestReport, IngestScheduler, IngestSession, RecordDecoder, SessionError,
};
use pollster::FutureExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

/// Where batches get decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gpu,
    Cpu,
}

/// Logging configuration.
pub struct LoggingConfig {
    pub level: String,
    pub enable_tracy: bool,
}

pub struct RunConfig {
    pub path: PathBuf,
    pub ingest: IngestConfig,
    pub backend: Backend,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("GPU setup failed: {0}")]
    Renderer(#[from] RendererError),
    #[error("GPU decoder setup failed: {0}")]
    Decoder(#[from] DecodeSubmitError),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn init_logging(logging: &LoggingConfig) {
    #[cfg(feature = "tracy")]
    {
        if logging.enable_tracy {
            use tracing_subscriber::Layer;
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;
            tracing_subscriber::registry()
                .with(tracing_tracy::TracyLayer::default())
                .with(
                    tracing_subscriber::fmt::layer().with_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| logging.level.clone().into()),
                    ),
                )
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level)),
        )
        .with_target(false)
        .init();

    #[cfg(not(feature = "tracy"))]
    if logging.enable_tracy {
        tracing::warn!("Built without the `tracy` feature; ignoring --tracy");
    }
}

pub fn run(config: &RunConfig) -> Result<IngestReport, AppError> {
    config.ingest.validate()?;

    #[cfg(feature = "mmap")]
    let source = lasstream_ingest::MmapSource::open(&config.path);
    #[cfg(not(feature = "mmap"))]
    let source = lasstream_ingest::FileSource::open(&config.path);
    let source = source.map_err(|source| AppError::Open {
        path: config.path.clone(),
        source,
    })?;

    let session = IngestSession::open(source, config.ingest.clone())?;
    let header = session.header();
    info!(
        "Loading {} ({} points, LAS {}.{}, view distance {:.3})",
        config.path.display(),
        header.num_points,
        header.version.0,
        header.version.1,
        header.diagonal()
    );

    match config.backend {
        Backend::Cpu => {
            let store = CpuAttributeStore::new(header.num_points as usize);
            let decoder = CpuDecoder::new(&store, session.layout(), session.quantization());
            Ok(run_with_progress(&session, &decoder)?)
        }
        Backend::Gpu => {
            let renderer = Renderer::new().block_on()?;
            let adapter = renderer.adapter_info();
            info!("Decoding on {} ({:?})", adapter.name, adapter.backend);
            let decoder = GpuDecoder::new(&renderer, &session)?;
            Ok(run_with_progress(&session, &decoder)?)
        }
    }
}

/// Run the scheduler while a progress bar follows the session's point count.
fn run_with_progress<S: ByteSource, D: RecordDecoder>(
    session: &IngestSession<S>,
    decoder: &D,
) -> Result<IngestReport, SessionError> {
    let progress = session.progress();
    let pb = ProgressBar::new(progress.total_points());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Loading points");

    let done = AtomicBool::new(false);
    let result = std::thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                pb.set_position(progress.points_loaded());
                std::thread::sleep(Duration::from_millis(100));
            }
        });
        let result = IngestScheduler::new(session).run(decoder);
        done.store(true, Ordering::Release);
        result
    });

    pb.set_position(progress.points_loaded());
    match &result {
        Ok(report) if report.is_complete() => pb.finish_with_message("Points loaded"),
        _ => pb.abandon_with_message("Incomplete"),
    }
    result
}
