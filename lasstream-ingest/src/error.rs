//! Error types for ingest sessions.

use lasstream_data::FormatError;
use std::ops::Range;
use thiserror::Error;

/// Invalid session configuration. Raised before any buffer is allocated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("concurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("batch of {batch_size} records x {record_length} bytes does not fit a 32-bit transfer")]
    BatchTooLarge { batch_size: u32, record_length: u32 },

    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Misuse of the transfer buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("all {capacity} transfer slots are in use")]
    Exhausted { capacity: usize },

    #[error("slot {slot} still has a transfer outstanding")]
    SlotBusy { slot: usize },

    #[error("staging {len} bytes overflows the {capacity} byte slot")]
    Overflow { len: usize, capacity: usize },
}

/// What went wrong with a single batch.
#[derive(Debug, Error)]
pub enum IngestErrorKind {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("staging failed: {0}")]
    Staging(#[from] PoolError),

    #[error("decode failed: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A failed batch, identified by its half-open point range.
#[derive(Debug, Error)]
#[error("batch [{}, {}) failed: {kind}", .range.start, .range.end)]
pub struct IngestError {
    pub range: Range<u64>,
    pub kind: IngestErrorKind,
}

impl IngestError {
    pub fn new(range: Range<u64>, kind: impl Into<IngestErrorKind>) -> Self {
        Self {
            range,
            kind: kind.into(),
        }
    }
}

/// Top-level error returned by session setup and `IngestScheduler::run`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid LAS header: {0}")]
    Format(#[from] FormatError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest aborted: {0}")]
    Ingest(#[from] IngestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
