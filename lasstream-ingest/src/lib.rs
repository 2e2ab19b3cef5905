//! lasstream Ingest Crate
//!
//! Streams the point records of a LAS file into attribute buffers in
//! fixed-size batches. A bounded pool of transfer slots caps how many
//! batches are staged at once; one worker per slot reads a batch, hands it
//! to a [`RecordDecoder`] and releases the slot for the next batch.
//!
//! ## Modules
//!
//! - [`plan`]: splitting the point range into batches
//! - [`pool`]: the transfer buffer pool
//! - [`session`]: per-run state, progress and cancellation
//! - [`scheduler`]: the worker loop
//! - [`decoder`]: the decode contract and the CPU decoder
//! - [`gpu`]: the compute-shader decoder

pub mod config;
pub mod decoder;
pub mod error;
pub mod gpu;
pub mod plan;
pub mod pool;
pub mod scheduler;
pub mod session;
pub mod source;

#[cfg(test)]
mod testing;

pub use config::{FailurePolicy, IngestConfig};
pub use decoder::{CpuAttributeStore, CpuDecoder, DecodeJob, RecordDecoder};
pub use error::{ConfigError, IngestError, IngestErrorKind, PoolError, SessionError};
pub use gpu::GpuDecoder;
pub use plan::{Batch, BatchPlan, plan};
pub use pool::{SlotGuard, TransferBufferPool};
pub use scheduler::IngestScheduler;
pub use session::{CancelToken, IngestReport, IngestSession, ProgressHandle};
#[cfg(feature = "mmap")]
pub use source::MmapSource;
pub use source::{ByteSource, FileSource, MemorySource};
