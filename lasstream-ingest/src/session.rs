//! State of one ingestion run.

use crate::config::IngestConfig;
use crate::error::{IngestError, SessionError};
use crate::plan::{Batch, BatchPlan, plan};
use crate::pool::TransferBufferPool;
use crate::source::ByteSource;
use lasstream_data::{FileHeader, HEADER_PROBE_LEN, Quantization, RecordLayout, parse_header};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Live count of decoded points, shared with whoever draws them.
///
/// Only increases, and only after a batch's decode has finished. Points past
/// `points_loaded()` may still be unwritten.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressState>,
}

#[derive(Debug)]
struct ProgressState {
    loaded: AtomicU64,
    total: u64,
}

impl ProgressHandle {
    pub fn new(total: u64) -> Self {
        Self {
            inner: Arc::new(ProgressState {
                loaded: AtomicU64::new(0),
                total,
            }),
        }
    }

    pub fn points_loaded(&self) -> u64 {
        self.inner.loaded.load(Ordering::Acquire)
    }

    pub fn total_points(&self) -> u64 {
        self.inner.total
    }

    /// Loaded share of the file in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.inner.total == 0 {
            return 1.0;
        }
        self.points_loaded() as f64 / self.inner.total as f64
    }

    /// Returns the new total.
    pub(crate) fn add(&self, points: u64) -> u64 {
        self.inner.loaded.fetch_add(points, Ordering::AcqRel) + points
    }
}

/// Stops a running session from starting new batches. Batches already in
/// flight finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Summary returned when a run finishes.
#[derive(Debug)]
pub struct IngestReport {
    pub points_loaded: u64,
    pub batches_completed: usize,
    /// Failed batches. Only ever non-empty under `FailurePolicy::BestEffort`.
    pub failures: Vec<IngestError>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl IngestReport {
    pub fn points_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.points_loaded as f64 / secs
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Everything one ingestion needs: the source, its parsed header, the batch
/// queue and the transfer pool. Created at ingest start, dropped when done.
pub struct IngestSession<S> {
    source: S,
    header: FileHeader,
    config: IngestConfig,
    pool: TransferBufferPool,
    pending: Mutex<BatchPlan>,
    in_flight: AtomicUsize,
    progress: ProgressHandle,
    cancel: CancelToken,
}

impl<S: ByteSource> IngestSession<S> {
    /// Parse the header from `source` and set up the session.
    ///
    /// Configuration and header problems are reported here, before any
    /// transfer buffer is allocated.
    #[tracing::instrument(skip_all)]
    pub fn open(source: S, config: IngestConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let probe_len = source.len().min(HEADER_PROBE_LEN as u64) as usize;
        let mut probe = vec![0u8; probe_len];
        source.read_at(0, &mut probe)?;
        let header = parse_header(&probe)?;
        Self::with_header(source, header, config)
    }

    /// Set up a session for an already parsed header.
    pub fn with_header(
        source: S,
        header: FileHeader,
        config: IngestConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        // Reject truncated or bogus headers before sizing anything by num_points.
        header.check_point_data(source.len())?;
        let pending = plan(&header, config.batch_size)?;
        let slot_capacity =
            config.slot_capacity(header.point_record_length, header.num_points)?;
        let pool = TransferBufferPool::new(config.concurrency, slot_capacity)?;

        info!(
            "Session: {} points, format {}, {} byte records, {} batches of up to {}",
            header.num_points,
            header.point_format.id(),
            header.point_record_length,
            pending.len(),
            config.batch_size
        );

        Ok(Self {
            progress: ProgressHandle::new(header.num_points),
            source,
            header,
            config,
            pool,
            pending: Mutex::new(pending),
            in_flight: AtomicUsize::new(0),
            cancel: CancelToken::new(),
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn pool(&self) -> &TransferBufferPool {
        &self.pool
    }

    pub fn layout(&self) -> RecordLayout {
        self.header.layout()
    }

    pub fn quantization(&self) -> Quantization {
        Quantization::from_header(&self.header, self.config.coordinates)
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Batches started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Batches not yet started.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_finished(&self) -> bool {
        let pending = self.pending.lock();
        pending.len() == 0 && self.in_flight() == 0
    }

    /// Take the next batch and count it in flight. Both happen under the
    /// queue lock, so a batch is never in neither count.
    pub(crate) fn next_batch(&self) -> Option<Batch> {
        let mut pending = self.pending.lock();
        let batch = pending.next()?;
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(batch)
    }

    pub(crate) fn end_batch(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::source::MemorySource;
    use crate::testing::{synthetic_file, synthetic_header};
    use lasstream_data::FormatError;

    #[test]
    fn test_open_parses_header_and_plans() {
        let header = synthetic_header(1_000, 2, 26);
        let source = MemorySource::new(synthetic_file(&header));
        let config = IngestConfig {
            batch_size: 300,
            concurrency: 2,
            ..IngestConfig::default()
        };
        let session = IngestSession::open(source, config).unwrap();
        assert_eq!(session.header().num_points, 1_000);
        assert_eq!(session.pending(), 4);
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.pool().capacity(), 2);
        assert_eq!(session.pool().slot_capacity(), 300 * 26);
        assert_eq!(session.progress().total_points(), 1_000);
        assert!(!session.is_finished());
    }

    #[test]
    fn test_open_rejects_short_source() {
        let source = MemorySource::new(vec![0u8; 100]);
        let err = IngestSession::open(source, IngestConfig::default()).err();
        assert!(matches!(
            err,
            Some(SessionError::Format(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_open_rejects_zero_points() {
        let header = synthetic_header(0, 2, 26);
        let source = MemorySource::new(header.encode());
        let err = IngestSession::open(source, IngestConfig::default()).err();
        assert!(matches!(err, Some(SessionError::Format(FormatError::ZeroPoints))));
    }

    #[test]
    fn test_open_rejects_truncated_point_data() {
        let header = synthetic_header(1_000, 2, 26);
        let mut bytes = synthetic_file(&header);
        bytes.truncate(bytes.len() - 1);
        let len = bytes.len() as u64;
        let err = IngestSession::open(MemorySource::new(bytes), IngestConfig::default()).err();
        assert!(matches!(
            err,
            Some(SessionError::Format(FormatError::PointDataPastEnd { end, len: l }))
                if end == len + 1 && l == len
        ));
    }

    #[test]
    fn test_with_header_rejects_oversized_count() {
        let header = synthetic_header(10, 2, 26);
        let source = MemorySource::new(synthetic_file(&header));
        let mut bogus = header.clone();
        bogus.num_points = u64::MAX / 2;
        let err = IngestSession::with_header(source, bogus, IngestConfig::default()).err();
        assert!(matches!(
            err,
            Some(SessionError::Format(FormatError::PointDataOverflow { .. }))
        ));
    }

    #[test]
    fn test_config_checked_before_header() {
        let source = MemorySource::new(Vec::new());
        let config = IngestConfig {
            concurrency: 0,
            ..IngestConfig::default()
        };
        let err = IngestSession::open(source, config).err();
        assert!(matches!(
            err,
            Some(SessionError::Config(ConfigError::ZeroConcurrency))
        ));
    }

    #[test]
    fn test_last_batch_counted_in_flight_when_taken() {
        let header = synthetic_header(100, 2, 26);
        let source = MemorySource::new(synthetic_file(&header));
        let session = IngestSession::open(source, IngestConfig::default()).unwrap();
        assert_eq!(session.pending(), 1);

        let batch = session.next_batch().unwrap();
        assert_eq!(batch.point_range(), 0..100);
        assert_eq!(session.pending(), 0);
        assert_eq!(session.in_flight(), 1);
        assert!(!session.is_finished());

        assert!(session.next_batch().is_none());
        assert_eq!(session.in_flight(), 1);

        session.end_batch();
        assert!(session.is_finished());
    }

    #[test]
    fn test_progress_handle() {
        let progress = ProgressHandle::new(200);
        assert_eq!(progress.fraction(), 0.0);
        assert_eq!(progress.add(50), 50);
        let shared = progress.clone();
        assert_eq!(shared.add(150), 200);
        assert_eq!(progress.points_loaded(), 200);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_report_throughput() {
        let report = IngestReport {
            points_loaded: 3_000_000,
            batches_completed: 6,
            failures: Vec::new(),
            elapsed: Duration::from_millis(1500),
            cancelled: false,
        };
        assert_eq!(report.points_per_second(), 2_000_000.0);
        assert!(report.is_complete());
    }
}
