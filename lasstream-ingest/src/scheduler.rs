//! Drives a session's batches through the pool and the decoder.
//!
//! One worker thread per transfer slot. Each worker loops: acquire a slot,
//! pull the next pending batch, read its bytes into the slot, decode, release
//! the slot, record progress. Batches finish in any order; each writes only
//! its own point range, so the result does not depend on that order.

use crate::config::FailurePolicy;
use crate::decoder::{DecodeJob, RecordDecoder};
use crate::error::{IngestError, IngestErrorKind, SessionError};
use crate::plan::Batch;
use crate::pool::SlotGuard;
use crate::session::{IngestReport, IngestSession};
use crate::source::ByteSource;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct IngestScheduler<'s, S> {
    session: &'s IngestSession<S>,
}

/// Shared between the workers of one `run`.
struct RunState {
    stop: AtomicBool,
    batches_completed: AtomicUsize,
    failures: Mutex<Vec<IngestError>>,
}

impl<'s, S: ByteSource> IngestScheduler<'s, S> {
    pub fn new(session: &'s IngestSession<S>) -> Self {
        Self { session }
    }

    /// Run every pending batch through `decoder` and block until all workers
    /// have drained.
    ///
    /// Under `FailurePolicy::Abort` the first failed batch stops dispatch and
    /// is returned as `SessionError::Ingest` once in-flight batches finish.
    /// Slots are released in every case.
    #[tracing::instrument(skip_all, fields(points = self.session.header().num_points))]
    pub fn run<D: RecordDecoder>(&self, decoder: &D) -> Result<IngestReport, SessionError> {
        let session = self.session;
        let workers = session.pool().capacity();
        let state = RunState {
            stop: AtomicBool::new(false),
            batches_completed: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        };
        let start = Instant::now();
        info!(
            "Ingesting {} batches with {} workers",
            session.pending(),
            workers
        );

        std::thread::scope(|s| {
            for worker in 0..workers {
                let state = &state;
                s.spawn(move || self.worker_loop(worker, decoder, state));
            }
        });

        let elapsed = start.elapsed();
        let cancelled = session.cancel_token().is_cancelled();
        let mut failures = state.failures.into_inner();
        let report = IngestReport {
            points_loaded: session.progress().points_loaded(),
            batches_completed: state.batches_completed.into_inner(),
            failures: Vec::new(),
            elapsed,
            cancelled,
        };

        if session.config().failure_policy == FailurePolicy::Abort && !failures.is_empty() {
            failures.sort_by_key(|f| f.range.start);
            let first = failures.remove(0);
            for other in &failures {
                warn!("Also failed while draining: {}", other);
            }
            error!(
                "Ingest aborted after {:.3}s with {} points loaded",
                elapsed.as_secs_f64(),
                report.points_loaded
            );
            return Err(SessionError::Ingest(first));
        }

        if cancelled {
            warn!(
                "Ingest cancelled after {:.3}s with {} of {} points loaded",
                elapsed.as_secs_f64(),
                report.points_loaded,
                session.header().num_points
            );
        } else {
            info!(
                "Loading finished in {:.3}s ({:.1}M points/s)",
                elapsed.as_secs_f64(),
                report.points_per_second() / 1_000_000.0
            );
        }
        if !failures.is_empty() {
            warn!("{} batches failed", failures.len());
        }

        Ok(IngestReport { failures, ..report })
    }

    fn worker_loop<D: RecordDecoder>(&self, worker: usize, decoder: &D, state: &RunState) {
        let session = self.session;
        let cancel = session.cancel_token();
        let progress = session.progress();

        loop {
            if state.stop.load(Ordering::Acquire) || cancel.is_cancelled() {
                break;
            }
            let mut slot = match session.pool().acquire() {
                Ok(slot) => slot,
                Err(err) => {
                    error!("Worker {} could not acquire a slot: {}", worker, err);
                    break;
                }
            };
            if state.stop.load(Ordering::Acquire) || cancel.is_cancelled() {
                break;
            }
            let Some(batch) = session.next_batch() else {
                break;
            };

            debug!(
                "Worker {} dispatching points [{}, {}) in slot {}",
                worker,
                batch.point_offset,
                batch.point_offset + batch.point_count as u64,
                slot.index()
            );
            let result = stage_and_decode(session.source(), &mut slot, &batch, decoder);
            drop(slot);

            match result {
                Ok(()) => {
                    let loaded = progress.add(batch.point_count as u64);
                    state.batches_completed.fetch_add(1, Ordering::AcqRel);
                    info!(
                        "Loaded points [{}, {}) ({:.1}%)",
                        batch.point_offset,
                        batch.point_offset + batch.point_count as u64,
                        100.0 * loaded as f64 / progress.total_points() as f64
                    );
                }
                Err(err) => {
                    error!("{}", err);
                    if session.config().failure_policy == FailurePolicy::Abort {
                        state.stop.store(true, Ordering::Release);
                    }
                    state.failures.lock().push(err);
                }
            }
            // Only after the outcome is recorded, so `is_finished` implies final counts.
            session.end_batch();
        }
    }
}

/// Read one batch into `slot` and decode it. The caller releases the slot.
fn stage_and_decode<S: ByteSource, D: RecordDecoder>(
    source: &S,
    slot: &mut SlotGuard<'_>,
    batch: &Batch,
    decoder: &D,
) -> Result<(), IngestError> {
    let range = batch.point_range();
    let len = batch.byte_len();

    let buf = slot
        .begin_transfer(len)
        .map_err(|e| IngestError::new(range.clone(), e))?;
    source
        .read_at(batch.byte_start, buf)
        .map_err(|e| IngestError::new(range.clone(), e))?;

    let job = DecodeJob {
        slot: slot.index(),
        point_offset: batch.point_offset,
        point_count: batch.point_count,
        words: slot.staged_words(len),
        byte_len: len,
    };
    decoder
        .decode(&job)
        .map_err(|e| IngestError::new(range.clone(), IngestErrorKind::Decode(Box::new(e))))?;

    slot.complete();
    Ok(())
}
