//! # Chunked Batch Runner
//!
//! Bulk jobs (reconciliation, CSV import, purge) are split into chunks that
//! each commit atomically, with a pause between chunks to stay under the
//! store's write rate.
//!
//! ## Chunk Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ops: [op0 .. op899]      chunk_size = 400                              │
//! │                                                                         │
//! │  chunk 0  [0..400)   ──► commit ──► Ok   info!(committed = 400)         │
//! │           pause 1000 ms                                                 │
//! │  chunk 1  [400..800) ──► commit ──► Err  stop                           │
//! │  chunk 2  [800..900)     never attempted                                │
//! │                                                                         │
//! │  BatchReport { total: 900, succeeded: 400, chunks_committed: 1,         │
//! │                failure: Some { chunk_index: 1, error } }                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Committed chunks are never rolled back; a failure is reported, not hidden.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use tally_store::{DocumentStore, StoreError, WriteBatch, WriteOp};

use crate::config::BatchSettings;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Report
// =============================================================================

/// The chunk that stopped a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub chunk_index: usize,
    #[serde(serialize_with = "error_message")]
    pub error: StoreError,
}

fn error_message<S: serde::Serializer>(error: &StoreError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

/// Outcome of a chunked job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub job: String,
    /// Operations submitted.
    pub total: usize,
    /// Operations in committed chunks.
    pub succeeded: usize,
    pub chunks_committed: usize,
    pub failure: Option<BatchFailure>,
}

impl BatchReport {
    /// A job with nothing to write.
    pub fn empty(job: impl Into<String>) -> Self {
        BatchReport {
            job: job.into(),
            total: 0,
            succeeded: 0,
            chunks_committed: 0,
            failure: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Turns a partial run into `EngineError::PartialBatch`.
    pub fn into_result(self) -> EngineResult<BatchReport> {
        match self.failure {
            None => Ok(self),
            Some(failure) => Err(EngineError::PartialBatch {
                job: self.job,
                succeeded: self.succeeded,
                total: self.total,
                source: failure.error,
            }),
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Commits write operations chunk by chunk.
#[derive(Clone)]
pub struct BatchRunner {
    store: Arc<dyn DocumentStore>,
    chunk_size: usize,
    pause: Duration,
}

impl BatchRunner {
    pub fn new(store: Arc<dyn DocumentStore>, settings: &BatchSettings) -> Self {
        BatchRunner {
            store,
            chunk_size: settings.chunk_size.max(1),
            pause: settings.pause(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Runs `ops` in chunks, stopping at the first failed chunk.
    pub async fn run(&self, job: &str, ops: Vec<WriteOp>) -> BatchReport {
        let total = ops.len();
        let mut report = BatchReport::empty(job);
        report.total = total;

        if total == 0 {
            info!(job, "Nothing to write");
            return report;
        }

        let chunk_count = total.div_ceil(self.chunk_size);
        info!(job, total, chunks = chunk_count, "Starting batch job");

        for (index, chunk) in ops.chunks(self.chunk_size).enumerate() {
            if index > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let batch = WriteBatch::from(chunk.to_vec());
            match self.store.commit(batch).await {
                Ok(()) => {
                    report.succeeded += chunk.len();
                    report.chunks_committed += 1;
                    info!(
                        job,
                        chunk = index + 1,
                        of = chunk_count,
                        committed = report.succeeded,
                        total,
                        "Chunk committed"
                    );
                }
                Err(e) => {
                    error!(job, chunk = index + 1, of = chunk_count, error = %e, "Chunk failed, stopping job");
                    report.failure = Some(BatchFailure {
                        chunk_index: index,
                        error: e,
                    });
                    break;
                }
            }
        }

        report
    }
}
