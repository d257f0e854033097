//! Cancellation and progress-reporting context threaded through every
//! suspension point: stream `fetch`, raster materialization, mutation
//! calls. Grounded on the teacher's `execution::timeout::QueryTimeout` /
//! `execution::limits::ResourceLimits` cooperative-cancellation design —
//! reworked from query-timeout enforcement into the plain `Job` context the
//! streaming engine expects to receive by reference.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// How often (in rows) long-running operations must poll
/// [`Job::is_cancelled`].
pub const CANCELLATION_CHECK_INTERVAL: u64 = 512;

/// Resource ceilings a `Job` enforces cooperatively. `None` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub max_result_rows: Option<u64>,
    pub max_intermediate_rows: Option<u64>,
}

/// Shared cancellation/progress context for one logical query execution.
///
/// Cheap to clone (an `Arc` handle); every transformer, puller, and raster
/// operation that accepts a `&Job` shares the same underlying flags.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

struct JobInner {
    cancelled: AtomicBool,
    started: Instant,
    limits: ResourceLimits,
    rows_seen: AtomicU64,
    progress: DashMap<String, f64>,
}

impl Job {
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    pub fn with_limits(limits: ResourceLimits) -> Self {
        Job {
            inner: Arc::new(JobInner {
                cancelled: AtomicBool::new(false),
                started: Instant::now(),
                limits,
                rows_seen: AtomicU64::new(0),
                progress: DashMap::new(),
            }),
        }
    }

    /// Cooperative cancellation flag. Long-running operations must check
    /// this at least every [`CANCELLATION_CHECK_INTERVAL`] rows and between
    /// parallel chunks.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.inner.started.elapsed()
    }

    /// Record that `n` more rows have been produced by this job, failing
    /// with [`crate::error::EngineError::ResourceLimit`] if either
    /// configured ceiling is exceeded.
    pub fn account_rows(&self, n: u64) -> Result<(), crate::error::EngineError> {
        let total = self.inner.rows_seen.fetch_add(n, Ordering::Relaxed) + n;
        if let Some(max) = self.inner.limits.max_intermediate_rows {
            if total > max {
                return Err(crate::error::EngineError::ResourceLimit(format!(
                    "intermediate result exceeded {max} rows"
                )));
            }
        }
        Ok(())
    }

    pub fn check_result_size(&self, n: u64) -> Result<(), crate::error::EngineError> {
        if let Some(max) = self.inner.limits.max_result_rows {
            if n > max {
                return Err(crate::error::EngineError::ResourceLimit(format!(
                    "result size exceeded {max} rows"
                )));
            }
        }
        Ok(())
    }

    /// Report fractional progress (`0.0..=1.0`) under `key`, keyed by the
    /// reporting instance's identity so the job can aggregate progress
    /// across concurrently-running stages.
    pub fn report_progress(&self, fraction: f64, key: &str) {
        self.inner.progress.insert(key.to_string(), fraction.clamp(0.0, 1.0));
    }

    /// Average of all reported progress keys, or `0.0` if none reported yet.
    pub fn aggregate_progress(&self) -> f64 {
        if self.inner.progress.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.inner.progress.iter().map(|e| *e.value()).sum();
        sum / self.inner.progress.len() as f64
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}
