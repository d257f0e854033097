//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - `raveldb.toml` (default configuration)
//! - `raveldb.local.toml` (git-ignored local overrides)
//! - Environment variables (`RAVELDB_*` prefix)
//!
//! None of the core algorithms require configuration; this exists
//! because every engine of this class exposes tunables for batch size and
//! parallelism, the way the teacher's `StorageConfig`/`PerformanceConfig`
//! do, and the non-goals list do not exclude it.
//!
//! ```toml
//! # raveldb.toml
//! [execution]
//! batch_size = 256
//! max_wavefronts = 0
//!
//! [join]
//! cartesian_fallback_warn_rows = 1000000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RAVELDB_EXECUTION__BATCH_SIZE=512
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub execution: ExecutionConfig,
    pub join: JoinConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Streaming/execution tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Rows per batch for in-memory stream sources (default 256).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum concurrent wavefronts per `StreamPuller`. `0` means
    /// `num_cpus::get()`.
    #[serde(default)]
    pub max_wavefronts: usize,

    /// Rows between cooperative cancellation checks (default: every 512 rows).
    #[serde(default = "default_cancellation_interval")]
    pub cancellation_check_interval: u64,
}

/// Join-strategy tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Above this many left×right pairs, a cartesian join logs a warning
    /// (it is still executed — spec has no size cutoff, this is
    /// observability only).
    #[serde(default = "default_cartesian_warn_rows")]
    pub cartesian_fallback_warn_rows: u64,

    /// Row-count threshold per chunk when parallelizing a join over rayon.
    #[serde(default = "default_join_chunk_size")]
    pub chunk_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Row-pair threshold above which a cartesian join fallback logs a
/// warning (observability only; the join still runs to completion). Kept
/// as a free-standing constant, not threaded through `EngineConfig`, so
/// `raster.rs` (which has no `Job`-borne config handle) can reference it
/// without plumbing `EngineConfig` through every join call site.
pub const DEFAULT_CARTESIAN_WARN_ROWS: u64 = 1_000_000;

fn default_batch_size() -> usize {
    256
}
fn default_cancellation_interval() -> u64 {
    crate::job::CANCELLATION_CHECK_INTERVAL
}
fn default_cartesian_warn_rows() -> u64 {
    DEFAULT_CARTESIAN_WARN_ROWS
}
fn default_join_chunk_size() -> usize {
    4096
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl EngineConfig {
    /// Load configuration from the default file locations, merged with
    /// environment overrides.
    pub fn load() -> Result<Self, crate::error::EngineError> {
        Figment::new()
            .merge(Toml::file("raveldb.toml"))
            .merge(Toml::file("raveldb.local.toml"))
            .merge(Env::prefixed("RAVELDB_").split("__"))
            .join(figment::providers::Serialized::defaults(
                EngineConfig::default(),
            ))
            .extract()
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))
    }

    pub fn from_file(path: &str) -> Result<Self, crate::error::EngineError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAVELDB_").split("__"))
            .join(figment::providers::Serialized::defaults(
                EngineConfig::default(),
            ))
            .extract()
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))
    }

    /// Resolved wavefront count: `max_wavefronts` if nonzero, else the
    /// process's CPU count.
    pub fn resolved_wavefronts(&self) -> usize {
        if self.execution.max_wavefronts == 0 {
            num_cpus::get().max(1)
        } else {
            self.execution.max_wavefronts
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            execution: ExecutionConfig {
                batch_size: default_batch_size(),
                max_wavefronts: 0,
                cancellation_check_interval: default_cancellation_interval(),
            },
            join: JoinConfig {
                cartesian_fallback_warn_rows: default_cartesian_warn_rows(),
                chunk_size: default_join_chunk_size(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
