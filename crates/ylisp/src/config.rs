//! Host-supplied configuration for a [`crate::Runtime`].
//!
//! Mirrors the host system vector of the design notes: pool capacity, GC
//! trigger points, recursion depth, and the batch/repl fatal-error mode are
//! all decided once at startup and held here rather than threaded through
//! every call.

use serde::{Deserialize, Serialize};

/// How a fatal error (`OutOfMemory`, `Internal`) is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Abort the process. Suitable for an embedded batch job.
    Batch,
    /// Return the error to the host instead of aborting.
    Repl,
}

/// Configuration governing one [`crate::Runtime`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fixed number of cells the memory pool can ever hold.
    pub pool_capacity: usize,

    /// Percent occupancy at which a full mark-and-sweep is triggered at
    /// the outermost save-point. Default 80.
    pub gc_trigger_percent: u8,

    /// Minimum percent of the pool a full sweep must reclaim, or the host
    /// is notified of memory shortage. Default 5.
    pub gc_min_effect_percent: u8,

    /// Maximum evaluator recursion depth. Default 1000.
    pub max_eval_depth: usize,

    /// Hard cap on `while` loop iterations.
    pub max_while_iterations: u64,

    /// How fatal errors are surfaced.
    pub mode: Mode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let pool_capacity = std::env::var("YLISP_POOL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(65_536);

        Self {
            pool_capacity,
            gc_trigger_percent: 80,
            gc_min_effect_percent: 5,
            max_eval_depth: 1000,
            max_while_iterations: 1_000_000,
            mode: Mode::Repl,
        }
    }
}
