//! Garbage collection policy (component C3) layered over [`crate::pool::Pool`].
//!
//! The pool itself knows how to mark-and-sweep given a root set; this
//! module decides *when* to run a full pass and what counts as "not
//! worth it".

use crate::cell::CellRef;
use crate::config::RuntimeConfig;
use crate::error::{YlError, YlResult};
use crate::pool::Pool;

/// Called when a save-point pop returns the pool to its outermost level
/// (the only point at which a full scan is considered, since only then is
/// "reachable from the symbol table" a complete root set — see the data
/// model notes on thread contexts holding their own roots while running).
///
/// Runs a full mark-and-sweep only if usage exceeds `gc_trigger_percent`.
/// If the pass frees less than `gc_min_effect_percent` of capacity, the
/// host is notified of memory shortage via `YlError::OutOfMemory`.
pub fn maybe_full_scan(pool: &mut Pool, roots: &[CellRef], cfg: &RuntimeConfig) -> YlResult<()> {
    if pool.usage_percent() <= cfg.gc_trigger_percent as u32 {
        return Ok(());
    }
    let before = pool.usage_percent();
    pool.full_scan_gc(roots);
    let after = pool.usage_percent();
    debug_assert!(before >= after, "a full scan cannot increase usage");
    if before.saturating_sub(after) < cfg.gc_min_effect_percent as u32 {
        log::error!(
            "full scan reclaimed only {}% of {} capacity; memory shortage",
            before.saturating_sub(after),
            pool.capacity()
        );
        return Err(YlError::OutOfMemory);
    }
    Ok(())
}

/// Additional full sweep run after an interpreter-visible evaluation
/// error, to recover cells the aborted evaluation would have freed at its
/// own save-point pops but didn't reach because it unwound past them.
pub fn recovery_sweep(pool: &mut Pool, roots: &[CellRef]) {
    pool.full_scan_gc(roots);
}
