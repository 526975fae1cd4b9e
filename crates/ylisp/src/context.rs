//! Per-interpreting-thread state (half of component C7): the owned
//! resources, pending signals, and evaluation trace that belong to one
//! call into [`crate::runtime::Runtime::interpret`]/`interpret_async`,
//! as opposed to the coordinator in [`crate::coordinator`] which tracks
//! *all* such contexts at once.

use std::fmt;

use crate::cell::CellRef;

/// Identifies one interpreting context for the lifetime of a single
/// `interpret`/`interpret_async` call. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Whether a context is inside evaluation (`Running`) or parked at a
/// documented safe point between top-level forms (`Safe`). A full
/// mark-and-sweep only ever runs while every live context is `Safe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Safe,
}

/// A resource a native function registered against the context that
/// created it, released automatically when the context terminates
/// (normally, by `kill()`, or by `force_stop()`) regardless of how
/// evaluation unwound. Mirrors the design notes' "owned resources" list
/// on a thread context — a native that opens a file handle or a timer
/// registers one of these instead of relying on its own `Drop`, since a
/// killed context never runs its native frames' destructors.
pub struct OwnedResource {
    pub label: String,
    release: Box<dyn FnOnce() + Send>,
}

impl OwnedResource {
    pub fn new(label: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            release: Box::new(release),
        }
    }

    fn run(self) {
        (self.release)();
    }
}

impl fmt::Debug for OwnedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedResource").field("label", &self.label).finish()
    }
}

/// Bookkeeping a single context's coordinator entry holds: its state,
/// whether it has been asked to stop, the resources it owns, and the
/// printed trace of frames it was evaluating the last time it checked
/// in, used for [`backtrace`] formatting on the error path.
#[derive(Debug)]
pub struct ContextEntry {
    pub state: ThreadState,
    pub kill_requested: bool,
    pub resources: Vec<OwnedResource>,
    pub trace: Vec<String>,
    /// A top-level form's result this context is holding onto between
    /// dropping the runtime-state lock at a safe point and either printing
    /// it or starting the next form. Another context's full mark-and-sweep
    /// can run while this one is parked at that safe point; treating this
    /// as an extra root is what keeps it from being collected out from
    /// under the owning context.
    pub pending_root: Option<CellRef>,
}

impl ContextEntry {
    pub fn new() -> Self {
        Self {
            state: ThreadState::Running,
            kill_requested: false,
            resources: Vec::new(),
            trace: Vec::new(),
            pending_root: None,
        }
    }

    /// Runs every owned resource's release closure in reverse
    /// registration order (most recently acquired first), the same
    /// order a stack of RAII guards would unwind in.
    pub fn release_all(&mut self) {
        while let Some(resource) = self.resources.pop() {
            resource.run();
        }
    }
}

impl Default for ContextEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders a context's last-known evaluation trace as a host-facing
/// backtrace, innermost frame first. Empty when the context never
/// checked in with a non-empty trace (e.g. it failed before entering
/// `eval` at all).
pub fn backtrace(trace: &[String]) -> String {
    if trace.is_empty() {
        return String::new();
    }
    trace
        .iter()
        .rev()
        .enumerate()
        .map(|(i, frame)| format!("{i}: {frame}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn owned_resources_release_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut entry = ContextEntry::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            entry.resources.push(OwnedResource::new(format!("r{i}"), move || {
                order.lock().unwrap().push(i);
            }));
        }
        entry.release_all();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert!(entry.resources.is_empty());
    }

    #[test]
    fn release_runs_exactly_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let resource = OwnedResource::new("once", move || {
            assert!(!ran2.swap(true, Ordering::SeqCst), "released twice");
        });
        resource.run();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn backtrace_is_empty_for_a_context_with_no_recorded_trace() {
        assert_eq!(backtrace(&[]), "");
    }

    #[test]
    fn backtrace_lists_frames_innermost_first() {
        let trace = vec!["(outer)".to_string(), "(inner)".to_string()];
        let rendered = backtrace(&trace);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "0: (inner)");
        assert_eq!(lines[1], "1: (outer)");
    }
}
