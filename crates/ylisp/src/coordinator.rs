//! The thread coordinator (component C7): tracks every live interpreting
//! context, arbitrates `kill()`/`force_stop()` against the cooperative
//! safe-point protocol, and cleans up owned resources when a context
//! goes away.
//!
//! Structurally this is the same `Mutex<_> + Condvar` shape as a work-stealing
//! pool's slot queue: instead of a queue of idle workers, the guarded state
//! here is a registry of contexts and their states, and instead of workers
//! waiting for work, `force_stop()` waits for the registry to drain. No
//! `unsafe`; every transition goes through the mutex.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::cell::CellRef;
use crate::context::{backtrace, ContextEntry, ContextId, OwnedResource, ThreadState};
use crate::error::{YlError, YlResult};

struct CoordinatorState {
    next_id: u64,
    contexts: HashMap<ContextId, ContextEntry>,
    /// Set by `force_stop()`; every context's next checkpoint sees this and
    /// fails with `ForceStopped` instead of continuing.
    stop_requested: bool,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            next_id: 0,
            contexts: HashMap::new(),
            stop_requested: false,
        }
    }
}

/// Owns the registry of live contexts. Cloning a `ThreadCoordinator` clones
/// the `Arc`, giving every clone a handle onto the same registry — the
/// shape a `Runtime` needs to hand a coordinator reference to native
/// functions without also handing out `&mut Runtime`.
#[derive(Clone)]
pub struct ThreadCoordinator {
    inner: Arc<(Mutex<CoordinatorState>, Condvar)>,
}

impl ThreadCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(CoordinatorState::new()), Condvar::new())),
        }
    }

    /// Registers a new interpreting context and returns a handle the
    /// calling thread holds for the lifetime of one `interpret` call.
    /// Dropping the handle deregisters the context and releases whatever
    /// owned resources it still holds.
    pub fn spawn_context(&self) -> ContextHandle {
        let (lock, _) = &*self.inner;
        let id = {
            let mut state = lock.lock().expect("coordinator registry poisoned");
            let id = ContextId(state.next_id);
            state.next_id += 1;
            state.contexts.insert(id, ContextEntry::new());
            id
        };
        ContextHandle {
            id,
            coordinator: self.clone(),
        }
    }

    /// Ids of every context currently registered, in no particular order.
    pub fn live_contexts(&self) -> Vec<ContextId> {
        let (lock, _) = &*self.inner;
        let state = lock.lock().expect("coordinator registry poisoned");
        state.contexts.keys().copied().collect()
    }

    /// Requests that `target` stop at its next safe point. Rejects a
    /// context killing itself, since that thread cannot observe the
    /// result of its own call — it should simply return an error instead.
    pub fn kill(&self, caller: ContextId, target: ContextId) -> YlResult<()> {
        if caller == target {
            return Err(YlError::func_invalid_param(
                "a context cannot kill itself; return an error instead",
            ));
        }
        let (lock, _) = &*self.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        let entry = state
            .contexts
            .get_mut(&target)
            .ok_or_else(|| YlError::func_invalid_param(format!("{target} is not live")))?;
        entry.kill_requested = true;
        Ok(())
    }

    /// Requests every live context stop at its next safe point, then
    /// blocks until the registry is empty — i.e. every context has
    /// actually observed the request and torn itself down. A context
    /// already parked at a safe point (for example, one blocked inside a
    /// long-running native call that itself polls for stop) is expected
    /// to notice `stop_requested` on its own and deregister promptly;
    /// this call does not forcibly interrupt anything itself.
    pub fn force_stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        state.stop_requested = true;
        while !state.contexts.is_empty() {
            state = cvar.wait(state).expect("coordinator condvar poisoned");
        }
        state.stop_requested = false;
    }

    /// Snapshot of a context's recorded evaluation trace, for a host that
    /// wants to render a backtrace for a context other than its own (for
    /// instance after observing it was killed).
    pub fn backtrace_of(&self, target: ContextId) -> Option<String> {
        let (lock, _) = &*self.inner;
        let state = lock.lock().expect("coordinator registry poisoned");
        state.contexts.get(&target).map(|e| backtrace(&e.trace))
    }

    /// Every live context's pending top-level result, the root set a GC
    /// pass must union with the symbol table's before sweeping — see
    /// [`ContextHandle::set_pending_root`].
    pub fn pending_roots(&self) -> Vec<CellRef> {
        let (lock, _) = &*self.inner;
        let state = lock.lock().expect("coordinator registry poisoned");
        state.contexts.values().filter_map(|e| e.pending_root).collect()
    }
}

impl Default for ThreadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// A live context's handle onto its own coordinator entry. The evaluator
/// calls [`ContextHandle::checkpoint`] at every documented safe point
/// (between top-level forms, and at each `while` iteration); a native
/// function that blocks internally should poll it periodically so a
/// `kill()`/`force_stop()` aimed at it is honored promptly rather than
/// only once the native call returns.
pub struct ContextHandle {
    id: ContextId,
    coordinator: ThreadCoordinator,
}

impl ContextHandle {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn coordinator(&self) -> &ThreadCoordinator {
        &self.coordinator
    }

    /// Marks this context `Safe`, checks for a pending kill or a
    /// process-wide `force_stop`, then marks it `Running` again before
    /// returning. Fails with [`YlError::Killed`] or
    /// [`YlError::ForceStopped`] if either was pending; the caller
    /// should unwind immediately without evaluating further, letting the
    /// handle's `Drop` release owned resources.
    pub fn checkpoint(&self) -> YlResult<()> {
        let (lock, cvar) = &*self.coordinator.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        if let Some(entry) = state.contexts.get_mut(&self.id) {
            entry.state = ThreadState::Safe;
        }
        let stopped = state.stop_requested;
        let killed = state
            .contexts
            .get(&self.id)
            .is_some_and(|e| e.kill_requested);
        if let Some(entry) = state.contexts.get_mut(&self.id) {
            entry.state = ThreadState::Running;
        }
        drop(state);
        cvar.notify_all();
        if killed {
            return Err(YlError::Killed);
        }
        if stopped {
            return Err(YlError::ForceStopped);
        }
        Ok(())
    }

    /// Records the printed form the evaluator is about to descend into,
    /// so a backtrace is available if this frame never returns cleanly.
    pub fn push_trace(&self, frame: String) {
        let (lock, _) = &*self.coordinator.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        if let Some(entry) = state.contexts.get_mut(&self.id) {
            entry.trace.push(frame);
        }
    }

    pub fn pop_trace(&self) {
        let (lock, _) = &*self.coordinator.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        if let Some(entry) = state.contexts.get_mut(&self.id) {
            entry.trace.pop();
        }
    }

    /// Registers a resource this context owns; released automatically
    /// when the handle is dropped, in reverse order of registration.
    pub fn own_resource(&self, resource: OwnedResource) {
        let (lock, _) = &*self.coordinator.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        if let Some(entry) = state.contexts.get_mut(&self.id) {
            entry.resources.push(resource);
        }
    }

    /// Pins (or clears, with `None`) this context's pending top-level
    /// result so it survives any other context's full mark-and-sweep while
    /// this one is parked at a safe point without the runtime-state lock
    /// held.
    pub fn set_pending_root(&self, root: Option<CellRef>) {
        let (lock, _) = &*self.coordinator.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        if let Some(entry) = state.contexts.get_mut(&self.id) {
            entry.pending_root = root;
        }
    }

    pub fn backtrace(&self) -> String {
        let (lock, _) = &*self.coordinator.inner;
        let state = lock.lock().expect("coordinator registry poisoned");
        state
            .contexts
            .get(&self.id)
            .map(|e| backtrace(&e.trace))
            .unwrap_or_default()
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.coordinator.inner;
        let mut state = lock.lock().expect("coordinator registry poisoned");
        if let Some(mut entry) = state.contexts.remove(&self.id) {
            entry.release_all();
        }
        drop(state);
        cvar.notify_all();
    }
}
