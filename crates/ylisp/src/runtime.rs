//! The runtime handle: the single entry point a host embeds, tying the
//! pool, symbol table, extension registry, and thread coordinator together
//! behind the public calls of the design notes' host system vector.
//!
//! Evaluation under this runtime is serialized by one lock guarding the
//! pool/symbol-table/extension state, acquired once per top-level form and
//! released at each safe point (between forms) so other contexts, or a
//! pending `force_stop`, get a chance to run. This is the same shape a
//! shared-queue worker pool uses a `Mutex` for, just with "the next unit of
//! dispatchable work" replaced by "the next top-level form".

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::cell::{CellRef, Dispatch};
use crate::config::{Mode, RuntimeConfig};
use crate::context::ContextId;
use crate::coordinator::{ContextHandle, ThreadCoordinator};
use crate::error::{YlError, YlResult};
use crate::eval::{self, EvalState};
use crate::extension::{ExtensionRegistry, NativeFn, NativeKind};
use crate::gc;
use crate::pool::Pool;
use crate::printer;
use crate::reader::Reader;
use crate::symtab::{CompletionResult, SymbolKind, SymbolTable};

struct RuntimeInner {
    pool: Pool,
    symtab: SymbolTable,
    ext: ExtensionRegistry,
}

thread_local! {
    // Set for the duration of a synchronous `interpret()` call on this OS
    // thread. `interpret_on` holds `inner`'s lock only between safe points,
    // not across the whole call, so a naive re-entrancy check against the
    // lock itself wouldn't catch a native function calling back into
    // `interpret()` on the same thread — it would instead block on the
    // next safe point's `lock()` and never wake, since the outer call is
    // the one holding it. This flag catches that case before it can block.
    static INTERPRETING: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

/// Clears the thread-local re-entrancy flag when dropped, including on the
/// unwinding path out of a `?` early return.
struct InterpretGuard;

impl InterpretGuard {
    fn enter() -> YlResult<Self> {
        if INTERPRETING.with(|f| f.replace(true)) {
            return Err(YlError::UnderInterpreting);
        }
        Ok(Self)
    }
}

impl Drop for InterpretGuard {
    fn drop(&mut self) {
        INTERPRETING.with(|f| f.set(false));
    }
}

/// Owns one interpreter instance: its pool, symbol table, extension
/// registry, and the coordinator tracking every context currently
/// evaluating against it. Cheap to share via `Arc` — `interpret_async`
/// takes `self: &Arc<Runtime>` so the spawned thread can outlive the
/// call that started it.
pub struct Runtime {
    inner: Mutex<RuntimeInner>,
    coordinator: ThreadCoordinator,
    config: RuntimeConfig,
}

impl Runtime {
    /// `init(system_vector)`: creates the pool, symbol table, and
    /// coordinator, and installs the predefined symbols `t`, `nil`,
    /// `quote` plus the built-in special forms.
    pub fn init(config: RuntimeConfig) -> YlResult<Self> {
        let mut pool = Pool::new(config.pool_capacity);
        let mut symtab = SymbolTable::new();
        eval::install_builtins(&mut pool, &mut symtab)?;
        symtab.insert(b"nil", SymbolKind::Bound, CellRef::Nil, "the empty list, and false");
        symtab.insert(b"t", SymbolKind::Bound, CellRef::True, "the canonical true value");
        // `quote` keeps the special-form binding `install_builtins` just
        // installed (`Builtin::Quote`); the reader interns a bare `quote`
        // token straight to `CellRef::Quote` (see reader.rs), so this
        // symbol-table entry is only ever reached via a non-bare spelling
        // (e.g. a double-quoted `"quote"` string used in head position).
        log::trace!(
            "runtime initialized: pool capacity {}, mode {:?}",
            config.pool_capacity,
            config.mode
        );
        Ok(Self {
            inner: Mutex::new(RuntimeInner {
                pool,
                symtab,
                ext: ExtensionRegistry::new(),
            }),
            coordinator: ThreadCoordinator::new(),
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The full GC root set: every symbol-table-reachable value, unioned
    /// with every live context's pinned pending result. The latter is what
    /// keeps one context's in-flight top-level value alive through another
    /// context's full mark-and-sweep once both run concurrently.
    fn roots(&self, inner: &RuntimeInner) -> Vec<CellRef> {
        let mut roots = inner.symtab.mark_reachable();
        roots.extend(self.coordinator.pending_roots());
        roots
    }

    /// Registers a native function under `name`, reachable from evaluated
    /// source the same way any other bound symbol is. This is the one
    /// entry point through which a host's native-function library (out of
    /// scope here) extends the language.
    #[allow(clippy::too_many_arguments)]
    pub fn register_native(
        &self,
        min_interface_version: u32,
        name: impl Into<String>,
        min_arity: usize,
        max_arity: Option<usize>,
        kind: NativeKind,
        description: impl Into<String>,
        dispatch: Box<NativeFn>,
    ) -> YlResult<()> {
        let name = name.into();
        let mut inner = self.inner.lock().expect("runtime state poisoned");
        let id = inner.ext.register(
            min_interface_version,
            name.clone(),
            min_arity,
            max_arity,
            kind,
            description,
            dispatch,
        )?;
        let cell = inner.pool.alloc_native_func(Dispatch::Extension(id), name.clone())?;
        inner.symtab.insert(name.as_bytes(), SymbolKind::Bound, cell, "");
        Ok(())
    }

    /// `interpret(bytes, len)`: synchronous; runs the reader and evaluator
    /// on the calling thread over every top-level form in `source`,
    /// returning the printed representation of the last one. An empty
    /// stream, or one containing only whitespace and comments, evaluates
    /// nothing and returns the printed form of `nil`.
    pub fn interpret(&self, source: &str) -> YlResult<String> {
        let _guard = InterpretGuard::enter()?;
        let handle = self.coordinator.spawn_context();
        self.interpret_on(source, &handle)
    }

    /// `interpret_async(bytes, len) -> thread_id`: spawns a new OS thread
    /// that runs `interpret`, returning its context id immediately so the
    /// caller can `kill` it before it finishes. The join handle yields the
    /// same `YlResult<String>` a synchronous `interpret` would.
    pub fn interpret_async(
        self: &Arc<Self>,
        source: String,
    ) -> (ContextId, JoinHandle<YlResult<String>>) {
        let handle = self.coordinator.spawn_context();
        let id = handle.id();
        let runtime = Arc::clone(self);
        let join = std::thread::Builder::new()
            .name(format!("ylisp-{id}"))
            .spawn(move || runtime.interpret_on(&source, &handle))
            .expect("failed to spawn evaluator thread");
        (id, join)
    }

    fn interpret_on(&self, source: &str, handle: &ContextHandle) -> YlResult<String> {
        let mut reader = Reader::new(source.as_bytes());
        let mut last = CellRef::Nil;

        loop {
            // The runtime-state lock is acquired fresh for each top-level
            // form and dropped before the safe-point checkpoint below, so a
            // concurrent context (or a pending `force_stop`) actually gets a
            // chance to run between forms rather than only in appearance.
            let mut inner = self.inner.lock().expect("runtime state poisoned");

            // Save-point discipline (§4.2/§4.6): everything the reader and
            // evaluator allocate for one top-level form lives in this
            // window; popping it reclaims all of it except whatever the
            // form's result (or a `set`/`mset` into the table) keeps alive.
            inner.pool.push_savepoint();

            let form = match reader.read_one(&mut inner.pool) {
                Ok(Some(form)) => form,
                Ok(None) => {
                    inner.pool.pop_savepoint(&[]);
                    break;
                }
                Err(e) => {
                    inner.pool.pop_savepoint(&[]);
                    return Err(self.finish_with_error(&mut inner, e));
                }
            };

            let mut state = EvalState::new(self.config.max_eval_depth, self.config.max_while_iterations, handle);
            let result = eval::eval(form, &mut inner.pool, &mut inner.symtab, &inner.ext, &mut state);
            match result {
                Ok(v) => {
                    let mut roots = self.roots(&inner);
                    roots.push(v);
                    inner.pool.pop_savepoint(&roots);
                    last = v;
                    // Pinned in the coordinator registry too, so this value
                    // survives a concurrent context's full scan even after
                    // we drop the lock below and before we print it.
                    handle.set_pending_root(Some(last));
                }
                Err(e) => {
                    inner.pool.pop_savepoint(&[]);
                    return Err(self.finish_with_error(&mut inner, e));
                }
            }

            // `last` is the pending result this call will eventually print;
            // it must count as a root here too, or a later top-level form's
            // full scan could recycle it out from under us before we get a
            // chance to print it.
            let mut roots = self.roots(&inner);
            roots.push(last);
            if let Err(e) = gc::maybe_full_scan(&mut inner.pool, &roots, &self.config) {
                return Err(self.finish_with_error(&mut inner, e));
            }

            // Safe point: drop our hold on the pool/symbol-table lock and
            // let the coordinator observe a pending kill/force_stop before
            // the next top-level form starts.
            drop(inner);
            if let Err(e) = handle.checkpoint() {
                return Err(e);
            }
        }

        handle.set_pending_root(None);
        let inner = self.inner.lock().expect("runtime state poisoned");
        Ok(printer::print(&inner.pool, last))
    }

    /// Runs the recovery sweep and applies this runtime's fatal-error
    /// policy (`Mode::Batch` aborts the process; `Mode::Repl` returns the
    /// error to the host) before handing the error back.
    fn finish_with_error(&self, inner: &mut RuntimeInner, err: YlError) -> YlError {
        let roots = self.roots(inner);
        gc::recovery_sweep(&mut inner.pool, &roots);
        if self.config.mode == Mode::Batch && matches!(err, YlError::OutOfMemory | YlError::Internal { .. }) {
            log::error!("fatal error in batch mode, aborting process: {err:?}");
            std::process::abort();
        }
        err
    }

    /// `force_stop()`: requests termination of all active evaluation and
    /// blocks until every context has cleaned up.
    pub fn force_stop(&self) {
        self.coordinator.force_stop();
    }

    pub fn kill(&self, caller: ContextId, target: ContextId) -> YlResult<()> {
        self.coordinator.kill(caller, target)
    }

    pub fn live_contexts(&self) -> Vec<ContextId> {
        self.coordinator.live_contexts()
    }

    pub fn backtrace_of(&self, target: ContextId) -> Option<String> {
        self.coordinator.backtrace_of(target)
    }

    /// `complete(prefix, buf, buflen)`.
    pub fn complete(&self, prefix: &[u8]) -> CompletionResult {
        let inner = self.inner.lock().expect("runtime state poisoned");
        inner.symtab.complete(prefix)
    }

    /// `candidates(prefix, out_slots, max_name_len) -> count`: every
    /// symbol name under `prefix`, in the dictionary order the design
    /// notes require.
    pub fn candidates(&self, prefix: &[u8]) -> Vec<String> {
        let inner = self.inner.lock().expect("runtime state poisoned");
        let mut out = Vec::new();
        inner.symtab.enumerate(prefix, |name, _record| {
            out.push(String::from_utf8_lossy(name).into_owned());
        });
        out
    }
}
