//! The extension surface (component C8): registration and dispatch of
//! host-provided native functions.
//!
//! A registered entry carries everything the evaluator needs at call
//! sites: an arity range, whether arguments arrive pre-evaluated or raw,
//! and the dispatch closure itself. Custom atom *kinds* (the other half
//! of this component per the data model) are a capability set the host
//! implements directly as a [`crate::cell::CustomAtom`]; there is no
//! separate registry for them; a host simply constructs one and calls
//! [`crate::pool::Pool::alloc_custom`].

use crate::cell::CellRef;
use crate::coordinator::ContextHandle;
use crate::error::{YlError, YlResult};
use crate::pool::Pool;
use crate::symtab::SymbolTable;

/// Whether a native function's arguments are evaluated before the call
/// (`Ordinary`) or passed to it as raw, unevaluated forms (`Special`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Ordinary,
    Special,
}

/// Everything a native call needs access to, bundled so the registered
/// closure's signature stays stable as the evaluator's internals change.
pub struct NativeCallCtx<'a> {
    pub pool: &'a mut Pool,
    pub symtab: &'a mut SymbolTable,
    /// Evaluated argument values (`Ordinary`) or raw unevaluated forms
    /// (`Special`), left to right.
    pub args: &'a [CellRef],
    /// The calling thread's coordinator handle, so a native function can
    /// register owned resources (released if this context is killed) and
    /// poll for cancellation during a long-running call of its own.
    pub context: &'a ContextHandle,
}

pub type NativeFn = dyn Fn(&mut NativeCallCtx) -> YlResult<CellRef> + Send + Sync;

pub struct NativeEntry {
    pub name: String,
    pub min_arity: usize,
    pub max_arity: Option<usize>,
    pub kind: NativeKind,
    pub description: String,
    pub dispatch: Box<NativeFn>,
}

/// The interface version this runtime implements. A registration whose
/// declared `min_interface_version` is newer than this is rejected,
/// reproducing the original's version-gated `ylregister_nfunc` check.
pub const INTERFACE_VERSION: u32 = 1;

#[derive(Default)]
pub struct ExtensionRegistry {
    entries: Vec<NativeEntry>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native function, returning the id used by
    /// [`crate::cell::Dispatch::Extension`]. Fails if `min_interface_version`
    /// is newer than this runtime's [`INTERFACE_VERSION`], or if `name` is
    /// already registered.
    pub fn register(
        &mut self,
        min_interface_version: u32,
        name: impl Into<String>,
        min_arity: usize,
        max_arity: Option<usize>,
        kind: NativeKind,
        description: impl Into<String>,
        dispatch: Box<NativeFn>,
    ) -> YlResult<u32> {
        let name = name.into();
        if min_interface_version > INTERFACE_VERSION {
            return Err(YlError::ExtensionRegister {
                reason: format!(
                    "requires interface version {min_interface_version}, runtime provides {INTERFACE_VERSION}"
                ),
            });
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(YlError::ExtensionRegister {
                reason: format!("'{name}' is already registered"),
            });
        }
        let id = self.entries.len() as u32;
        self.entries.push(NativeEntry {
            name,
            min_arity,
            max_arity,
            kind,
            description: description.into(),
            dispatch,
        });
        Ok(id)
    }

    pub fn unregister(&mut self, name: &str) -> YlResult<()> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| YlError::ExtensionRegister {
                reason: format!("'{name}' is not registered"),
            })?;
        // Leave a tombstone so previously-issued Dispatch::Extension(id)
        // values already baked into cells don't silently alias a new
        // entry; calling a tombstoned id fails with FuncFail.
        self.entries[pos].dispatch = Box::new(|_| {
            Err(YlError::func_fail("native function was unregistered"))
        });
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&NativeEntry> {
        self.entries.get(id as usize)
    }

    pub fn check_arity(entry: &NativeEntry, n: usize) -> YlResult<()> {
        if n < entry.min_arity || entry.max_arity.is_some_and(|max| n > max) {
            return Err(YlError::func_invalid_param(format!(
                "'{}' takes [{}, {:?}] arguments, got {}",
                entry.name, entry.min_arity, entry.max_arity, n
            )));
        }
        Ok(())
    }

    pub fn call(&self, id: u32, ctx: &mut NativeCallCtx) -> YlResult<CellRef> {
        let entry = self
            .get(id)
            .ok_or_else(|| YlError::internal("dangling extension id"))?;
        Self::check_arity(entry, ctx.args.len())?;
        (entry.dispatch)(ctx)
    }
}
