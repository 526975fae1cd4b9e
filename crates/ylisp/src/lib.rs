// ylisp: an embeddable Lisp-family interpreter built from a fixed-capacity
// cell pool, a mark-and-sweep collector, a trie-backed symbol table, and a
// cooperative safe-point thread coordinator.

pub mod cell;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod eval;
pub mod extension;
pub mod gc;
pub mod pool;
pub mod printer;
pub mod reader;
pub mod runtime;
pub mod symtab;

pub use cell::{Cell, CellRef, CustomAtom};
pub use config::{Mode, RuntimeConfig};
pub use context::ContextId;
pub use error::{YlError, YlResult};
pub use extension::{NativeCallCtx, NativeEntry, NativeFn, NativeKind};
pub use runtime::Runtime;
pub use symtab::CompletionResult;
