//! Structured error variants surfaced to the host.
//!
//! Every variant here corresponds to one `Kind` row of the error table in
//! this crate's design notes. Serialized with an internally-tagged `"kind"`
//! discriminator so a host can switch on `error.kind` in JSON without a
//! wrapper object, the same shape the rest of this workspace uses for its
//! result types.

use serde::{Deserialize, Serialize};

/// Crate-wide result alias. Used with `?` throughout.
pub type YlResult<T> = Result<T, YlError>;

/// Structured error variants produced by the reader, evaluator, memory
/// pool, symbol table, and thread coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum YlError {
    /// `init()` was called with an incomplete host system vector.
    InitError,

    /// The pool, an atom payload, or a symbol buffer could not be
    /// allocated. Fatal in batch mode; aborts the current top-level form
    /// in repl mode.
    OutOfMemory,

    /// An external native function failed on an I/O boundary.
    Io { message: String },

    /// An invariant was violated (pool corruption, a state machine ran off
    /// its transition table). Always fatal.
    Internal { message: String },

    /// `force_stop()` terminated this evaluation.
    ForceStopped,

    /// A synchronous `interpret()` was attempted while one was already
    /// running on this context.
    UnderInterpreting,

    /// A native function or custom atom kind was registered with a bad
    /// interface version or a name already in use.
    ExtensionRegister { reason: String },

    /// The reader encountered a byte it has no transition for.
    SyntaxUnknown { line: u32 },

    /// An escape sequence other than `\"`, `\\`, `\n` was used.
    SyntaxEscape { line: u32 },

    /// An unmatched `)` was seen at the top level.
    SyntaxParen { line: u32 },

    /// A bare `'` was not followed by a readable form.
    SyntaxQuote { line: u32 },

    /// A list or string was still open when the byte stream ended.
    UnterminatedForm { line: u32 },

    /// A single atom body exceeded the reader's symbol buffer.
    SymbolTooLong { line: u32 },

    /// `eval` was asked to evaluate the squote-produced wrapper in a
    /// position that forbids it.
    EvalSquoted,

    /// An argument count or index fell outside its valid range.
    EvalRange,

    /// A symbol had no binding in the association list, the symbol table,
    /// and did not parse as a number.
    EvalUndefined { name: String },

    /// The head of a form was not callable (not bound to a function,
    /// special form, or macro, and not a nested form to restart evaluation
    /// on).
    EvalFuncExpected,

    /// An assertion inside the evaluator failed (includes exceeding the
    /// configured recursion depth).
    EvalAssert { message: String },

    /// A native function was called with arguments outside its declared
    /// shape.
    FuncInvalidParam { message: String },

    /// A native function's own body reported failure.
    FuncFail { message: String },

    /// This context was cancelled by another thread's `kill()`.
    Killed,
}

impl YlError {
    pub fn internal(message: impl Into<String>) -> Self {
        YlError::Internal {
            message: message.into(),
        }
    }

    pub fn eval_assert(message: impl Into<String>) -> Self {
        YlError::EvalAssert {
            message: message.into(),
        }
    }

    pub fn func_invalid_param(message: impl Into<String>) -> Self {
        YlError::FuncInvalidParam {
            message: message.into(),
        }
    }

    pub fn func_fail(message: impl Into<String>) -> Self {
        YlError::FuncFail {
            message: message.into(),
        }
    }
}
