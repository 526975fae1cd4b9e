//! The reader (component C5): turns a byte stream into expression trees.
//!
//! States like `LIST`/`SQUOTE`/`SYMBOL`/`DQUOTE`/`COMMENT`/`ESCAPE` are
//! expressed here as a recursive descent parser rather than an explicit
//! state-transition table: the Rust call stack plays the role of the
//! state stack, which is the idiomatic shape for this grammar and avoids
//! hand-rolling dispatch that `match` already gives for free.
//!
//! A bare token and a double-quoted string both produce [`crate::cell::Cell::Symbol`]
//! atoms — the data model has no separate string variant; both feed the
//! same accumulation buffer.

use crate::cell::CellRef;
use crate::error::{YlError, YlResult};
use crate::pool::Pool;

/// A single atom body is bounded by this many bytes; overrun is a hard
/// parse error. 4 KiB, matching the original's `elembuf`.
const SYMBOL_BUF_LIMIT: usize = 4096;

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0, line: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn is_delimiter(c: u8) -> bool {
        matches!(c, b'(' | b')' | b'\'' | b'"' | b';') || c.is_ascii_whitespace()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b';') => {
                    self.advance();
                    while let Some(c) = self.peek() {
                        self.advance();
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Reads every remaining top-level form.
    pub fn read_all(&mut self, pool: &mut Pool) -> YlResult<Vec<CellRef>> {
        let mut forms = Vec::new();
        while let Some(form) = self.read_one(pool)? {
            forms.push(form);
        }
        Ok(forms)
    }

    /// Reads the next top-level form, or `None` at end of stream.
    pub fn read_one(&mut self, pool: &mut Pool) -> YlResult<Option<CellRef>> {
        self.skip_ws_and_comments();
        if self.peek().is_none() {
            return Ok(None);
        }
        self.read_form(pool).map(Some)
    }

    fn read_form(&mut self, pool: &mut Pool) -> YlResult<CellRef> {
        match self.peek().expect("read_form called at end of stream") {
            b'(' => {
                self.advance();
                self.read_list(pool)
            }
            b')' => Err(YlError::SyntaxParen { line: self.line() }),
            b'\'' => {
                self.advance();
                self.skip_ws_and_comments();
                if self.peek().is_none() {
                    return Err(YlError::SyntaxQuote { line: self.line() });
                }
                let quoted = self.read_form(pool)?;
                let tail = pool.alloc_pair(quoted, CellRef::Nil)?;
                pool.alloc_pair(CellRef::Quote, tail)
            }
            b'"' => self.read_quoted_symbol(pool),
            _ => self.read_bare_symbol(pool),
        }
    }

    fn read_list(&mut self, pool: &mut Pool) -> YlResult<CellRef> {
        let mut items = Vec::new();
        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                None => return Err(YlError::UnterminatedForm { line: self.line() }),
                Some(b')') => {
                    self.advance();
                    break;
                }
                _ => items.push(self.read_form(pool)?),
            }
        }
        let mut tail = CellRef::Nil;
        for item in items.into_iter().rev() {
            tail = pool.alloc_pair(item, tail)?;
        }
        Ok(tail)
    }

    /// Consumes an escape sequence after a `\` has already been consumed.
    /// Only `"`, `\`, and `n` (producing LF) are recognized.
    fn read_escape(&mut self) -> YlResult<u8> {
        match self.advance() {
            Some(b'"') => Ok(b'"'),
            Some(b'\\') => Ok(b'\\'),
            Some(b'n') => Ok(b'\n'),
            _ => Err(YlError::SyntaxEscape { line: self.line() }),
        }
    }

    fn read_quoted_symbol(&mut self, pool: &mut Pool) -> YlResult<CellRef> {
        self.advance(); // opening quote
        let mut buf = Vec::new();
        loop {
            match self.advance() {
                None => return Err(YlError::UnterminatedForm { line: self.line() }),
                Some(b'"') => break,
                Some(b'\\') => buf.push(self.read_escape()?),
                Some(c) => buf.push(c),
            }
            if buf.len() > SYMBOL_BUF_LIMIT {
                return Err(YlError::SymbolTooLong { line: self.line() });
            }
        }
        pool.alloc_symbol(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_bare_symbol(&mut self, pool: &mut Pool) -> YlResult<CellRef> {
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(c) if Self::is_delimiter(c) => break,
                Some(b'\\') => {
                    self.advance();
                    buf.push(self.read_escape()?);
                }
                Some(c) => {
                    self.advance();
                    buf.push(c);
                }
            }
            if buf.len() > SYMBOL_BUF_LIMIT {
                return Err(YlError::SymbolTooLong { line: self.line() });
            }
        }
        if buf.is_empty() {
            return Err(YlError::SyntaxUnknown { line: self.line() });
        }
        // The three reserved identifiers are predefined cells living
        // outside the pool, compared and reachable by identity; a bare
        // token spelling one of them must resolve to the sentinel
        // directly rather than to a pool `Symbol` atom that merely
        // happens to be named `"quote"`, or `(quote x)`'s head would
        // never hit `eval`'s `head == CellRef::Quote` fast path. Only
        // bare tokens are interned this way — a double-quoted `"quote"`
        // string remains an ordinary symbol atom.
        match buf.as_slice() {
            b"nil" => return Ok(CellRef::Nil),
            b"t" => return Ok(CellRef::True),
            b"quote" => return Ok(CellRef::Quote),
            _ => {}
        }
        pool.alloc_symbol(String::from_utf8_lossy(&buf).into_owned())
    }
}
