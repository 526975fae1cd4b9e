//! Printed representation of a cell graph, used by the CLI and by the
//! reader/printer round-trip property in this crate's design notes (§8.1).
//!
//! Doubles print with six fractional digits (`%f`-style, e.g. `6.000000`),
//! matching the concrete scenarios that pin down `6.000000`/`(a b c)`/
//! `30.000000` literally. A proper list prints space-separated; an improper
//! tail prints as `(a . b)`. `quote` is never un-sugared back to `'x` on the
//! print side, since nothing in the original collaborator prints it that
//! way either.

use crate::cell::{Cell, CellRef};
use crate::pool::Pool;

/// Renders `r` the way a host-facing print call would. Borrows `pool` only;
/// does not allocate.
pub fn print(pool: &Pool, r: CellRef) -> String {
    let mut out = String::new();
    write_cell(pool, r, &mut out);
    out
}

fn write_cell(pool: &Pool, r: CellRef, out: &mut String) {
    match r {
        CellRef::Nil => out.push_str("nil"),
        CellRef::True => out.push_str("t"),
        CellRef::Quote => out.push_str("quote"),
        CellRef::Pool(_) => match pool.get(r) {
            Cell::Pair(..) => write_list(pool, r, out),
            atom => out.push_str(&atom.atom_display()),
        },
    }
}

/// Writes a pair chain as `(a b c)`, or `(a b . c)` if the final cdr is not
/// `nil`.
fn write_list(pool: &Pool, r: CellRef, out: &mut String) {
    out.push('(');
    let mut node = r;
    let mut first = true;
    loop {
        if !first {
            out.push(' ');
        }
        first = false;
        write_cell(pool, pool.car(node), out);
        let cdr = pool.cdr(node);
        if cdr.is_nil() {
            break;
        }
        if pool.is_atom(cdr) {
            out.push_str(" . ");
            write_cell(pool, cdr, out);
            break;
        }
        node = cdr;
    }
    out.push(')');
}
