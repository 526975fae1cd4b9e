//! The S-expression memory pool (component C2): a fixed-capacity arena of
//! cells plus free/used index stacks and a stack of save-points.
//!
//! Cell identity is the pool index; cells are never relocated. The three
//! predefined cells (`nil`, `t`, `quote`) live outside the arena entirely
//! and are handled by [`crate::cell::CellRef`] directly, so the arena only
//! ever holds cells obtained through `alloc_*`.

use crate::cell::{Cell, CellRef, CustomAtom, Dispatch};
use crate::error::{YlError, YlResult};

struct Slot {
    /// `None` when this index is on the free list.
    body: Option<Cell>,
    gc_mark: bool,
}

/// Fixed-capacity arena plus the bookkeeping needed to recycle cells in
/// constant time and to run scoped or full mark-and-sweep passes.
pub struct Pool {
    slots: Vec<Slot>,
    capacity: usize,
    /// Free-block indices, stack-like: last in, first out.
    free: Vec<u32>,
    /// Used-block indices handed out since the outermost save-point.
    used: Vec<u32>,
    /// `used.len()` recorded at each `push_savepoint()`.
    savepoints: Vec<usize>,
    high_water_mark: usize,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        let mut free = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot {
                body: None,
                gc_mark: false,
            });
            free.push(i as u32);
        }
        // free list is popped from the end; order doesn't matter since all
        // slots are identical before anything is allocated.
        Self {
            slots,
            capacity,
            free,
            used: Vec::new(),
            savepoints: Vec::new(),
            high_water_mark: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used_count(&self) -> usize {
        self.capacity - self.free.len()
    }

    pub fn usage_percent(&self) -> u32 {
        (self.used_count() as u64 * 100 / self.capacity as u64) as u32
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn is_free(&self, idx: u32) -> bool {
        self.slots[idx as usize].body.is_none()
    }

    fn take_free_index(&mut self) -> YlResult<u32> {
        let idx = self.free.pop().ok_or(YlError::OutOfMemory)?;
        self.used.push(idx);
        let used = self.used_count();
        if used > self.high_water_mark {
            self.high_water_mark = used;
        }
        Ok(idx)
    }

    fn alloc(&mut self, body: Cell) -> YlResult<CellRef> {
        let idx = self.take_free_index()?;
        self.slots[idx as usize].body = Some(body);
        Ok(CellRef::Pool(idx))
    }

    pub fn alloc_pair(&mut self, car: CellRef, cdr: CellRef) -> YlResult<CellRef> {
        self.alloc(Cell::Pair(car, cdr))
    }

    pub fn alloc_symbol(&mut self, name: impl Into<String>) -> YlResult<CellRef> {
        self.alloc(Cell::Symbol(name.into()))
    }

    pub fn alloc_double(&mut self, value: f64) -> YlResult<CellRef> {
        self.alloc(Cell::Double(value))
    }

    pub fn alloc_binary(&mut self, data: Vec<u8>) -> YlResult<CellRef> {
        self.alloc(Cell::Binary(data))
    }

    pub fn alloc_native_func(&mut self, dispatch: Dispatch, name: impl Into<String>) -> YlResult<CellRef> {
        self.alloc(Cell::NativeFunc {
            dispatch,
            name: name.into(),
        })
    }

    pub fn alloc_special_form(&mut self, dispatch: Dispatch, name: impl Into<String>) -> YlResult<CellRef> {
        self.alloc(Cell::SpecialForm {
            dispatch,
            name: name.into(),
        })
    }

    pub fn alloc_custom(&mut self, atom: Box<dyn CustomAtom>) -> YlResult<CellRef> {
        self.alloc(Cell::Custom(atom))
    }

    /// Borrow a pool cell's body. Panics on the predefined refs; callers
    /// must special-case those before reaching into the pool (mirrors the
    /// original treating them as living "outside" the pool).
    pub fn get(&self, r: CellRef) -> &Cell {
        match r {
            CellRef::Pool(idx) => self.slots[idx as usize]
                .body
                .as_ref()
                .expect("dereferenced a free pool cell"),
            _ => panic!("get() called on a predefined cell ref: {r:?}"),
        }
    }

    pub fn get_mut(&mut self, r: CellRef) -> &mut Cell {
        match r {
            CellRef::Pool(idx) => self.slots[idx as usize]
                .body
                .as_mut()
                .expect("dereferenced a free pool cell"),
            _ => panic!("get_mut() called on a predefined cell ref: {r:?}"),
        }
    }

    pub fn car(&self, r: CellRef) -> CellRef {
        match self.get(r) {
            Cell::Pair(car, _) => *car,
            _ => panic!("car() of a non-pair cell"),
        }
    }

    pub fn cdr(&self, r: CellRef) -> CellRef {
        match self.get(r) {
            Cell::Pair(_, cdr) => *cdr,
            _ => panic!("cdr() of a non-pair cell"),
        }
    }

    pub fn is_atom(&self, r: CellRef) -> bool {
        match r {
            CellRef::Nil | CellRef::True | CellRef::Quote => true,
            CellRef::Pool(_) => !self.get(r).is_pair(),
        }
    }

    /// Recycle a single cell, running its cleanup (dropping owned buffers;
    /// a custom atom's `Drop` is its `clean`). Does not recurse into a
    /// pair's components — they are managed independently by the GC.
    fn release(&mut self, idx: u32) {
        let slot = &mut self.slots[idx as usize];
        slot.body = None;
        slot.gc_mark = false;
        self.free.push(idx);
    }

    // -- save-points --------------------------------------------------

    pub fn push_savepoint(&mut self) {
        self.savepoints.push(self.used.len());
    }

    /// Pop the innermost save-point, recycling cells allocated since the
    /// matching push that are not reachable from `roots` (the symbol
    /// table, every live context, and any caller-supplied extra roots
    /// such as the form's return value). Returns the number of cells
    /// recycled.
    pub fn pop_savepoint(&mut self, roots: &[CellRef]) -> usize {
        let start = self
            .savepoints
            .pop()
            .expect("pop_savepoint() without a matching push_savepoint()");

        if start == self.used.len() {
            return 0;
        }

        let reachable = self.mark_from(roots);
        let mut recycled = 0;
        let mut kept = Vec::with_capacity(self.used.len() - start);
        for &idx in &self.used[start..] {
            if self.is_free(idx) {
                continue; // already recycled by something else in this window
            }
            if reachable.contains(&idx) {
                kept.push(idx);
            } else {
                self.release(idx);
                recycled += 1;
            }
        }
        self.used.truncate(start);
        self.used.extend(kept);
        recycled
    }

    pub fn savepoint_depth(&self) -> usize {
        self.savepoints.len()
    }

    // -- mark-and-sweep (full scan) -------------------------------------

    /// Clear every cell's gc-mark, mark from `roots`, and recycle
    /// everything left unmarked. Returns the number of cells recycled.
    /// Correct only when every live context is at a safe point — enforced
    /// by the coordinator, not by this method.
    pub fn full_scan_gc(&mut self, roots: &[CellRef]) -> usize {
        for slot in &mut self.slots {
            slot.gc_mark = false;
        }
        let reachable = self.mark_from(roots);
        let mut recycled = 0;
        for idx in 0..self.capacity as u32 {
            if !self.is_free(idx) && !reachable.contains(&idx) {
                self.release(idx);
                recycled += 1;
            }
        }
        // used-list bookkeeping is owned by save-point pop/push, not by a
        // full scan; entries for freed cells become stale but harmless
        // since `is_free` is checked wherever `used` is consulted.
        recycled
    }

    /// Breadth-first reachability walk from `roots`, returning the set of
    /// pool indices reached. Iterative (explicit worklist) so that long
    /// proper lists don't blow the native call stack.
    fn mark_from(&self, roots: &[CellRef]) -> std::collections::HashSet<u32> {
        let mut seen = std::collections::HashSet::new();
        let mut stack: Vec<CellRef> = roots.to_vec();
        while let Some(r) = stack.pop() {
            let idx = match r {
                CellRef::Pool(idx) => idx,
                _ => continue, // predefined cells are reachable by definition, not tracked here
            };
            if !seen.insert(idx) {
                continue;
            }
            match &self.slots[idx as usize].body {
                Some(Cell::Pair(car, cdr)) => {
                    stack.push(*car);
                    stack.push(*cdr);
                }
                Some(Cell::Custom(atom)) => {
                    stack.extend(atom.visit());
                }
                Some(_) | None => {}
            }
        }
        seen
    }
}
