//! Mark-and-sweep collection over the cell arena.
//!
//! Roots are the `current` call frame, every `persist`-flagged cell, and the
//! context's shadow root stack of transiently-protected cells. The collector
//! is non-incremental and non-moving; it runs at quiescent points only, and
//! is invoked automatically when allocation finds the free list empty.

use tracing::{debug, trace};

use crate::arena::{CellArena, RESERVED};
use crate::context::Context;
use crate::eval::{Fault, Outcome};
use crate::value::{CellRef, Kind};

impl CellArena {
    /// Mark the transitive closure reachable from `root`. Worklist-driven,
    /// so cyclic chains and deep lists cannot overflow the stack.
    pub(crate) fn mark_from(&mut self, root: CellRef) {
        let mut pending = std::mem::take(&mut self.scratch);
        pending.push(root);
        while let Some(r) = pending.pop() {
            if r.index() < RESERVED {
                continue;
            }
            let cell = self.get_mut(r);
            if cell.mark {
                continue;
            }
            cell.mark = true;
            match cell.kind {
                Kind::List { value, next } => {
                    pending.extend(value);
                    pending.extend(next);
                }
                Kind::Env { name, value, next } => {
                    pending.extend(name);
                    pending.extend(value);
                    pending.extend(next);
                }
                Kind::Call {
                    parent,
                    env,
                    callable,
                } => {
                    pending.extend(parent);
                    pending.extend(env);
                    pending.extend(callable);
                }
                _ => {}
            }
        }
        self.scratch = pending;
    }

    pub(crate) fn mark_persistent(&mut self) {
        for i in RESERVED..self.total() {
            let r = CellRef(i as u32);
            if self.get(r).persist {
                self.mark_from(r);
            }
        }
    }
}

impl Context {
    /// Run a full collection cycle, returning the number of cells linked
    /// back onto the free list.
    pub fn collect(&mut self) -> usize {
        if let Some(current) = self.current {
            self.arena.mark_from(current);
        }
        for i in 0..self.roots.len() {
            self.arena.mark_from(self.roots[i]);
        }
        self.arena.mark_persistent();
        let freed = self.arena.sweep();
        trace!(freed, "collection cycle");
        freed
    }

    /// Allocate a cell, collecting first when the free list is empty. The
    /// fault halts the current top-level run; hosts see it as a nil result.
    pub(crate) fn alloc(&mut self, kind: Kind) -> Outcome<CellRef> {
        if self.arena.exhausted() {
            debug!("free list empty, collecting");
            if self.collect() == 0 {
                return Err(Fault::OutOfCells);
            }
        }
        self.arena.try_alloc(kind).ok_or(Fault::OutOfCells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NIL;

    fn ctx(cells: usize) -> Context {
        Context::open(1024, cells, Box::new(|_| {}))
    }

    #[test]
    fn test_collect_reclaims_unreachable_cells() {
        let mut ctx = ctx(8);
        let _garbage = ctx.number(1.5);
        let _more = ctx.number(2.5);
        assert_eq!(ctx.collect(), 8);
        assert_eq!(ctx.memory_stats().free_cells, 8);
    }

    #[test]
    fn test_persist_is_a_sticky_root() {
        let mut ctx = ctx(8);
        let v = ctx.number(9.0);
        ctx.persist(v);
        ctx.collect();
        assert_eq!(ctx.as_number(v), Some(9.0));
        ctx.collect();
        assert_eq!(ctx.as_number(v), Some(9.0));
        assert_eq!(ctx.memory_stats().free_cells, 7);
    }

    #[test]
    fn test_marking_follows_env_chains() {
        let mut ctx = ctx(16);
        let env = ctx.make_env();
        ctx.persist(env);
        let n = ctx.number(3.0);
        ctx.set(env, "a", n);
        let m = ctx.number(4.0);
        ctx.set(env, "b", m);
        ctx.collect();
        assert_eq!(ctx.as_number(ctx.get(env, "a")), Some(3.0));
        assert_eq!(ctx.as_number(ctx.get(env, "b")), Some(4.0));
    }

    #[test]
    fn test_marking_survives_cyclic_lists() {
        let mut ctx = ctx(8);
        let list = ctx.list();
        ctx.persist(list);
        // tie the list to itself: [list]
        ctx.list_append(list, list);
        ctx.collect();
        assert!(ctx.is_list(list));
    }

    #[test]
    fn test_exhaustion_collects_lazily() {
        let mut ctx = ctx(4);
        // fill the arena with garbage, then keep allocating: each alloc past
        // capacity must succeed by collecting the previous garbage
        for i in 0..32 {
            let v = ctx.number(i as f64);
            assert_ne!(v, NIL);
        }
    }

    #[test]
    fn test_allocation_fails_when_everything_is_rooted() {
        let mut ctx = ctx(2);
        let a = ctx.number(1.0);
        ctx.persist(a);
        let b = ctx.number(2.0);
        ctx.persist(b);
        assert_eq!(ctx.number(3.0), NIL);
    }
}
