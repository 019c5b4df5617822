//! The interpreter context and its host-embedding surface.
//!
//! A context owns everything: the cell arena, the program-text buffer, the
//! printer, the `current` call frame the collector roots from, and the
//! shadow root stack protecting values mid-evaluation. Nothing is process
//! global; hosts may hold any number of independent contexts.

use tracing::trace;

use crate::arena::{CellArena, NIL, RESERVED, TextArena};
use crate::eval::Fault;
use crate::format::FORMAT_LEN;
use crate::value::{CellRef, Kind, NativeFn, Span};

/// Printer callback invoked by the `,` and `;` operators.
pub type Printer = Box<dyn FnMut(&str)>;

/// An interpreter instance over fixed-capacity memory.
pub struct Context {
    pub(crate) arena: CellArena,
    pub(crate) text: TextArena,
    pub(crate) printer: Printer,
    /// The innermost live call frame; the collector's primary root.
    pub(crate) current: Option<CellRef>,
    /// Shadow root stack: transiently-protected cells, visited by the marker
    /// alongside `current` and the persist flags.
    pub(crate) roots: Vec<CellRef>,
    pub(crate) format_buf: String,
}

impl Context {
    /// The shared nil singleton. Valid in any context.
    pub const NIL: CellRef = NIL;

    /// Open a context with a program-text capacity in bytes, a cell-area
    /// capacity in cells, and a printer. Neither capacity grows afterwards.
    pub fn open(prog_bytes: usize, cell_count: usize, printer: Printer) -> Context {
        Context {
            arena: CellArena::new(cell_count),
            text: TextArena::new(prog_bytes),
            printer,
            current: None,
            roots: Vec::new(),
            format_buf: String::with_capacity(FORMAT_LEN),
        }
    }

    /// Total number of allocatable cells.
    pub fn cells(&self) -> usize {
        self.arena.capacity()
    }

    #[inline]
    pub(crate) fn kind(&self, v: CellRef) -> Kind {
        self.arena.get(v).kind
    }

    /// Evaluate `source` under `env` (or no environment), returning the last
    /// useful value, or nil. Appends the source to the program-text buffer;
    /// when it does not fit, returns nil without evaluating. Re-entrant:
    /// native functions may call back in, nesting a fresh call frame.
    pub fn run(&mut self, env: Option<CellRef>, source: &str) -> CellRef {
        trace!(bytes = source.len(), "run");
        let watermark = self.roots.len();
        if let Some(e) = env {
            self.roots.push(e);
        }
        let Some(base) = self.text.append(source) else {
            self.roots.truncate(watermark);
            return NIL;
        };
        let end = self.text.used();
        let frame = match self.alloc(Kind::Call {
            parent: self.current,
            env,
            callable: None,
        }) {
            Ok(f) => f,
            Err(_) => {
                self.roots.truncate(watermark);
                return NIL;
            }
        };
        let saved = self.current;
        self.current = Some(frame);

        let mut result = NIL;
        let mut at = base;
        while at < end {
            match self.eval(frame, &mut at, true, true) {
                Ok(v) => {
                    result = v;
                    self.roots.truncate(watermark);
                    self.roots.push(result);
                }
                Err(Fault::Eof) | Err(Fault::OutOfCells) => break,
            }
        }

        self.current = saved;
        self.roots.truncate(watermark);
        result
    }

    /// True for everything except nil, free cells, and the number zero.
    pub fn truthy(&self, v: CellRef) -> bool {
        match self.kind(v) {
            Kind::Free { .. } | Kind::Nil => false,
            Kind::Number(n) => n != 0.0,
            _ => true,
        }
    }

    /// Flag `v` as a sticky GC root. Never cleared.
    pub fn persist(&mut self, v: CellRef) {
        if v.index() >= RESERVED {
            self.arena.get_mut(v).persist = true;
        }
    }
}

/// ## Constructors
///
/// Each returns the nil singleton when the arena (or the text buffer, for
/// interned payloads) is exhausted.
impl Context {
    pub fn number(&mut self, n: f64) -> CellRef {
        self.alloc(Kind::Number(n)).unwrap_or(NIL)
    }

    /// A string value. The bytes are interned into the program-text buffer.
    pub fn string(&mut self, s: &str) -> CellRef {
        let Some(start) = self.text.append(s) else {
            return NIL;
        };
        self.alloc(Kind::Str(Span::new(start, s.len()))).unwrap_or(NIL)
    }

    /// A symbol value. The name is interned into the program-text buffer.
    pub fn symbol(&mut self, s: &str) -> CellRef {
        let Some(start) = self.text.append(s) else {
            return NIL;
        };
        self.alloc(Kind::Symbol(Span::new(start, s.len())))
            .unwrap_or(NIL)
    }

    /// A user function from host-supplied arg-spec and body source.
    pub fn function(&mut self, args: &str, body: &str) -> CellRef {
        let Some(a) = self.text.append(args) else {
            return NIL;
        };
        let Some(b) = self.text.append(body) else {
            return NIL;
        };
        self.alloc(Kind::Fn {
            args: a as u32,
            body: b as u32,
        })
        .unwrap_or(NIL)
    }

    /// A native function with the given arg spec (a single word or a
    /// parenthesized, space-separated list of names).
    pub fn native(&mut self, args: &str, f: NativeFn) -> CellRef {
        let Some(a) = self.text.append(args) else {
            return NIL;
        };
        self.alloc(Kind::CFn {
            args: a as u32,
            call: f,
        })
        .unwrap_or(NIL)
    }

    /// An empty list.
    pub fn list(&mut self) -> CellRef {
        self.alloc(Kind::List {
            value: None,
            next: None,
        })
        .unwrap_or(NIL)
    }

    /// An empty environment.
    pub fn make_env(&mut self) -> CellRef {
        self.alloc(Kind::Env {
            name: None,
            value: None,
            next: None,
        })
        .unwrap_or(NIL)
    }
}

/// ## Tag tests and payload access
impl Context {
    pub fn is_nil(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::Nil)
    }

    pub fn is_number(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::Number(_))
    }

    pub fn is_string(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::Str(_))
    }

    pub fn is_symbol(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::Symbol(_))
    }

    pub fn is_list(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::List { .. })
    }

    pub fn is_env(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::Env { .. })
    }

    pub fn is_function(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::Fn { .. })
    }

    pub fn is_native(&self, v: CellRef) -> bool {
        matches!(self.kind(v), Kind::CFn { .. })
    }

    pub fn as_number(&self, v: CellRef) -> Option<f64> {
        match self.kind(v) {
            Kind::Number(n) => Some(n),
            _ => None,
        }
    }

    /// String contents; `None` for anything that is not a string value.
    pub fn as_str(&self, v: CellRef) -> Option<&str> {
        match self.kind(v) {
            Kind::Str(span) => Some(self.text.slice(span)),
            _ => None,
        }
    }
}

/// ## Environments
impl Context {
    /// Set `name` (a symbol cell) to `value` in `env`. A full arena drops
    /// the binding.
    pub fn env_set(&mut self, env: CellRef, name: CellRef, value: CellRef) {
        let _ = self.env_bind(env, name, value);
    }

    /// Set `name` to `value` in `env`, interning the name.
    pub fn set(&mut self, env: CellRef, name: &str, value: CellRef) {
        let base = self.roots.len();
        self.roots.extend([env, value]);
        let name_cell = self.symbol(name);
        self.roots.truncate(base);
        if name_cell != NIL {
            let _ = self.env_bind(env, name_cell, value);
        }
    }

    /// Look `name` up in `env` alone (no call-chain walk); nil when unbound.
    pub fn get(&self, env: CellRef, name: &str) -> CellRef {
        self.env_get_str(env, name)
    }
}

/// ## Lists
impl Context {
    /// The value held by a list cell, or nil.
    pub fn list_value(&self, v: CellRef) -> CellRef {
        match self.kind(v) {
            Kind::List { value, .. } => value.unwrap_or(NIL),
            _ => NIL,
        }
    }

    /// The next cell in the list; `None` at the end or for non-lists.
    pub fn list_next(&self, v: CellRef) -> Option<CellRef> {
        match self.kind(v) {
            Kind::List { next, .. } => next,
            _ => None,
        }
    }

    /// Append `item` to `list`, returning the cell now holding it; nil for
    /// non-lists or when the arena is exhausted.
    pub fn list_append(&mut self, list: CellRef, item: CellRef) -> CellRef {
        self.append_to_list(list, item).unwrap_or(NIL)
    }

    pub(crate) fn append_to_list(
        &mut self,
        list: CellRef,
        item: CellRef,
    ) -> Result<CellRef, Fault> {
        if !self.is_list(list) {
            return Ok(NIL);
        }
        let base = self.roots.len();
        self.roots.extend([list, item]);
        if let Kind::List { value: None, .. } = self.kind(list) {
            if let Kind::List { value, .. } = &mut self.arena.get_mut(list).kind {
                *value = Some(item);
            }
            self.roots.truncate(base);
            return Ok(list);
        }
        let mut node = list;
        while let Kind::List { next: Some(nx), .. } = self.kind(node) {
            node = nx;
        }
        let fresh = self.alloc(Kind::List {
            value: Some(item),
            next: None,
        })?;
        if let Kind::List { next, .. } = &mut self.arena.get_mut(node).kind {
            *next = Some(fresh);
        }
        self.roots.truncate(base);
        Ok(fresh)
    }

    /// Detach and return the last cell of `list`. Popping a one-element list
    /// clears the head in place, leaving the empty-list representation.
    pub fn list_pop(&mut self, list: CellRef) -> CellRef {
        if !self.is_list(list) {
            return NIL;
        }
        let mut prev = list;
        let mut node = list;
        while let Kind::List { next: Some(nx), .. } = self.kind(node) {
            prev = node;
            node = nx;
        }
        if let Kind::List { next, .. } = &mut self.arena.get_mut(prev).kind {
            *next = None;
        }
        if prev == node {
            if let Kind::List { value, .. } = &mut self.arena.get_mut(node).kind {
                *value = None;
            }
        }
        node
    }

    /// The value at list index `n`; nil past the end or in an element hole.
    pub(crate) fn list_nth(&self, list: CellRef, n: i64) -> CellRef {
        let mut node = list;
        for _ in 0..n.max(0) {
            match self.kind(node) {
                Kind::List { next: Some(nx), .. } => node = nx,
                _ => return NIL,
            }
        }
        match self.kind(node) {
            Kind::List { value: Some(v), .. } => v,
            _ => NIL,
        }
    }

    /// Overwrite the element at list index `n`; quietly ignores an index
    /// past the end.
    pub(crate) fn list_store(&mut self, list: CellRef, n: i64, value: CellRef) {
        let mut node = list;
        for _ in 0..n.max(0) {
            match self.kind(node) {
                Kind::List { next: Some(nx), .. } => node = nx,
                _ => return,
            }
        }
        if let Kind::List { value: slot, .. } = &mut self.arena.get_mut(node).kind {
            *slot = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::open(4096, 128, Box::new(|_| {}))
    }

    #[test]
    fn test_open_reports_cell_capacity() {
        let ctx = Context::open(1024, 77, Box::new(|_| {}));
        assert_eq!(ctx.cells(), 77);
    }

    #[test]
    fn test_constructors_and_tag_tests() {
        let mut ctx = ctx();
        let n = ctx.number(1.5);
        assert!(ctx.is_number(n));
        assert_eq!(ctx.as_number(n), Some(1.5));
        let s = ctx.string("hey");
        assert!(ctx.is_string(s));
        assert_eq!(ctx.as_str(s), Some("hey"));
        let sym = ctx.symbol("hey");
        assert!(ctx.is_symbol(sym));
        assert!(ctx.as_str(sym).is_none());
        let f = ctx.function("x", "(* x 2)");
        assert!(ctx.is_function(f));
        let e = ctx.make_env();
        assert!(ctx.is_env(e));
        let l = ctx.list();
        assert!(ctx.is_list(l));
        assert!(ctx.is_nil(Context::NIL));
    }

    #[test]
    fn test_truthiness() {
        let mut ctx = ctx();
        assert!(!ctx.truthy(Context::NIL));
        let zero = ctx.number(0.0);
        assert!(!ctx.truthy(zero));
        let n = ctx.number(0.5);
        assert!(ctx.truthy(n));
        let empty = ctx.string("");
        assert!(ctx.truthy(empty));
        let l = ctx.list();
        assert!(ctx.truthy(l));
    }

    #[test]
    fn test_list_round_trip() {
        let mut ctx = ctx();
        let list = ctx.list();
        ctx.persist(list);
        let a = ctx.number(1.0);
        ctx.list_append(list, a);
        let b = ctx.number(2.0);
        ctx.list_append(list, b);
        assert_eq!(ctx.as_number(ctx.list_value(list)), Some(1.0));
        let second = ctx.list_next(list).unwrap();
        assert_eq!(ctx.as_number(ctx.list_value(second)), Some(2.0));
        assert!(ctx.list_next(second).is_none());

        let popped = ctx.list_pop(list);
        assert_eq!(ctx.as_number(ctx.list_value(popped)), Some(2.0));
        assert!(ctx.list_next(list).is_none());
        let emptied = ctx.list_pop(list);
        assert_eq!(emptied, list);
        assert!(ctx.is_nil(ctx.list_value(list)));
    }

    #[test]
    fn test_run_returns_the_last_useful_value() {
        let mut ctx = ctx();
        let v = ctx.run(None, "1 2 3");
        assert_eq!(ctx.as_number(v), Some(3.0));
    }

    #[test]
    fn test_run_without_env_still_binds_in_its_frame() {
        let mut ctx = ctx();
        let v = ctx.run(None, "(= x 4)(+ x 1)");
        assert_eq!(ctx.as_number(v), Some(5.0));
    }

    #[test]
    fn test_oversized_source_is_rejected_whole() {
        let mut ctx = Context::open(8, 32, Box::new(|_| {}));
        let v = ctx.run(None, "(+ 1 2)(+ 3 4)");
        assert!(ctx.is_nil(v));
        // nothing was appended, so a small chunk still fits
        let v = ctx.run(None, "+ 1 2");
        assert_eq!(ctx.as_number(v), Some(3.0));
    }

    #[test]
    fn test_env_set_by_cell() {
        let mut ctx = ctx();
        let env = ctx.make_env();
        ctx.persist(env);
        let name = ctx.symbol("k");
        let value = ctx.number(6.0);
        ctx.env_set(env, name, value);
        assert_eq!(ctx.as_number(ctx.env_get(env, name)), Some(6.0));
        assert_eq!(ctx.as_number(ctx.get(env, "k")), Some(6.0));
    }
}
