//! The fused parser/evaluator.
//!
//! There is no AST. Every rule reads from the program text through a byte
//! cursor, advances it in place, and produces a value; recursion into an
//! operand is recursion into the evaluator itself. Two flags thread through
//! every call:
//!
//! - `resolve` — whether a bare word is looked up along the call chain (and
//!   applied when it names a callable) or produced as a symbol literal.
//! - `fx` — whether side effects are live. A dry parse (`fx == false`) still
//!   advances the cursor exactly as a live parse would and still allocates
//!   (a skipped function literal must still capture its body cursor), but
//!   suppresses printing, binding, list mutation, loop iteration, and native
//!   calls.
//!
//! Running out of input while an operator still expects tokens raises
//! `Fault::Eof`, which `?` bubbles to the top-level run loop. A fault always
//! unwinds to `run`, which restores the shadow-root watermark, so fault
//! paths below skip root-stack truncation.
//!
//! GC safety: any intermediate value that must outlive a sub-evaluation is
//! pushed onto the context's shadow root stack first, because every
//! sub-evaluation may allocate and therefore collect.

use crate::arena::{NIL, ONE, ZERO};
use crate::context::Context;
use crate::value::{CellRef, Kind, NativeFn, Span};

/// Why evaluation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Input ended while an operator still expected tokens.
    Eof,
    /// The arena is exhausted even after a collection.
    OutOfCells,
}

pub(crate) type Outcome<T> = Result<T, Fault>;

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn flag(truth: bool) -> CellRef {
    if truth { ONE } else { ZERO }
}

impl Context {
    /// Skip whitespace and comments. `Err(Eof)` when the input ends first.
    fn skip_space(&self, at: &mut usize) -> Outcome<()> {
        loop {
            match self.text.byte(*at) {
                0 => return Err(Fault::Eof),
                b'`' => {
                    while !matches!(self.text.byte(*at), 0 | b'\n') {
                        *at += 1;
                    }
                }
                b if is_space(b) => *at += 1,
                _ => return Ok(()),
            }
        }
    }

    fn scan_word(&self, at: &mut usize) -> Span {
        let start = *at;
        while is_word_byte(self.text.byte(*at)) {
            *at += 1;
        }
        Span::new(start, *at - start)
    }

    /// Unsigned decimal with an optional fractional part. A second dot ends
    /// the number, and a trailing dot is consumed with no fraction.
    fn scan_number(&self, at: &mut usize) -> f64 {
        let mut value = 0.0;
        let mut scale = 1.0;
        let mut dot = false;
        loop {
            let b = self.text.byte(*at);
            if b == b'.' && !dot {
                dot = true;
                *at += 1;
                continue;
            }
            if !is_digit(b) {
                break;
            }
            let d = f64::from(b - b'0');
            if dot {
                scale /= 10.0;
                value += d * scale;
            } else {
                value = value * 10.0 + d;
            }
            *at += 1;
        }
        value
    }

    /// Evaluate one expression starting at `*at`, leaving `*at` just past it.
    pub(crate) fn eval(
        &mut self,
        call: CellRef,
        at: &mut usize,
        resolve: bool,
        fx: bool,
    ) -> Outcome<CellRef> {
        self.skip_space(at)?;
        let lead = self.text.byte(*at);
        *at += 1;
        match lead {
            b'~' => Ok(NIL),
            b'"' => self.eval_string(at),
            b'+' => self.eval_arith(call, at, fx, |a, b| a + b),
            b'-' => self.eval_arith(call, at, fx, |a, b| a - b),
            b'*' => self.eval_arith(call, at, fx, |a, b| a * b),
            b'/' => self.eval_arith(call, at, fx, |a, b| a / b),
            b'<' => {
                if self.text.byte(*at) == b'=' {
                    *at += 1;
                    self.eval_compare(call, at, fx, |a, b| a <= b)
                } else {
                    self.eval_compare(call, at, fx, |a, b| a < b)
                }
            }
            b'>' => {
                if self.text.byte(*at) == b'=' {
                    *at += 1;
                    self.eval_compare(call, at, fx, |a, b| a >= b)
                } else {
                    self.eval_compare(call, at, fx, |a, b| a > b)
                }
            }
            b'&' => {
                let (a, b) = self.eval_pair(call, at, fx)?;
                Ok(flag(self.truthy(a) && self.truthy(b)))
            }
            b'|' => {
                let (a, b) = self.eval_pair(call, at, fx)?;
                Ok(flag(self.truthy(a) || self.truthy(b)))
            }
            b'!' => {
                let a = self.eval(call, at, true, fx)?;
                Ok(flag(!self.truthy(a)))
            }
            b'_' => self.eval_round(call, at, fx),
            b'(' => {
                let result = self.eval_body(call, at, b')', fx)?;
                Ok(result.unwrap_or(NIL))
            }
            b'{' => self.eval_block(call, at, fx),
            b'[' => self.eval_list_literal(call, at, fx),
            b'.' => self.eval_index(call, at, fx),
            b':' => self.eval_store(call, at, fx),
            b'=' => {
                if self.text.byte(*at) == b'=' {
                    *at += 1;
                    self.eval_equality(call, at, fx)
                } else {
                    self.eval_bind(call, at, fx)
                }
            }
            b',' => {
                let v = self.eval(call, at, true, fx)?;
                if fx {
                    self.print_value(v);
                }
                Ok(NIL)
            }
            b';' => {
                if fx {
                    self.print_str("\n");
                }
                Ok(NIL)
            }
            b'@' => {
                let name = self.eval(call, at, false, fx)?;
                Ok(self.lookup(call, name))
            }
            b'?' => self.eval_choice(call, at, fx),
            b'#' => self.eval_append(call, at, fx),
            b'\\' => self.eval_pop(call, at, fx),
            b'%' => self.eval_foreach(call, at, fx),
            b'^' => self.eval_while(call, at, fx),
            b'$' => self.eval_len(call, at, fx),
            b'\'' => self.eval_fn_literal(call, at),
            _ => {
                *at -= 1;
                let b = self.text.byte(*at);
                if is_digit(b) {
                    let n = self.scan_number(at);
                    self.alloc(Kind::Number(n))
                } else if is_word_start(b) {
                    self.eval_word(call, at, resolve, fx)
                } else {
                    Err(Fault::Eof)
                }
            }
        }
    }

    /// `"..."` — the payload borrows the source bytes between the quotes.
    /// There are no escape sequences.
    fn eval_string(&mut self, at: &mut usize) -> Outcome<CellRef> {
        let start = *at;
        while !matches!(self.text.byte(*at), 0 | b'"') {
            *at += 1;
        }
        if self.text.byte(*at) == 0 {
            return Err(Fault::Eof);
        }
        let span = Span::new(start, *at - start);
        *at += 1;
        self.alloc(Kind::Str(span))
    }

    /// Evaluate two consecutive operands, keeping the first protected while
    /// the second runs.
    fn eval_pair(
        &mut self,
        call: CellRef,
        at: &mut usize,
        fx: bool,
    ) -> Outcome<(CellRef, CellRef)> {
        let a = self.eval(call, at, true, fx)?;
        let base = self.roots.len();
        self.roots.push(a);
        let b = self.eval(call, at, true, fx)?;
        self.roots.truncate(base);
        Ok((a, b))
    }

    /// Binary arithmetic; anything but two numbers yields nil.
    fn eval_arith(
        &mut self,
        call: CellRef,
        at: &mut usize,
        fx: bool,
        op: fn(f64, f64) -> f64,
    ) -> Outcome<CellRef> {
        let (a, b) = self.eval_pair(call, at, fx)?;
        match (self.kind(a), self.kind(b)) {
            (Kind::Number(x), Kind::Number(y)) => self.alloc(Kind::Number(op(x, y))),
            _ => Ok(NIL),
        }
    }

    /// Binary comparison; anything but two numbers yields 0.
    fn eval_compare(
        &mut self,
        call: CellRef,
        at: &mut usize,
        fx: bool,
        op: fn(f64, f64) -> bool,
    ) -> Outcome<CellRef> {
        let (a, b) = self.eval_pair(call, at, fx)?;
        match (self.kind(a), self.kind(b)) {
            (Kind::Number(x), Kind::Number(y)) => Ok(flag(op(x, y))),
            _ => Ok(ZERO),
        }
    }

    /// `== a b` — numbers by value, strings bytewise, identity otherwise.
    fn eval_equality(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let (a, b) = self.eval_pair(call, at, fx)?;
        let ka = self.kind(a);
        let kb = self.kind(b);
        match (ka, kb) {
            (Kind::Number(x), Kind::Number(y)) => Ok(flag(x == y)),
            (Kind::Str(x), Kind::Str(y)) => {
                Ok(flag(self.text.slice(x) == self.text.slice(y)))
            }
            _ if std::mem::discriminant(&ka) != std::mem::discriminant(&kb) => Ok(ZERO),
            _ if a == b => Ok(ONE),
            _ => Ok(NIL),
        }
    }

    /// `_ a` — round to the nearest integer, away from zero. The integer
    /// cast means negative inputs that round to zero come out as plain zero.
    fn eval_round(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let a = self.eval(call, at, true, fx)?;
        let Kind::Number(n) = self.kind(a) else {
            return Ok(NIL);
        };
        let rounded = if n > 0.0 {
            (n + 0.5) as i64
        } else {
            (n - 0.5) as i64
        };
        self.alloc(Kind::Number(rounded as f64))
    }

    /// Evaluate expressions up to `end`, keeping the latest value rooted.
    /// `None` when the body was empty.
    fn eval_body(
        &mut self,
        call: CellRef,
        at: &mut usize,
        end: u8,
        fx: bool,
    ) -> Outcome<Option<CellRef>> {
        let base = self.roots.len();
        let mut result = None;
        loop {
            self.skip_space(at)?;
            if self.text.byte(*at) == end {
                *at += 1;
                break;
            }
            let v = self.eval(call, at, true, fx)?;
            self.roots.truncate(base);
            self.roots.push(v);
            result = Some(v);
        }
        self.roots.truncate(base);
        Ok(result)
    }

    /// `{ ... }` — run the body inside a fresh call frame and yield the
    /// frame's env, which lets a block be captured as an environment value.
    fn eval_block(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let frame = self.alloc(Kind::Call {
            parent: Some(call),
            env: None,
            callable: None,
        })?;
        let saved = self.current;
        self.current = Some(frame);
        let body = self.eval_body(frame, at, b'}', fx);
        self.current = saved;
        body?;
        match self.kind(frame) {
            Kind::Call { env: Some(env), .. } => Ok(env),
            _ => Ok(NIL),
        }
    }

    /// `[ ... ]` — evaluate each expression and append it to a fresh list.
    fn eval_list_literal(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let head = self.alloc(Kind::List {
            value: None,
            next: None,
        })?;
        let base = self.roots.len();
        self.roots.push(head);
        let mut tail = head;
        loop {
            self.skip_space(at)?;
            if self.text.byte(*at) == b']' {
                *at += 1;
                break;
            }
            let item = self.eval(call, at, true, fx)?;
            tail = self.append_to_list(tail, item)?;
        }
        self.roots.truncate(base);
        Ok(head)
    }

    /// `. target key` — read an env binding (key is a literal symbol) or a
    /// list element (key is evaluated and must be a number).
    fn eval_index(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let target = self.eval(call, at, true, fx)?;
        let base = self.roots.len();
        self.roots.push(target);
        let out = match self.kind(target) {
            Kind::Env { .. } => {
                let key = self.eval(call, at, false, fx)?;
                Ok(self.env_get(target, key))
            }
            Kind::List { .. } => {
                let key = self.eval(call, at, true, fx)?;
                match self.kind(key) {
                    Kind::Number(n) => Ok(self.list_nth(target, n as i64)),
                    _ => Ok(NIL),
                }
            }
            _ => {
                self.eval(call, at, false, fx)?;
                Ok(NIL)
            }
        };
        self.roots.truncate(base);
        out
    }

    /// `: target key value` — write an env binding or a list element. The
    /// key and value are parsed the same way whether or not side effects are
    /// live; only the store itself is gated.
    fn eval_store(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let target = self.eval(call, at, true, fx)?;
        let base = self.roots.len();
        self.roots.push(target);
        match self.kind(target) {
            Kind::Env { .. } => {
                let key = self.eval(call, at, false, fx)?;
                self.roots.push(key);
                let value = self.eval(call, at, true, fx)?;
                if fx {
                    self.env_bind(target, key, value)?;
                }
            }
            Kind::List { .. } => {
                let key = self.eval(call, at, true, fx)?;
                self.roots.push(key);
                let value = self.eval(call, at, true, fx)?;
                if let Kind::Number(n) = self.kind(key) {
                    if fx {
                        self.list_store(target, n as i64, value);
                    }
                }
            }
            _ => {
                self.eval(call, at, false, fx)?;
                self.eval(call, at, true, fx)?;
            }
        }
        self.roots.truncate(base);
        Ok(NIL)
    }

    /// `= name value` — bind in the current frame's env, creating the env on
    /// first use.
    fn eval_bind(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let name = self.eval(call, at, false, fx)?;
        let base = self.roots.len();
        self.roots.push(name);
        let value = self.eval(call, at, true, fx)?;
        if fx {
            self.roots.push(value);
            let env = self.frame_env(call)?;
            self.env_bind(env, name, value)?;
        }
        self.roots.truncate(base);
        Ok(NIL)
    }

    /// `? cond a b` — both branches are parsed; only the selected one keeps
    /// its side effects.
    fn eval_choice(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let cond = self.eval(call, at, true, fx)?;
        let base = self.roots.len();
        self.roots.push(cond);
        let taken = self.truthy(cond);
        let a = self.eval(call, at, true, fx && taken)?;
        self.roots.push(a);
        let b = self.eval(call, at, true, fx && !taken)?;
        self.roots.truncate(base);
        Ok(if taken { a } else { b })
    }

    /// `# list item` — append; yields the cell now holding the item.
    fn eval_append(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let (list, item) = self.eval_pair(call, at, fx)?;
        if fx {
            self.append_to_list(list, item)
        } else {
            Ok(NIL)
        }
    }

    /// `\ list` — detach and yield the last cell.
    fn eval_pop(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let list = self.eval(call, at, true, fx)?;
        if fx { Ok(self.list_pop(list)) } else { Ok(NIL) }
    }

    /// `% list name body` — bind `name` to each element and re-evaluate the
    /// body by rewinding the cursor; the body text is parsed once per
    /// iteration but scanned exactly once overall.
    fn eval_foreach(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let list = self.eval(call, at, true, fx)?;
        let base = self.roots.len();
        self.roots.push(list);
        let name = self.eval(call, at, false, fx)?;
        self.roots.push(name);
        let body = *at;

        let mut node = match self.kind(list) {
            Kind::List { value: Some(_), .. } => Some(list),
            _ => None,
        };
        if !fx || node.is_none() {
            // the body still has to be scanned to find the expression's end
            let mut skip = body;
            self.eval(call, &mut skip, false, false)?;
            *at = skip;
            self.roots.truncate(base);
            return Ok(NIL);
        }

        let mut result = NIL;
        while let Some(n) = node {
            let Kind::List {
                value: Some(item),
                next,
            } = self.kind(n)
            else {
                break;
            };
            let env = self.frame_env(call)?;
            self.env_bind(env, name, item)?;
            let mut cursor = body;
            result = self.eval(call, &mut cursor, true, fx)?;
            *at = cursor;
            self.roots.truncate(base + 2);
            self.roots.push(result);
            self.roots.extend(next);
            node = next;
        }
        self.roots.truncate(base);
        Ok(result)
    }

    /// `^ cond body` — re-evaluate both sub-expressions each iteration.
    fn eval_while(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let cond_at = *at;
        let mut cond = self.eval(call, at, true, fx)?;
        let body_at = *at;
        let base = self.roots.len();

        if !self.truthy(cond) {
            // scan the body once to find the expression's end
            self.eval(call, at, false, false)?;
            return Ok(NIL);
        }

        let mut result = NIL;
        while self.truthy(cond) {
            let mut cursor = body_at;
            result = self.eval(call, &mut cursor, true, fx)?;
            *at = cursor;
            self.roots.truncate(base);
            self.roots.push(result);
            let mut again = cond_at;
            cond = self.eval(call, &mut again, true, fx)?;
            if !fx {
                break;
            }
        }
        self.roots.truncate(base);
        Ok(result)
    }

    /// `$ value` — length of a string, env chain, or list; nil otherwise.
    /// An unset head node (empty list, fresh env) does not count.
    fn eval_len(&mut self, call: CellRef, at: &mut usize, fx: bool) -> Outcome<CellRef> {
        let v = self.eval(call, at, true, fx)?;
        let (mut len, mut node) = match self.kind(v) {
            Kind::Str(span) => return self.alloc(Kind::Number(span.len as f64)),
            Kind::Env { value, .. } | Kind::List { value, .. } => {
                (if value.is_some() { 0i64 } else { -1 }, Some(v))
            }
            _ => return Ok(NIL),
        };
        while let Some(n) = node {
            len += 1;
            node = match self.kind(n) {
                Kind::Env { next, .. } | Kind::List { next, .. } => next,
                _ => None,
            };
        }
        self.alloc(Kind::Number(len as f64))
    }

    /// `' args body` — capture cursors into the program text. The body is
    /// scanned once so the literal ends where the body does; the fresh cell
    /// stays protected across that scan, which still allocates.
    fn eval_fn_literal(&mut self, call: CellRef, at: &mut usize) -> Outcome<CellRef> {
        self.skip_space(at)?;
        let args = *at;
        if self.text.byte(*at) == b'(' {
            while !matches!(self.text.byte(*at), 0 | b')') {
                *at += 1;
            }
            if self.text.byte(*at) == 0 {
                return Err(Fault::Eof);
            }
            *at += 1;
        } else {
            self.scan_word(at);
        }
        self.skip_space(at)?;
        let body = *at;
        let cell = self.alloc(Kind::Fn {
            args: args as u32,
            body: body as u32,
        })?;
        let base = self.roots.len();
        self.roots.push(cell);
        self.eval(call, at, false, false)?;
        self.roots.truncate(base);
        Ok(cell)
    }

    /// A bare word: a symbol literal when `resolve` is off; otherwise a
    /// dynamic lookup, applying the result when it names a callable.
    fn eval_word(
        &mut self,
        call: CellRef,
        at: &mut usize,
        resolve: bool,
        fx: bool,
    ) -> Outcome<CellRef> {
        let word = self.scan_word(at);
        if !resolve {
            return self.alloc(Kind::Symbol(word));
        }
        let callee = self.lookup_span(call, word);
        match self.kind(callee) {
            Kind::Fn { args, body } => {
                self.apply(call, at, fx, callee, args as usize, Some(body as usize), None)
            }
            Kind::CFn { args, call: f } => {
                self.apply(call, at, fx, callee, args as usize, None, Some(f))
            }
            _ => Ok(callee),
        }
    }

    /// Apply a callable: evaluate the actuals from the call site in the
    /// caller's frame, bind them by the names in the arg spec into a fresh
    /// env, then run the body (or native) inside a new frame. With side
    /// effects off the arguments are still parsed and bound but nothing
    /// runs, and the callable itself is the result.
    fn apply(
        &mut self,
        call: CellRef,
        at: &mut usize,
        fx: bool,
        callee: CellRef,
        spec: usize,
        body: Option<usize>,
        native: Option<NativeFn>,
    ) -> Outcome<CellRef> {
        let base = self.roots.len();
        self.roots.push(callee);
        let env = self.alloc(Kind::Env {
            name: None,
            value: None,
            next: None,
        })?;
        self.roots.push(env);
        let frame = self.alloc(Kind::Call {
            parent: Some(call),
            env: Some(env),
            callable: Some(callee),
        })?;
        self.roots.push(frame);

        let mut spec_at = spec;
        if self.text.byte(spec_at) == b'(' {
            spec_at += 1;
            loop {
                while is_space(self.text.byte(spec_at)) {
                    spec_at += 1;
                }
                if matches!(self.text.byte(spec_at), 0 | b')') {
                    break;
                }
                self.bind_argument(call, at, fx, env, &mut spec_at)?;
            }
        } else {
            while is_space(self.text.byte(spec_at)) {
                spec_at += 1;
            }
            if self.text.byte(spec_at) == 0 {
                return Err(Fault::Eof);
            }
            self.bind_argument(call, at, fx, env, &mut spec_at)?;
        }

        let result = if !fx {
            callee
        } else {
            let saved = self.current;
            self.current = Some(frame);
            let out = match (body, native) {
                (Some(b), _) => {
                    let mut cursor = b;
                    self.eval(frame, &mut cursor, true, fx)
                }
                (None, Some(f)) => Ok(f(self, env)),
                (None, None) => Ok(NIL),
            };
            self.current = saved;
            out?
        };
        self.roots.truncate(base);
        Ok(result)
    }

    /// Read one parameter name from the arg spec and bind the next actual
    /// argument, evaluated at the call site in the caller's frame.
    fn bind_argument(
        &mut self,
        call: CellRef,
        at: &mut usize,
        fx: bool,
        env: CellRef,
        spec_at: &mut usize,
    ) -> Outcome<()> {
        let start = *spec_at;
        while is_word_byte(self.text.byte(*spec_at)) {
            *spec_at += 1;
        }
        let name = Span::new(start, *spec_at - start);
        let value = self.eval(call, at, true, fx)?;
        let base = self.roots.len();
        self.roots.push(value);
        let name_cell = self.alloc(Kind::Symbol(name))?;
        self.env_bind(env, name_cell, value)?;
        self.roots.truncate(base);
        Ok(())
    }
}
