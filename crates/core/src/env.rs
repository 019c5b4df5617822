//! Environments and the dynamic call-frame chain.
//!
//! An environment is a linked list of (symbol, value) cells. A name has at
//! most one binding per environment: `env_bind` overwrites in place and only
//! appends when the name is new. Name resolution during evaluation walks the
//! *call* chain, trying each frame's environment in turn, so scoping is
//! dynamic rather than lexical.

use crate::arena::NIL;
use crate::context::Context;
use crate::eval::Outcome;
use crate::value::{CellRef, Kind, Span};

impl Context {
    /// Text of a symbol cell, when `cell` is one.
    pub(crate) fn symbol_span(&self, cell: Option<CellRef>) -> Option<Span> {
        match cell.map(|c| self.kind(c)) {
            Some(Kind::Symbol(s)) => Some(s),
            _ => None,
        }
    }

    /// Set `name` to `value` in `env`: overwrite an existing binding, claim
    /// the unused head node of a fresh environment, or append at the tail.
    /// All three operands are protected across the tail allocation.
    pub(crate) fn env_bind(&mut self, env: CellRef, name: CellRef, value: CellRef) -> Outcome<()> {
        let base = self.roots.len();
        self.roots.extend([env, name, value]);
        let result = self.env_bind_inner(env, name, value);
        self.roots.truncate(base);
        result
    }

    fn env_bind_inner(&mut self, env: CellRef, name: CellRef, value: CellRef) -> Outcome<()> {
        let name_text = self.symbol_span(Some(name));
        let mut node = env;
        loop {
            let Kind::Env {
                name: slot_name,
                next,
                ..
            } = self.kind(node)
            else {
                return Ok(());
            };
            if slot_name.is_none() {
                break;
            }
            let matches = match (self.symbol_span(slot_name), name_text) {
                (Some(a), Some(b)) => self.text.slice(a) == self.text.slice(b),
                _ => false,
            };
            if matches {
                if let Kind::Env { value: slot, .. } = &mut self.arena.get_mut(node).kind {
                    *slot = Some(value);
                }
                return Ok(());
            }
            match next {
                Some(nx) => node = nx,
                None => {
                    let fresh = self.alloc(Kind::Env {
                        name: Some(name),
                        value: Some(value),
                        next: None,
                    })?;
                    if let Kind::Env { next: slot, .. } = &mut self.arena.get_mut(node).kind {
                        *slot = Some(fresh);
                    }
                    return Ok(());
                }
            }
        }
        // unused head node from make_env
        if let Kind::Env {
            name: slot_name,
            value: slot_value,
            ..
        } = &mut self.arena.get_mut(node).kind
        {
            *slot_name = Some(name);
            *slot_value = Some(value);
        }
        Ok(())
    }

    /// Look `name` up in a single environment chain; nil when unbound.
    pub fn env_get(&self, env: CellRef, name: CellRef) -> CellRef {
        match self.symbol_span(Some(name)) {
            Some(span) => self.env_get_span(env, span),
            None => NIL,
        }
    }

    pub(crate) fn env_get_span(&self, env: CellRef, name: Span) -> CellRef {
        let want = self.text.slice(name);
        self.env_get_str(env, want)
    }

    pub(crate) fn env_get_str(&self, env: CellRef, want: &str) -> CellRef {
        let mut node = Some(env);
        while let Some(r) = node {
            let Kind::Env {
                name: slot_name,
                value,
                next,
            } = self.kind(r)
            else {
                break;
            };
            if let Some(span) = self.symbol_span(slot_name) {
                if self.text.slice(span) == want {
                    return value.unwrap_or(NIL);
                }
            }
            node = next;
        }
        NIL
    }

    /// Resolve `name` along the dynamic call chain: the frame's environment
    /// first, then each parent frame in turn. Nil when nothing matches.
    pub(crate) fn lookup_span(&self, call: CellRef, name: Span) -> CellRef {
        let mut frame = Some(call);
        while let Some(r) = frame {
            let Kind::Call { parent, env, .. } = self.kind(r) else {
                break;
            };
            if let Some(env) = env {
                let found = self.env_get_span(env, name);
                if found != NIL {
                    return found;
                }
            }
            frame = parent;
        }
        NIL
    }

    pub(crate) fn lookup(&self, call: CellRef, name: CellRef) -> CellRef {
        match self.symbol_span(Some(name)) {
            Some(span) => self.lookup_span(call, span),
            None => NIL,
        }
    }

    /// The frame's environment, created on first use.
    pub(crate) fn frame_env(&mut self, call: CellRef) -> Outcome<CellRef> {
        if let Kind::Call { env: Some(env), .. } = self.kind(call) {
            return Ok(env);
        }
        let env = self.alloc(Kind::Env {
            name: None,
            value: None,
            next: None,
        })?;
        if let Kind::Call { env: slot, .. } = &mut self.arena.get_mut(call).kind {
            *slot = Some(env);
        }
        Ok(env)
    }
}
