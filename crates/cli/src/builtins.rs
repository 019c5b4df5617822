//! Host built-ins installed into the top-level environment.

use std::fs;

use mote_core::{CellRef, Context};
use tracing::debug;

/// Install the built-in natives into `env`.
pub fn install(ctx: &mut Context, env: CellRef) {
    let cells = ctx.native("()", builtin_cells);
    ctx.set(env, "cells", cells);
    let load = ctx.native("path", builtin_load);
    ctx.set(env, "load", load);
}

/// `(cells)` — the cell-area size of the running context.
fn builtin_cells(ctx: &mut Context, _env: CellRef) -> CellRef {
    let count = ctx.cells() as f64;
    ctx.number(count)
}

/// `(load "path")` — run a script file inside a fresh, persisted environment
/// and return that environment. Unreadable files and non-string paths yield
/// nil.
fn builtin_load(ctx: &mut Context, env: CellRef) -> CellRef {
    let Some(path) = ctx.as_str(ctx.get(env, "path")) else {
        return Context::NIL;
    };
    let path = path.to_owned();
    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            debug!(%path, error = %e, "load failed");
            return Context::NIL;
        }
    };
    let module = ctx.make_env();
    ctx.persist(module);
    ctx.run(Some(module), &source);
    module
}
