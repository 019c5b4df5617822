//! mote: an embeddable scripting interpreter over fixed-capacity memory.
//!
//! A context is opened with a program-text capacity and a cell count; every
//! runtime value lives in a uniform cell arena reclaimed by a mark-and-sweep
//! collector, and source text is evaluated in a single pass with no AST.
//! The language is a tiny single-character operator notation with dynamic
//! scoping; see the operator dispatch in `eval` for the full table.
//!
//! ```
//! use mote_core::Context;
//!
//! let mut ctx = Context::open(4096, 512, Box::new(|s| print!("{s}")));
//! let env = ctx.make_env();
//! ctx.persist(env);
//! let result = ctx.run(Some(env), "(= x 10)(* x x)");
//! assert_eq!(ctx.as_number(result), Some(100.0));
//! ```
//!
//! Errors are sentinel values: a domain error (wrong operand type, missing
//! key, index out of range) evaluates to nil, and running off the end of the
//! input halts the run. `run` returns the last useful value either way.

mod arena;
mod context;
mod env;
mod eval;
mod format;
mod gc;
mod stats;
mod value;

pub use context::{Context, Printer};
pub use stats::MemoryStats;
pub use value::{CellRef, NativeFn};
