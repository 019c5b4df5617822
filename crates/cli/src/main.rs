//! mote - interactive REPL and file runner for the mote language
//!
//! Usage:
//!   mote                    # start the REPL
//!   mote program.mote       # run a script file
//!
//! The interpreter runs inside fixed-capacity memory; `--prog-bytes` and
//! `--cells` size the program-text buffer and the cell arena. Two built-ins
//! are installed into the top-level environment: `cells` (the cell-area
//! size) and `load` (run a file into a fresh persisted environment).

mod builtins;
mod repl;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use mote_core::{CellRef, Context};

#[derive(Parser)]
#[command(name = "mote")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Embeddable scripting interpreter", long_about = None)]
struct Args {
    /// Script to run (starts the interactive REPL if not given)
    file: Option<PathBuf>,

    /// Program-text buffer capacity in bytes
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    prog_bytes: usize,

    /// Cell-area capacity in cells
    #[arg(long, default_value_t = 128 * 1024)]
    cells: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let result = match args.file {
        Some(path) => run_file(&path, args.prog_bytes, args.cells),
        None => repl::run(args.prog_bytes, args.cells),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// A context printing to stdout, with the built-ins installed into a
/// persisted top-level environment.
fn open_context(prog_bytes: usize, cells: usize) -> (Context, CellRef) {
    let mut ctx = Context::open(
        prog_bytes,
        cells,
        Box::new(|s| {
            print!("{s}");
            let _ = io::stdout().flush();
        }),
    );
    let env = ctx.make_env();
    ctx.persist(env);
    builtins::install(&mut ctx, env);
    (ctx, env)
}

fn run_file(path: &Path, prog_bytes: usize, cells: usize) -> Result<(), String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
    let (mut ctx, env) = open_context(prog_bytes, cells);
    ctx.run(Some(env), &source);
    Ok(())
}
