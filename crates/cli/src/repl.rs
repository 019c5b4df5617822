//! Line-oriented REPL: banner, prompt, persistent history, `:q` to quit.

use std::path::PathBuf;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Run the interactive loop until `:q`, Ctrl-C, or Ctrl-D.
pub fn run(prog_bytes: usize, cells: usize) -> Result<(), String> {
    let (mut ctx, env) = crate::open_context(prog_bytes, cells);
    println!("mote {} (:q to quit)", env!("CARGO_PKG_VERSION"));
    println!("Cell count: {}", ctx.cells());

    let mut editor =
        DefaultEditor::new().map_err(|e| format!("failed to start line editor: {e}"))?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }

    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed == ":q" {
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);
                let value = ctx.run(Some(env), &line);
                println!("{}", ctx.format(value));
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(format!("input error: {e}")),
        }
    }

    if let Some(path) = &history {
        let _ = editor.save_history(path);
    }
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    home::home_dir().map(|dir| dir.join(".mote_history"))
}
