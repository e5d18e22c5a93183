//! Runs the layer boundary lint over `console/src`.
//!
//! Usage: `architecture-lint [CONSOLE_DIR]`. Without an argument the console
//! crate of this workspace is linted.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn default_console_dir() -> PathBuf {
    // tools/architecture-lint -> workspace root
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap_or_else(|| Path::new("."))
        .join("console")
}

fn main() -> ExitCode {
    let console_dir = std::env::args_os()
        .nth(1)
        .map_or_else(default_console_dir, PathBuf::from);
    match architecture_lint::lint_console_sources(&console_dir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{}: {err}", console_dir.display());
            ExitCode::FAILURE
        }
    }
}
