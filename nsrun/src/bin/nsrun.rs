//! CLI entry point. Mirrors the teacher's separation of a thin `main.rs`
//! over a library crate (`boxlite`'s `src/bin/shim.rs` pattern), with
//! top-level error handling modeled on the error taxonomy in `error.rs`.

use clap::Parser;
use nsrun::cli::Cli;
use nsrun::paths::Paths;
use std::process::ExitCode;

fn main() -> ExitCode {
    nsrun::logging::init();

    let cli = Cli::parse();
    let paths = Paths::from_env();

    match nsrun::dispatch(&paths, cli.command) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(error = %e, "nsrun failed");
            eprintln!("nsrun: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
