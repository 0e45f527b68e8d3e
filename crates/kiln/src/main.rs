//! kiln CLI application

// CLI binary needs to write to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use kiln::cli::{self, CliError, EXIT_OK, exit_code_for, render_error};
use kiln::tracing::{TracingConfig, init_tracing};
use kiln::{commands, signals};
use kiln_core::ProcessSet;
use std::io::{self, Write};
use std::sync::Arc;

fn main() {
    // Tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let exit_code = run(&cli);
    std::process::exit(exit_code);
}

fn run(cli: &cli::Cli) -> i32 {
    let tracing_config = TracingConfig {
        format: cli.format,
        level: cli.level.into(),
        ..Default::default()
    };
    // Ignore error if tracing is already initialized
    let _ = init_tracing(tracing_config);

    let processes = Arc::new(ProcessSet::new());
    let result = signals::install(Arc::clone(&processes)).and_then(|()| {
        let start = std::env::current_dir().map_err(|e| {
            CliError::other(format!("Failed to read the current directory: {e}"))
        })?;
        commands::dispatch(&cli.command, cli.json, &start, processes)
    });

    match result {
        Ok(output) => {
            print!("{output}");
            let _ = io::stdout().flush();
            EXIT_OK
        }
        Err(err) => {
            render_error(&err, cli.json);
            exit_code_for(&err)
        }
    }
}
