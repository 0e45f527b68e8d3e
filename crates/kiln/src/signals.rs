//! Interrupt handling.
//!
//! SIGINT and SIGTERM both stop the build: every child still tracked in the
//! invocation's [`ProcessSet`] is terminated, then the process exits with
//! [`EXIT_SIGINT`].

use crate::cli::{CliError, EXIT_SIGINT};
use kiln_core::ProcessSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long children get to exit after SIGTERM before they are killed
pub const TERMINATION_GRACE: Duration = Duration::from_secs(3);

/// Install the process-wide interrupt handler.
///
/// Can only be called once per process.
pub fn install(processes: Arc<ProcessSet>) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        let count = processes.count();
        warn!(count, "Interrupted, stopping child processes");
        let signalled = processes.terminate_all(TERMINATION_GRACE);

        #[allow(clippy::print_stderr)]
        {
            if signalled > 0 {
                eprintln!("Interrupted; stopped {signalled} running command(s)");
            } else {
                eprintln!("Interrupted");
            }
        }
        std::process::exit(EXIT_SIGINT);
    })
    .map_err(|e| CliError::other(format!("Failed to install signal handler: {e}")))
}
