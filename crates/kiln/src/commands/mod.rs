//! Subcommand implementations.
//!
//! Every command returns the text to print on stdout; rendering errors and
//! choosing the exit code is left to `main`.

pub mod build;
pub mod list;
pub mod plan;

use crate::cli::{CliError, Commands};
use kiln_core::{ProcessRunner, ProcessSet, Project, TargetKinds, TargetRegistry, load_project};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A loaded project ready for commands to act on.
#[derive(Debug)]
pub struct Session {
    /// The located project
    pub project: Project,
    /// Every target the project declares
    pub registry: TargetRegistry,
    /// Runner registering children in the invocation's process set
    pub runner: ProcessRunner,
}

impl Session {
    /// Locate the project containing `start` and load its targets
    pub fn open(start: &Path, processes: Arc<ProcessSet>) -> Result<Self, CliError> {
        let project = Project::discover(start)?;
        debug!(root = %project.root.display(), "Opened project");
        let registry = load_project(&project, &TargetKinds::builtin())?;
        Ok(Self {
            project,
            registry,
            runner: ProcessRunner::new(processes),
        })
    }
}

/// Run `command` against the project containing `start`.
pub fn dispatch(
    command: &Commands,
    json: bool,
    start: &Path,
    processes: Arc<ProcessSet>,
) -> Result<String, CliError> {
    let mut session = Session::open(start, processes)?;
    match command {
        Commands::List => list::execute(&session, json),
        Commands::Plan { target } => plan::execute(&session, target, json),
        Commands::Build { target, args } => build::execute(&mut session, target, args, json),
    }
}
