//! Target registry, templating and dependency-ordered execution for kiln.
//!
//! A project declares named targets in `BUILD.toml` files. Each target has
//! dependencies and free-form options; executing a target checks, hydrates,
//! runs and finally cleans up its whole dependency tree in order.
//!
//! # Key Types
//!
//! - [`Target`]: lifecycle contract implemented by every target kind
//! - [`TargetRegistry`]: unique-name registry the executor resolves against
//! - [`Executor`]: drives the check, run and cleanup sweeps
//! - [`Overrides`]: values for `{{name}}` placeholders in target options
//! - [`ProcessRunner`] and [`ProcessSet`]: external commands and their
//!   termination on interrupt
//!
//! # Example
//!
//! ```ignore
//! use kiln_core::{Executor, Overrides, ProcessRunner, ProcessSet, Project, TargetKinds};
//! use std::sync::Arc;
//!
//! let project = Project::discover(&std::env::current_dir()?)?;
//! let mut registry = kiln_core::load_project(&project, &TargetKinds::builtin())?;
//!
//! let runner = ProcessRunner::new(Arc::new(ProcessSet::new()));
//! let overrides: Overrides = [("env", "production")].into_iter().collect();
//!
//! Executor::new(&mut registry, &runner, &overrides)
//!     .with_revisit(project.config.revisit)
//!     .execute("deploy")?;
//! ```

pub mod config;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod process;
pub mod targets;
pub mod template;

pub use config::{CONFIG_FILE_NAME, Project, ProjectConfig, find_project_root};
pub use definitions::{discover_build_files, load_file, load_project};
pub use error::{Error, Result};
pub use executor::{Executor, Revisit, plan};
pub use process::{CommandOutput, ProcessRunner, ProcessSet};
pub use targets::{
    BuildFile, ResultMap, RunContext, Target, TargetBase, TargetDefinition, TargetKinds,
    TargetRegistry,
};
pub use template::{Options, Overrides};
