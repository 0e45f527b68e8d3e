//! Error types for the kiln-core crate

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for kiln-core operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A definition or project configuration is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kiln_core::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
    },

    /// Two targets were registered under the same name
    #[error("Target '{name}' defined more than once")]
    #[diagnostic(
        code(kiln_core::registry::duplicate),
        help("Target names must be unique across every build file in the project")
    )]
    DuplicateTarget {
        /// The name that was registered twice
        name: String,
    },

    /// A target name was looked up but never registered
    #[error("Unknown target '{name}'")]
    #[diagnostic(
        code(kiln_core::registry::unknown),
        help("Run `kiln list` to see the registered targets")
    )]
    UnknownTarget {
        /// The name that could not be resolved
        name: String,
    },

    /// A target lists a dependency that is not registered
    #[error("Target '{target}' depends on missing target '{dependency}'")]
    #[diagnostic(code(kiln_core::graph::missing_dependency))]
    MissingDependency {
        /// The target declaring the dependency
        target: String,
        /// The dependency name that could not be resolved
        dependency: String,
    },

    /// The dependency walk re-entered a target that is still in progress
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    #[diagnostic(code(kiln_core::graph::cycle))]
    CycleDetected {
        /// The walk path, ending with the repeated target
        path: Vec<String>,
    },

    /// A `{{name}}` placeholder has no value in the override mapping
    #[error("Found '{{{{{name}}}}}' without a definition")]
    #[diagnostic(
        code(kiln_core::template::missing_value),
        help("Pass the value as a command-line flag or declare it as an option on the target")
    )]
    MissingTemplateValue {
        /// The unresolved placeholder identifier
        name: String,
    },

    /// Substitution of a single value never converged
    #[error("Templating '{key}' exceeded {limit} substitutions; an override probably refers to itself")]
    #[diagnostic(code(kiln_core::template::recursion))]
    TemplateRecursion {
        /// The configuration key being templated
        key: String,
        /// The substitution limit that was hit
        limit: usize,
    },

    /// A target's precondition check failed
    #[error("Check failed for target '{target}': {reason}")]
    #[diagnostic(code(kiln_core::target::check))]
    CheckFailed {
        /// The target whose check failed
        target: String,
        /// Why the check failed
        reason: String,
    },

    /// A target's run step failed
    #[error("Target '{target}' failed: {message}")]
    #[diagnostic(code(kiln_core::target::run))]
    RunFailed {
        /// The target whose run failed
        target: String,
        /// Description of the failure
        message: String,
        /// Exit code of the failing process, if it exited normally
        exit_code: Option<i32>,
    },

    /// An external process could not be started
    #[error("Failed to spawn `{command}`: {source}")]
    #[diagnostic(code(kiln_core::process::spawn))]
    Process {
        /// The command line that failed to start
        command: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(kiln_core::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<Path>>,
        /// Description of the operation that failed
        operation: String,
    },

    /// A definition or configuration file could not be parsed
    #[error("Failed to parse {}: {message}", path.display())]
    #[diagnostic(code(kiln_core::parse))]
    Parse {
        /// The file that failed to parse
        path: Box<Path>,
        /// Parser message
        message: String,
    },

    /// No project root could be found above the starting directory
    #[error("Could not find a project root above {}", start.display())]
    #[diagnostic(
        code(kiln_core::project::no_root),
        help("Run kiln inside a git checkout or create a .kiln.toml at the project root")
    )]
    NoProjectRoot {
        /// Directory the search started from
        start: Box<Path>,
    },

    /// Discovery found no definition files
    #[error("Could not locate any {file_name} files under {}", root.display())]
    #[diagnostic(code(kiln_core::project::no_build_files))]
    NoBuildFiles {
        /// The project root that was searched
        root: Box<Path>,
        /// The definition file name searched for
        file_name: String,
    },

    /// Definition files were found but declared no targets
    #[error("No targets found under {}", root.display())]
    #[diagnostic(code(kiln_core::project::no_targets))]
    NoTargets {
        /// The project root that was searched
        root: Box<Path>,
    },
}

impl Error {
    /// Create a configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a duplicate target error
    pub fn duplicate_target(name: impl Into<String>) -> Self {
        Self::DuplicateTarget { name: name.into() }
    }

    /// Create an unknown target error
    pub fn unknown_target(name: impl Into<String>) -> Self {
        Self::UnknownTarget { name: name.into() }
    }

    /// Create a missing template value error
    pub fn missing_template_value(name: impl Into<String>) -> Self {
        Self::MissingTemplateValue { name: name.into() }
    }

    /// Create a check failure
    pub fn check_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CheckFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a run failure for a command that exited unsuccessfully
    pub fn command_failed(target: impl Into<String>, command: &str, exit_code: Option<i32>) -> Self {
        let message = match exit_code {
            Some(code) => format!("`{command}` exited with status {code}"),
            None => format!("`{command}` was terminated by a signal"),
        };
        Self::RunFailed {
            target: target.into(),
            message,
            exit_code,
        }
    }

    /// Create a process spawn error
    pub fn process(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Process {
            command: command.into(),
            source,
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(PathBuf::into_boxed_path),
            operation: operation.into(),
        }
    }

    /// Create a parse error for a file
    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error stems from invalid configuration rather than a failed build
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::DuplicateTarget { .. }
                | Self::UnknownTarget { .. }
                | Self::MissingDependency { .. }
                | Self::CycleDetected { .. }
                | Self::Parse { .. }
                | Self::NoProjectRoot { .. }
                | Self::NoBuildFiles { .. }
                | Self::NoTargets { .. }
        )
    }
}

/// Result type for kiln-core operations
pub type Result<T> = std::result::Result<T, Error>;
