use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::Serialize;
use std::io::{self, Write};
use thiserror::Error;

/// Successful invocation
pub const EXIT_OK: i32 = 0;
/// Bad arguments, invalid definitions or an unknown target
pub const EXIT_CLI: i32 = 2;
/// Check, template or run failure
pub const EXIT_BUILD: i32 = 3;
/// Interrupted by SIGINT or SIGTERM (128 + SIGINT)
pub const EXIT_SIGINT: i32 = 130;

/// Everything the binary can fail with, grouped by exit code.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// The invocation or the project definitions are wrong
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(kiln::cli::config))]
    Config {
        /// What is wrong
        message: String,
        /// Suggested fix
        #[help]
        help: Option<String>,
    },
    /// A target failed its check, templating or run
    #[error("Build failed: {message}")]
    #[diagnostic(code(kiln::cli::build))]
    Build {
        /// What failed
        message: String,
        /// Suggested fix
        #[help]
        help: Option<String>,
    },
    /// The environment got in the way (I/O, serialization)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(kiln::cli::other))]
    Other {
        /// What failed
        message: String,
        /// Suggested fix
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// A [`CliError::Config`] without help
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// A [`CliError::Build`] without help
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            help: None,
        }
    }

    /// A [`CliError::Other`] without help
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Replace the help text
    #[must_use]
    pub fn with_help(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Config { help, .. } | Self::Build { help, .. } | Self::Other { help, .. } => {
                *help = Some(text.into());
            }
        }
        self
    }

    /// Short machine-readable class used in the JSON error envelope
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Build { .. } => "build",
            Self::Other { .. } => "other",
        }
    }
}

/// Definition problems, unknown targets and cycles map to `Config`; check,
/// template and run failures to `Build`; I/O to `Other`.
impl From<kiln_core::Error> for CliError {
    fn from(err: kiln_core::Error) -> Self {
        use kiln_core::Error as E;

        let help = err.help().map(|h| h.to_string());
        let converted = match err {
            // the core message already says "Configuration error"
            E::Configuration { message } => Self::config(message),
            ref e if e.is_configuration() => Self::config(e.to_string()),
            E::Io {
                ref source,
                ref path,
                ref operation,
            } => {
                let location = path
                    .as_deref()
                    .map(|p| format!(" on {}", p.display()))
                    .unwrap_or_default();
                Self::other(format!("I/O {operation} failed{location}: {source}"))
            }
            E::RunFailed { .. } => Self::build(err.to_string())
                .with_help("Check the command output above for details"),
            e => Self::build(e.to_string()),
        };

        match help {
            Some(help) => converted.with_help(help),
            None => converted,
        }
    }
}

/// Process exit code for an error
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Build { .. } | CliError::Other { .. } => EXIT_BUILD,
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: String,
    help: Option<&'a str>,
}

/// Print an error: a JSON envelope on stdout with `--json`, otherwise a
/// miette report on stderr.
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if !json_mode {
        eprintln!("{:?}", Report::new(err.clone()));
        let _ = io::stderr().flush();
        return;
    }

    let help = match err {
        CliError::Config { help, .. } | CliError::Build { help, .. } | CliError::Other { help, .. } => {
            help.as_deref()
        }
    };
    let envelope = ErrorEnvelope::new(ErrorBody {
        code: err.code(),
        message: err.to_string(),
        help,
    });
    match serde_json::to_string(&envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize error: {e}"),
    }
}

/// `{"status": "ok", "data": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct OkEnvelope<T> {
    /// Always `"ok"`
    pub status: &'static str,
    /// Command output
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Wrap command output
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// `{"status": "error", "error": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<E> {
    /// Always `"error"`
    pub status: &'static str,
    /// Error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Wrap error details
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Serialize `data` inside an [`OkEnvelope`]
pub fn to_json<T: Serialize>(data: T) -> Result<String, CliError> {
    serde_json::to_string_pretty(&OkEnvelope::new(data))
        .map_err(|e| CliError::other(format!("Failed to serialize output: {e}")))
}

/// Declarative build targets with dependency-ordered execution.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Run build targets declared in BUILD.toml files, dependencies first")]
#[command(version)]
pub struct Cli {
    /// What to do
    #[command(subcommand)]
    pub command: Commands,

    /// Minimum level of log events written to stderr.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Minimum log level (RUST_LOG takes precedence)",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        help = "Set log output format",
        default_value = "pretty",
        value_enum
    )]
    pub format: TracingFormat,

    /// Emit JSON envelope on stdout.
    #[arg(long, global = true, help = "Emit JSON envelope on stdout")]
    pub json: bool,
}

/// kiln subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List every target in the project.
    #[command(about = "List every target in the project")]
    List,

    /// Run a target after its dependencies.
    #[command(
        about = "Run a target after its dependencies",
        disable_help_flag = true,
        long_about = "Run a target after its dependencies.\n\n\
            Every top-level option of the target and of its dependencies becomes a \
            --<option> flag whose default is the declared value. Run \
            `kiln build <target> --help` to list them."
    )]
    Build {
        /// Target to build
        target: String,
        /// Per-target option flags
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            num_args = 0..,
            value_name = "OPTIONS"
        )]
        args: Vec<String>,
    },

    /// Show the order targets would run in.
    #[command(about = "Show the order targets would run in")]
    Plan {
        /// Target to plan
        target: String,
    },
}

/// Parse command-line arguments into the CLI structure.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_build_with_trailing_flags() {
        let cli = Cli::try_parse_from(["kiln", "--json", "build", "web", "--env", "prod"]).unwrap();
        assert!(cli.json);
        assert_eq!(
            cli.command,
            Commands::Build {
                target: "web".into(),
                args: vec!["--env".into(), "prod".into()],
            }
        );
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["kiln", "list"]).unwrap();
        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.format, TracingFormat::Pretty);
        assert!(!cli.json);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code_for(&CliError::config("x")), EXIT_CLI);
        assert_eq!(exit_code_for(&CliError::build("x")), EXIT_BUILD);
        assert_eq!(exit_code_for(&CliError::other("x")), EXIT_BUILD);
    }

    #[test]
    fn test_core_error_mapping() {
        let err: CliError = kiln_core::Error::configuration("bad").into();
        assert!(matches!(err, CliError::Config { ref message, .. } if message == "bad"));
        assert!(!err.to_string().contains("Configuration error: Configuration error"));

        let err: CliError = kiln_core::Error::unknown_target("web").into();
        assert_eq!(exit_code_for(&err), EXIT_CLI);
        assert!(matches!(err, CliError::Config { help: Some(_), .. }));

        let err: CliError = kiln_core::Error::missing_template_value("sha").into();
        assert_eq!(exit_code_for(&err), EXIT_BUILD);

        let err: CliError = kiln_core::Error::command_failed("web", "make", Some(2)).into();
        assert!(matches!(err, CliError::Build { help: Some(_), .. }));

        let err: CliError = kiln_core::Error::io(
            io::Error::new(io::ErrorKind::NotFound, "gone"),
            Some(Path::new("/x").to_path_buf()),
            "read",
        )
        .into();
        assert!(matches!(err, CliError::Other { .. }));
        assert!(err.to_string().contains("on /x"));
    }

    #[test]
    fn test_with_help_keeps_variant() {
        let err = CliError::build("x").with_help("try again");
        assert_eq!(err.code(), "build");
        assert!(matches!(err, CliError::Build { help: Some(ref h), .. } if h == "try again"));
    }

    #[test]
    fn test_json_output_is_enveloped() {
        let json = to_json(vec!["a", "b"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"][1], "b");
    }
}
