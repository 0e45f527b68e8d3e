//! Target model: the unit of work and its lifecycle.
//!
//! A target is registered once, checked, hydrated against the command-line
//! overrides, run, and finally cleaned up. Concrete kinds implement
//! [`Target`]; shared state (name, deps, options, origin) lives in
//! [`TargetBase`].

mod artifact;
mod command;
mod kinds;
mod phony;
mod registry;
mod virtualenv;

pub use artifact::ArtifactTarget;
pub use command::CommandTarget;
pub use kinds::{Constructor, TargetDefinition, TargetKinds};
pub use phony::PhonyTarget;
pub use registry::TargetRegistry;
pub use virtualenv::VirtualenvTarget;

use crate::process::ProcessRunner;
use crate::template::{self, Options, Overrides};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Data a target's run hands to the targets that run after it.
pub type ResultMap = serde_json::Map<String, Value>;

/// The definition file a target was declared in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFile {
    /// Path of the definition file
    pub path: PathBuf,
    /// Directory containing the definition file
    pub dir: PathBuf,
    /// Root of the project the file belongs to
    pub project_root: PathBuf,
}

impl BuildFile {
    /// Describe a definition file at `path` inside `project_root`
    pub fn new(path: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            path,
            dir,
            project_root: project_root.into(),
        }
    }

    /// Path of the file relative to the project root, for display
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        self.path
            .strip_prefix(&self.project_root)
            .unwrap_or(&self.path)
    }
}

/// Services available to a target while it runs.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Runner for external commands
    pub runner: &'a ProcessRunner,
}

/// State shared by every target kind.
#[derive(Debug, Clone)]
pub struct TargetBase {
    name: String,
    deps: Vec<String>,
    options: Options,
    origin: Option<Arc<BuildFile>>,
}

impl TargetBase {
    /// Create a base with no options
    pub fn new(name: impl Into<String>, deps: Vec<String>) -> Self {
        Self::with_options(name, deps, Options::new())
    }

    /// Create a base carrying free-form options
    pub fn with_options(name: impl Into<String>, deps: Vec<String>, options: Options) -> Self {
        Self {
            name: name.into(),
            deps,
            options,
            origin: None,
        }
    }

    /// Target name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency names in declaration order
    #[must_use]
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    /// Free-form options, including kind-specific fields
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Mutable access to the options
    pub const fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// A string option, if present and a string
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// The definition file this target came from, once bound
    #[must_use]
    pub fn origin(&self) -> Option<&Arc<BuildFile>> {
        self.origin.as_ref()
    }

    /// Bind the origin unless one is already set. Returns whether it bound.
    pub fn set_origin(&mut self, origin: &Arc<BuildFile>) -> bool {
        if self.origin.is_some() {
            return false;
        }
        self.origin = Some(Arc::clone(origin));
        true
    }

    /// Directory relative paths in the options resolve against
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        self.origin
            .as_deref()
            .map_or_else(|| Path::new("."), |origin| origin.dir.as_path())
    }

    /// Resolve `path` against [`base_dir`](Self::base_dir) unless absolute
    #[must_use]
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Substitute placeholders in every option
    pub fn hydrate(&mut self, overrides: &Overrides) -> Result<()> {
        template::substitute(&mut self.options, overrides)
    }

    /// Fail unless `key` holds a non-empty string
    pub fn require_str(&self, kind: &str, key: &str) -> Result<()> {
        match self.options.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(()),
            Some(Value::String(_)) | None => Err(Error::configuration(format!(
                "{kind} target '{}' must contain a '{key}' key",
                self.name
            ))),
            Some(_) => Err(Error::configuration(format!(
                "{kind} target '{}': '{key}' must be a string",
                self.name
            ))),
        }
    }

    /// Fail unless `key` holds a table
    pub fn require_table(&self, kind: &str, key: &str) -> Result<&Options> {
        match self.options.get(key) {
            Some(Value::Object(table)) => Ok(table),
            None => Err(Error::configuration(format!(
                "{kind} target '{}' must contain a '{key}' key",
                self.name
            ))),
            Some(_) => Err(Error::configuration(format!(
                "{kind} target '{}': '{key}' must be a table",
                self.name
            ))),
        }
    }
}

/// A unit of work with dependencies and lifecycle hooks.
///
/// Only [`run`](Self::run) is mandatory. The default `check` and `cleanup`
/// do nothing; the default `hydrate` templates every option in the base.
pub trait Target: fmt::Debug + Send {
    /// Shared state
    fn base(&self) -> &TargetBase;

    /// Mutable shared state
    fn base_mut(&mut self) -> &mut TargetBase;

    /// Kind name as written in definition files
    fn kind(&self) -> &'static str;

    /// Target name
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Dependency names in declaration order
    fn deps(&self) -> &[String] {
        self.base().deps()
    }

    /// Precondition check, e.g. a required tool is installed.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Resolve placeholders in the configuration.
    fn hydrate(&mut self, overrides: &Overrides) -> Result<()> {
        self.base_mut().hydrate(overrides)
    }

    /// Do the work. `input` holds the results of everything run so far.
    fn run(&mut self, ctx: &RunContext<'_>, input: &ResultMap) -> Result<Option<ResultMap>>;

    /// Release resources acquired by `run`.
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Accept a string or a list of strings for `key`.
pub(crate) fn string_list(owner: &str, key: &str, value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    Error::configuration(format!(
                        "'{key}' of target '{owner}' must only contain strings"
                    ))
                })
            })
            .collect(),
        Some(_) => Err(Error::configuration(format!(
            "'{key}' of target '{owner}' must be a string or a list of strings"
        ))),
    }
}

/// Fail with a check error unless `program` is on `PATH`.
pub(crate) fn require_program(target: &str, program: &str) -> Result<()> {
    match which::which(program) {
        Ok(path) => {
            tracing::debug!(target_name = %target, program, path = %path.display(), "Found program");
            Ok(())
        }
        Err(_) => Err(Error::check_failed(
            target,
            format!("'{program}' is not installed or not on PATH"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_with(options: Value) -> TargetBase {
        let Value::Object(options) = options else {
            unreachable!("fixture is an object")
        };
        TargetBase::with_options("web", vec![], options)
    }

    #[test]
    fn test_origin_first_writer_wins() {
        let mut base = TargetBase::new("web", vec![]);
        let first = Arc::new(BuildFile::new("/repo/a/BUILD.toml", "/repo"));
        let second = Arc::new(BuildFile::new("/repo/b/BUILD.toml", "/repo"));

        assert!(base.set_origin(&first));
        assert!(!base.set_origin(&second));
        assert_eq!(base.origin().unwrap().dir, PathBuf::from("/repo/a"));
    }

    #[test]
    fn test_resolve_path_against_origin() {
        let mut base = TargetBase::new("web", vec![]);
        assert_eq!(base.resolve_path("x"), PathBuf::from("./x"));

        base.set_origin(&Arc::new(BuildFile::new("/repo/web/BUILD.toml", "/repo")));
        assert_eq!(base.resolve_path("dist"), PathBuf::from("/repo/web/dist"));
        assert_eq!(base.resolve_path("/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_relative_path() {
        let file = BuildFile::new("/repo/web/BUILD.toml", "/repo");
        assert_eq!(file.relative_path(), Path::new("web/BUILD.toml"));
    }

    #[test]
    fn test_require_str() {
        let base = base_with(json!({"command": "make", "empty": "", "n": 1}));
        assert!(base.require_str("command", "command").is_ok());

        let err = base.require_str("command", "missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: command target 'web' must contain a 'missing' key"
        );
        assert!(base.require_str("command", "empty").is_err());
        assert!(base.require_str("command", "n").is_err());
    }

    #[test]
    fn test_string_list_forms() {
        assert_eq!(string_list("t", "deps", None).unwrap(), Vec::<String>::new());
        assert_eq!(string_list("t", "deps", Some(&json!("a"))).unwrap(), vec!["a"]);
        assert_eq!(
            string_list("t", "deps", Some(&json!(["a", "b"]))).unwrap(),
            vec!["a", "b"]
        );
        assert!(string_list("t", "deps", Some(&json!([1]))).is_err());
        assert!(string_list("t", "deps", Some(&json!({"a": 1}))).is_err());
    }

    #[test]
    fn test_hydrate_templates_options() {
        let mut base = base_with(json!({"command": "deploy {{env}}"}));
        let overrides: Overrides = [("env", "prod")].into_iter().collect();
        base.hydrate(&overrides).unwrap();
        assert_eq!(base.option_str("command"), Some("deploy prod"));
    }
}
