//! Project discovery and `.kiln.toml` configuration.

use crate::executor::Revisit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the optional project configuration file.
pub const CONFIG_FILE_NAME: &str = ".kiln.toml";

/// Default definition file name.
pub const DEFAULT_BUILD_FILE: &str = "BUILD.toml";

fn default_build_file() -> String {
    DEFAULT_BUILD_FILE.to_string()
}

/// Settings read from `.kiln.toml` at the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Definition file name searched for during discovery
    #[serde(default = "default_build_file")]
    pub build_file: String,

    /// Directory names never descended into
    #[serde(default)]
    pub ignore_paths: Vec<String>,

    /// Policy for targets reachable through several dependents
    #[serde(default)]
    pub revisit: Revisit,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            build_file: default_build_file(),
            ignore_paths: Vec::new(),
            revisit: Revisit::default(),
        }
    }
}

impl ProjectConfig {
    /// Parse configuration text; `path` is only used in errors
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::parse(path, e.to_string()))?;
        if config.build_file.is_empty() || config.build_file.contains(['/', '\\']) {
            return Err(Error::configuration(format!(
                "build_file must be a plain file name, got '{}'",
                config.build_file
            )));
        }
        Ok(config)
    }

    /// Load `.kiln.toml` from `root`, falling back to defaults when absent
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "Loading project configuration");
                Self::parse(&path, &text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io(e, Some(path), "read project configuration")),
        }
    }

    /// Whether a directory name is excluded from discovery
    #[must_use]
    pub fn is_ignored(&self, dir_name: &str) -> bool {
        self.ignore_paths.iter().any(|ignored| ignored == dir_name)
    }
}

/// A located project: its root and configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Project root directory
    pub root: PathBuf,
    /// Configuration from `.kiln.toml`, or defaults
    pub config: ProjectConfig,
}

impl Project {
    /// Find the project containing `start` and load its configuration
    pub fn discover(start: &Path) -> Result<Self> {
        let root = find_project_root(start)?;
        Self::load(root)
    }

    /// Load the project rooted at `root`
    pub fn load(root: PathBuf) -> Result<Self> {
        let config = ProjectConfig::load(&root)?;
        Ok(Self { root, config })
    }

    /// Whether the root is a git checkout
    #[must_use]
    pub fn is_git_checkout(&self) -> bool {
        self.root.join(".git").exists()
    }
}

/// Nearest ancestor of `start` (inclusive) holding `.git` or `.kiln.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let start = std::fs::canonicalize(start)
        .map_err(|e| Error::io(e, Some(start.to_path_buf()), "resolve working directory"))?;

    start
        .ancestors()
        .find(|dir| dir.join(".git").exists() || dir.join(CONFIG_FILE_NAME).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::NoProjectRoot {
            start: start.clone().into_boxed_path(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::parse(Path::new(".kiln.toml"), "").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.build_file, "BUILD.toml");
        assert_eq!(config.revisit, Revisit::Rerun);
    }

    #[test]
    fn test_full_config() {
        let config = ProjectConfig::parse(
            Path::new(".kiln.toml"),
            r#"
            build_file = "KILN"
            ignore_paths = ["node_modules", "target"]
            revisit = "once"
            "#,
        )
        .unwrap();
        assert_eq!(config.build_file, "KILN");
        assert!(config.is_ignored("node_modules"));
        assert!(!config.is_ignored("src"));
        assert_eq!(config.revisit, Revisit::Once);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = ProjectConfig::parse(Path::new(".kiln.toml"), "buildfile = \"X\"").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_build_file_must_be_a_name() {
        let err = ProjectConfig::parse(Path::new(".kiln.toml"), "build_file = \"a/BUILD\"")
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_find_root_by_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();

        let root = find_project_root(&dir.path().join("a/b")).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_find_root_by_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("outer/inner")).unwrap();
        fs::write(dir.path().join("outer/.kiln.toml"), "revisit = \"once\"").unwrap();

        let project = Project::discover(&dir.path().join("outer/inner")).unwrap();
        assert_eq!(project.root, fs::canonicalize(dir.path().join("outer")).unwrap());
        assert_eq!(project.config.revisit, Revisit::Once);
        assert!(!project.is_git_checkout());
    }
}
