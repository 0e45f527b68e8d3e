use super::virtualenv::DIR_MAPPINGS_KEY;
use super::{ResultMap, RunContext, Target, TargetBase, require_program, string_list};
use crate::template::Options;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REQUIRED_FPM_OPTIONS: &[&str] = &["deb-user", "deb-group", "maintainer"];

/// Packages files into a Debian package with `fpm`.
#[derive(Debug, Clone)]
pub struct ArtifactTarget {
    base: TargetBase,
}

/// The `artifact` table once hydrated.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Package {
    target_directory: String,
    fpm_options: Vec<(String, String)>,
}

impl ArtifactTarget {
    /// Kind name in definition files
    pub const KIND: &'static str = "artifact";

    /// Validate and wrap a base
    pub fn new(base: TargetBase) -> Result<Self> {
        let target = Self { base };
        if target.files()?.is_empty() {
            return Err(target.invalid("must contain a 'files' key"));
        }
        target.exclude_files()?;
        target.package()?;
        Ok(target)
    }

    fn invalid(&self, message: &str) -> Error {
        Error::configuration(format!(
            "{} target '{}' {message}",
            Self::KIND,
            self.base.name()
        ))
    }

    fn files(&self) -> Result<Vec<String>> {
        string_list(self.base.name(), "files", self.base.options().get("files"))
    }

    fn exclude_files(&self) -> Result<Vec<String>> {
        string_list(
            self.base.name(),
            "exclude_files",
            self.base.options().get("exclude_files"),
        )
    }

    fn package(&self) -> Result<Package> {
        let artifact = self.base.require_table(Self::KIND, "artifact")?;

        match artifact.get("type").and_then(Value::as_str) {
            Some("deb") => {}
            Some(other) => {
                return Err(self.invalid(&format!(
                    "has unsupported artifact type '{other}' (only 'deb' is supported)"
                )));
            }
            None => return Err(self.invalid("must contain an 'artifact.type' key")),
        }

        let target_directory = match artifact.get("target_directory").and_then(Value::as_str) {
            Some(dir) if !dir.is_empty() => dir.to_string(),
            _ => return Err(self.invalid("must contain an 'artifact.target_directory' key")),
        };

        let Some(Value::Object(fpm)) = artifact.get("fpm_options") else {
            return Err(self.invalid("must contain an 'artifact.fpm_options' table"));
        };
        for key in REQUIRED_FPM_OPTIONS {
            if !fpm.contains_key(*key) {
                return Err(self.invalid(&format!("is missing fpm option '{key}'")));
            }
        }

        Ok(Package {
            target_directory,
            fpm_options: fpm_options(fpm),
        })
    }

    /// Expand the file globs against the definition directory and subtract
    /// the exclusions. Paths are relative to that directory.
    pub fn sources(&self) -> Result<BTreeSet<PathBuf>> {
        let base = self.base.base_dir();
        let included = expand(base, &self.files()?)?;
        let excluded = expand(base, &self.exclude_files()?)?;
        Ok(included.difference(&excluded).cloned().collect())
    }

    /// Turn `src=dst` mappings from earlier results into fpm directory
    /// arguments, placing relative destinations under the target directory.
    pub fn dir_mappings(&self, input: &ResultMap) -> Result<Vec<String>> {
        let package = self.package()?;
        let mappings = string_list(self.base.name(), DIR_MAPPINGS_KEY, input.get(DIR_MAPPINGS_KEY))?;

        mappings
            .iter()
            .map(|mapping| {
                let Some((source, dest)) = mapping.split_once('=') else {
                    return Err(self.invalid(&format!(
                        "received malformed directory mapping '{mapping}'"
                    )));
                };
                let dest = Path::new(&package.target_directory).join(dest);
                Ok(format!("{source}/={}", dest.display()))
            })
            .collect()
    }

    /// The full `fpm` command line
    pub fn fpm_command(&self, input: &ResultMap) -> Result<String> {
        let package = self.package()?;
        let sources = self.sources()?;
        if sources.is_empty() {
            return Err(self.invalid("matched no files"));
        }

        let base = self.base.base_dir();
        let mut args = vec!["fpm".to_string(), "-t".to_string(), "deb".to_string()];
        args.extend(package.fpm_options.iter().map(|(k, v)| format!("--{k}={v}")));
        args.extend(["-n".to_string(), self.base.name().to_string()]);
        args.extend(["-s".to_string(), "dir".to_string()]);
        args.extend(self.dir_mappings(input)?);
        args.extend(sources.iter().map(|rel| {
            format!(
                "{}={}",
                base.join(rel).display(),
                Path::new(&package.target_directory).join(rel).display()
            )
        }));
        Ok(args.join(" "))
    }
}

impl Target for ArtifactTarget {
    fn base(&self) -> &TargetBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TargetBase {
        &mut self.base
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn check(&self) -> Result<()> {
        require_program(self.base.name(), "fpm").inspect_err(|_| {
            warn!(
                target_name = %self.base.name(),
                "fpm installation instructions at https://fpm.readthedocs.io/en/latest/installation.html"
            );
        })
    }

    fn run(&mut self, ctx: &RunContext<'_>, input: &ResultMap) -> Result<Option<ResultMap>> {
        let command = self.fpm_command(input)?;
        debug!(target_name = %self.base.name(), command = %command, "Packaging");

        let status = ctx.runner.run(&command, Some(self.base.base_dir()))?;
        if !status.success() {
            return Err(Error::command_failed(self.base.name(), "fpm", status.code()));
        }
        info!(target_name = %self.base.name(), "Bundling complete");
        Ok(None)
    }
}

fn fpm_options(table: &Options) -> Vec<(String, String)> {
    table
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn expand(base: &Path, patterns: &[String]) -> Result<BTreeSet<PathBuf>> {
    let escaped = glob::Pattern::escape(&base.to_string_lossy());
    let mut paths = BTreeSet::new();

    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            format!("{escaped}/{pattern}")
        };
        let entries = glob::glob(&full).map_err(|e| {
            Error::configuration(format!("Invalid file pattern '{pattern}': {e}"))
        })?;
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                Error::io(e.into_error(), Some(path), "expand file pattern")
            })?;
            let rel = path.strip_prefix(base).map_or_else(|_| path.clone(), Path::to_path_buf);
            paths.insert(rel);
        }
    }

    Ok(paths)
}
