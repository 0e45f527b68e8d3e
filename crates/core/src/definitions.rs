//! Discovery and loading of definition files.
//!
//! Definition files are TOML documents holding `[[target]]` tables:
//!
//! ```toml
//! [[target]]
//! kind = "command"
//! name = "web"
//! deps = ["assets"]
//! command = "npm run build -- --env={{env}}"
//! env = "staging"
//! ```

use crate::config::Project;
use crate::targets::{BuildFile, TargetDefinition, TargetKinds, TargetRegistry};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default)]
    target: Vec<toml::Table>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

/// Every definition file under the project root, in sorted path order.
///
/// Hidden directories and directories named in `ignore_paths` are skipped.
pub fn discover_build_files(project: &Project) -> Result<Vec<PathBuf>> {
    let config = &project.config;
    let walker = WalkDir::new(&project.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !(is_hidden(entry)
                    || entry.file_name().to_str().is_some_and(|name| config.is_ignored(name)))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf);
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            Error::io(source, path, "walk project tree")
        })?;
        if entry.file_type().is_file() && entry.file_name() == config.build_file.as_str() {
            debug!(path = %entry.path().display(), "Found build file");
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Parse one definition file into target definitions
pub fn parse_file(path: &Path) -> Result<Vec<TargetDefinition>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::io(e, Some(path.to_path_buf()), "read build file"))?;
    parse_str(path, &text)
}

/// Parse definition text; `path` is only used in errors
pub fn parse_str(path: &Path, text: &str) -> Result<Vec<TargetDefinition>> {
    let file: DefinitionFile = toml::from_str(text).map_err(|e| Error::parse(path, e.to_string()))?;
    file.target
        .into_iter()
        .map(|table| {
            TargetDefinition::from_table(table).map_err(|e| match e {
                Error::Configuration { message } => Error::parse(path, message),
                other => other,
            })
        })
        .collect()
}

/// Register every target declared in `path` and bind them to it.
///
/// Returns the number of targets the file declared.
pub fn load_file(
    registry: &mut TargetRegistry,
    kinds: &TargetKinds,
    path: &Path,
    project_root: &Path,
) -> Result<usize> {
    let definitions = parse_file(path)?;
    let count = definitions.len();

    for definition in definitions {
        registry.register(kinds.build(definition)?)?;
    }

    registry.bind_origin(&Arc::new(BuildFile::new(path, project_root)));
    debug!(path = %path.display(), count, "Loaded build file");
    Ok(count)
}

/// Discover and load every definition file of a project.
pub fn load_project(project: &Project, kinds: &TargetKinds) -> Result<TargetRegistry> {
    let files = discover_build_files(project)?;
    if files.is_empty() {
        return Err(Error::NoBuildFiles {
            root: project.root.clone().into_boxed_path(),
            file_name: project.config.build_file.clone(),
        });
    }

    let mut registry = TargetRegistry::new();
    for file in &files {
        load_file(&mut registry, kinds, file, &project.root)?;
    }

    if registry.is_empty() {
        return Err(Error::NoTargets {
            root: project.root.clone().into_boxed_path(),
        });
    }

    info!(
        files = files.len(),
        targets = registry.len(),
        root = %project.root.display(),
        "Loaded project"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_str() {
        let defs = parse_str(
            Path::new("BUILD.toml"),
            r#"
            [[target]]
            kind = "command"
            name = "web"
            command = "make"

            [[target]]
            kind = "phony"
            name = "all"
            deps = "web"
            "#,
        )
        .unwrap();

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].deps, vec!["web"]);
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let err = parse_str(Path::new("web/BUILD.toml"), "[[target]]\nkind = \"phony\"").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("web/BUILD.toml"));

        let err = parse_str(Path::new("BUILD.toml"), "[[target]\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        let err = parse_str(Path::new("BUILD.toml"), "targets = []").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_empty_file_has_no_targets() {
        assert!(parse_str(Path::new("BUILD.toml"), "").unwrap().is_empty());
    }
}
