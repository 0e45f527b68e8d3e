use super::{ResultMap, RunContext, Target, TargetBase, require_program};
use crate::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result key artifact targets read directory mappings from.
pub const DIR_MAPPINGS_KEY: &str = "artifact_target_dir_mappings";

/// Builds a Python virtual environment in a scratch directory.
///
/// The environment is handed to later targets as a directory mapping onto
/// `target_directory`. Every scratch directory is removed during cleanup.
#[derive(Debug)]
pub struct VirtualenvTarget {
    base: TargetBase,
    tempdirs: Vec<PathBuf>,
}

impl VirtualenvTarget {
    /// Kind name in definition files
    pub const KIND: &'static str = "virtualenv";

    /// Validate and wrap a base
    pub fn new(base: TargetBase) -> Result<Self> {
        base.require_str(Self::KIND, "requirements")?;
        base.require_str(Self::KIND, "target_directory")?;
        Ok(Self {
            base,
            tempdirs: Vec::new(),
        })
    }

    /// Scratch directories created so far and not yet removed
    #[must_use]
    pub fn tempdirs(&self) -> &[PathBuf] {
        &self.tempdirs
    }

    fn requirements(&self) -> PathBuf {
        self.base
            .resolve_path(self.base.option_str("requirements").unwrap_or_default())
    }

    fn target_directory(&self) -> &str {
        self.base.option_str("target_directory").unwrap_or_default()
    }

    fn make_tempdir(&mut self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("kiln-{}-", self.base.name()))
            .tempdir()
            .map_err(|e| Error::io(e, None, "create virtualenv directory"))?
            .keep();
        debug!(target_name = %self.base.name(), dir = %dir.display(), "Created virtualenv directory");
        self.tempdirs.push(dir.clone());
        Ok(dir)
    }

    fn step(&self, ctx: &RunContext<'_>, command: &str) -> Result<()> {
        let status = ctx.runner.run(command, Some(self.base.base_dir()))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::command_failed(self.base.name(), command, status.code()))
        }
    }
}

impl Target for VirtualenvTarget {
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
        require_program(self.base.name(), "python")
    }

    fn run(&mut self, ctx: &RunContext<'_>, _input: &ResultMap) -> Result<Option<ResultMap>> {
        let dir = self.make_tempdir()?;
        info!(target_name = %self.base.name(), dir = %dir.display(), "Building virtualenv");

        self.step(ctx, &format!("python -m virtualenv {}", dir.display()))?;
        self.step(
            ctx,
            &format!(
                "{} install -r {}",
                dir.join("bin").join("pip").display(),
                self.requirements().display()
            ),
        )?;

        let mut result = ResultMap::new();
        result.insert(
            DIR_MAPPINGS_KEY.to_string(),
            Value::String(format!("{}={}", dir.display(), self.target_directory())),
        );
        Ok(Some(result))
    }

    fn cleanup(&mut self) -> Result<()> {
        while let Some(dir) = self.tempdirs.pop() {
            remove_dir(&dir)?;
        }
        Ok(())
    }
}

fn remove_dir(dir: &Path) -> Result<()> {
    debug!(dir = %dir.display(), "Removing virtualenv directory");
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(e, Some(dir.to_path_buf()), "remove virtualenv directory")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(options: Value) -> Result<VirtualenvTarget> {
        let Value::Object(options) = options else {
            unreachable!("fixture is an object")
        };
        VirtualenvTarget::new(TargetBase::with_options("api", vec![], options))
    }

    #[test]
    fn test_requires_keys() {
        let err = target(json!({"target_directory": "/opt/api"})).unwrap_err();
        assert!(err.to_string().contains("'requirements'"));

        let err = target(json!({"requirements": "requirements.txt"})).unwrap_err();
        assert!(err.to_string().contains("'target_directory'"));
    }

    #[test]
    fn test_cleanup_removes_tempdirs() {
        let mut venv = target(json!({
            "requirements": "requirements.txt",
            "target_directory": "/opt/api/venv",
        }))
        .unwrap();

        let dir = venv.make_tempdir().unwrap();
        assert!(dir.is_dir());
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("kiln-api-")
        );

        venv.cleanup().unwrap();
        assert!(!dir.exists());
        assert!(venv.tempdirs().is_empty());

        // nothing left to remove
        venv.cleanup().unwrap();
    }
}
