use super::{ResultMap, RunContext, Target, TargetBase};
use crate::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;

/// Runs one external command.
///
/// `command` is required; `directory` defaults to the definition file's
/// directory and is resolved relative to it. Both are templated.
#[derive(Debug, Clone)]
pub struct CommandTarget {
    base: TargetBase,
}

impl CommandTarget {
    /// Kind name in definition files
    pub const KIND: &'static str = "command";

    /// Validate and wrap a base
    pub fn new(base: TargetBase) -> Result<Self> {
        base.require_str(Self::KIND, "command")?;
        if let Some(directory) = base.options().get("directory")
            && !directory.is_string()
        {
            return Err(Error::configuration(format!(
                "command target '{}': 'directory' must be a string",
                base.name()
            )));
        }
        Ok(Self { base })
    }

    /// The command line as currently configured
    #[must_use]
    pub fn command(&self) -> &str {
        self.base.option_str("command").unwrap_or_default()
    }

    /// The directory the command runs in, if any
    #[must_use]
    pub fn directory(&self) -> Option<PathBuf> {
        match self.base.options().get("directory").and_then(Value::as_str) {
            Some(directory) => Some(self.base.resolve_path(directory)),
            None => self.base.origin().map(|origin| origin.dir.clone()),
        }
    }
}

impl Target for CommandTarget {
    fn base(&self) -> &TargetBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TargetBase {
        &mut self.base
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn run(&mut self, ctx: &RunContext<'_>, _input: &ResultMap) -> Result<Option<ResultMap>> {
        let command = self.command();
        let status = ctx.runner.run(command, self.directory().as_deref())?;
        if !status.success() {
            return Err(Error::command_failed(self.name(), command, status.code()));
        }
        Ok(None)
    }
}
