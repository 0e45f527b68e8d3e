use super::{ResultMap, RunContext, Target, TargetBase};
use crate::{Error, Result};

/// Groups dependencies under one name. Running it does nothing itself.
#[derive(Debug, Clone)]
pub struct PhonyTarget {
    base: TargetBase,
}

impl PhonyTarget {
    /// Kind name in definition files
    pub const KIND: &'static str = "phony";

    /// Validate and wrap a base
    pub fn new(base: TargetBase) -> Result<Self> {
        if base.deps().is_empty() {
            return Err(Error::configuration(format!(
                "phony target '{}' without deps does nothing",
                base.name()
            )));
        }
        Ok(Self { base })
    }
}

impl Target for PhonyTarget {
    fn base(&self) -> &TargetBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TargetBase {
        &mut self.base
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn run(&mut self, _ctx: &RunContext<'_>, _input: &ResultMap) -> Result<Option<ResultMap>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_deps() {
        let err = PhonyTarget::new(TargetBase::new("all", vec![])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: phony target 'all' without deps does nothing"
        );
        assert!(PhonyTarget::new(TargetBase::new("all", vec!["web".into()])).is_ok());
    }
}
