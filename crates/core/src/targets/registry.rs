//! Name-keyed target registry.

use super::{BuildFile, Target};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// All targets known to one invocation, keyed by unique name.
///
/// Iteration follows registration order. There is no removal.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: IndexMap<String, Box<dyn Target>>,
}

impl TargetRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target. Fails if the name is already taken.
    pub fn register(&mut self, target: Box<dyn Target>) -> Result<()> {
        let name = target.name().to_string();
        if self.targets.contains_key(&name) {
            return Err(Error::duplicate_target(name));
        }
        debug!(target_name = %name, kind = target.kind(), "Registered target");
        self.targets.insert(name, target);
        Ok(())
    }

    /// Look up a target by name
    pub fn get(&self, name: &str) -> Result<&dyn Target> {
        self.targets
            .get(name)
            .map(|target| &**target)
            .ok_or_else(|| Error::unknown_target(name))
    }

    /// Look up a target by name for mutation
    pub fn get_mut(&mut self, name: &str) -> Result<&mut (dyn Target + 'static)> {
        self.targets
            .get_mut(name)
            .map(|target| &mut **target)
            .ok_or_else(|| Error::unknown_target(name))
    }

    /// Whether a name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Number of targets
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no target is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Target> {
        self.targets.values().map(|target| &**target)
    }

    /// Names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Bind `origin` to every target that has none yet.
    ///
    /// Called after each definition file loads, so targets keep the file
    /// that first declared them. Returns how many targets were bound.
    pub fn bind_origin(&mut self, origin: &Arc<BuildFile>) -> usize {
        let mut bound = 0;
        for target in self.targets.values_mut() {
            if target.base_mut().set_origin(origin) {
                bound += 1;
            }
        }
        debug!(file = %origin.path.display(), bound, "Bound targets to build file");
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::{PhonyTarget, ResultMap, RunContext, TargetBase};

    #[derive(Debug)]
    struct Noop(TargetBase);

    impl Target for Noop {
        fn base(&self) -> &TargetBase {
            &self.0
        }
        fn base_mut(&mut self) -> &mut TargetBase {
            &mut self.0
        }
        fn kind(&self) -> &'static str {
            "noop"
        }
        fn run(&mut self, _: &RunContext<'_>, _: &ResultMap) -> Result<Option<ResultMap>> {
            Ok(None)
        }
    }

    fn noop(name: &str) -> Box<dyn Target> {
        Box::new(Noop(TargetBase::new(name, vec![])))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = TargetRegistry::new();
        registry.register(noop("a")).unwrap();

        assert_eq!(registry.get("a").unwrap().name(), "a");
        assert!(registry.contains("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = TargetRegistry::new();
        registry.register(noop("a")).unwrap();

        let err = registry.register(noop("a")).unwrap_err();
        assert!(matches!(err, Error::DuplicateTarget { ref name } if name == "a"));
        assert_eq!(err.to_string(), "Target 'a' defined more than once");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_target() {
        let registry = TargetRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(Error::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut registry = TargetRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(noop(name)).unwrap();
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), ["c", "a", "b"]);
    }

    #[test]
    fn test_bind_origin_only_unset() {
        let mut registry = TargetRegistry::new();
        registry.register(noop("a")).unwrap();

        let first = Arc::new(BuildFile::new("/repo/one/BUILD.toml", "/repo"));
        assert_eq!(registry.bind_origin(&first), 1);

        registry
            .register(Box::new(
                PhonyTarget::new(TargetBase::new("b", vec!["a".into()])).unwrap(),
            ))
            .unwrap();
        let second = Arc::new(BuildFile::new("/repo/two/BUILD.toml", "/repo"));
        assert_eq!(registry.bind_origin(&second), 1);

        let origin_of = |name: &str| registry.get(name).unwrap().base().origin().unwrap().path.clone();
        assert_eq!(origin_of("a"), first.path);
        assert_eq!(origin_of("b"), second.path);
    }
}
