//! Declarative target definitions and the kind constructor table.

use super::{
    ArtifactTarget, CommandTarget, PhonyTarget, Target, TargetBase, VirtualenvTarget, string_list,
};
use crate::template::Options;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde_json::Value;

/// A parsed `[[target]]` table before it is turned into a [`Target`].
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDefinition {
    /// Kind name selecting the constructor
    pub kind: String,
    /// Unique target name
    pub name: String,
    /// Dependency names in declaration order
    pub deps: Vec<String>,
    /// Every remaining key
    pub options: Options,
}

impl TargetDefinition {
    /// Build a definition from a TOML table
    pub fn from_table(table: toml::Table) -> Result<Self> {
        match serde_json::to_value(table) {
            Ok(Value::Object(options)) => Self::from_options(options),
            Ok(_) => Err(Error::configuration("Target definition must be a table")),
            Err(e) => Err(Error::configuration(format!(
                "Target definition cannot be represented: {e}"
            ))),
        }
    }

    /// Split the reserved keys (`kind`, `name`, `deps`) out of an option table
    pub fn from_options(mut options: Options) -> Result<Self> {
        let name = match options.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            Some(_) => return Err(Error::configuration("Target 'name' must be a non-empty string")),
            None => return Err(Error::configuration("Target definition is missing a 'name' key")),
        };

        let kind = match options.remove("kind") {
            Some(Value::String(kind)) => kind,
            Some(_) => {
                return Err(Error::configuration(format!(
                    "Target '{name}': 'kind' must be a string"
                )));
            }
            None => {
                return Err(Error::configuration(format!(
                    "Target '{name}' is missing a 'kind' key"
                )));
            }
        };

        let deps = string_list(&name, "deps", options.remove("deps").as_ref())?;

        Ok(Self {
            kind,
            name,
            deps,
            options,
        })
    }

    /// Shared target state for this definition
    #[must_use]
    pub fn into_base(self) -> TargetBase {
        TargetBase::with_options(self.name, self.deps, self.options)
    }
}

/// Builds a target of one kind, validating its configuration.
pub type Constructor = fn(TargetBase) -> Result<Box<dyn Target>>;

/// Constructor table keyed by kind name.
#[derive(Debug, Clone)]
pub struct TargetKinds {
    constructors: IndexMap<String, Constructor>,
}

impl Default for TargetKinds {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TargetKinds {
    /// A table with no kinds at all
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }

    /// A table with the built-in kinds
    #[must_use]
    pub fn builtin() -> Self {
        let mut kinds = Self::empty();
        kinds.register(CommandTarget::KIND, |base| {
            Ok(Box::new(CommandTarget::new(base)?))
        });
        kinds.register(PhonyTarget::KIND, |base| Ok(Box::new(PhonyTarget::new(base)?)));
        kinds.register(VirtualenvTarget::KIND, |base| {
            Ok(Box::new(VirtualenvTarget::new(base)?))
        });
        kinds.register(ArtifactTarget::KIND, |base| {
            Ok(Box::new(ArtifactTarget::new(base)?))
        });
        kinds
    }

    /// Add or replace the constructor for `kind`
    pub fn register(&mut self, kind: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    /// Registered kind names
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the target a definition describes
    pub fn build(&self, definition: TargetDefinition) -> Result<Box<dyn Target>> {
        let Some(constructor) = self.constructors.get(&definition.kind) else {
            return Err(Error::configuration(format!(
                "Target '{}' has unknown kind '{}' (known kinds: {})",
                definition.name,
                definition.kind,
                self.kinds().collect::<Vec<_>>().join(", ")
            )));
        };
        constructor(definition.into_base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(source: &str) -> toml::Table {
        source.parse().unwrap()
    }

    #[test]
    fn test_definition_splits_reserved_keys() {
        let def = TargetDefinition::from_table(table(
            r#"
            kind = "command"
            name = "web"
            deps = ["assets", "lint"]
            command = "npm run build"
            retries = 2
            "#,
        ))
        .unwrap();

        assert_eq!(def.kind, "command");
        assert_eq!(def.name, "web");
        assert_eq!(def.deps, vec!["assets", "lint"]);
        assert_eq!(def.options.len(), 2);
        assert_eq!(def.options["retries"], 2);
    }

    #[test]
    fn test_single_dep_string() {
        let def = TargetDefinition::from_table(table(
            r#"
            kind = "phony"
            name = "all"
            deps = "web"
            "#,
        ))
        .unwrap();
        assert_eq!(def.deps, vec!["web"]);
    }

    #[test]
    fn test_missing_name_and_kind() {
        let err = TargetDefinition::from_table(table(r#"kind = "phony""#)).unwrap_err();
        assert!(err.to_string().contains("missing a 'name'"));

        let err = TargetDefinition::from_table(table(r#"name = "x""#)).unwrap_err();
        assert!(err.to_string().contains("missing a 'kind'"));
    }

    #[test]
    fn test_unknown_kind() {
        let def = TargetDefinition::from_table(table(
            r#"
            kind = "rocket"
            name = "x"
            "#,
        ))
        .unwrap();

        let err = TargetKinds::builtin().build(def).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("unknown kind 'rocket'"));
        assert!(err.to_string().contains("command, phony, virtualenv, artifact"));
    }

    #[test]
    fn test_builtin_build() {
        let def = TargetDefinition::from_table(table(
            r#"
            kind = "command"
            name = "web"
            command = "make"
            "#,
        ))
        .unwrap();

        let target = TargetKinds::default().build(def).unwrap();
        assert_eq!(target.kind(), "command");
        assert_eq!(target.name(), "web");
    }

    #[test]
    fn test_custom_kind() {
        let mut kinds = TargetKinds::empty();
        kinds.register("alias", |base| Ok(Box::new(PhonyTarget::new(base)?)));

        let def = TargetDefinition::from_table(table(
            r#"
            kind = "alias"
            name = "all"
            deps = ["a"]
            "#,
        ))
        .unwrap();
        assert_eq!(kinds.build(def).unwrap().kind(), "phony");
    }
}
