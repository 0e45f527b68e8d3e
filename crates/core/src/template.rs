//! `{{name}}` placeholder substitution for target configuration.
//!
//! Targets carry free-form options that may reference values supplied on
//! the command line. Hydrating a target resolves every placeholder in those
//! options, recursing into nested tables and lists, against an
//! [`Overrides`] mapping. Substitution is pure: it never touches the
//! filesystem or spawns processes.

use crate::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Free-form option table attached to a target.
pub type Options = Map<String, Value>;

/// Keys the CLI layer uses for its own bookkeeping; never treated as overrides.
pub const CONTROL_KEYS: &[&str] = &["target", "args"];

/// Upper bound on substitutions performed for a single value.
pub const MAX_SUBSTITUTIONS: usize = 1024;

#[allow(clippy::expect_used)] // static pattern
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// Values available to `{{name}}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: BTreeMap<String, String>,
}

impl Overrides {
    /// Create an empty override mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Set a value only when the name is not already present
    pub fn insert_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_insert_with(|| value.into());
    }

    /// Look up a value by placeholder name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether a placeholder name has a value
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the mapping is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop the CLI control keys from the mapping
    #[must_use]
    pub fn without_control_keys(mut self) -> Self {
        self.values.retain(|key, _| !CONTROL_KEYS.contains(&key.as_str()));
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut overrides = Self::new();
        overrides.extend(iter);
        overrides
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Overrides {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

/// Resolve every placeholder in `options`, in place.
///
/// Tables recurse, lists are scanned element by element, strings are
/// rendered with [`render`]. Numbers, booleans and nulls are left alone.
pub fn substitute(options: &mut Options, overrides: &Overrides) -> Result<()> {
    for (key, value) in options.iter_mut() {
        substitute_value(key, value, overrides)?;
    }
    Ok(())
}

fn substitute_value(key: &str, value: &mut Value, overrides: &Overrides) -> Result<()> {
    match value {
        Value::Object(table) => substitute(table, overrides),
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| substitute_value(key, item, overrides)),
        Value::String(text) => {
            if PLACEHOLDER.is_match(text) {
                *text = render(key, text, overrides)?;
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
    }
}

/// Render a single string value.
///
/// The first `{{name}}` occurrence is replaced and the scan restarts from
/// the beginning, so a value spliced in may itself contain placeholders.
/// `key` only names the value in error messages.
pub fn render(key: &str, template: &str, overrides: &Overrides) -> Result<String> {
    let mut rendered = template.to_string();
    let mut substitutions = 0;

    loop {
        let (range, name) = {
            let Some(captures) = PLACEHOLDER.captures(&rendered) else {
                break;
            };
            match (captures.get(0), captures.get(1)) {
                (Some(whole), Some(name)) => (whole.range(), name.as_str().to_string()),
                _ => break,
            }
        };

        let Some(replacement) = overrides.get(&name) else {
            return Err(Error::missing_template_value(name));
        };

        substitutions += 1;
        if substitutions > MAX_SUBSTITUTIONS {
            return Err(Error::TemplateRecursion {
                key: key.to_string(),
                limit: MAX_SUBSTITUTIONS,
            });
        }

        rendered.replace_range(range, replacement);
    }

    Ok(rendered)
}

/// Whether a string contains at least one placeholder
#[must_use]
pub fn has_placeholder(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}
