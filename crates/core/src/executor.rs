//! Dependency-ordered lifecycle driver.
//!
//! Executing a target is three sweeps over its dependency tree:
//!
//! 1. **check**: every dependency before its dependent; any failure aborts
//!    before anything runs. Unknown dependencies and cycles surface here.
//! 2. **run**: depth-first in declaration order. Each dependency is
//!    hydrated by its parent, recursed into, and its result merged into
//!    the accumulated input before the next one starts.
//! 3. **cleanup**: dependencies first, once per distinct target, whether
//!    or not the run sweep succeeded.

use crate::process::ProcessRunner;
use crate::targets::{ResultMap, RunContext, TargetRegistry};
use crate::template::Overrides;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// What to do when a target is reached again through another dependent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revisit {
    /// Run it again each time it is reached
    #[default]
    Rerun,
    /// Run it the first time only
    Once,
}

impl fmt::Display for Revisit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rerun => write!(f, "rerun"),
            Self::Once => write!(f, "once"),
        }
    }
}

/// The targets currently being walked, outermost first.
#[derive(Debug, Default)]
struct WalkPath {
    names: Vec<String>,
}

impl WalkPath {
    fn enter(&mut self, name: &str) -> Result<()> {
        if self.names.iter().any(|n| n == name) {
            let mut path = self.names.clone();
            path.push(name.to_string());
            return Err(Error::CycleDetected { path });
        }
        self.names.push(name.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.names.pop();
    }
}

/// Resolve the dependencies of `name`, failing on unregistered ones.
fn deps_of(registry: &TargetRegistry, name: &str) -> Result<Vec<String>> {
    let deps = registry.get(name)?.deps().to_vec();
    if let Some(missing) = deps.iter().find(|dep| !registry.contains(dep)) {
        return Err(Error::MissingDependency {
            target: name.to_string(),
            dependency: missing.clone(),
        });
    }
    Ok(deps)
}

/// Drives one invocation against a registry.
#[derive(Debug)]
pub struct Executor<'a> {
    registry: &'a mut TargetRegistry,
    runner: &'a ProcessRunner,
    overrides: &'a Overrides,
    revisit: Revisit,
    checked: HashSet<String>,
    ran: HashSet<String>,
}

impl<'a> Executor<'a> {
    /// Create an executor with the default revisit policy
    pub fn new(
        registry: &'a mut TargetRegistry,
        runner: &'a ProcessRunner,
        overrides: &'a Overrides,
    ) -> Self {
        Self {
            registry,
            runner,
            overrides,
            revisit: Revisit::default(),
            checked: HashSet::new(),
            ran: HashSet::new(),
        }
    }

    /// Set the revisit policy
    #[must_use]
    pub const fn with_revisit(mut self, revisit: Revisit) -> Self {
        self.revisit = revisit;
        self
    }

    /// Check, run and clean up `name` and its dependency tree.
    ///
    /// Returns the accumulated result mapping. A run failure wins over a
    /// cleanup failure; the latter is then only logged. Each call is an
    /// independent invocation: nothing is remembered from earlier calls.
    pub fn execute(&mut self, name: &str) -> Result<ResultMap> {
        info!(target_name = %name, revisit = %self.revisit, "Executing target");
        self.checked.clear();
        self.ran.clear();

        self.check_tree(name, &mut WalkPath::default())?;

        let outcome = self.run_tree(name, ResultMap::new(), &mut WalkPath::default());
        let cleanup = self.cleanup_tree(name, &mut HashSet::new());

        match (outcome, cleanup) {
            (Ok(result), Ok(())) => {
                info!(target_name = %name, "Target complete");
                Ok(result)
            }
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(error = %cleanup_err, "Cleanup failed after a failed run");
                Err(e)
            }
        }
    }

    fn check_tree(&mut self, name: &str, path: &mut WalkPath) -> Result<()> {
        path.enter(name)?;
        if self.checked.contains(name) {
            path.leave();
            return Ok(());
        }

        for dep in deps_of(self.registry, name)? {
            self.check_tree(&dep, path)?;
        }

        debug!(target_name = %name, "Checking target");
        self.registry.get(name)?.check()?;
        self.checked.insert(name.to_string());
        path.leave();
        Ok(())
    }

    fn run_tree(&mut self, name: &str, mut input: ResultMap, path: &mut WalkPath) -> Result<ResultMap> {
        path.enter(name)?;

        for dep in deps_of(self.registry, name)? {
            if self.revisit == Revisit::Once && self.ran.contains(&dep) {
                debug!(target_name = %dep, dependent = %name, "Already ran, skipping");
                continue;
            }
            self.registry.get_mut(&dep)?.hydrate(self.overrides)?;
            input = self.run_tree(&dep, input, path)?;
        }

        let ctx = RunContext {
            runner: self.runner,
        };
        let target = self.registry.get_mut(name)?;
        target.hydrate(self.overrides)?;

        info!(target_name = %name, kind = target.kind(), "Running target");
        if let Some(output) = target.run(&ctx, &input)? {
            input.extend(output);
        }

        self.ran.insert(name.to_string());
        path.leave();
        Ok(input)
    }

    fn cleanup_tree(&mut self, name: &str, cleaned: &mut HashSet<String>) -> Result<()> {
        if !cleaned.insert(name.to_string()) {
            return Ok(());
        }

        for dep in deps_of(self.registry, name)? {
            self.cleanup_tree(&dep, cleaned)?;
        }

        debug!(target_name = %name, "Cleaning up target");
        self.registry.get_mut(name)?.cleanup()
    }
}

/// The order in which `name` and its dependencies would run.
///
/// Nothing is checked, hydrated or run. Unknown targets, missing
/// dependencies and cycles fail the same way execution would.
pub fn plan(registry: &TargetRegistry, name: &str, revisit: Revisit) -> Result<Vec<String>> {
    fn walk(
        registry: &TargetRegistry,
        name: &str,
        revisit: Revisit,
        path: &mut WalkPath,
        order: &mut Vec<String>,
    ) -> Result<()> {
        path.enter(name)?;
        for dep in deps_of(registry, name)? {
            if revisit == Revisit::Once && order.contains(&dep) {
                continue;
            }
            walk(registry, &dep, revisit, path, order)?;
        }
        order.push(name.to_string());
        path.leave();
        Ok(())
    }

    let mut order = Vec::new();
    walk(registry, name, revisit, &mut WalkPath::default(), &mut order)?;
    Ok(order)
}
