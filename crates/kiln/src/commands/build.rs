//! `kiln build <target> [--<option> <value>]...`
//!
//! The flags a build accepts depend on the target: every top-level scalar
//! option of the target and of its transitive dependencies becomes a
//! `--<option>` flag defaulting to the declared value. Values resolve in
//! this order: explicit flag, built-in git values, declared default.

use super::Session;
use crate::cli::{CliError, to_json};
use clap::parser::ValueSource;
use clap::{Arg, ArgMatches, error::ErrorKind};
use indexmap::IndexMap;
use kiln_core::template::CONTROL_KEYS;
use kiln_core::{Executor, Overrides, Project, ProcessRunner, ResultMap, TargetRegistry};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Placeholder filled with the full commit hash of the checkout.
pub const GIT_SHA: &str = "git_sha";
/// Placeholder filled with the abbreviated commit hash.
pub const GIT_SHA_SHORT: &str = "git_sha_short";
/// Length of [`GIT_SHA_SHORT`].
pub const SHORT_SHA_LEN: usize = 12;

const RESERVED_FLAGS: &[&str] = &["help"];

/// Top-level scalar options of `target` and everything it depends on.
///
/// The first declaration of a key wins, visiting the target before its
/// dependencies. Unknown dependencies are skipped here and reported by the
/// executor.
#[must_use]
pub fn collect_flags(registry: &TargetRegistry, target: &str) -> IndexMap<String, String> {
    let mut flags = IndexMap::new();
    let mut seen = HashSet::new();
    let mut pending = vec![target.to_string()];

    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Ok(target) = registry.get(&name) else {
            continue;
        };

        for (key, value) in target.base().options() {
            if CONTROL_KEYS.contains(&key.as_str()) || RESERVED_FLAGS.contains(&key.as_str()) {
                continue;
            }
            if !is_flag_name(key) {
                debug!(target_name = %name, option = %key, "Option cannot be a flag, skipping");
                continue;
            }
            let default = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            flags.entry(key.clone()).or_insert(default);
        }

        pending.extend(target.deps().iter().rev().cloned());
    }

    flags
}

/// Whether `key` can be spelled as `--<key>`.
///
/// Such keys are also the only ones a `{{name}}` placeholder can refer to.
#[must_use]
pub fn is_flag_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// The parser for a target's per-build flags
#[must_use]
pub fn flag_parser(target: &str, flags: &IndexMap<String, String>) -> clap::Command {
    let mut cmd = clap::Command::new(format!("kiln build {target}"))
        .no_binary_name(true)
        .about(format!("Options for building '{target}'"));

    for (key, default) in flags {
        cmd = cmd.arg(
            Arg::new(key.clone())
                .long(key.clone())
                .value_name("VALUE")
                .default_value(default.clone())
                .help(format!("Value for {{{{{key}}}}}")),
        );
    }

    for key in [GIT_SHA, GIT_SHA_SHORT] {
        if !flags.contains_key(key) {
            cmd = cmd.arg(
                Arg::new(key)
                    .long(key)
                    .value_name("VALUE")
                    .help("Defaults to the checked-out commit"),
            );
        }
    }

    cmd
}

/// Assemble the override mapping from parsed flags and git values.
#[must_use]
pub fn resolve_overrides(
    flags: &IndexMap<String, String>,
    matches: &ArgMatches,
    git: &[(String, String)],
) -> Overrides {
    let mut overrides = Overrides::new();
    let explicit = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);

    let ids = flags
        .keys()
        .map(String::as_str)
        .chain([GIT_SHA, GIT_SHA_SHORT]);
    for id in ids {
        if explicit(id)
            && let Some(value) = matches.get_one::<String>(id)
        {
            overrides.insert(id, value.clone());
        }
    }

    for (name, value) in git {
        overrides.insert_default(name.clone(), value.clone());
    }

    for (name, default) in flags {
        overrides.insert_default(name.clone(), default.clone());
    }

    overrides.without_control_keys()
}

/// `git_sha` and `git_sha_short` for the checkout, if there is one.
pub fn git_values(runner: &ProcessRunner, project: &Project) -> Vec<(String, String)> {
    if !project.is_git_checkout() {
        return Vec::new();
    }

    match runner.run_captured("git rev-parse HEAD", Some(&project.root)) {
        Ok(output) if output.success() => {
            let sha = output.stdout.trim().to_string();
            let short: String = sha.chars().take(SHORT_SHA_LEN).collect();
            debug!(sha = %sha, "Resolved git revision");
            vec![(GIT_SHA.to_string(), sha), (GIT_SHA_SHORT.to_string(), short)]
        }
        Ok(output) => {
            warn!(stderr = %output.stderr.trim(), "git rev-parse failed; git_sha and git_sha_short are unset");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "Could not run git; git_sha and git_sha_short are unset");
            Vec::new()
        }
    }
}

#[derive(Debug, Serialize)]
struct BuildReport<'a> {
    target: &'a str,
    result: ResultMap,
}

/// `kiln build`
pub fn execute(
    session: &mut Session,
    target: &str,
    args: &[String],
    json: bool,
) -> Result<String, CliError> {
    // Resolve the name first so a typo is not reported as a flag error
    session.registry.get(target)?;

    let flags = collect_flags(&session.registry, target);
    let matches = match flag_parser(target, &flags).try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => return Ok(e.render().to_string()),
        Err(e) => {
            return Err(CliError::config(e.render().to_string().trim_end().to_string())
                .with_help(format!("Run `kiln build {target} --help` to list its options")));
        }
    };

    let git = git_values(&session.runner, &session.project);
    let overrides = resolve_overrides(&flags, &matches, &git);
    debug!(count = overrides.len(), "Resolved overrides");

    let result = Executor::new(&mut session.registry, &session.runner, &overrides)
        .with_revisit(session.project.config.revisit)
        .execute(target)?;
    info!(target_name = %target, "Build finished");

    if json {
        to_json(BuildReport { target, result })
    } else {
        Ok(format!("Built '{target}'\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::TargetBase;
    use kiln_core::targets::{CommandTarget, PhonyTarget};
    use serde_json::json;

    fn command(name: &str, deps: &[&str], options: Value) -> Box<CommandTarget> {
        let Value::Object(options) = options else {
            unreachable!("fixture is an object")
        };
        let deps = deps.iter().map(ToString::to_string).collect();
        Box::new(CommandTarget::new(TargetBase::with_options(name, deps, options)).unwrap())
    }

    fn registry() -> TargetRegistry {
        let mut registry = TargetRegistry::new();
        registry
            .register(command(
                "assets",
                &[],
                json!({"command": "npm run assets --cdn={{cdn}}", "cdn": "cdn.example.com", "retries": 3}),
            ))
            .unwrap();
        registry
            .register(command(
                "web",
                &["assets"],
                json!({"command": "npm run build --env={{env}}", "env": "staging", "artifact": {"x": "y"}}),
            ))
            .unwrap();
        registry
            .register(Box::new(
                PhonyTarget::new(TargetBase::new("all", vec!["web".into(), "ghost".into()])).unwrap(),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_collect_flags_walks_dependencies() {
        let flags = collect_flags(&registry(), "all");
        assert_eq!(
            flags.keys().collect::<Vec<_>>(),
            ["command", "env", "cdn", "retries"]
        );
        assert_eq!(flags["command"], "npm run build --env={{env}}");
        assert_eq!(flags["retries"], "3");
    }

    #[test]
    fn test_explicit_flag_beats_git_and_default() {
        let flags = collect_flags(&registry(), "web");
        let matches = flag_parser("web", &flags)
            .try_get_matches_from(["--env", "production", "--git_sha_short", "feedface"])
            .unwrap();
        let git = vec![
            (GIT_SHA.to_string(), "0123456789abcdef".to_string()),
            (GIT_SHA_SHORT.to_string(), "0123456789ab".to_string()),
        ];

        let overrides = resolve_overrides(&flags, &matches, &git);

        assert_eq!(overrides.get("env"), Some("production"));
        assert_eq!(overrides.get("cdn"), Some("cdn.example.com"));
        assert_eq!(overrides.get(GIT_SHA), Some("0123456789abcdef"));
        assert_eq!(overrides.get(GIT_SHA_SHORT), Some("feedface"));
    }

    #[test]
    fn test_options_that_cannot_be_flags_are_skipped() {
        let mut registry = TargetRegistry::new();
        registry
            .register(command(
                "t",
                &[],
                json!({"command": "true", "-x": "x", "my opt": "y", "": "z", "ok-name": "1"}),
            ))
            .unwrap();

        let flags = collect_flags(&registry, "t");
        assert_eq!(flags.keys().collect::<Vec<_>>(), ["command", "ok-name"]);

        let matches = flag_parser("t", &flags)
            .try_get_matches_from(Vec::<String>::new())
            .unwrap();
        let overrides = resolve_overrides(&flags, &matches, &[]);
        assert_eq!(overrides.get("ok-name"), Some("1"));
        assert!(!overrides.contains("-x"));
    }

    #[test]
    fn test_flag_names() {
        assert!(is_flag_name("env"));
        assert!(is_flag_name("git_sha_short"));
        assert!(is_flag_name("deb-user"));
        assert!(is_flag_name("_private"));
        assert!(!is_flag_name("-x"));
        assert!(!is_flag_name("my opt"));
        assert!(!is_flag_name(""));
        assert!(!is_flag_name("a=b"));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let flags = collect_flags(&registry(), "web");
        let err = flag_parser("web", &flags)
            .try_get_matches_from(["--nope", "1"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_help_lists_options() {
        let flags = collect_flags(&registry(), "web");
        let err = flag_parser("web", &flags)
            .try_get_matches_from(["--help"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        let help = err.render().to_string();
        assert!(help.contains("--env <VALUE>"));
        assert!(help.contains("--git_sha <VALUE>"));
    }
}
