use super::Session;
use crate::cli::{CliError, to_json};
use kiln_core::TargetRegistry;
use serde::Serialize;
use std::fmt::Write;

/// One row of `kiln list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    /// Target name
    pub name: String,
    /// Kind name
    pub kind: String,
    /// Dependency names
    pub deps: Vec<String>,
    /// Definition file, relative to the project root
    pub origin: Option<String>,
}

/// Summaries of every target in registration order
#[must_use]
pub fn summarize(registry: &TargetRegistry) -> Vec<TargetSummary> {
    registry
        .iter()
        .map(|target| TargetSummary {
            name: target.name().to_string(),
            kind: target.kind().to_string(),
            deps: target.deps().to_vec(),
            origin: target
                .base()
                .origin()
                .map(|origin| origin.relative_path().display().to_string()),
        })
        .collect()
}

/// Render summaries as aligned text
#[must_use]
pub fn render(summaries: &[TargetSummary]) -> String {
    let name_width = summaries.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let kind_width = summaries.iter().map(|s| s.kind.len()).max().unwrap_or(0);

    let mut out = String::new();
    for s in summaries {
        let _ = write!(
            out,
            "{:<name_width$}  {:<kind_width$}  {}",
            s.name,
            s.kind,
            s.origin.as_deref().unwrap_or("-"),
        );
        if !s.deps.is_empty() {
            let _ = write!(out, "  <- {}", s.deps.join(", "));
        }
        out.push('\n');
    }
    out
}

/// `kiln list`
pub fn execute(session: &Session, json: bool) -> Result<String, CliError> {
    let summaries = summarize(&session.registry);
    if json {
        to_json(summaries)
    } else {
        Ok(render(&summaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, kind: &str, deps: &[&str]) -> TargetSummary {
        TargetSummary {
            name: name.into(),
            kind: kind.into(),
            deps: deps.iter().map(ToString::to_string).collect(),
            origin: Some("BUILD.toml".into()),
        }
    }

    #[test]
    fn test_render_aligns_columns() {
        let text = render(&[
            summary("web", "command", &[]),
            summary("everything", "phony", &["web"]),
        ]);
        assert_eq!(
            text,
            "web         command  BUILD.toml\n\
             everything  phony    BUILD.toml  <- web\n"
        );
    }
}
