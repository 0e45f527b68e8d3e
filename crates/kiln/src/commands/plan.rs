use super::Session;
use crate::cli::{CliError, to_json};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Serialize)]
struct Plan<'a> {
    target: &'a str,
    revisit: String,
    order: Vec<String>,
}

/// `kiln plan <target>`
pub fn execute(session: &Session, target: &str, json: bool) -> Result<String, CliError> {
    let revisit = session.project.config.revisit;
    let order = kiln_core::plan(&session.registry, target, revisit)?;

    if json {
        return to_json(Plan {
            target,
            revisit: revisit.to_string(),
            order,
        });
    }

    let mut out = String::new();
    for (step, name) in order.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {name}", step + 1);
    }
    Ok(out)
}
