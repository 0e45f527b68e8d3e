//! Command-line front end for kiln.
//!
//! The binary in `main.rs` is a thin wrapper: parsing lives in [`cli`],
//! subcommands in [`commands`], interrupt handling in [`signals`] and log
//! setup in [`tracing`](mod@crate::tracing).

pub mod cli;
pub mod commands;
pub mod signals;
pub mod tracing;
