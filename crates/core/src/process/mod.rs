//! Process execution and cancellation.
//!
//! - [`ProcessRunner`] spawns one external command at a time, either with
//!   inherited stdio or with captured output
//! - [`ProcessSet`] tracks the children that are currently alive so a
//!   signal handler can terminate them

mod runner;
mod set;

pub use runner::{CommandOutput, ProcessRunner};
pub use set::ProcessSet;
