//! Coloured console output for user-facing progress lines
//!
//! Informational, warning and success lines go to stdout; errors go to stderr.
//! Diagnostics that only matter with `--verbose` use `tracing` instead.

use colored::Colorize;
use std::fmt::Display;

pub fn info(msg: impl Display) {
    println!("{}", msg);
}

pub fn warn(msg: impl Display) {
    println!("{}", msg.to_string().yellow());
}

pub fn error(msg: impl Display) {
    eprintln!("{}", msg.to_string().red());
}

pub fn success(msg: impl Display) {
    println!("{}", msg.to_string().green());
}
