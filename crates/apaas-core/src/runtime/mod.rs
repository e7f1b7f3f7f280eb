//! External tool detection and invocation
//!
//! This module provides:
//! - Generic tool management for git, npm, pnpm and npx
//! - Availability and minimum-version checks for `doctor`

pub mod check;
pub mod tool;
pub mod version;

pub use check::{check_tools, ensure_required, version_warnings, ToolInfo};
pub use tool::{git_tool, node_tool, npm_tool, npx_tool, pnpm_tool, ToolManager};
