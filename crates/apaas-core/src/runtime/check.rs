//! Tool availability checks used by `doctor`

use super::tool::{self, ToolManager};
use super::version;
use anyhow::Result;

/// Minimum Node.js version supported by rslib
pub const MIN_NODE_VERSION: &str = "18.12.0";

/// Tool detection result
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: &'static str,
    pub version: Option<String>,
    pub available: bool,
    /// Missing optional tools are reported but do not fail the check
    pub required: bool,
}

fn probe(tool: &ToolManager, required: bool) -> ToolInfo {
    let version = tool.get_version();
    ToolInfo {
        name: tool.config().display_name,
        available: version.is_some(),
        version,
        required,
    }
}

/// Check the tools the CLI shells out to
pub fn check_tools() -> Vec<ToolInfo> {
    vec![
        probe(&tool::git_tool(), true),
        probe(&tool::node_tool(), true),
        probe(&tool::npm_tool(), true),
        probe(&tool::npx_tool(), true),
        probe(&tool::pnpm_tool(), false),
    ]
}

/// Warnings about installed-but-outdated tools
pub fn version_warnings(tools: &[ToolInfo]) -> Vec<String> {
    tools
        .iter()
        .filter(|t| t.name == "Node.js")
        .filter_map(|t| t.version.as_deref())
        .filter_map(|v| version::check_minimum("Node.js", v, MIN_NODE_VERSION))
        .collect()
}

/// Fail if any required tool is missing
pub fn ensure_required(tools: &[ToolInfo]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|t| t.required && !t.available)
        .map(|t| t.name)
        .collect();

    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required tools:\n{}",
            missing
                .iter()
                .map(|m| format!("  - {}", m))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    Ok(())
}
