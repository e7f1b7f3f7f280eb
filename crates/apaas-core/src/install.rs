//! Dependency installation (`apaas install`)

use crate::log;
use crate::runtime::tool::{npm_tool, pnpm_tool, ToolManager};
use anyhow::{Context, Result};
use std::path::Path;

/// Scope whose packages must not carry nested `node_modules`
const APAAS_SCOPE_DIR: &str = "node_modules/@x-apaas";

/// Package manager used for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
}

impl PackageManager {
    /// pnpm when a `pnpm-lock.yaml` is present, npm otherwise
    pub fn detect(project_dir: &Path) -> Self {
        if project_dir.join("pnpm-lock.yaml").exists() {
            PackageManager::Pnpm
        } else {
            PackageManager::Npm
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
        }
    }

    fn tool(&self) -> ToolManager {
        match self {
            PackageManager::Npm => npm_tool(),
            PackageManager::Pnpm => pnpm_tool(),
        }
    }

    /// Arguments adding a single package as a dependency
    pub fn add_args(&self, package: &str) -> Vec<String> {
        match self {
            PackageManager::Npm => vec!["install".into(), "--save".into(), package.into()],
            PackageManager::Pnpm => vec!["add".into(), package.into()],
        }
    }
}

/// Install dependencies, optionally add one package, then dedupe the apaas scope
pub async fn install(project_dir: &Path, package: Option<&str>) -> Result<()> {
    let pm = PackageManager::detect(project_dir);
    log::info(format!("Using package manager: {}", pm.name()));

    let tool = pm.tool();
    tool.run(["install"], Some(project_dir), &[]).await?;
    if let Some(package) = package {
        tool.run(pm.add_args(package), Some(project_dir), &[]).await?;
    }

    let removed = remove_nested_node_modules(project_dir)?;
    if removed > 0 {
        log::info(format!(
            "Removed {} nested node_modules folder(s) under {}",
            removed, APAAS_SCOPE_DIR
        ));
    }
    Ok(())
}

/// Delete `node_modules/@x-apaas/*/node_modules` so scoped packages resolve
/// shared dependencies from the project root. Returns how many were removed.
pub fn remove_nested_node_modules(project_dir: &Path) -> Result<usize> {
    let scope_dir = project_dir.join(APAAS_SCOPE_DIR);
    if !scope_dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    let entries = std::fs::read_dir(&scope_dir)
        .with_context(|| format!("Failed to read {}", scope_dir.display()))?;
    for entry in entries {
        let nested = entry?.path().join("node_modules");
        if nested.exists() {
            std::fs::remove_dir_all(&nested)
                .with_context(|| format!("Failed to remove {}", nested.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
