//! Template fetching by shallow git clone into a local cache directory

use crate::error::ApaasError;
use crate::runtime::tool::{git_tool, ToolManager};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Cache directory name under the user home
pub const CACHE_DIR_NAME: &str = ".apaasCliRepo";

/// Where a template comes from
#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// Git remote URL
    pub url: String,
    /// Branch or tag to clone (default branch if None)
    pub version: Option<String>,
}

/// A failed clone, with everything needed to explain it
#[derive(Debug)]
pub struct CloneFailure {
    pub code: i32,
    pub stderr: String,
}

/// Clones templates into a scratch cache directory
pub struct TemplateFetcher {
    git: ToolManager,
    cache_dir: PathBuf,
}

impl TemplateFetcher {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            git: git_tool(),
            cache_dir,
        }
    }

    /// Fetcher caching under `<user_home>/.apaasCliRepo`
    pub fn in_home(user_home: &Path) -> Self {
        Self::new(user_home.join(CACHE_DIR_NAME))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn git_available(&self) -> bool {
        self.git.is_installed()
    }

    /// `git clone` arguments for a source
    pub fn clone_args(&self, source: &TemplateSource) -> Vec<String> {
        let mut args = vec!["clone".to_string()];
        if let Some(version) = &source.version {
            args.push("--branch".to_string());
            args.push(version.clone());
        }
        args.push(source.url.clone());
        args.push("--depth=1".to_string());
        args.push(self.cache_dir.to_string_lossy().into_owned());
        args
    }

    /// Recreate the cache directory and shallow-clone the template into it.
    ///
    /// Returns `Ok(Err(..))` when git ran but failed, so the caller can print
    /// diagnostics before propagating git's exit code.
    pub async fn fetch(
        &self,
        source: &TemplateSource,
    ) -> Result<std::result::Result<(), CloneFailure>> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)
                .with_context(|| format!("Failed to clear {}", self.cache_dir.display()))?;
        }
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Failed to create {}", self.cache_dir.display()))?;

        tracing::debug!(args = ?self.clone_args(source), "cloning template");
        let output = self.git.output(self.clone_args(source), None).await?;
        if !output.status.success() {
            return Ok(Err(CloneFailure {
                code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }));
        }

        let git_dir = self.cache_dir.join(".git");
        if git_dir.exists() {
            std::fs::remove_dir_all(&git_dir)
                .with_context(|| format!("Failed to remove {}", git_dir.display()))?;
        }
        Ok(Ok(()))
    }
}

impl CloneFailure {
    pub fn into_error(self) -> ApaasError {
        ApaasError::Command {
            program: "git".to_string(),
            code: self.code,
        }
    }
}
