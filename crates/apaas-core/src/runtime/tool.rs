//! External command-line tools (git, npm, pnpm, npx)
//!
//! Provides a small abstraction for checking whether a tool is available and
//! running it either with inherited stdio or with captured output.

use crate::error::ApaasError;
use anyhow::{Context, Result};
use colored::Colorize;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command as TokioCommand;

/// Configuration for a CLI tool
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Name of the tool binary (e.g., "git")
    pub name: &'static str,
    /// Display name for user-facing messages
    pub display_name: &'static str,
    /// Whether the binary is a `.cmd` shim on Windows (node tooling)
    pub cmd_shim: bool,
    /// Where to get the tool
    pub install_hint: &'static str,
}

/// Runs and inspects an external tool
#[derive(Debug, Clone)]
pub struct ToolManager {
    config: ToolConfig,
}

impl ToolManager {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Executable name for the current platform
    pub fn program(&self) -> String {
        if cfg!(windows) && self.config.cmd_shim {
            format!("{}.cmd", self.config.name)
        } else {
            self.config.name.to_string()
        }
    }

    /// Check if the tool is installed and runnable from PATH
    pub fn is_installed(&self) -> bool {
        std::process::Command::new(self.program())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Get the installed tool version (if available)
    pub fn get_version(&self) -> Option<String> {
        std::process::Command::new(self.program())
            .arg("--version")
            .output()
            .ok()
            .and_then(|output| {
                if output.status.success() {
                    String::from_utf8(output.stdout)
                        .ok()
                        .map(|s| s.trim().to_string())
                } else {
                    None
                }
            })
    }

    fn command<I, S>(&self, args: I, cwd: Option<&Path>) -> TokioCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = TokioCommand::new(self.program());
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion with inherited stdio; a non-zero exit becomes
    /// `ApaasError::Command` carrying the exit code.
    pub async fn run<I, S>(
        &self,
        args: I,
        cwd: Option<&Path>,
        envs: &[(&str, OsString)],
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args, cwd);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let status = cmd
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.program()))?;

        if status.success() {
            Ok(())
        } else {
            Err(ApaasError::Command {
                program: self.program(),
                code: status.code().unwrap_or(1),
            }
            .into())
        }
    }

    /// Run to completion with captured stdout/stderr
    pub async fn output<I, S>(&self, args: I, cwd: Option<&Path>) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args, cwd);
        cmd.stdin(Stdio::null());
        cmd.output()
            .await
            .with_context(|| format!("Failed to run {}", self.program()))
    }

    /// One-line status used by `doctor`
    pub fn describe(&self) -> String {
        match self.get_version() {
            Some(version) => format!("{} {}", self.config.display_name, version.dimmed()),
            None => format!(
                "{} {} ({})",
                self.config.display_name,
                "not found".red(),
                self.config.install_hint
            ),
        }
    }
}

pub fn git_tool() -> ToolManager {
    ToolManager::new(ToolConfig {
        name: "git",
        display_name: "git",
        cmd_shim: false,
        install_hint: "https://git-scm.com/downloads",
    })
}

pub fn node_tool() -> ToolManager {
    ToolManager::new(ToolConfig {
        name: "node",
        display_name: "Node.js",
        cmd_shim: false,
        install_hint: "https://nodejs.org",
    })
}

pub fn npm_tool() -> ToolManager {
    ToolManager::new(ToolConfig {
        name: "npm",
        display_name: "npm",
        cmd_shim: true,
        install_hint: "bundled with Node.js",
    })
}

pub fn npx_tool() -> ToolManager {
    ToolManager::new(ToolConfig {
        name: "npx",
        display_name: "npx",
        cmd_shim: true,
        install_hint: "bundled with Node.js",
    })
}

pub fn pnpm_tool() -> ToolManager {
    ToolManager::new(ToolConfig {
        name: "pnpm",
        display_name: "pnpm",
        cmd_shim: true,
        install_hint: "https://pnpm.io/installation",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_tool() -> ToolManager {
        ToolManager::new(ToolConfig {
            name: "apaas-definitely-not-a-real-tool",
            display_name: "missing",
            cmd_shim: false,
            install_hint: "nowhere",
        })
    }

    #[test]
    fn test_missing_tool_is_not_installed() {
        let tool = missing_tool();
        assert!(!tool.is_installed());
        assert!(tool.get_version().is_none());
        assert!(tool.describe().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_missing_tool_run_fails_to_spawn() {
        let err = missing_tool().run(["--version"], None, &[]).await.unwrap_err();
        assert!(err.to_string().contains("Failed to run"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_carries_code() {
        let sh = ToolManager::new(ToolConfig {
            name: "sh",
            display_name: "sh",
            cmd_shim: false,
            install_hint: "",
        });
        let err = sh.run(["-c", "exit 3"], None, &[]).await.unwrap_err();
        assert_eq!(crate::error::exit_code_of(&err), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_captured() {
        let sh = ToolManager::new(ToolConfig {
            name: "sh",
            display_name: "sh",
            cmd_shim: false,
            install_hint: "",
        });
        let out = sh.output(["-c", "echo hi; echo err >&2"], None).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hi");
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "err");
    }

    #[test]
    fn test_program_name_for_shims() {
        let npx = npx_tool();
        if cfg!(windows) {
            assert_eq!(npx.program(), "npx.cmd");
        } else {
            assert_eq!(npx.program(), "npx");
        }
        assert_eq!(git_tool().program(), "git");
    }
}
