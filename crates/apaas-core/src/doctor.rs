//! Environment diagnosis (`apaas doctor`)

use crate::config::{SettingsStore, TemplateKind};
use crate::log;
use crate::runtime::check::{self, ToolInfo};
use anyhow::{Context, Result};
use colored::Colorize;
use std::time::Duration;

/// Timeout for template reachability probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of probing a template repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable(u16),
    Unreachable(String),
    /// Not an http(s) remote; only git itself can check it
    Skipped,
}

/// Probe an http(s) template remote with a HEAD request
pub async fn probe_template(client: &reqwest::Client, remote: &str) -> Reachability {
    let Ok(url) = url::Url::parse(remote) else {
        return Reachability::Skipped;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Reachability::Skipped;
    }

    match client.head(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => Reachability::Reachable(response.status().as_u16()),
        Err(e) => Reachability::Unreachable(e.to_string()),
    }
}

/// Probe the external tools on the blocking pool; each probe spawns a process
pub async fn detect_tools() -> Result<Vec<ToolInfo>> {
    tokio::task::spawn_blocking(check::check_tools)
        .await
        .context("Tool detection task failed")
}

/// Check tools and template repositories, failing if a required tool is missing
pub async fn run(store: &SettingsStore, user_agent: &str) -> Result<()> {
    log::info("Tools:");
    let tools = detect_tools().await?;
    for tool in &tools {
        let status = match (&tool.version, tool.required) {
            (Some(v), _) => format!("{} {}", "ok".green(), v.dimmed()),
            (None, true) => "missing".red().to_string(),
            (None, false) => "not installed (optional)".yellow().to_string(),
        };
        log::info(format!("  {:<8} {}", tool.name, status));
    }
    for warning in check::version_warnings(&tools) {
        log::warn(format!("  {}", warning));
    }

    log::info("");
    log::info("Template repositories:");
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    let settings = store.load();
    for kind in TemplateKind::ALL {
        let remote = settings.templates.get(kind);
        let line = match probe_template(&client, remote).await {
            Reachability::Reachable(status) => {
                format!("{} (HTTP {})", "reachable".green(), status)
            }
            Reachability::Unreachable(reason) => {
                format!("{} ({})", "unreachable".yellow(), reason)
            }
            Reachability::Skipped => "not probed (non-http remote)".dimmed().to_string(),
        };
        log::info(format!("  {:<8} {} {}", kind.key(), remote, line));
    }

    check::ensure_required(&tools)?;
    log::info("");
    log::success("apaas doctor: ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_http_remotes_are_skipped() {
        let client = reqwest::Client::new();
        assert_eq!(
            probe_template(&client, "git@github.com:org/repo.git").await,
            Reachability::Skipped
        );
        assert_eq!(
            probe_template(&client, "ssh://git@host/org/repo.git").await,
            Reachability::Skipped
        );
    }

    #[tokio::test]
    async fn test_detect_tools_reports_every_tool() {
        let tools = detect_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"git"));
        assert!(tools.iter().all(|t| t.available == t.version.is_some()));
    }

    #[tokio::test]
    async fn test_unreachable_remote() {
        // Port 9 on loopback (discard) is not served in test environments
        let client = reqwest::Client::new();
        let result = probe_template(&client, "http://127.0.0.1:9/repo.git").await;
        assert!(matches!(result, Reachability::Unreachable(_)));
    }
}
