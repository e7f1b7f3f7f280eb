//! Template repository settings and the `set` / `config` commands

pub mod store;

use crate::log;
use anyhow::Result;

pub use store::{
    looks_like_git_remote, SettingSource, Settings, SettingsStore, TemplateKind, TemplateUrls,
    CONFIG_FILE_NAME,
};

/// Persist a template URL for a kind (`apaas set`)
pub fn set_template(store: &SettingsStore, kind: TemplateKind, url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        anyhow::bail!("Template repository URL must not be empty");
    }
    if !looks_like_git_remote(url) {
        log::warn(format!(
            "'{}' does not look like a git remote; saving it anyway",
            url
        ));
    }

    store.save_template(kind, url)?;
    log::success(format!("Updated {} template repository to: {}", kind, url));
    Ok(())
}

/// Print the effective template settings with their sources (`apaas config`)
pub fn show(store: &SettingsStore) {
    let settings = store.load();

    log::info("Current template repository settings:");
    log::info("");
    for kind in TemplateKind::ALL {
        log::info(format!(
            "{:<20}: {}",
            kind.display_name(),
            settings.templates.get(kind)
        ));
        log::info(format!("  source: {}", store.source_of(kind)));
        log::info("");
    }
    log::info(format!(
        "Config file path (if present): {}",
        store.path().display()
    ));
}
