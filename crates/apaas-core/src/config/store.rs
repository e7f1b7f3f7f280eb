//! Persisted template repository settings (`~/.apaas-cli.json`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Settings file name in the user's home directory
pub const CONFIG_FILE_NAME: &str = ".apaas-cli.json";

pub const MONOREPO_TEMPLATE_ENV: &str = "APAAS_MONOREPO_TEMPLATE_GIT";
pub const NORMAL_TEMPLATE_ENV: &str = "APAAS_NORMAL_TEMPLATE_GIT";

const BUILTIN_MONOREPO_TEMPLATE: &str = "https://example.com/your-default-monorepo-template.git";
const BUILTIN_NORMAL_TEMPLATE: &str = "https://example.com/your-default-normal-template.git";

/// Kind of project template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TemplateKind {
    /// Monorepo collection of custom modules
    Monorepo,
    /// Single standalone project
    Normal,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 2] = [TemplateKind::Monorepo, TemplateKind::Normal];

    pub fn key(&self) -> &'static str {
        match self {
            TemplateKind::Monorepo => "monorepo",
            TemplateKind::Normal => "normal",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TemplateKind::Monorepo => "Monorepo collection",
            TemplateKind::Normal => "Standalone project",
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            TemplateKind::Monorepo => MONOREPO_TEMPLATE_ENV,
            TemplateKind::Normal => NORMAL_TEMPLATE_ENV,
        }
    }

    fn builtin_url(&self) -> &'static str {
        match self {
            TemplateKind::Monorepo => BUILTIN_MONOREPO_TEMPLATE,
            TemplateKind::Normal => BUILTIN_NORMAL_TEMPLATE,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Template git repository per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUrls {
    #[serde(default)]
    pub monorepo: String,
    #[serde(default)]
    pub normal: String,
}

impl TemplateUrls {
    pub fn get(&self, kind: TemplateKind) -> &str {
        match kind {
            TemplateKind::Monorepo => &self.monorepo,
            TemplateKind::Normal => &self.normal,
        }
    }

    pub fn set(&mut self, kind: TemplateKind, url: String) {
        match kind {
            TemplateKind::Monorepo => self.monorepo = url,
            TemplateKind::Normal => self.normal = url,
        }
    }
}

/// Contents of the settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub templates: TemplateUrls,
}

/// Where an effective template URL came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingSource {
    File(PathBuf),
    Env(&'static str),
    Builtin,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingSource::File(path) => write!(f, "config file ({})", path.display()),
            SettingSource::Env(name) => write!(f, "environment variable ({})", name),
            SettingSource::Builtin => write!(f, "built-in default"),
        }
    }
}

/// Reads and writes the settings file, with env-var defaults
pub struct SettingsStore {
    path: PathBuf,
    env: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl SettingsStore {
    /// Store at `~/.apaas-cli.json`, defaults from the process environment
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine the home directory")?;
        Ok(Self::at(home.join(CONFIG_FILE_NAME)))
    }

    pub fn at(path: PathBuf) -> Self {
        Self::with_env(path, |key| std::env::var(key).ok())
    }

    /// Store with a custom environment lookup
    pub fn with_env(
        path: PathBuf,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path,
            env: Box::new(env),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn env_value(&self, kind: TemplateKind) -> Option<String> {
        (self.env)(kind.env_var()).filter(|v| !v.trim().is_empty())
    }

    /// Default URL for a kind: env var if set, else the built-in placeholder
    pub fn default_url(&self, kind: TemplateKind) -> String {
        self.env_value(kind)
            .unwrap_or_else(|| kind.builtin_url().to_string())
    }

    pub fn defaults(&self) -> Settings {
        let mut settings = Settings::default();
        for kind in TemplateKind::ALL {
            settings.templates.set(kind, self.default_url(kind));
        }
        settings
    }

    /// Load settings. A missing or unreadable file yields the defaults; empty
    /// entries are filled from the defaults.
    pub fn load(&self) -> Settings {
        let parsed = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| match serde_json::from_str::<Settings>(&raw) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        error = %e,
                        "ignoring unparsable settings file"
                    );
                    None
                }
            });

        let mut settings = parsed.unwrap_or_default();
        for kind in TemplateKind::ALL {
            if settings.templates.get(kind).trim().is_empty() {
                settings.templates.set(kind, self.default_url(kind));
            }
        }
        settings
    }

    /// Persist the template URL for one kind, keeping the other
    pub fn save_template(&self, kind: TemplateKind, url: &str) -> Result<Settings> {
        let mut next = self.load();
        next.templates.set(kind, url.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&next).context("Failed to serialize settings")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(next)
    }

    /// Source of the effective URL for a kind
    pub fn source_of(&self, kind: TemplateKind) -> SettingSource {
        if self.path.exists() {
            return SettingSource::File(self.path.clone());
        }
        if self.env_value(kind).is_some() {
            SettingSource::Env(kind.env_var())
        } else {
            SettingSource::Builtin
        }
    }
}

/// Whether a string looks like something `git clone` accepts
pub fn looks_like_git_remote(input: &str) -> bool {
    let input = input.trim();
    if let Ok(url) = url::Url::parse(input) {
        return matches!(url.scheme(), "http" | "https" | "ssh" | "git" | "file")
            && (url.has_host() || url.scheme() == "file");
    }
    // scp-like syntax: user@host:org/repo.git
    match input.split_once(':') {
        Some((user_host, path)) => {
            user_host.contains('@') && !user_host.contains('/') && !path.is_empty()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path, env: &'static [(&'static str, &'static str)]) -> SettingsStore {
        SettingsStore::with_env(dir.join(CONFIG_FILE_NAME), move |key| {
            env.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn test_missing_file_yields_builtin_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), &[]);
        let settings = store.load();
        assert_eq!(settings.templates.monorepo, BUILTIN_MONOREPO_TEMPLATE);
        assert_eq!(settings.templates.normal, BUILTIN_NORMAL_TEMPLATE);
        assert_eq!(store.source_of(TemplateKind::Normal), SettingSource::Builtin);
    }

    #[test]
    fn test_env_overrides_builtin_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), &[(MONOREPO_TEMPLATE_ENV, "git@host:org/mono.git")]);
        assert_eq!(store.load().templates.monorepo, "git@host:org/mono.git");
        assert_eq!(
            store.source_of(TemplateKind::Monorepo),
            SettingSource::Env(MONOREPO_TEMPLATE_ENV)
        );
        assert_eq!(store.source_of(TemplateKind::Normal), SettingSource::Builtin);
    }

    #[test]
    fn test_save_template_keeps_other_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), &[]);

        store
            .save_template(TemplateKind::Monorepo, "https://git.example.com/mono.git")
            .unwrap();
        store
            .save_template(TemplateKind::Normal, "https://git.example.com/normal.git")
            .unwrap();

        let settings = store.load();
        assert_eq!(settings.templates.monorepo, "https://git.example.com/mono.git");
        assert_eq!(settings.templates.normal, "https://git.example.com/normal.git");
        assert!(matches!(
            store.source_of(TemplateKind::Monorepo),
            SettingSource::File(_)
        ));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"templates\""));
    }

    #[test]
    fn test_partial_file_is_filled_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), &[]);
        std::fs::write(
            store.path(),
            r#"{"templates": {"monorepo": "https://a/b.git", "normal": ""}}"#,
        )
        .unwrap();

        let settings = store.load();
        assert_eq!(settings.templates.monorepo, "https://a/b.git");
        assert_eq!(settings.templates.normal, BUILTIN_NORMAL_TEMPLATE);
    }

    #[test]
    fn test_unparsable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), &[]);
        std::fs::write(store.path(), "{ broken").unwrap();
        assert_eq!(store.load(), store.defaults());
    }

    #[test]
    fn test_looks_like_git_remote() {
        assert!(looks_like_git_remote("https://github.com/org/repo.git"));
        assert!(looks_like_git_remote("ssh://git@github.com/org/repo.git"));
        assert!(looks_like_git_remote("git@github.com:org/repo.git"));
        assert!(!looks_like_git_remote("not a url"));
        assert!(!looks_like_git_remote("mailto:someone@example.com"));
    }
}
