//! Project initialisation from a git template (`apaas init`)
//!
//! This module provides:
//! - Template cloning into a cache directory
//! - Copying the template into a new project directory
//! - Renaming the bundled `hello` demo module to the requested name

pub mod copier;
pub mod fetcher;

use crate::config::{SettingsStore, TemplateKind};
use crate::log;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use copier::{capitalize, copy_dir_contents, replace_placeholders};
pub use fetcher::{CloneFailure, TemplateFetcher, TemplateSource};

/// Prefix shared by project and module directory names
pub const NAME_PREFIX: &str = "apaas-custom-";

/// Demo module name shipped in templates
const DEMO_MODULE_NAME: &str = "hello";

/// Inputs of `apaas init`
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Module/project name
    pub name: String,
    pub kind: TemplateKind,
    /// Template branch or tag
    pub version: Option<String>,
    /// Custom directory holding the template cache (defaults to the home dir)
    pub user_home: Option<PathBuf>,
    /// Directory the project is created in
    pub cwd: PathBuf,
}

impl InitOptions {
    pub fn project_path(&self) -> PathBuf {
        self.cwd.join(format!("{}{}", NAME_PREFIX, self.name))
    }
}

fn resolve_user_home(custom: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    match custom {
        Some(path) if !path.as_os_str().is_empty() => {
            Ok(crate::module::resolve_against(cwd, path))
        }
        _ => dirs::home_dir().context("Could not determine the home directory"),
    }
}

/// Create a project from the configured template
pub async fn init_project(store: &SettingsStore, options: &InitOptions) -> Result<PathBuf> {
    if options.name.trim().is_empty() || options.name.contains(['/', '\\']) {
        anyhow::bail!("Invalid project name: '{}'", options.name);
    }

    let settings = store.load();
    let url = settings.templates.get(options.kind).trim().to_string();
    if url.is_empty() {
        anyhow::bail!(
            "No template repository configured for {}. Run `apaas set` first.",
            options.kind
        );
    }

    let user_home = resolve_user_home(options.user_home.as_deref(), &options.cwd)?;
    let fetcher = TemplateFetcher::in_home(&user_home);
    if !fetcher.git_available() {
        anyhow::bail!(
            "git was not found on this machine. Check that git is installed and on PATH."
        );
    }

    let source = TemplateSource {
        url,
        version: options.version.clone(),
    };
    log::info(format!("Cloning {} template from {}", options.kind, source.url));
    if let Err(failure) = fetcher.fetch(&source).await? {
        print_clone_diagnostics(options.kind, &source, fetcher.cache_dir(), &failure);
        return Err(failure.into_error().into());
    }

    let project_path = options.project_path();
    if project_path.exists() {
        anyhow::bail!(
            "A project already exists at {}. Check the target directory.",
            project_path.display()
        );
    }

    let copied = copy_dir_contents(fetcher.cache_dir(), &project_path)?;
    tracing::debug!(copied, project = %project_path.display(), "template copied");

    personalize(&project_path, &options.name)?;

    log::success(format!("Created project: {}", project_path.display()));
    Ok(project_path)
}

/// Rename the demo module (source and static assets) to `name`
pub fn personalize(project_path: &Path, name: &str) -> Result<()> {
    let demo_dir_name = format!("{}{}", NAME_PREFIX, DEMO_MODULE_NAME);
    let module_dir_name = format!("{}{}", NAME_PREFIX, name);

    let custom_path = project_path.join("src/custom");
    let demo_module = custom_path.join(&demo_dir_name);
    if demo_module.exists() {
        replace_placeholders(&demo_module, name)?;
        let target = custom_path.join(&module_dir_name);
        if target != demo_module {
            std::fs::rename(&demo_module, &target)
                .with_context(|| format!("Failed to rename {}", demo_module.display()))?;
        }
    }

    let static_path = project_path.join("public/custom");
    let demo_static = static_path.join(&demo_dir_name);
    if demo_static.exists() {
        let target = static_path.join(&module_dir_name);
        if target != demo_static {
            std::fs::rename(&demo_static, &target)
                .with_context(|| format!("Failed to rename {}", demo_static.display()))?;
        }
    }

    Ok(())
}

fn print_clone_diagnostics(
    kind: TemplateKind,
    source: &TemplateSource,
    cache_dir: &Path,
    failure: &CloneFailure,
) {
    log::error("Failed to clone the template repository.");
    log::error(format!("Template kind: {}", kind));
    log::error(format!("Template repository: {}", source.url));
    if let Some(version) = &source.version {
        log::error(format!("Template version (branch/tag): {}", version));
    }
    log::error(format!("Cache directory: {}", cache_dir.display()));
    log::error("");
    log::error("Common causes:");
    log::error("1) An unstable connection to the git host causes TLS/HTTP2 read timeouts (curl 28 / errno 60).");
    log::error("2) A corporate network, gateway or security software limits long-lived git downloads.");
    log::error("3) git is configured with an unreachable proxy (http.proxy/https.proxy).");
    log::error("");
    log::error("You can try:");
    log::error("A) Switch networks (e.g. a mobile hotspot) and retry.");
    log::error("B) Force HTTP/1.1: git config --global http.version HTTP/1.1");
    log::error("C) Inspect or unset the git proxy: git config --global --get http.proxy && git config --global --get https.proxy");
    log::error("D) Use an SSH remote instead (usually more stable): git@github.com:<org>/<repo>.git");
    log::error("");
    log::error("Debug command:");
    log::error(format!(
        "GIT_CURL_VERBOSE=1 GIT_TRACE=1 git ls-remote {} | cat",
        source.url
    ));
    log::error("");
    if !failure.stderr.trim().is_empty() {
        log::error("git output:");
        log::error(failure.stderr.trim());
    }
}
