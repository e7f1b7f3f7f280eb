//! Charm-style prompts for `apaas init` and `apaas set`

use crate::config::{self, SettingsStore, TemplateKind};
use crate::templates::{self, InitOptions};
use anyhow::Result;
use std::path::PathBuf;

/// Arguments of `apaas init` as given on the command line
#[derive(Debug, Clone)]
pub struct InitArgs {
    pub name: String,
    /// Prompted for when absent
    pub kind: Option<TemplateKind>,
    pub version: Option<String>,
    pub user_home: Option<PathBuf>,
    pub cwd: PathBuf,
}

/// Ask which template kind to use
pub fn select_kind(prompt: &str, initial: TemplateKind) -> Result<TemplateKind> {
    let mut select = cliclack::select(prompt).initial_value(initial);
    for kind in TemplateKind::ALL {
        select = select.item(kind, kind.display_name(), kind.key());
    }
    Ok(select.interact()?)
}

/// Create a project, prompting for the template kind when not given
pub async fn run_init(store: &SettingsStore, args: InitArgs) -> Result<PathBuf> {
    cliclack::intro("apaas init")?;

    let kind = match args.kind {
        Some(kind) => {
            cliclack::log::info(format!("Using {} template", kind.display_name()))?;
            kind
        }
        None => select_kind("Select a project template", TemplateKind::Monorepo)?,
    };

    let options = InitOptions {
        name: args.name,
        kind,
        version: args.version,
        user_home: args.user_home,
        cwd: args.cwd,
    };
    let project_path = templates::init_project(store, &options).await?;

    let steps = [
        format!("cd {}", project_path.display()),
        "apaas install".to_string(),
    ];
    cliclack::note("Next steps", steps.join("\n"))?;
    cliclack::outro("Happy coding!")?;

    Ok(project_path)
}

/// Update a template repository, prompting for whatever was not given
pub fn run_set(
    store: &SettingsStore,
    kind: Option<TemplateKind>,
    url: Option<String>,
) -> Result<()> {
    cliclack::intro("apaas set")?;

    let kind = match kind {
        Some(kind) => kind,
        None => select_kind(
            "Which template repository do you want to change?",
            TemplateKind::Monorepo,
        )?,
    };

    let url = match url {
        Some(url) => url,
        None => {
            let current = store.load().templates.get(kind).to_string();
            cliclack::input(format!("{} repository URL", kind.display_name()))
                .placeholder("git@host:group/template.git")
                .default_input(&current)
                .validate(|input: &String| {
                    if input.trim().is_empty() {
                        Err("The repository URL must not be empty")
                    } else {
                        Ok(())
                    }
                })
                .interact()?
        }
    };

    config::set_template(store, kind, &url)?;
    cliclack::outro("Settings saved")?;
    Ok(())
}
