//! apaas - scaffold, build and run custom modules

use anyhow::Result;
use apaas_core::config::{self, SettingsStore, TemplateKind};
use apaas_core::dev::{self, PortRange, SessionOptions};
use apaas_core::module::extract_forwarded_args;
use apaas_core::{build, doctor, install, log, tui};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI version
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "apaas")]
#[command(about = "CLI for scaffolding, building and running apaas custom modules")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Enable debug diagnostics (RUST_LOG is honoured otherwise)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new project from a template repository
    Init(InitArgs),
    /// Install project dependencies
    Install(InstallArgs),
    /// Build a custom module into a zip archive
    Build(BuildArgs),
    /// Run a custom module with a local static server and watch build
    Run(RunArgs),
    /// Set a template repository URL
    Set(SetArgs),
    /// Show the template repository settings
    Config,
    /// Diagnose the local environment
    Doctor,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Module name (the project is created as apaas-custom-<name>)
    pub name: String,

    /// Template branch or tag
    #[arg(short = 'v', long = "version")]
    pub template_version: Option<String>,

    /// Directory holding the template cache (defaults to the home directory)
    #[arg(short = 'u', long = "userhome")]
    pub user_home: Option<PathBuf>,

    /// Template kind; prompted for when omitted
    #[arg(long, value_enum)]
    pub kind: Option<TemplateKind>,
}

#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Package to add after installing
    #[arg(short, long = "pkg")]
    pub pkg: Option<String>,
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Module directory
    pub module_dir: PathBuf,

    /// Config file name (default apaas.json)
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Module directory
    pub module_dir: PathBuf,

    /// Config file name (default apaas.json)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Open the served URL in the browser
    #[arg(long)]
    pub open: bool,

    /// Extra arguments passed through to `rslib build`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Template kind; prompted for when omitted
    #[arg(long, value_enum)]
    pub kind: Option<TemplateKind>,

    /// Repository URL; prompted for when omitted
    #[arg(long)]
    pub url: Option<String>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("apaas=debug,apaas_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Prompts hide the cursor; make sure it comes back
fn install_cursor_guard() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        std::process::exit(130);
    })
    .ok();
}

async fn run(command: Command) -> Result<()> {
    let cwd = std::env::current_dir()?;

    match command {
        Command::Init(args) => {
            install_cursor_guard();
            let store = SettingsStore::from_home()?;
            let result = tui::run_init(
                &store,
                tui::InitArgs {
                    name: args.name,
                    kind: args.kind,
                    version: args.template_version,
                    user_home: args.user_home,
                    cwd,
                },
            )
            .await;

            let _ = console::Term::stderr().show_cursor();
            result.map(|_| ())
        }
        Command::Install(args) => install::install(&cwd, args.pkg.as_deref()).await,
        Command::Build(args) => {
            build::build(&build::BuildOptions {
                module_dir: args.module_dir,
                config_name: args.name,
                cwd,
            })
            .await?;
            Ok(())
        }
        Command::Run(args) => {
            let (forwarded_args, extracted_name) = extract_forwarded_args(&args.rest);
            dev::run_session(SessionOptions {
                module_dir: args.module_dir,
                config_name: extracted_name.or(args.name),
                forwarded_args,
                cwd,
                open_browser: args.open,
                port_range: PortRange::default(),
            })
            .await
        }
        Command::Set(args) => {
            install_cursor_guard();
            let store = SettingsStore::from_home()?;
            let result = tui::run_set(&store, args.kind, args.url);

            let _ = console::Term::stderr().show_cursor();
            result
        }
        Command::Config => {
            config::show(&SettingsStore::from_home()?);
            Ok(())
        }
        Command::Doctor => {
            let user_agent = format!("apaas-cli/{}", CLI_VERSION);
            doctor::run(&SettingsStore::from_home()?, &user_agent).await
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args.command).await {
        log::error(format!("{:#}", e));
        std::process::exit(apaas_core::exit_code_of(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_run_collects_passthrough_args() {
        let args = Args::parse_from([
            "apaas",
            "run",
            "src/custom/apaas-custom-hello",
            "--open",
            "--mode",
            "development",
            "--name=apaas.dev.json",
        ]);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert!(run.open);
        assert_eq!(run.module_dir, PathBuf::from("src/custom/apaas-custom-hello"));

        let (forwarded, name) = extract_forwarded_args(&run.rest);
        assert_eq!(forwarded, vec!["--mode", "development"]);
        assert_eq!(name.as_deref(), Some("apaas.dev.json"));
    }

    #[test]
    fn test_init_short_flags() {
        let args = Args::parse_from([
            "apaas",
            "init",
            "hello",
            "-v",
            "release/1.2",
            "--kind",
            "normal",
        ]);
        let Command::Init(init) = args.command else {
            panic!("expected init");
        };
        assert_eq!(init.name, "hello");
        assert_eq!(init.template_version.as_deref(), Some("release/1.2"));
        assert_eq!(init.kind, Some(TemplateKind::Normal));
    }

    #[test]
    fn test_build_name_option() {
        let args = Args::parse_from(["apaas", "build", "mods/hello", "-n", "apaas.prod.json"]);
        let Command::Build(build) = args.command else {
            panic!("expected build");
        };
        assert_eq!(build.name.as_deref(), Some("apaas.prod.json"));
    }
}
