//! APaaS Core - Shared library for the `apaas` custom module CLI
//!
//! This library provides everything behind the `apaas` subcommands: creating a
//! project from a git template, building a custom module into a deployable zip,
//! and running a module in a live development session.
//!
//! # Architecture
//!
//! - **Module layer** - `apaas.json` descriptor loading and the rslib command line
//! - **Command layer** - `build`, `dev` (sessions), `templates` (init), `install`,
//!   `config` (template settings) and `doctor`
//! - **CLI/TUI layer** - Optional cliclack-based prompts (feature-gated)
//!
//! # Feature Flags
//!
//! - `tui` (default): Enables the cliclack-based prompts module
//!
//! # Example Usage (without TUI)
//!
//! ```ignore
//! use apaas_core::dev::{run_session, PortRange, SessionOptions};
//!
//! run_session(SessionOptions {
//!     module_dir: "src/custom/apaas-custom-hello".into(),
//!     config_name: None,
//!     forwarded_args: vec![],
//!     cwd: std::env::current_dir()?,
//!     open_browser: false,
//!     port_range: PortRange::default(),
//! })
//! .await?;
//! ```

pub mod build;
pub mod config;
pub mod dev;
pub mod doctor;
pub mod error;
pub mod install;
pub mod log;
pub mod module;
pub mod runtime;
pub mod templates;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export main types for convenience
pub use config::{SettingsStore, TemplateKind};
pub use error::{exit_code_of, ApaasError};
pub use module::{load_module, LoadedModule, ModuleDescriptor, Purpose};
