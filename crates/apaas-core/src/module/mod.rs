//! Custom module descriptors and the build tool command line
//!
//! This module provides:
//! - `apaas.json` loading and validation
//! - rslib config discovery and argument construction
//! - Extraction of the reserved `--name` option from forwarded arguments

pub mod descriptor;
pub mod rslib;

use crate::error::ApaasError;
use std::path::{Path, PathBuf};

pub use descriptor::{
    check_config_name, resolve_against, resolve_entry, resolve_module_dir, CustomWidget,
    ModuleDescriptor, DEFAULT_CONFIG_NAME,
};
pub use rslib::{extract_forwarded_args, find_rslib_config, rslib_args};

/// What the loaded module is going to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// One-shot build; `copyAssets` is required
    Build,
    /// Development session; `copyAssets` is optional
    Run,
}

/// A validated module ready to be built or run
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub module_dir: PathBuf,
    pub config_path: PathBuf,
    pub descriptor: ModuleDescriptor,
    /// Absolute, existing entry path
    pub entry_path: PathBuf,
}

impl LoadedModule {
    pub fn output_name(&self) -> &str {
        &self.descriptor.output_name
    }
}

/// Resolve, read and validate a module. Nothing is spawned or written.
pub fn load_module(
    module_dir: &Path,
    cwd: &Path,
    config_name: Option<&str>,
    purpose: Purpose,
) -> Result<LoadedModule, ApaasError> {
    let module_dir = resolve_module_dir(module_dir, cwd)?;

    let config_name = config_name.unwrap_or(DEFAULT_CONFIG_NAME);
    check_config_name(config_name)?;

    let config_path = module_dir.join(config_name);
    let descriptor = ModuleDescriptor::load(&config_path)?;

    if purpose == Purpose::Build {
        descriptor.require_copy_assets(&config_path)?;
    }

    let entry_path = resolve_entry(&module_dir, &descriptor.entry)?;

    Ok(LoadedModule {
        module_dir,
        config_path,
        descriptor,
        entry_path,
    })
}
