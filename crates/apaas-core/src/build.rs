//! Custom module build (`apaas build`)
//!
//! Runs rslib once, assembles the output directory (bundle, descriptor and
//! static assets) under `<cwd>/zip/<outputName>` and packs it into a zip.

use crate::log;
use crate::module::rslib::{self, ENV_ENTRY, ENV_OUTPUT_NAME};
use crate::module::{load_module, LoadedModule, Purpose};
use crate::runtime::tool::npx_tool;
use anyhow::{Context, Result};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Directory (relative to the working directory) holding build outputs
pub const ZIP_ROOT: &str = "zip";

/// Inputs of `apaas build`
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub module_dir: PathBuf,
    /// Descriptor file name override (default `apaas.json`)
    pub config_name: Option<String>,
    pub cwd: PathBuf,
}

/// Paths involved in a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub output_path: PathBuf,
    pub zip_path: PathBuf,
    /// Where rslib writes by default; removed after packaging
    pub rslib_default_output: PathBuf,
}

impl BuildLayout {
    pub fn new(cwd: &Path, module_dir: &Path, output_name: &str) -> Self {
        let zip_root = cwd.join(ZIP_ROOT);
        Self {
            output_path: zip_root.join(output_name),
            zip_path: zip_root.join(format!("{}.zip", output_name)),
            rslib_default_output: module_dir.join(output_name),
        }
    }
}

/// Build a module end to end and return the zip path
pub async fn build(options: &BuildOptions) -> Result<PathBuf> {
    let module_dir = crate::module::resolve_module_dir(&options.module_dir, &options.cwd)?;
    if !rslib::has_local_rslib_config(&module_dir) {
        log::warn(format!(
            "No rslib.config.(js|ts|cjs|mjs) in the module directory; building anyway\ncurrent directory: {}",
            module_dir.display()
        ));
    }

    let module = load_module(
        &module_dir,
        &options.cwd,
        options.config_name.as_deref(),
        Purpose::Build,
    )?;
    let output_name = module.output_name().to_string();
    let layout = BuildLayout::new(&options.cwd, &module.module_dir, &output_name);

    remove_path(&layout.output_path)?;

    run_rslib(&module).await?;
    log::success(format!("Built module {}", output_name));

    print_output_sizes(&layout.output_path);

    assemble_output(&module, &options.cwd, &layout.output_path)?;

    if layout.zip_path.exists() {
        fs::remove_file(&layout.zip_path)
            .with_context(|| format!("Failed to remove {}", layout.zip_path.display()))?;
    }

    let zip_bytes = match zip_directory(&layout.output_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_dir_all(&layout.output_path);
            return Err(e.context("Failed to create the zip archive"));
        }
    };
    if let Err(e) = fs::write(&layout.zip_path, &zip_bytes) {
        let _ = fs::remove_dir_all(&layout.output_path);
        return Err(anyhow::Error::new(e)
            .context(format!("Failed to save {}", layout.zip_path.display())));
    }

    log::success(format!(
        "Built {}! Archive size: {:.2} MB",
        output_name,
        zip_bytes.len() as f64 / 1024.0 / 1024.0
    ));

    remove_path(&layout.output_path)?;
    remove_path(&layout.rslib_default_output)?;

    Ok(layout.zip_path)
}

async fn run_rslib(module: &LoadedModule) -> Result<()> {
    let args = rslib::rslib_args(&module.module_dir, false, &[]);
    let npx = npx_tool();
    log::info(format!(
        "Build command: {}",
        rslib::display_command(&npx.program(), &args)
    ));

    let envs = [
        (ENV_ENTRY, module.entry_path.clone().into_os_string()),
        (ENV_OUTPUT_NAME, module.output_name().into()),
    ];
    npx.run(&args, Some(&module.module_dir), &envs)
        .await
        .context("rslib build failed")
}

/// Copy the descriptor and declared assets into the output directory
fn assemble_output(module: &LoadedModule, cwd: &Path, output_path: &Path) -> Result<()> {
    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    let config_file_name = module
        .config_path
        .file_name()
        .context("Config path has no file name")?;
    fs::copy(&module.config_path, output_path.join(config_file_name))
        .with_context(|| format!("Failed to copy {}", module.config_path.display()))?;

    let assets = module.descriptor.require_copy_assets(&module.config_path)?;
    for asset in assets {
        let source = cwd.join(asset);
        let target = output_path.join(asset_destination(asset));
        if !source.exists() {
            log::warn(format!("Asset not found, skipping: {}", source.display()));
            continue;
        }
        crate::templates::copy_dir_contents(&source, &target)
            .with_context(|| format!("Failed to copy asset {}", asset))?;
    }

    Ok(())
}

/// Assets under `public/` are published under `static/`
pub fn asset_destination(asset: &str) -> PathBuf {
    match asset.strip_prefix("public/") {
        Some(rest) => Path::new("static").join(rest),
        None => PathBuf::from(asset),
    }
}

/// Per-file sizes (KB) of everything under `dir`, relative paths with `/`
pub fn output_sizes(dir: &Path) -> Vec<(String, u64)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(dir).ok()?;
            let rel = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = entry.metadata().ok()?.len();
            Some((rel, size))
        })
        .collect()
}

fn print_output_sizes(dir: &Path) {
    if !dir.exists() {
        return;
    }
    log::info("Build output sizes:");
    for (rel, size) in output_sizes(dir) {
        log::info(format!("  {}: {:.2} KB", rel, size as f64 / 1024.0));
    }
}

/// Zip the contents of `dir` (entries relative to it) into memory
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut zip_buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut zip_buffer));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            let relative = entry.path().strip_prefix(dir)?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                zip.add_directory(format!("{}/", name), options)?;
            } else if entry.file_type().is_file() {
                let content = fs::read(entry.path())
                    .with_context(|| format!("Failed to read {}", entry.path().display()))?;
                zip.start_file(name, options)?;
                zip.write_all(&content)?;
            }
        }

        zip.finish()?;
    }

    Ok(zip_buffer)
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    } else if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
