//! Template file copying and demo-module personalisation

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copy the contents of `from` into `to`, creating `to`.
/// Returns the number of files copied.
pub fn copy_dir_contents(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to)
        .with_context(|| format!("Failed to create directory: {}", to.display()))?;

    let mut copied = 0;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .context("Walked path outside of source directory")?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy file: {}", entry.path().display()))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Upper-case the first character (`hello` -> `Hello`)
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Replace `{{moduleName}}` / `{{ModuleName}}` in every text file under `dir`.
/// Files that are not valid UTF-8 are left untouched. Returns files rewritten.
pub fn replace_placeholders(dir: &Path, module_name: &str) -> Result<usize> {
    let replacements = [
        ("{{moduleName}}", module_name.to_string()),
        ("{{ModuleName}}", capitalize(module_name)),
    ];

    let mut rewritten = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let Ok(content) = String::from_utf8(bytes) else {
            continue;
        };

        let mut updated = content.clone();
        for (placeholder, value) in &replacements {
            updated = updated.replace(placeholder, value);
        }
        if updated != content {
            fs::write(path, updated)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            rewritten += 1;
        }
    }

    Ok(rewritten)
}
