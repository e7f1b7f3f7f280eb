//! Version comparison for required runtimes

use semver::Version;

/// Parse version string, handling a leading `v` (as printed by `node --version`)
pub fn parse_version(version_str: &str) -> Option<Version> {
    let trimmed = version_str.trim();
    let cleaned = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(cleaned).ok()
}

/// Compare an installed version against the minimum a tool needs.
/// Returns a warning message if the installed version is older.
pub fn check_minimum(name: &str, installed: &str, minimum: &str) -> Option<String> {
    let installed_ver = parse_version(installed)?; // Can't compare, skip warning
    let minimum_ver = parse_version(minimum)?;

    if installed_ver < minimum_ver {
        Some(format!(
            "{} {} is older than the minimum supported version {}",
            name, installed_ver, minimum_ver
        ))
    } else {
        None
    }
}
