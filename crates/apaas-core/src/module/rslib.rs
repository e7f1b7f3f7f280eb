//! Command line for the rslib build tool

use crate::log;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Build tool config file names, in priority order
pub const RSLIB_CONFIG_NAMES: &[&str] = &[
    "rslib.config.ts",
    "rslib.config.js",
    "rslib.config.cjs",
    "rslib.config.mjs",
];

/// How many ancestor directories above the module directory are searched
const MAX_ASCENT: usize = 3;

/// Env var carrying the absolute entry path to the build tool
pub const ENV_ENTRY: &str = "PUBLIC_ENTRY";
/// Env var carrying the module output name
pub const ENV_OUTPUT_NAME: &str = "PUBLIC_OUTPUT_NAME";
/// Env var carrying the dev session output directory
pub const ENV_OUTPUT_DIR: &str = "PUBLIC_OUTPUT_DIR";
/// Hot reload flag understood by the rsbuild runtime
pub const ENV_HOT: &str = "RSBUILD_ENV_HOT";

/// Search `start` and up to three ancestors for an rslib config; nearest wins
pub fn find_rslib_config(start: &Path) -> Option<PathBuf> {
    for (depth, dir) in start.ancestors().take(MAX_ASCENT + 1).enumerate() {
        for name in RSLIB_CONFIG_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                if depth > 0 {
                    log::info(format!(
                        "Found rslib config in a parent directory: {} ({} level(s) up)",
                        candidate.display(),
                        depth
                    ));
                }
                return Some(candidate);
            }
        }
    }
    None
}

/// Whether the module directory itself carries an rslib config
pub fn has_local_rslib_config(module_dir: &Path) -> bool {
    RSLIB_CONFIG_NAMES
        .iter()
        .any(|name| module_dir.join(name).is_file())
}

/// Arguments passed to `npx` to run rslib for a module
///
/// An explicit `-c` is passed whenever a config is found, since rslib's own
/// discovery from the module directory misses configs in parent directories.
pub fn rslib_args(module_dir: &Path, watch: bool, forwarded: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["rslib".into(), "build".into()];

    if let Some(config_path) = find_rslib_config(module_dir) {
        args.push("-c".into());
        args.push(config_path.into_os_string());
    }

    if watch {
        args.push("-w".into());
    }

    args.extend(forwarded.iter().map(OsString::from));
    args
}

/// Split raw trailing arguments into those forwarded to rslib and the
/// reserved `--name`/`-n` descriptor override, which is consumed here.
///
/// A name flag without a value yields `Some("")`, which later fails the
/// `.json` check instead of silently falling back to the default.
pub fn extract_forwarded_args(raw: &[String]) -> (Vec<String>, Option<String>) {
    let mut forwarded = Vec::new();
    let mut name = None;

    let mut iter = raw.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg
            .strip_prefix("--name=")
            .or_else(|| arg.strip_prefix("-name="))
        {
            if !value.is_empty() {
                name = Some(value.to_string());
                continue;
            }
        }

        if arg == "--name" || arg == "-n" {
            match iter.peek() {
                Some(next) if !next.starts_with('-') => {
                    name = Some((*next).clone());
                    iter.next();
                }
                _ => name = Some(String::new()),
            }
            continue;
        }

        forwarded.push(arg.clone());
    }

    (forwarded, name)
}

/// Program used to launch node tooling (`npx.cmd` on Windows)
pub fn npx_program() -> &'static str {
    if cfg!(windows) {
        "npx.cmd"
    } else {
        "npx"
    }
}

/// Render a command line for logging
pub fn display_command(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}
