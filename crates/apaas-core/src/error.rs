//! Error taxonomy shared by every subcommand
//!
//! Errors that abort a command before anything is started are typed here so the
//! binary can tell them apart (e.g. to propagate a child's exit code). Everything
//! else flows through `anyhow` with context attached at the call site.

use std::path::PathBuf;

/// Typed failures surfaced by the apaas commands
#[derive(Debug, thiserror::Error)]
pub enum ApaasError {
    /// Missing/invalid configuration file, field or option
    #[error("{0}")]
    Config(String),

    /// A declared path does not exist or has the wrong type
    #[error("{message}\nerror path is {}", path.display())]
    Path { message: String, path: PathBuf },

    /// A local resource (port, lock, directory) could not be acquired
    #[error("{0}")]
    Resource(String),

    /// An external command ran but exited unsuccessfully
    #[error("{program} exited with code {code}")]
    Command { program: String, code: i32 },
}

impl ApaasError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn path(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Path {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Exit code the process should terminate with for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ApaasError::Command { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Find the exit code carried by an error chain, defaulting to 1
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ApaasError>())
        .map(ApaasError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_command_error_propagates_exit_code() {
        let err = anyhow::Error::new(ApaasError::Command {
            program: "npx".to_string(),
            code: 2,
        })
        .context("Build failed");
        assert_eq!(exit_code_of(&err), 2);
    }

    #[test]
    fn test_other_errors_exit_with_one() {
        let err: anyhow::Error = ApaasError::config("bad config").into();
        assert_eq!(exit_code_of(&err), 1);

        let err = anyhow::anyhow!("plain failure");
        assert_eq!(exit_code_of(&err), 1);
    }

    #[test]
    fn test_path_error_names_path() {
        let err = ApaasError::path("entry is wrong", "/tmp/missing.js");
        let message = err.to_string();
        assert!(message.contains("entry is wrong"));
        assert!(message.contains("/tmp/missing.js"));
    }

    #[test]
    fn test_context_does_not_hide_code() {
        let result: Result<(), ApaasError> = Err(ApaasError::Command {
            program: "git".to_string(),
            code: 128,
        });
        let err = result.context("clone").unwrap_err();
        assert_eq!(exit_code_of(&err), 128);
    }
}
