//! Supervision of the long-running `rslib build -w` process
//!
//! The child's stdout/stderr are streamed line by line into the console log and
//! its exit is reported, but nothing here treats an exit as fatal: the session
//! keeps serving the last good output.

use crate::log;
use crate::module::rslib::{self, ENV_ENTRY, ENV_HOT, ENV_OUTPUT_DIR, ENV_OUTPUT_NAME};
use crate::module::LoadedModule;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long `terminate` waits for the child to exit after signalling it
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// A fully resolved build command
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub envs: Vec<(String, OsString)>,
}

impl BuildCommand {
    pub fn new(program: impl Into<String>, args: Vec<OsString>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
            envs: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// `npx rslib build [-c cfg] -w ...` for a dev session writing to `output_dir`
    pub fn rslib_watch(module: &LoadedModule, output_dir: &Path, forwarded: &[String]) -> Self {
        let args = rslib::rslib_args(&module.module_dir, true, forwarded);
        Self::new(rslib::npx_program(), args, &module.module_dir)
            .env(ENV_HOT, "true")
            .env(ENV_OUTPUT_NAME, module.output_name())
            .env(ENV_ENTRY, module.entry_path.as_os_str())
            .env(ENV_OUTPUT_DIR, output_dir.as_os_str())
    }

    pub fn display(&self) -> String {
        rslib::display_command(&self.program, &self.args)
    }
}

/// How a running build is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillPolicy {
    /// SIGTERM to the whole process group (the child leads its own group)
    ProcessGroup(i32),
    /// Kill only the direct child
    SingleProcess,
}

/// Handle to the supervised build process
pub struct BuildProcess {
    pid: Option<u32>,
    policy: KillPolicy,
    kill_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Option<ExitStatus>>>,
}

impl BuildProcess {
    /// Start the command. Failure to spawn is returned to the caller.
    pub fn spawn(command: BuildCommand) -> Result<Self> {
        let mut cmd = TokioCommand::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command.envs {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start build command: {}", command.display()))?;

        let pid = child.id();
        let policy = kill_policy_for(pid);
        tracing::debug!(?pid, ?policy, "build process started");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, |line| {
                log::success(format!("Source updated: {}", line))
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, |line| {
                log::error(format!("Build error: {}", line))
            }));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(error = %e, "kill failed");
                    }
                    child.wait().await
                }
            };

            match status {
                Ok(status) => {
                    match status.code() {
                        Some(code) => log::warn(format!("Build process exited with code {}", code)),
                        None => log::warn("Build process terminated by signal"),
                    }
                    Some(status)
                }
                Err(e) => {
                    log::error(format!("Failed to wait for build process: {}", e));
                    None
                }
            }
        });

        Ok(Self {
            pid,
            policy,
            kill_tx: Some(kill_tx),
            task: Some(task),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kill_policy(&self) -> KillPolicy {
        self.policy
    }

    /// True once the child has exited (or was never running)
    pub fn has_exited(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop the build and wait (bounded) for it to exit.
    /// Returns the exit status when one was observed. Idempotent.
    pub async fn terminate(&mut self) -> Option<ExitStatus> {
        let mut task = self.task.take()?;

        if !task.is_finished() {
            match self.policy {
                KillPolicy::ProcessGroup(pgid) => {
                    if let Err(e) = signal_group(pgid) {
                        log::warn(format!(
                            "Failed to signal build process group {}: {}; killing the child only",
                            pgid, e
                        ));
                        self.kill_child();
                    }
                }
                KillPolicy::SingleProcess => self.kill_child(),
            }
        }

        match timeout(TERMINATE_GRACE, &mut task).await {
            Ok(Ok(status)) => return status,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "build supervisor task failed");
                return None;
            }
            Err(_) => {}
        }

        log::warn("Build process did not exit in time; killing it");
        self.kill_child();
        match timeout(TERMINATE_GRACE, &mut task).await {
            Ok(Ok(status)) => status,
            _ => {
                task.abort();
                None
            }
        }
    }

    fn kill_child(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn pump_lines<R, F>(reader: R, emit: F)
where
    R: AsyncRead + Unpin,
    F: Fn(&str),
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    emit(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading build output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn kill_policy_for(pid: Option<u32>) -> KillPolicy {
    match pid.and_then(|pid| i32::try_from(pid).ok()) {
        Some(pgid) if pgid > 0 => KillPolicy::ProcessGroup(pgid),
        _ => KillPolicy::SingleProcess,
    }
}

#[cfg(not(unix))]
fn kill_policy_for(_pid: Option<u32>) -> KillPolicy {
    KillPolicy::SingleProcess
}

#[cfg(unix)]
fn signal_group(pgid: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(-pgid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    // Group already gone
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn signal_group(_pgid: i32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process groups are not supported on this platform",
    ))
}
