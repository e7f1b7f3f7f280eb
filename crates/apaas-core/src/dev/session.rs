//! Development session lifecycle (`apaas run`)
//!
//! A session owns everything it starts: the output directory lock, the HTTP
//! server task, the rslib watch process and the output watcher. Teardown takes
//! each handle out of its `Option`, so it is safe after a partial start and
//! when called twice.

use super::lock::SessionLock;
use super::port::{bind_first_free, PortRange};
use super::server::{self, ChangeNotification, ClientRegistry};
use super::supervisor::{BuildCommand, BuildProcess};
use super::watcher::{FileEvent, FileEventKind, OutputWatcher};
use crate::build::ZIP_ROOT;
use crate::error::ApaasError;
use crate::log;
use crate::module::{load_module, Purpose};
use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Serving,
    ShuttingDown,
    Terminated,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Idle, Terminated)
                | (Starting, Serving)
                | (Starting, ShuttingDown)
                | (Serving, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Serving => "serving",
            SessionState::ShuttingDown => "shutting down",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why a serving session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    ServerExited,
}

/// Inputs of `apaas run`
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub module_dir: PathBuf,
    pub config_name: Option<String>,
    /// Extra arguments appended to the rslib command line
    pub forwarded_args: Vec<String>,
    pub cwd: PathBuf,
    pub open_browser: bool,
    pub port_range: PortRange,
}

pub struct Session {
    state: SessionState,
    output_name: String,
    output_dir: PathBuf,
    cwd: PathBuf,
    registry: Arc<ClientRegistry>,
    url: Option<String>,
    lock: Option<SessionLock>,
    owned_dir: Option<PathBuf>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    build: Option<BuildProcess>,
    watcher: Option<OutputWatcher>,
    forwarder: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(output_name: impl Into<String>, output_dir: PathBuf, cwd: PathBuf) -> Self {
        Self {
            state: SessionState::Idle,
            output_name: output_name.into(),
            output_dir,
            cwd,
            registry: ClientRegistry::new(),
            url: None,
            lock: None,
            owned_dir: None,
            server: None,
            build: None,
            watcher: None,
            forwarder: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Base URL once the server is bound
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    fn transition(&mut self, next: SessionState) -> Result<(), ApaasError> {
        if !self.state.can_transition_to(next) {
            return Err(ApaasError::Resource(format!(
                "Invalid session transition: {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "session state");
        self.state = next;
        Ok(())
    }

    /// Bring the session up to `Serving`.
    ///
    /// Failing to lock, create the output directory or bind a port is fatal.
    /// A build that cannot be spawned or a watcher that cannot start is only
    /// logged.
    pub async fn start(
        &mut self,
        build: BuildCommand,
        port_range: PortRange,
        open_browser: bool,
    ) -> Result<()> {
        self.transition(SessionState::Starting)?;
        server::check_mount_name(&self.output_name)?;

        self.lock = Some(SessionLock::acquire(&self.output_dir)?);
        self.owned_dir = Some(self.output_dir.clone());
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            ApaasError::Resource(format!(
                "Failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let listener = bind_first_free(port_range).await?;
        let port = listener.local_addr()?.port();
        self.transition(SessionState::Serving)?;

        let app = server::router(&self.output_dir, &self.output_name, self.registry())?;
        self.server = Some(tokio::spawn(server::serve(listener, app)));

        let url = format!("http://127.0.0.1:{}/", port);
        log::success(format!("Static server started: {}", url));
        if port != port_range.start {
            log::warn(format!(
                "Port {} is in use, switched to port {}",
                port_range.start, port
            ));
        }
        log::info(format!("Static directory: {}", self.output_dir.display()));
        self.url = Some(url.clone());

        log::info(format!("Build command: {}", build.display()));
        match BuildProcess::spawn(build) {
            Ok(process) => self.build = Some(process),
            Err(e) => log::error(format!("{:#}", e)),
        }

        match OutputWatcher::start(&self.output_dir) {
            Ok((watcher, rx)) => {
                log::info(format!("Watching build output: {}", self.output_dir.display()));
                self.watcher = Some(watcher);
                self.forwarder = Some(tokio::spawn(forward_changes(
                    rx,
                    self.registry(),
                    self.cwd.clone(),
                )));
            }
            Err(e) => log::error(format!("{:#}", e)),
        }

        if open_browser {
            if let Err(e) = open::that(&url) {
                log::warn(format!("Failed to open browser: {}", e));
            }
        }

        Ok(())
    }

    /// Wait for SIGINT/SIGTERM or for the server task to end
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        let server = async {
            match self.server.as_mut() {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = shutdown_signal() => {
                log::warn("Received termination signal, shutting down...");
                ShutdownReason::Signal
            }
            result = server => {
                match result {
                    Ok(Ok(())) => log::error("Static server stopped unexpectedly"),
                    Ok(Err(e)) => log::error(format!("Static server error: {}", e)),
                    Err(e) => log::error(format!("Static server task failed: {}", e)),
                }
                ShutdownReason::ServerExited
            }
        }
    }

    /// Release everything the session holds. Failures are logged only.
    pub async fn teardown(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        if self.state != SessionState::ShuttingDown {
            let _ = self.transition(SessionState::ShuttingDown);
        }

        if let Some(mut watcher) = self.watcher.take() {
            watcher.close();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(mut build) = self.build.take() {
            build.terminate().await;
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
        self.registry.close_all();

        if let Some(dir) = self.owned_dir.take() {
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    log::warn(format!(
                        "Failed to remove output directory {}: {}",
                        dir.display(),
                        e
                    ));
                }
            }
        }
        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }

        self.state = SessionState::Terminated;
        tracing::debug!("session terminated");
    }
}

/// Run a development session until it is interrupted.
///
/// Configuration and path errors are returned before anything is started.
pub async fn run_session(options: SessionOptions) -> Result<()> {
    let module = load_module(
        &options.module_dir,
        &options.cwd,
        options.config_name.as_deref(),
        Purpose::Run,
    )?;

    let output_dir = options.cwd.join(ZIP_ROOT).join(module.output_name());
    let build = BuildCommand::rslib_watch(&module, &output_dir, &options.forwarded_args);

    let mut session = Session::new(module.output_name(), output_dir, options.cwd.clone());
    if let Err(e) = session
        .start(build, options.port_range, options.open_browser)
        .await
    {
        session.teardown().await;
        return Err(e);
    }

    session.wait_for_shutdown().await;
    session.teardown().await;
    Ok(())
}

async fn forward_changes(
    mut rx: mpsc::UnboundedReceiver<FileEvent>,
    registry: Arc<ClientRegistry>,
    cwd: PathBuf,
) {
    while let Some(event) = rx.recv().await {
        if event.kind != FileEventKind::Change {
            continue;
        }
        let shown = event.path.strip_prefix(&cwd).unwrap_or(&event.path);
        log::info(format!("Build output changed: {}", shown.display()));

        let message = ChangeNotification::change(event.file_name()).to_json();
        let delivered = registry.broadcast(&message);
        if delivered > 0 {
            log::info(format!("Sent reload notification to {} client(s)", delivered));
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error(format!("Failed to listen for Ctrl+C: {}", e));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::debug!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
