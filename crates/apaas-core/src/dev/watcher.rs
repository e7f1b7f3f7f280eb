//! Output directory watcher
//!
//! Watches the session output directory recursively and turns notify events
//! into [`FileEvent`]s. Paths with a dot-prefixed component below the root are
//! ignored. Once [`OutputWatcher::close`] has been called nothing else is
//! forwarded.
//!
//! The watcher remembers which paths exist below the root, so a file that is
//! recreated or renamed over an existing one is reported as a change.

use crate::log;
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Add,
    Change,
    Unlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    /// Base name of the affected path
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub struct OutputWatcher {
    watcher: Option<RecommendedWatcher>,
    closed: Arc<AtomicBool>,
    root: PathBuf,
}

impl OutputWatcher {
    /// Start watching `root`; events arrive on the returned receiver
    pub fn start(root: &Path) -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let mut known = KnownPaths::scan(root);

        let closed_flag = Arc::clone(&closed);
        let root_clone = root.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if closed_flag.load(Ordering::SeqCst) {
                return;
            }
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::error(format!("File watch error: {}", e));
                    return;
                }
            };

            for path in &event.paths {
                if should_ignore(path, &root_clone) {
                    continue;
                }
                let Some(kind) = classify(&event.kind, path) else {
                    continue;
                };
                let kind = known.record(kind, path);
                let _ = tx.send(FileEvent {
                    kind,
                    path: path.clone(),
                });
            }
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        Ok((
            Self {
                watcher: Some(watcher),
                closed,
                root: root.to_path_buf(),
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop watching. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                tracing::debug!(error = %e, "unwatch failed");
            }
        }
    }
}

impl Drop for OutputWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// True for paths outside `root` or with a dot-prefixed component below it
pub fn should_ignore(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };

    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}

/// Paths currently present below the watched root
#[derive(Debug, Default)]
struct KnownPaths(HashSet<PathBuf>);

impl KnownPaths {
    fn scan(root: &Path) -> Self {
        let paths = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| !should_ignore(path, root))
            .collect();
        Self(paths)
    }

    /// Turn an add on a path that already exists into a change
    fn record(&mut self, kind: FileEventKind, path: &Path) -> FileEventKind {
        match kind {
            FileEventKind::Add if !self.0.insert(path.to_path_buf()) => FileEventKind::Change,
            FileEventKind::Add => FileEventKind::Add,
            FileEventKind::Change => {
                self.0.insert(path.to_path_buf());
                FileEventKind::Change
            }
            FileEventKind::Unlink => {
                self.0.remove(path);
                FileEventKind::Unlink
            }
        }
    }
}

fn classify(kind: &EventKind, path: &Path) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Add),
        EventKind::Remove(_) => Some(FileEventKind::Unlink),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            Some(FileEventKind::Change)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEventKind::Add),
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
            FileEventKind::Add
        } else {
            FileEventKind::Unlink
        }),
        _ => None,
    }
}
