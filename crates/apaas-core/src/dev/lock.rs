//! Exclusive ownership of a session output directory
//!
//! A `<outputName>.session.lock` file next to the output directory records the
//! PID of the owning session. A second session for the same output name is
//! refused while that process is alive; locks left behind by dead processes
//! are replaced.
//!
//! The PID is written to a private file first and hard-linked into place, so
//! the lock file never exists without its content.

use crate::error::ApaasError;
use crate::log;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const LOCK_SUFFIX: &str = ".session.lock";

static STAGING_SEQ: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    released: bool,
}

impl SessionLock {
    /// Lock file path for an output directory
    pub fn path_for(output_dir: &Path) -> Result<PathBuf, ApaasError> {
        let name = output_dir.file_name().ok_or_else(|| {
            ApaasError::path("Output directory has no final component", output_dir)
        })?;
        let mut file_name = name.to_os_string();
        file_name.push(LOCK_SUFFIX);
        Ok(output_dir.with_file_name(file_name))
    }

    pub fn acquire(output_dir: &Path) -> Result<Self, ApaasError> {
        let path = Self::path_for(output_dir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ApaasError::Resource(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Second attempt only happens after a stale lock was removed
        for _ in 0..2 {
            match publish_pid(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "session lock acquired");
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match read_owner(&path) {
                    Some(pid) if process_alive(pid) => {
                        return Err(ApaasError::config(format!(
                            "Another session (pid {}) is already using {}\nremove {} if no session is running",
                            pid,
                            output_dir.display(),
                            path.display()
                        )));
                    }
                    _ => {
                        log::warn(format!("Replacing stale session lock: {}", path.display()));
                        match fs::remove_file(&path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => {
                                return Err(ApaasError::Resource(format!(
                                    "Failed to remove stale lock {}: {}",
                                    path.display(),
                                    e
                                )))
                            }
                        }
                    }
                },
                Err(e) => {
                    return Err(ApaasError::Resource(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        Err(ApaasError::Resource(format!(
            "Could not acquire session lock {}",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn(format!(
                "Failed to remove session lock {}: {}",
                self.path.display(),
                e
            )),
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Create `path` holding this process's PID, failing with `AlreadyExists` if
/// it is taken
fn publish_pid(path: &Path) -> io::Result<()> {
    let mut staging = path.as_os_str().to_os_string();
    staging.push(format!(
        ".{}.{}",
        std::process::id(),
        STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let staging = PathBuf::from(staging);

    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staging)
        .and_then(|mut file| write!(file, "{}", std::process::id()));
    let result = written.and_then(|()| fs::hard_link(&staging, path));

    if let Err(e) = fs::remove_file(&staging) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!(path = %staging.display(), error = %e, "staging file left behind");
        }
    }
    result
}

fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 only performs the existence and permission checks
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

// No cheap liveness probe here; an existing lock is assumed to be held
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_sibling_of_output_dir() {
        let path = SessionLock::path_for(Path::new("/work/zip/hello")).unwrap();
        assert_eq!(path, PathBuf::from("/work/zip/hello.session.lock"));
    }

    #[test]
    fn test_acquire_writes_pid_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("zip/hello");

        let mut lock = SessionLock::acquire(&output).unwrap();
        let content = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(content, std::process::id().to_string());

        lock.release();
        assert!(!lock.path().exists());
        lock.release();
    }

    #[test]
    fn test_live_owner_refuses_second_session() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello");

        let _held = SessionLock::acquire(&output).unwrap();
        let err = SessionLock::acquire(&output).unwrap_err();
        assert!(matches!(err, ApaasError::Config(_)));
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello");
        let path = {
            let lock = SessionLock::acquire(&output).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
        SessionLock::acquire(&output).unwrap();
    }

    #[test]
    fn test_unreadable_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello");
        fs::write(SessionLock::path_for(&output).unwrap(), "not a pid").unwrap();

        let lock = SessionLock::acquire(&output).unwrap();
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello");
        let barrier = std::sync::Barrier::new(8);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        SessionLock::acquire(&output)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, ApaasError::Config(_)));
        }

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("hello.session.lock")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_owner_is_replaced() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("hello");
        fs::write(SessionLock::path_for(&output).unwrap(), dead_pid.to_string()).unwrap();

        assert!(SessionLock::acquire(&output).is_ok());
    }
}
