//! Development session for a custom module (`apaas run`)
//!
//! This module provides:
//! - A loopback static server with a server-sent event endpoint
//! - Supervision of the `rslib build -w` process
//! - Output directory watching and change broadcast
//! - Session lifecycle with idempotent teardown

pub mod lock;
pub mod port;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod watcher;

pub use lock::SessionLock;
pub use port::{bind_first_free, PortRange, DEFAULT_PORT};
pub use server::{router, ChangeNotification, ClientRegistry};
pub use session::{run_session, Session, SessionOptions, SessionState, ShutdownReason};
pub use supervisor::{BuildCommand, BuildProcess, KillPolicy};
pub use watcher::{FileEvent, FileEventKind, OutputWatcher};
