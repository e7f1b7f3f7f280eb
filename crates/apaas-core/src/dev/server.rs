//! Session HTTP server: static output directory plus a change event stream
//!
//! The same directory is served at `/`, `/app/<outputName>/` and
//! `/m/<outputName>/`. `GET /sse` keeps a server-sent event stream open and
//! receives one message per broadcast.

use crate::error::ApaasError;
use crate::log;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::get,
    Router,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Pending messages per client before new ones are dropped for it
const CLIENT_BUFFER: usize = 100;

/// Message pushed to clients when a built file changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeNotification {
    pub event: &'static str,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

impl ChangeNotification {
    pub fn change(file_name: impl Into<String>) -> Self {
        Self {
            event: "change",
            file_path: file_name.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Connected event stream clients
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    next_id: AtomicUsize,
}

impl ClientRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: usize) -> bool {
        self.clients.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Drop every sender so open streams end
    pub fn close_all(&self) {
        self.clients.write().clear();
    }

    /// One delivery attempt per client; returns how many accepted the message.
    /// Clients whose stream is gone are removed.
    pub fn broadcast(&self, message: &str) -> usize {
        let clients: Vec<(usize, mpsc::Sender<String>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(client = id, "client lagging, message dropped")
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut clients = self.clients.write();
            for id in closed {
                clients.remove(&id);
            }
        }

        delivered
    }
}

/// Unregisters a client when its response stream is dropped
struct ClientGuard {
    id: usize,
    registry: Arc<ClientRegistry>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if self.registry.unregister(self.id) {
            log::info("SSE client disconnected");
        }
    }
}

/// `outputName` is mounted as a literal URL segment
pub fn check_mount_name(output_name: &str) -> Result<(), ApaasError> {
    let url_safe = !output_name.is_empty()
        && output_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.~@".contains(c));
    if url_safe {
        Ok(())
    } else {
        Err(ApaasError::config(format!(
            "`outputName` '{}' cannot be used as a URL segment (allowed: letters, digits, - _ . ~ @)",
            output_name
        )))
    }
}

/// Router serving `static_dir` under every prefix, plus `/sse`
pub fn router(
    static_dir: &Path,
    output_name: &str,
    registry: Arc<ClientRegistry>,
) -> Result<Router, ApaasError> {
    check_mount_name(output_name)?;

    Ok(Router::new()
        .route("/sse", get(handle_sse))
        .with_state(registry)
        .nest_service(&format!("/app/{}", output_name), ServeDir::new(static_dir))
        .nest_service(&format!("/m/{}", output_name), ServeDir::new(static_dir))
        // Bare root kept for older plugins
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ))
}

/// Serve until the listener fails or the task is aborted
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app).await
}

async fn handle_sse(State(registry): State<Arc<ClientRegistry>>) -> impl IntoResponse {
    let (id, mut rx) = registry.register();
    log::info("New SSE client connected");
    tracing::debug!(client = id, total = registry.len(), "sse client registered");

    let guard = ClientGuard { id, registry };
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(message) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(message));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
