//! Loopback port selection for the session server

use crate::error::ApaasError;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;

/// Port tried first
pub const DEFAULT_PORT: u16 = 3000;

/// Candidate ports: `start` followed by `span` more
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub span: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT,
            span: 100,
        }
    }
}

impl PortRange {
    pub fn candidates(&self) -> impl Iterator<Item = u16> {
        let end = self.start.saturating_add(self.span);
        self.start..=end
    }
}

/// Bind `127.0.0.1` on the first candidate that is free.
///
/// The bound listener is returned rather than the number, so nothing can
/// take the port between the probe and the server start.
pub async fn bind_first_free(range: PortRange) -> Result<TcpListener, ApaasError> {
    for port in range.candidates() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::debug!(port, error = %e, "port unavailable"),
        }
    }

    Err(ApaasError::Resource(format!(
        "No free port in 127.0.0.1:{}-{}",
        range.start,
        range.start.saturating_add(range.span)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_has_101_candidates() {
        let range = PortRange::default();
        let ports: Vec<u16> = range.candidates().collect();
        assert_eq!(ports.len(), 101);
        assert_eq!(ports.first(), Some(&3000));
        assert_eq!(ports.last(), Some(&3100));
    }

    #[tokio::test]
    async fn test_skips_occupied_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }

        let listener = bind_first_free(PortRange { start: port, span: 1 }).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port + 1);
    }

    #[tokio::test]
    async fn test_all_occupied_is_resource_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_first_free(PortRange { start: port, span: 0 }).await.unwrap_err();
        assert!(matches!(err, ApaasError::Resource(_)));
    }
}
