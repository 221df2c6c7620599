//! Byte-stream socket abstraction for firmware downloads.
//!
//! Each download opens a dedicated connection (never the control channel's
//! TLS session) so the large, slow transfer cannot corrupt the broker
//! connection's session state.  Reads are non-blocking: `Ok(0)` means "no
//! data yet", an orderly EOF surfaces as [`SocketError::Closed`] so the
//! downloader can distinguish completion from starvation.

use core::fmt;

use crate::config::TlsSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    /// TCP connect refused or host unreachable.
    Refused,
    /// TLS handshake or session failure.
    Tls,
    /// Peer closed the connection (orderly EOF).
    Closed,
    /// Any other I/O failure.
    Io,
    /// Operation on a socket that is not connected.
    NotConnected,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => write!(f, "connection refused"),
            Self::Tls => write!(f, "TLS handshake failed"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::Io => write!(f, "socket I/O error"),
            Self::NotConnected => write!(f, "socket not connected"),
        }
    }
}

/// Client socket for one firmware download.
///
/// `tls` carries the trust configuration for HTTPS origins; `None` selects
/// plain TCP.  The connect call is the one place a brief block is tolerated
/// (name resolution + handshake); everything after it is non-blocking.
pub trait DownloadSocket {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        tls: Option<&TlsSettings>,
    ) -> Result<(), SocketError>;

    /// Write the full buffer (the request is a few dozen bytes).
    fn write_all(&mut self, data: &[u8]) -> Result<(), SocketError>;

    /// Read up to `buf.len()` bytes.  `Ok(0)` when nothing is available,
    /// `Err(Closed)` on EOF.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketError>;

    /// Release the connection.  Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
