//! Unified error taxonomy for the OTA agent.
//!
//! A single flat enum that every sub-machine (control channel, downloader,
//! installer) converts its internal faults into, keeping the agent's error
//! reporting uniform.  Variants carry a `&'static str` detail or the numeric
//! code of the underlying flash primitive where one exists.

use core::fmt;

use crate::agent::ports::FlashSinkError;

// ---------------------------------------------------------------------------
// Agent-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaError {
    /// Link down, broker endpoint unconfigured, or a sub-machine is in the
    /// wrong state for the requested operation.
    NotReady(&'static str),
    /// Operation requested while an update is already in progress.
    Busy,
    /// Announcement payload missing a required field, carrying a non-string
    /// value, or violating the fragment protocol.
    MalformedAnnouncement(&'static str),
    /// Firmware URL scheme is not http/https, or the host is empty.
    BadUrl(&'static str),
    /// TCP connect refused, TLS handshake failed, or the socket closed
    /// unexpectedly.
    NetworkFailure(&'static str),
    /// The response-header phase exceeded its deadline.
    HeaderTimeout,
    /// The download attempt exceeded `download_timeout_ms`.
    Timeout,
    /// The server used a transfer encoding the downloader does not decode.
    UnsupportedEncoding,
    /// Zero body bytes after the headers.
    EmptyResponse,
    /// The flash update primitive reported failure.
    FlashError { op: &'static str, code: i32 },
    /// SHA-256 of the streamed image does not match the announcement.
    /// Terminal: the origin is authoritative, so retrying cannot help.
    ChecksumMismatch,
    /// Partition finalize or boot-arm failed.
    InstallFailure { op: &'static str, code: i32 },
}

impl OtaError {
    /// Numeric code from the underlying flash primitive where applicable,
    /// 0 otherwise.  Forwarded to the error callback.
    pub fn code(&self) -> i32 {
        match self {
            Self::FlashError { code, .. } | Self::InstallFailure { code, .. } => *code,
            _ => 0,
        }
    }

    /// Terminal errors are never retried; everything else counts against
    /// the retry budget.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ChecksumMismatch)
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(msg) => write!(f, "not ready: {msg}"),
            Self::Busy => write!(f, "update already in progress"),
            Self::MalformedAnnouncement(msg) => write!(f, "malformed announcement: {msg}"),
            Self::BadUrl(msg) => write!(f, "bad firmware URL: {msg}"),
            Self::NetworkFailure(msg) => write!(f, "network failure: {msg}"),
            Self::HeaderTimeout => write!(f, "response header timeout"),
            Self::Timeout => write!(f, "download timeout"),
            Self::UnsupportedEncoding => write!(f, "unsupported transfer encoding"),
            Self::EmptyResponse => write!(f, "no data received from server"),
            Self::FlashError { op, code } => write!(f, "flash {op} failed (code {code})"),
            Self::ChecksumMismatch => write!(f, "checksum verification failed"),
            Self::InstallFailure { op, code } => write!(f, "install {op} failed (code {code})"),
        }
    }
}

impl From<FlashSinkError> for OtaError {
    fn from(e: FlashSinkError) -> Self {
        Self::FlashError {
            op: e.op,
            code: e.code,
        }
    }
}
