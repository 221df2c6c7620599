//! OTA agent core: status model, pending-update record, ports, service.

pub mod announcement;
pub mod ports;
pub mod service;

// ---------------------------------------------------------------------------
// Agent status
// ---------------------------------------------------------------------------

/// Top-level agent state.  Exactly one value at any time; transitions are
/// serialized by [`step`](service::OtaAgent::step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    Idle,
    Checking,
    Downloading,
    Installing,
    Success,
    Error,
    Rollback,
}

impl OtaStatus {
    /// Callback-facing name.  `"UNKNOWN"` is reserved for forward
    /// compatibility on the observer surface and is never produced here.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Checking => "CHECKING",
            Self::Downloading => "DOWNLOADING",
            Self::Installing => "INSTALLING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Rollback => "ROLLBACK",
        }
    }
}

// ---------------------------------------------------------------------------
// Pending update
// ---------------------------------------------------------------------------

/// The accepted-but-not-yet-installed update.  At most one exists; it is
/// cleared when the download succeeds, permanently fails, or the agent is
/// reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub version: String,
    pub url: String,
    pub checksum: String,
}
