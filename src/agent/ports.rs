//! Port traits — the hexagonal boundary between the agent core and the
//! platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ OtaAgent (domain)
//! ```
//!
//! Driven adapters (clock, WiFi link, flash partition, system control,
//! status sinks) implement these traits.  The agent consumes them as
//! `&mut impl Trait` parameters at its call sites, so the core never touches
//! ESP-IDF directly and the whole state machine runs on the host under test.
//!
//! The MQTT and download-socket ports live next to their state machines in
//! [`control::transport`](crate::control::transport) and
//! [`download::socket`](crate::download::socket).

use core::fmt;

use super::OtaStatus;

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.  Every deadline and throttle in the
/// core is computed against this, never against wall-clock time.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Network link
// ───────────────────────────────────────────────────────────────

/// Link-state query.  Association and IP acquisition belong to the host
/// application; the core only needs up/down.
pub trait LinkPort {
    fn is_up(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System control
// ───────────────────────────────────────────────────────────────

/// Reboot and scheduling hooks.
pub trait SystemPort {
    /// Request a software reset.  On the device this does not return; test
    /// doubles record the call instead.
    fn restart(&mut self);

    /// Cooperative yield so the platform watchdog and peer tasks get CPU
    /// time during the download hot loop.
    fn yield_now(&mut self);

    /// Blocking delay.  Only the installer's rollback drain uses this.
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Flash update partition
// ───────────────────────────────────────────────────────────────

/// Failure from the flash update primitive, carrying the primitive's
/// numeric code for the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSinkError {
    pub op: &'static str,
    pub code: i32,
}

impl FlashSinkError {
    pub fn new(op: &'static str, code: i32) -> Self {
        Self { op, code }
    }
}

impl fmt::Display for FlashSinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flash {} failed (code {})", self.op, self.code)
    }
}

/// The inactive-partition byte sink.
///
/// Exclusive resource: held by the downloader while streaming, handed to the
/// installer for commit, never both.  Every error path must end in
/// [`abort`](FlashSink::abort); a partially written partition must never be
/// armed.
pub trait FlashSink {
    /// Open the inactive partition for writing.  `expected_size` is a hint;
    /// `None` when the image size is not known up front.
    fn begin(&mut self, expected_size: Option<u32>) -> Result<(), FlashSinkError>;

    /// Append bytes, strictly in order.
    fn write(&mut self, data: &[u8]) -> Result<(), FlashSinkError>;

    /// Close the partition.  With `commit`, the image is marked complete.
    fn finalize(&mut self, commit: bool) -> Result<(), FlashSinkError>;

    /// Arm the newly written partition as the boot target for the next reset.
    fn activate(&mut self) -> Result<(), FlashSinkError>;

    /// Discard the in-progress write.  Idempotent; safe to call when the
    /// sink was never opened.
    fn abort(&mut self);

    /// Whether a write session is currently open.
    fn is_open(&self) -> bool;

    /// Whether the primitive has latched an error since `begin`.
    fn has_error(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Observer
// ───────────────────────────────────────────────────────────────

/// Status and error callbacks.
///
/// Delivered synchronously from the `step` that causes the transition.
/// Implementations must return promptly, must not re-enter the agent, and
/// must not panic.
pub trait OtaObserver {
    /// `progress` is 0–100 and only meaningful while `Downloading`.
    fn on_status(&mut self, status: OtaStatus, progress: u8);

    /// `code` is the numeric code from the flash primitive where
    /// applicable, 0 otherwise.
    fn on_error(&mut self, message: &str, code: i32);
}
