//! Log-based observer adapter.
//!
//! Implements [`OtaObserver`] by writing status transitions and errors to
//! the logger (UART / USB-CDC in production).  A host application that
//! wants richer reporting registers its own observer instead.

use log::{info, warn};

use crate::agent::ports::OtaObserver;
use crate::agent::OtaStatus;

/// Adapter that logs every status and error callback.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaObserver for LogObserver {
    fn on_status(&mut self, status: OtaStatus, progress: u8) {
        if status == OtaStatus::Downloading {
            info!("OTA | {} {}%", status.as_str(), progress);
        } else {
            info!("OTA | {}", status.as_str());
        }
    }

    fn on_error(&mut self, message: &str, code: i32) {
        warn!("OTA | error: {message} (code {code})");
    }
}
