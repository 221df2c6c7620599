//! Installer — commits the newly written partition or arranges rollback.
//!
//! These are the only operations where a longer blocking call is
//! acceptable; the installer never holds the flash sink open across steps.

use log::{info, warn};

use crate::agent::ports::{FlashSink, SystemPort};
use crate::error::OtaError;

/// Delay before the rollback reset so the error event can drain to its
/// sinks.
pub const ROLLBACK_DRAIN_MS: u32 = 2_000;

/// Close and arm the newly written partition.
///
/// On success the partition boots on the next reset; on failure the sink
/// has been aborted and the partial image can never be armed.
pub fn commit(flash: &mut impl FlashSink) -> Result<(), OtaError> {
    if flash.has_error() {
        flash.abort();
        return Err(OtaError::InstallFailure {
            op: "finalize",
            code: 0,
        });
    }

    if let Err(e) = flash.finalize(true) {
        flash.abort();
        return Err(OtaError::InstallFailure {
            op: "finalize",
            code: e.code,
        });
    }

    if let Err(e) = flash.activate() {
        return Err(OtaError::InstallFailure {
            op: "activate",
            code: e.code,
        });
    }

    info!("install: partition armed for next boot");
    Ok(())
}

/// Request a reboot into the previous image.
///
/// The bootloader's fallback-partition policy does the actual reverting;
/// this side only reports, drains, and resets.
pub fn rollback(sys: &mut impl SystemPort, obs: &mut impl crate::agent::ports::OtaObserver) {
    warn!("install: rollback requested, rebooting to previous image");
    obs.on_error("manual rollback required - rebooting to previous image", 0);
    sys.delay_ms(ROLLBACK_DRAIN_MS);
    sys.restart();
}

/// Confirm the running image on startup.
///
/// Without this, the bootloader's rollback watchdog reverts to the previous
/// firmware after a few failed boots.
#[cfg(target_os = "espidf")]
pub fn mark_boot_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("install: running image confirmed (rollback cancelled)"),
        Err(e) => warn!("install: mark_app_valid failed: {e:?}"),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mark_boot_valid() {
    log::info!("install(sim): boot confirmation skipped");
}
