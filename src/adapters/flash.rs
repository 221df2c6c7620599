//! Flash-partition sink adapter — backed by the `esp-ota` crate.
//!
//! On ESP-IDF targets the `esp-ota` crate wraps the ESP-IDF OTA partition
//! API (safe begin/write/finalize/set-boot, abort on drop).  On simulation
//! targets the image accumulates in memory so the full pipeline runs on the
//! host.

use log::{info, warn};

use crate::agent::ports::{FlashSink, FlashSinkError};

/// Simulation image cap; mirrors the 4 MB app partition of the reference
/// layout.
#[cfg(not(target_os = "espidf"))]
const SIM_PARTITION_SIZE: usize = 4 * 1024 * 1024;

pub struct OtaPartitionSink {
    open: bool,
    errored: bool,

    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(target_os = "espidf")]
    completed: Option<esp_ota::CompletedOtaUpdate>,

    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    finalized: bool,
    #[cfg(not(target_os = "espidf"))]
    armed: bool,
}

impl OtaPartitionSink {
    pub fn new() -> Self {
        Self {
            open: false,
            errored: false,
            #[cfg(target_os = "espidf")]
            update: None,
            #[cfg(target_os = "espidf")]
            completed: None,
            #[cfg(not(target_os = "espidf"))]
            image: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            finalized: false,
            #[cfg(not(target_os = "espidf"))]
            armed: false,
        }
    }

    /// Simulation: the accumulated image bytes.
    #[cfg(not(target_os = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Simulation: whether the image was armed as the boot target.
    #[cfg(not(target_os = "espidf"))]
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Default for OtaPartitionSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashSink for OtaPartitionSink {
    fn begin(&mut self, expected_size: Option<u32>) -> Result<(), FlashSinkError> {
        if self.open {
            return Err(FlashSinkError::new("begin", -1));
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("flash: begin failed: {e:?}");
                FlashSinkError::new("begin", -1)
            })?;
            self.update = Some(update);
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.image.clear();
            self.finalized = false;
            self.armed = false;
        }

        self.open = true;
        self.errored = false;
        info!(
            "flash: partition opened (expected size {})",
            expected_size.map_or_else(|| "unknown".to_string(), |s| s.to_string())
        );
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FlashSinkError> {
        if !self.open {
            return Err(FlashSinkError::new("write", -1));
        }

        #[cfg(target_os = "espidf")]
        {
            let update = self
                .update
                .as_mut()
                .ok_or_else(|| FlashSinkError::new("write", -1))?;
            if let Err(e) = update.write(data) {
                warn!("flash: write failed: {e:?}");
                self.errored = true;
                return Err(FlashSinkError::new("write", -1));
            }
        }
        #[cfg(not(target_os = "espidf"))]
        {
            if self.image.len() + data.len() > SIM_PARTITION_SIZE {
                self.errored = true;
                return Err(FlashSinkError::new("write", -2));
            }
            self.image.extend_from_slice(data);
        }

        Ok(())
    }

    fn finalize(&mut self, commit: bool) -> Result<(), FlashSinkError> {
        if !self.open {
            return Err(FlashSinkError::new("finalize", -1));
        }
        if !commit {
            self.abort();
            return Ok(());
        }

        #[cfg(target_os = "espidf")]
        {
            let update = self
                .update
                .take()
                .ok_or_else(|| FlashSinkError::new("finalize", -1))?;
            let completed = update.finalize().map_err(|e| {
                warn!("flash: finalize failed: {e:?}");
                self.open = false;
                self.errored = true;
                FlashSinkError::new("finalize", -1)
            })?;
            self.completed = Some(completed);
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.finalized = true;
        }

        self.open = false;
        info!("flash: partition finalized");
        Ok(())
    }

    fn activate(&mut self) -> Result<(), FlashSinkError> {
        #[cfg(target_os = "espidf")]
        {
            let completed = self
                .completed
                .as_mut()
                .ok_or_else(|| FlashSinkError::new("activate", -1))?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("flash: set_as_boot_partition failed: {e:?}");
                FlashSinkError::new("activate", -1)
            })?;
        }
        #[cfg(not(target_os = "espidf"))]
        {
            if !self.finalized {
                return Err(FlashSinkError::new("activate", -1));
            }
            self.armed = true;
        }

        info!("flash: boot partition armed");
        Ok(())
    }

    fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when the OtaUpdate is dropped.
            self.update.take();
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.image.clear();
            self.finalized = false;
            self.armed = false;
        }
        if self.open {
            warn!("flash: write session aborted");
        }
        self.open = false;
        self.errored = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn has_error(&self) -> bool {
        self.errored
    }
}
