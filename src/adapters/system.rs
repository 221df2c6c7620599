//! System-control adapter: reboot, cooperative yield, delays.
//!
//! The yield path keeps the FreeRTOS idle task (and with it the watchdog)
//! serviced during the download hot loop; a 1 ms sleep is enough to let
//! lower-priority tasks run.

use crate::agent::ports::SystemPort;

pub struct EspSystem;

impl EspSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EspSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPort for EspSystem {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        log::info!("system: restarting");
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        log::warn!("system(sim): restart requested");
    }

    fn yield_now(&mut self) {
        #[cfg(target_os = "espidf")]
        std::thread::sleep(std::time::Duration::from_millis(1));
        #[cfg(not(target_os = "espidf"))]
        std::thread::yield_now();
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
