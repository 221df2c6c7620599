//! WiFi link-state adapter.
//!
//! Association, credentials, and IP acquisition belong to the host
//! application; the agent only needs "link is up / link is down".
//!
//! - **`target_os = "espidf"`**: queries the driver for the associated AP.
//! - **all other targets**: a settable flag for simulation and tests.

use crate::agent::ports::LinkPort;

pub struct WifiLink {
    #[cfg(not(target_os = "espidf"))]
    up: bool,
}

impl WifiLink {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            up: true,
        }
    }

    /// Simulation control: flip the link state.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_up(&mut self, up: bool) {
        self.up = up;
    }
}

impl Default for WifiLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkPort for WifiLink {
    #[cfg(target_os = "espidf")]
    fn is_up(&self) -> bool {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut ap_info: wifi_ap_record_t = core::mem::zeroed();
            esp_wifi_sta_get_ap_info(&mut ap_info) == ESP_OK as i32
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_up(&self) -> bool {
        self.up
    }
}
