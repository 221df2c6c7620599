//! Step-cadence watchdog for the agent loop.
//!
//! Two layers of stall protection:
//!
//! - A soft supervisor measures the gap between consecutive feeds and
//!   counts steps that overran their budget.  The downloader promises to
//!   yield within `yield_interval_ms`; a creeping step time breaks that
//!   promise (and starves the broker keep-alive) long before the hardware
//!   watchdog would notice, so overruns are surfaced in the log while the
//!   device is still debuggable.
//! - On ESP-IDF targets the Task Watchdog Timer is armed as the hard
//!   backstop: if the loop wedges outright (hung TLS handshake, livelocked
//!   driver), the device resets and the bootloader's rollback policy takes
//!   over.
//!
//! The main loop calls [`feed`](StepWatchdog::feed) once per iteration.

use log::warn;

/// Hardware backstop.  Generous next to the step budget; tight enough to
/// catch a wedged handshake.
#[cfg(target_os = "espidf")]
const TWDT_TIMEOUT_MS: u32 = 10_000;

pub struct StepWatchdog {
    /// Longest acceptable gap between feeds.  Anything slower means a
    /// step blew through the cooperative-yield contract.
    stall_budget_ms: u64,
    last_feed_ms: Option<u64>,
    consecutive_overruns: u32,
    #[cfg(target_os = "espidf")]
    twdt_armed: bool,
}

impl StepWatchdog {
    /// Arm the watchdog with the given per-step budget.
    pub fn new(stall_budget_ms: u64) -> Self {
        Self {
            stall_budget_ms,
            last_feed_ms: None,
            consecutive_overruns: 0,
            #[cfg(target_os = "espidf")]
            twdt_armed: Self::arm_twdt(),
        }
    }

    /// Record one loop iteration at `now_ms` and kick the hardware timer.
    ///
    /// The first feed only establishes the baseline.  A gap above the
    /// budget counts as an overrun; a step back inside the budget clears
    /// the streak.
    pub fn feed(&mut self, now_ms: u64) {
        if let Some(last) = self.last_feed_ms {
            let gap = now_ms.saturating_sub(last);
            if gap > self.stall_budget_ms {
                self.consecutive_overruns += 1;
                warn!(
                    "watchdog: step took {gap} ms (budget {} ms, {} in a row)",
                    self.stall_budget_ms, self.consecutive_overruns
                );
            } else {
                self.consecutive_overruns = 0;
            }
        }
        self.last_feed_ms = Some(now_ms);
        self.kick_twdt();
    }

    /// Kick the hardware timer and move the baseline without judging the
    /// elapsed time.  For phases that intentionally run slower than the
    /// step cadence, like waiting for the link to come up.
    pub fn feed_idle(&mut self, now_ms: u64) {
        self.last_feed_ms = Some(now_ms);
        self.consecutive_overruns = 0;
        self.kick_twdt();
    }

    /// Steps in a row that exceeded the budget.  Diagnostic only; the
    /// hardware timer is what actually resets the device.
    pub fn consecutive_overruns(&self) -> u32 {
        self.consecutive_overruns
    }

    // ── TWDT backstop ─────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn arm_twdt() -> bool {
        use esp_idf_svc::sys::*;
        unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms: TWDT_TIMEOUT_MS,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            if esp_task_wdt_reconfigure(&cfg) != ESP_OK {
                warn!("watchdog: TWDT reconfigure failed (may already be configured)");
            }
            let armed = esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK;
            if !armed {
                warn!("watchdog: TWDT subscribe failed, soft supervision only");
            }
            armed
        }
    }

    #[cfg(target_os = "espidf")]
    fn kick_twdt(&self) {
        if self.twdt_armed {
            unsafe {
                esp_idf_svc::sys::esp_task_wdt_reset();
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn kick_twdt(&self) {}
}
