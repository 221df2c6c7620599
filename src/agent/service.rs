//! The OTA agent — top-level orchestrator.
//!
//! [`OtaAgent`] owns the agent status, the pending-update record, the retry
//! budget, and the two sub-machines (control channel, downloader).  It
//! exposes a clean, hardware-agnostic API; all I/O flows through port
//! traits injected at call sites, so the whole update pipeline runs on the
//! host with mock adapters.
//!
//! ```text
//!  MqttTransport ──▶ ┌──────────────────────────┐ ──▶ OtaObserver
//!                    │         OtaAgent          │
//! DownloadSocket ──▶ │ ControlChannel·Downloader │ ──▶ FlashSink
//!                    └──────────────────────────┘
//! ```
//!
//! The host calls [`step`](OtaAgent::step) every 10–100 ms.  A step never
//! blocks for more than one chunk of socket I/O.

use log::{error, info, warn};

use crate::cert::{self, CertError};
use crate::config::{BrokerConfig, OtaConfig, TlsSettings};
use crate::control::transport::MqttTransport;
use crate::control::ControlChannel;
use crate::download::socket::DownloadSocket;
use crate::download::{DownloadEvent, DownloadState, Downloader};
use crate::error::OtaError;
use crate::installer;
use crate::version;

use super::announcement::UpdateAnnouncement;
use super::ports::{Clock, FlashSink, LinkPort, OtaObserver, SystemPort};
use super::{OtaStatus, PendingUpdate};

// ───────────────────────────────────────────────────────────────
// OtaAgent
// ───────────────────────────────────────────────────────────────

pub struct OtaAgent {
    config: OtaConfig,
    tls: TlsSettings,
    status: OtaStatus,
    pending: Option<PendingUpdate>,
    retry_count: u32,
    last_check_ms: u64,
    started: bool,
    control: ControlChannel,
    downloader: Downloader,
}

impl OtaAgent {
    /// Build an agent listening on `update_topic`.  The configuration is
    /// validated here and immutable afterwards apart from the explicit
    /// setters.
    pub fn new(update_topic: impl Into<String>, config: OtaConfig) -> Result<Self, OtaError> {
        config.validate().map_err(OtaError::NotReady)?;
        Ok(Self {
            config,
            tls: TlsSettings::default(),
            status: OtaStatus::Idle,
            pending: None,
            retry_count: 0,
            last_check_ms: 0,
            started: false,
            control: ControlChannel::new(update_topic),
            downloader: Downloader::new(),
        })
    }

    // ── Configuration ─────────────────────────────────────────

    /// Store the broker endpoint.  No I/O.
    pub fn configure_broker(&mut self, broker: BrokerConfig) {
        self.control.configure(broker);
    }

    /// Install trust material for TLS connections (broker and HTTPS
    /// origin).  The CA blob must carry PEM framing; `insecure` disables
    /// verification and is logged on every use.
    pub fn configure_tls(
        &mut self,
        ca_pem: Option<Vec<u8>>,
        insecure: bool,
    ) -> Result<(), CertError> {
        if let Some(blob) = &ca_pem {
            cert::validate_cert_pem(blob)?;
        }
        if insecure {
            warn!("agent: TLS verification disabled (insecure mode)");
        }
        self.tls.ca_pem = ca_pem;
        self.tls.insecure = insecure;
        self.control.set_tls(self.tls.clone());
        Ok(())
    }

    /// Present a client certificate when the broker demands mutual TLS.
    /// Both blobs are validated before acceptance; rejecting a bad pair
    /// here beats an opaque handshake failure later.
    pub fn configure_client_cert(
        &mut self,
        cert_pem: Vec<u8>,
        key_pem: Vec<u8>,
    ) -> Result<(), CertError> {
        cert::validate_cert_pem(&cert_pem)?;
        cert::validate_key_pem(&key_pem)?;
        info!("agent: client certificate configured for mutual TLS");
        self.tls.client_cert_pem = Some(cert_pem);
        self.tls.client_key_pem = Some(key_pem);
        self.control.set_tls(self.tls.clone());
        Ok(())
    }

    pub fn set_check_interval_ms(&mut self, ms: u64) {
        self.config.check_interval_ms = ms;
    }

    pub fn set_download_timeout_ms(&mut self, ms: u64) {
        self.config.download_timeout_ms = ms;
    }

    pub fn set_max_retries(&mut self, retries: u32) {
        if retries > 0 {
            self.config.max_retries = retries;
        }
    }

    pub fn set_current_version(&mut self, version: impl Into<String>) {
        self.config.current_version = version.into();
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Arm the agent.  Requires the link to be up and a configured broker
    /// endpoint; the control channel's first connect attempt happens on the
    /// next [`step`] without throttle delay.
    pub fn start(&mut self, link: &impl LinkPort) -> Result<(), OtaError> {
        if !link.is_up() {
            return Err(OtaError::NotReady("network link is down"));
        }
        if !self.control.is_configured() {
            return Err(OtaError::NotReady("broker endpoint not configured"));
        }
        self.control.prime();
        self.started = true;
        info!(
            "agent: started (version {}, topic '{}')",
            self.config.current_version,
            self.control.topic()
        );
        Ok(())
    }

    /// One cooperative tick.  Control-channel processing always precedes
    /// download progression, and an announcement accepted in this step
    /// drives the downloader no earlier than the next step.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        clock: &impl Clock,
        link: &impl LinkPort,
        mqtt: &mut impl MqttTransport,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
        sys: &mut impl SystemPort,
        obs: &mut impl OtaObserver,
    ) {
        if !self.started {
            return;
        }
        let now = clock.now_ms();

        // 1. Link gate: tear down the channel, abort any in-flight
        //    download.  Status and pending survive, so the download
        //    restarts from byte 0 once the link returns.
        if !link.is_up() {
            self.control.disconnect(mqtt);
            if self.downloader.state() != DownloadState::Idle {
                warn!("agent: link down, aborting in-flight download");
                self.downloader.abort(sock, flash);
            }
            return;
        }

        let was_downloading = self.status == OtaStatus::Downloading;

        // 2. Control channel.
        match self
            .control
            .tick(now, mqtt, self.config.mqtt_connect_timeout_ms)
        {
            Ok(Some(ann)) => self.handle_announcement(ann, obs),
            Ok(None) => {}
            Err(e) => self.report(obs, &e),
        }

        // 3. Periodic self-check surfacing.  Updates arrive by push; this
        //    only makes the agent's liveness observable.
        if self.status == OtaStatus::Idle
            && now.saturating_sub(self.last_check_ms) >= self.config.check_interval_ms
        {
            self.last_check_ms = now;
            self.set_status(OtaStatus::Checking, 0, obs);
            self.set_status(OtaStatus::Idle, 0, obs);
        }

        // 4. Download progression.
        if was_downloading && self.status == OtaStatus::Downloading {
            self.drive_download(now, sock, flash, sys, obs);
        }
    }

    /// Bypass announcement parsing and start an update directly.
    pub fn force_update(
        &mut self,
        version: &str,
        url: &str,
        checksum: &str,
        obs: &mut impl OtaObserver,
    ) -> Result<(), OtaError> {
        if self.status != OtaStatus::Idle {
            return Err(OtaError::Busy);
        }
        info!("agent: forced update to {version} from {url}");
        self.pending = Some(PendingUpdate {
            version: version.into(),
            url: url.into(),
            checksum: checksum.into(),
        });
        self.retry_count = 0;
        self.set_status(OtaStatus::Downloading, 0, obs);
        Ok(())
    }

    /// Unconditional cancellation: abort the flash sink, clean the
    /// downloader, clear the pending update, return to Idle.  Idempotent.
    pub fn reset(&mut self, sock: &mut impl DownloadSocket, flash: &mut impl FlashSink) {
        self.downloader.abort(sock, flash);
        self.pending = None;
        self.retry_count = 0;
        self.status = OtaStatus::Idle;
        info!("agent: reset");
    }

    /// Publish a JSON status beacon on `topic`.  Optional surface; only
    /// valid while the control channel is connected.
    pub fn publish_status(
        &mut self,
        mqtt: &mut impl MqttTransport,
        topic: &str,
    ) -> Result<(), OtaError> {
        let beacon = serde_json::json!({
            "status": self.status.as_str(),
            "version": self.config.current_version,
        });
        self.control
            .publish(mqtt, topic, beacon.to_string().as_bytes())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self) -> OtaStatus {
        self.status
    }

    pub fn status_str(&self) -> &'static str {
        self.status.as_str()
    }

    pub fn current_version(&self) -> &str {
        &self.config.current_version
    }

    pub fn pending_version(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.version.as_str())
    }

    pub fn last_check_ms(&self) -> u64 {
        self.last_check_ms
    }

    pub fn is_update_in_progress(&self) -> bool {
        matches!(
            self.status,
            OtaStatus::Downloading | OtaStatus::Installing | OtaStatus::Rollback
        )
    }

    pub fn download_state(&self) -> DownloadState {
        self.downloader.state()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    // ── Announcement handling ─────────────────────────────────

    fn handle_announcement(&mut self, ann: UpdateAnnouncement, obs: &mut impl OtaObserver) {
        if self.status != OtaStatus::Idle {
            info!(
                "agent: ignoring announcement for {} while {}",
                ann.version,
                self.status.as_str()
            );
            return;
        }
        if !version::is_newer(&ann.version, &self.config.current_version) {
            info!(
                "agent: version {} is not newer than current {}",
                ann.version, self.config.current_version
            );
            return;
        }

        info!("agent: new version available: {}", ann.version);
        self.pending = Some(PendingUpdate {
            version: ann.version,
            url: ann.firmware_url,
            checksum: ann.checksum,
        });
        self.retry_count = 0;
        self.set_status(OtaStatus::Downloading, 0, obs);
    }

    // ── Download orchestration ────────────────────────────────

    fn drive_download(
        &mut self,
        now: u64,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
        sys: &mut impl SystemPort,
        obs: &mut impl OtaObserver,
    ) {
        // (Re)start an attempt; the first tick happens on the next step.
        if self.downloader.state() == DownloadState::Idle {
            let Some(p) = self.pending.clone() else {
                warn!("agent: downloading with no pending update, resetting");
                self.status = OtaStatus::Idle;
                return;
            };
            if let Err(e) =
                self.downloader
                    .begin(now, &p.url, &p.checksum, &self.config, &self.tls, sock, flash)
            {
                self.on_download_failure(e, sock, flash, obs);
            }
            return;
        }

        match self.downloader.tick(now, &self.config, sock, flash, sys) {
            DownloadEvent::Pending => {}
            DownloadEvent::Progress(pct) => obs.on_status(OtaStatus::Downloading, pct),
            DownloadEvent::Complete => self.install(sock, flash, sys, obs),
            DownloadEvent::Failed(e) => self.on_download_failure(e, sock, flash, obs),
        }
    }

    fn on_download_failure(
        &mut self,
        err: OtaError,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
        obs: &mut impl OtaObserver,
    ) {
        self.report(obs, &err);
        self.downloader.reset(sock, flash);

        if err.is_terminal() {
            self.pending = None;
            self.retry_count = 0;
            self.set_status(OtaStatus::Error, 0, obs);
            return;
        }

        self.retry_count += 1;
        if self.retry_count >= self.config.max_retries {
            self.pending = None;
            self.retry_count = 0;
            self.set_status(OtaStatus::Error, 0, obs);
        } else {
            info!(
                "agent: retry {}/{}",
                self.retry_count, self.config.max_retries
            );
            // Status stays Downloading; the next step restarts the attempt.
        }
    }

    fn install(
        &mut self,
        sock: &mut impl DownloadSocket,
        flash: &mut impl FlashSink,
        sys: &mut impl SystemPort,
        obs: &mut impl OtaObserver,
    ) {
        self.set_status(OtaStatus::Installing, 0, obs);

        match installer::commit(flash) {
            Ok(()) => {
                if let Some(p) = self.pending.take() {
                    self.config.current_version = p.version;
                }
                self.retry_count = 0;
                self.downloader.reset(sock, flash);
                self.set_status(OtaStatus::Success, 0, obs);
                info!(
                    "agent: update installed, now at {}; rebooting",
                    self.config.current_version
                );
                sys.restart();
            }
            Err(e) => {
                self.report(obs, &e);
                self.pending = None;
                self.retry_count = 0;
                self.downloader.reset(sock, flash);
                self.set_status(OtaStatus::Error, 0, obs);
                if self.config.enable_rollback {
                    self.set_status(OtaStatus::Rollback, 0, obs);
                    installer::rollback(sys, obs);
                }
            }
        }
    }

    // ── Reporting ─────────────────────────────────────────────

    fn set_status(&mut self, status: OtaStatus, progress: u8, obs: &mut impl OtaObserver) {
        self.status = status;
        info!("agent: status {} ({progress}%)", status.as_str());
        obs.on_status(status, progress);
    }

    fn report(&self, obs: &mut impl OtaObserver, err: &OtaError) {
        error!("agent: {err}");
        obs.on_error(&err.to_string(), err.code());
    }
}
