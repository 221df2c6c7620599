//! otalink firmware entry point.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                    │
//! │                                                             │
//! │  Esp32Clock   WifiLink   EspMqttTransport   TcpDownload-    │
//! │  (Clock)      (LinkPort) (MqttTransport)    Socket          │
//! │  OtaPartitionSink        EspSystem          LogObserver     │
//! │  (FlashSink)             (SystemPort)       (OtaObserver)   │
//! │                                                             │
//! │  ──────────────── Port Trait Boundary ──────────────        │
//! │                                                             │
//! │  ┌───────────────────────────────────────────────────┐      │
//! │  │              OtaAgent (pure logic)                │      │
//! │  │  ControlChannel · Downloader · Installer          │      │
//! │  └───────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use otalink::adapters::flash::OtaPartitionSink;
use otalink::adapters::log_sink::LogObserver;
use otalink::adapters::mqtt::EspMqttTransport;
use otalink::adapters::socket::TcpDownloadSocket;
use otalink::adapters::system::EspSystem;
use otalink::adapters::time::Esp32Clock;
use otalink::adapters::wifi::WifiLink;
use otalink::adapters::cert_store;
use otalink::agent::ports::Clock;
use otalink::agent::ports::LinkPort;
use otalink::agent::service::OtaAgent;
use otalink::agent::OtaStatus;
use otalink::config::{BrokerConfig, OtaConfig};
use otalink::drivers::watchdog::StepWatchdog;
use otalink::installer;

/// Update topic the agent subscribes to; the status beacon goes to the
/// sibling `/status` topic.
const UPDATE_TOPIC: &str = "otalink/firmware/update";
const STATUS_TOPIC: &str = "otalink/firmware/status";

const BROKER_HOST: &str = "broker.local";
const BROKER_PORT_PLAIN: u16 = 1883;
const BROKER_PORT_TLS: u16 = 8883;

/// Step cadence of the cooperative loop.
const STEP_PERIOD_MS: u64 = 20;

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
    }

    info!("otalink v{} starting", env!("CARGO_PKG_VERSION"));

    // Confirm the running image so the bootloader's rollback watchdog
    // stands down.
    installer::mark_boot_valid();

    // ── 2. Adapters ───────────────────────────────────────────
    let clock = Esp32Clock::new();
    let link = WifiLink::new();
    let mut mqtt = EspMqttTransport::new();
    let mut sock = TcpDownloadSocket::new();
    let mut flash = OtaPartitionSink::new();
    let mut sys = EspSystem::new();
    let mut obs = LogObserver::new();

    // ── 3. Agent configuration ────────────────────────────────
    let config = OtaConfig {
        current_version: env!("CARGO_PKG_VERSION").into(),
        ..Default::default()
    };
    // A step gets one sleep period plus the downloader's yield budget
    // before it counts as overrun.
    let mut watchdog = StepWatchdog::new(STEP_PERIOD_MS + config.yield_interval_ms);
    let mut agent = match OtaAgent::new(UPDATE_TOPIC, config) {
        Ok(agent) => agent,
        Err(e) => anyhow::bail!("agent configuration rejected: {e}"),
    };

    // With a provisioned CA the broker connection moves to the TLS port;
    // without one it stays on plain MQTT.  A provisioned client identity
    // is presented for brokers that demand mutual TLS.
    let mut broker = BrokerConfig::new(BROKER_HOST, BROKER_PORT_PLAIN);
    let tls_material = cert_store::load();
    match tls_material.ca_pem.clone() {
        Some(ca) => {
            broker.port = BROKER_PORT_TLS;
            broker.use_tls = true;
            if let Err(e) = agent.configure_tls(Some(ca), false) {
                anyhow::bail!("CA certificate rejected: {e}");
            }
        }
        None => info!("no CA provisioned, broker connection stays plaintext"),
    }
    if let Some((cert, key)) = tls_material.client_identity() {
        if let Err(e) = agent.configure_client_cert(cert, key) {
            anyhow::bail!("client certificate rejected: {e}");
        }
    }
    broker.client_id = Some(format!("otalink-{}", env!("CARGO_PKG_VERSION")));
    agent.configure_broker(broker);

    // ── 4. Wait for the link, then arm the agent ──────────────
    // Association and IP acquisition belong to the host platform; the
    // agent only watches the link state.
    while !link.is_up() {
        warn!("waiting for network link");
        std::thread::sleep(std::time::Duration::from_millis(500));
        watchdog.feed_idle(clock.now_ms());
    }
    if let Err(e) = agent.start(&link) {
        anyhow::bail!("agent start failed: {e}");
    }

    // ── 5. Cooperative loop ───────────────────────────────────
    let mut last_status = OtaStatus::Idle;
    loop {
        agent.step(
            &clock, &link, &mut mqtt, &mut sock, &mut flash, &mut sys, &mut obs,
        );

        // Status beacon on every transition (best-effort).
        let status = agent.status();
        if status != last_status {
            last_status = status;
            if agent.publish_status(&mut mqtt, STATUS_TOPIC).is_err() {
                info!("status beacon skipped (control channel down)");
            }
        }

        watchdog.feed(clock.now_ms());
        std::thread::sleep(std::time::Duration::from_millis(STEP_PERIOD_MS));
    }
}
