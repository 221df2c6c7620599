//! Agent configuration.
//!
//! All tunable parameters for the OTA agent.  [`OtaConfig`] is immutable
//! after [`start`](crate::agent::service::OtaAgent::start) apart from the
//! explicit runtime setters the agent exposes; [`BrokerConfig`] describes
//! the control-channel endpoint and is applied without I/O.

use serde::{Deserialize, Serialize};

/// Largest chunk the downloader will read from the socket in one step.
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Core OTA agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtaConfig {
    /// Minimum milliseconds between periodic self-checks.
    pub check_interval_ms: u64,
    /// Maximum milliseconds for an entire download attempt.
    pub download_timeout_ms: u64,
    /// Consecutive failed download attempts before giving up.
    pub max_retries: u32,
    /// On install failure, take the rollback path instead of parking in Error.
    pub enable_rollback: bool,
    /// Enforce SHA-256 equality before committing the image.
    pub verify_checksum: bool,
    /// Currently running firmware version ("MAJOR.MINOR.PATCH").
    pub current_version: String,
    /// Bytes read from the download socket per step.
    pub chunk_size: usize,
    /// Milliseconds between cooperative yields in the download hot loop.
    pub yield_interval_ms: u64,
    /// Milliseconds before an in-flight MQTT connect attempt is abandoned.
    pub mqtt_connect_timeout_ms: u64,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            download_timeout_ms: 60_000,
            max_retries: 3,
            enable_rollback: true,
            verify_checksum: true,
            current_version: "1.0.0".into(),
            chunk_size: 512,
            yield_interval_ms: 50,
            mqtt_connect_timeout_ms: 15_000,
        }
    }
}

impl OtaConfig {
    /// Range-check the configuration.  Invalid values are rejected, not
    /// clamped, so a bad provisioning payload cannot silently degrade the
    /// agent (e.g. a zero chunk size would stall every download).
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err("chunk_size out of range");
        }
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1");
        }
        if self.current_version.is_empty() {
            return Err("current_version must not be empty");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Control-channel endpoint
// ---------------------------------------------------------------------------

/// MQTT broker endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Stable client identifier; derived from the device if `None`.
    pub client_id: Option<String>,
    /// Whether the broker connection itself uses TLS.
    pub use_tls: bool,
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            client_id: None,
            use_tls: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TLS trust material
// ---------------------------------------------------------------------------

/// Trust configuration shared by the control channel and the HTTPS
/// download socket.  Blobs are immutable once configured and have already
/// passed the framing checks in [`cert`](crate::cert).
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// PEM-encoded CA certificate chain used to verify the peer.
    pub ca_pem: Option<Vec<u8>>,
    /// PEM-encoded client certificate, presented when the broker or
    /// origin demands mutual TLS.
    pub client_cert_pem: Option<Vec<u8>>,
    /// PEM-encoded private key paired with `client_cert_pem`.
    pub client_key_pem: Option<Vec<u8>>,
    /// Accept any server certificate.  Opt-in only; every use is logged.
    pub insecure: bool,
}

impl TlsSettings {
    /// Whether a complete client identity is configured.
    pub fn has_client_identity(&self) -> bool {
        self.client_cert_pem.is_some() && self.client_key_pem.is_some()
    }
}
