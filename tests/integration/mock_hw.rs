//! Mock adapters for integration tests.
//!
//! Every port the agent consumes has a recording double here, so tests can
//! assert on the full call history without a broker, an HTTP origin, or
//! flash hardware.

use std::cell::Cell;
use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use otalink::agent::ports::{
    Clock, FlashSink, FlashSinkError, LinkPort, OtaObserver, SystemPort,
};
use otalink::agent::OtaStatus;
use otalink::config::{BrokerConfig, TlsSettings};
use otalink::control::transport::{
    MqttEvent, MqttMessage, MqttTransport, QosLevel, TransportError,
};
use otalink::download::socket::{DownloadSocket, SocketError};

// ── Clock / link ──────────────────────────────────────────────

pub struct FakeClock {
    ms: Cell<u64>,
}

#[allow(dead_code)]
impl FakeClock {
    pub fn new() -> Self {
        Self { ms: Cell::new(0) }
    }

    pub fn advance(&self, ms: u64) {
        self.ms.set(self.ms.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.ms.set(ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.ms.get()
    }
}

pub struct MockLink {
    up: Cell<bool>,
}

#[allow(dead_code)]
impl MockLink {
    pub fn new() -> Self {
        Self {
            up: Cell::new(true),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.set(up);
    }
}

impl LinkPort for MockLink {
    fn is_up(&self) -> bool {
        self.up.get()
    }
}

// ── MQTT transport ────────────────────────────────────────────

#[derive(Default)]
pub struct MockMqtt {
    pub events: VecDeque<MqttEvent>,
    pub connects: u32,
    pub disconnects: u32,
    pub subscriptions: Vec<(String, QosLevel)>,
    pub published: Vec<(String, Vec<u8>)>,
}

#[allow(dead_code)]
impl MockMqtt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection acknowledgement.
    pub fn accept(&mut self) {
        self.events.push_back(MqttEvent::Connected);
    }

    /// Queue a complete single-delivery message.
    pub fn deliver(&mut self, topic: &str, payload: &[u8]) {
        self.events.push_back(MqttEvent::Message(MqttMessage {
            topic: topic.into(),
            payload: payload.to_vec(),
            index: 0,
            total: payload.len(),
        }));
    }

    pub fn deliver_fragment(&mut self, topic: &str, payload: &[u8], index: usize, total: usize) {
        self.events.push_back(MqttEvent::Message(MqttMessage {
            topic: topic.into(),
            payload: payload.to_vec(),
            index,
            total,
        }));
    }
}

impl MqttTransport for MockMqtt {
    fn configure(&mut self, _b: &BrokerConfig, _t: &TlsSettings) -> Result<(), TransportError> {
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        self.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), TransportError> {
        self.subscriptions.push((topic.into(), qos));
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.published.push((topic.into(), payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self) -> Option<MqttEvent> {
        self.events.pop_front()
    }
}

// ── Download socket ───────────────────────────────────────────

/// What one `connect` attempt should see.
pub struct SocketScript {
    pub refuse: bool,
    pub reads: VecDeque<Vec<u8>>,
    /// After `reads` drains: EOF when true, would-block forever when false.
    pub close_at_end: bool,
}

#[allow(dead_code)]
impl SocketScript {
    pub fn serving(response: &[u8]) -> Self {
        Self {
            refuse: false,
            reads: VecDeque::from([response.to_vec()]),
            close_at_end: true,
        }
    }

    pub fn refused() -> Self {
        Self {
            refuse: true,
            reads: VecDeque::new(),
            close_at_end: true,
        }
    }
}

#[derive(Default)]
pub struct ScriptedSocket {
    scripts: VecDeque<SocketScript>,
    current: Option<SocketScript>,
    open: bool,
    /// (host, port, tls) per connect attempt.
    pub connects: Vec<(String, u16, bool)>,
    pub sent: Vec<u8>,
}

#[allow(dead_code)]
impl ScriptedSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&mut self, script: SocketScript) {
        self.scripts.push_back(script);
    }
}

impl DownloadSocket for ScriptedSocket {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        tls: Option<&TlsSettings>,
    ) -> Result<(), SocketError> {
        self.connects.push((host.into(), port, tls.is_some()));
        let script = self.scripts.pop_front().ok_or(SocketError::Refused)?;
        if script.refuse {
            return Err(SocketError::Refused);
        }
        self.current = Some(script);
        self.open = true;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SocketError> {
        if !self.open {
            return Err(SocketError::NotConnected);
        }
        self.sent.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        let script = self.current.as_mut().ok_or(SocketError::NotConnected)?;
        match script.reads.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > buf.len() {
                    let rest = chunk.split_off(buf.len());
                    script.reads.push_front(rest);
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => {
                if script.close_at_end {
                    Err(SocketError::Closed)
                } else {
                    Ok(0)
                }
            }
        }
    }

    fn close(&mut self) {
        self.current = None;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ── Flash sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockFlash {
    pub data: Vec<u8>,
    pub open: bool,
    pub begun: u32,
    pub aborted: u32,
    pub finalized: bool,
    pub committed: bool,
    pub activated: bool,
    pub latched_error: bool,
    pub fail_begin: bool,
    /// Fail the write that would push the image past this size.
    pub fail_write_after: Option<usize>,
    pub fail_finalize: bool,
    pub fail_activate: bool,
}

#[allow(dead_code)]
impl MockFlash {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlashSink for MockFlash {
    fn begin(&mut self, _expected_size: Option<u32>) -> Result<(), FlashSinkError> {
        if self.fail_begin {
            return Err(FlashSinkError::new("begin", 11));
        }
        if self.open {
            return Err(FlashSinkError::new("begin", 12));
        }
        self.begun += 1;
        self.open = true;
        self.data.clear();
        self.finalized = false;
        self.committed = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FlashSinkError> {
        if !self.open {
            return Err(FlashSinkError::new("write", 13));
        }
        if let Some(limit) = self.fail_write_after {
            if self.data.len() + data.len() > limit {
                self.latched_error = true;
                return Err(FlashSinkError::new("write", 14));
            }
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finalize(&mut self, commit: bool) -> Result<(), FlashSinkError> {
        if self.fail_finalize {
            return Err(FlashSinkError::new("finalize", 21));
        }
        if !self.open {
            return Err(FlashSinkError::new("finalize", 22));
        }
        self.open = false;
        self.finalized = true;
        self.committed = commit;
        Ok(())
    }

    fn activate(&mut self) -> Result<(), FlashSinkError> {
        if self.fail_activate {
            return Err(FlashSinkError::new("activate", 31));
        }
        if !self.finalized || !self.committed {
            return Err(FlashSinkError::new("activate", 32));
        }
        self.activated = true;
        Ok(())
    }

    fn abort(&mut self) {
        if self.open {
            self.aborted += 1;
        }
        self.open = false;
        self.data.clear();
        self.latched_error = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn has_error(&self) -> bool {
        self.latched_error
    }
}

// ── System / observer ─────────────────────────────────────────

#[derive(Default)]
pub struct MockSystem {
    pub restarts: u32,
    pub yields: u32,
    pub delays: Vec<u32>,
}

#[allow(dead_code)]
impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SystemPort for MockSystem {
    fn restart(&mut self) {
        self.restarts += 1;
    }

    fn yield_now(&mut self) {
        self.yields += 1;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub statuses: Vec<(OtaStatus, u8)>,
    pub errors: Vec<(String, i32)>,
}

#[allow(dead_code)]
impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_status(&self) -> Option<OtaStatus> {
        self.statuses.last().map(|(s, _)| *s)
    }

    /// Progress values reported while DOWNLOADING.
    pub fn download_progress(&self) -> Vec<u8> {
        self.statuses
            .iter()
            .filter(|(s, _)| *s == OtaStatus::Downloading)
            .map(|(_, p)| *p)
            .collect()
    }
}

impl OtaObserver for RecordingObserver {
    fn on_status(&mut self, status: OtaStatus, progress: u8) {
        self.statuses.push((status, progress));
    }

    fn on_error(&mut self, message: &str, code: i32) {
        self.errors.push((message.into(), code));
    }
}

// ── Fixture helpers ───────────────────────────────────────────

#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    otalink::download::to_hex(&digest)
}

/// A complete 200 response; `with_length` controls the Content-Length
/// header.
#[allow(dead_code)]
pub fn http_ok(body: &[u8], with_length: bool) -> Vec<u8> {
    let mut resp = String::from("HTTP/1.1 200 OK\r\n");
    if with_length {
        resp.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    resp.push_str("\r\n");
    let mut bytes = resp.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

#[allow(dead_code)]
pub fn announcement_json(version: &str, url: &str, checksum: &str) -> Vec<u8> {
    serde_json::json!({
        "command": "update",
        "version": version,
        "firmware_url": url,
        "checksum": checksum,
    })
    .to_string()
    .into_bytes()
}
