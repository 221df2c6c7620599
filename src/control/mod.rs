//! Control channel — the long-lived pub/sub connection announcements
//! arrive on.
//!
//! Maintains a four-state connection machine, throttles reconnects to one
//! attempt per 5 s, subscribes to the update topic at QoS 1 on every
//! (re)connect, reassembles fragmented payloads, and hands exactly one
//! parsed [`UpdateAnnouncement`] upward per complete message.
//!
//! ```text
//! Disconnected ──(throttle elapsed)──▶ Connecting ──(transport ok)──▶ Connected
//!      ▲                                   │                             │
//!      └────(throttle elapsed)── Failed ◀──┴──(timeout / refused)        │
//!      └─────────────────────────────────────────(transport dropped)─────┘
//! ```

pub mod transport;

use log::{info, warn};

use crate::agent::announcement::{self, UpdateAnnouncement};
use crate::config::{BrokerConfig, TlsSettings};
use crate::error::OtaError;
use self::transport::{MqttEvent, MqttTransport, QosLevel};

/// Minimum spacing between consecutive connect attempts.
pub const RECONNECT_THROTTLE_MS: u64 = 5_000;

/// Upper bound on a reassembled announcement payload.
pub const MAX_ANNOUNCEMENT_BYTES: usize = 1024;

/// Events drained from the transport per tick.  Keeps `tick` bounded even
/// against a misbehaving broker.
const MAX_EVENTS_PER_TICK: usize = 8;

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttConnState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// Control channel
// ───────────────────────────────────────────────────────────────

pub struct ControlChannel {
    state: MqttConnState,
    topic: String,
    broker: Option<BrokerConfig>,
    tls: TlsSettings,
    /// `None` means the next attempt is unthrottled (set by [`prime`]).
    last_attempt_ms: Option<u64>,
    connect_start_ms: u64,
    assembler: heapless::Vec<u8, MAX_ANNOUNCEMENT_BYTES>,
}

impl ControlChannel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            state: MqttConnState::Disconnected,
            topic: topic.into(),
            broker: None,
            tls: TlsSettings::default(),
            last_attempt_ms: None,
            connect_start_ms: 0,
            assembler: heapless::Vec::new(),
        }
    }

    /// Store the broker endpoint.  No I/O happens until [`tick`].
    pub fn configure(&mut self, broker: BrokerConfig) {
        self.broker = Some(broker);
    }

    /// Install trust material shared with the transport.
    pub fn set_tls(&mut self, tls: TlsSettings) {
        self.tls = tls;
    }

    pub fn is_configured(&self) -> bool {
        self.broker.is_some()
    }

    pub fn state(&self) -> MqttConnState {
        self.state
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Allow the next connect attempt to bypass the reconnect throttle.
    /// Called once by the agent's `start`; the 5 s spacing invariant binds
    /// consecutive attempts, not the first.
    pub fn prime(&mut self) {
        self.last_attempt_ms = None;
    }

    /// Tear the connection down (link lost, agent reset).  The throttle
    /// state survives so a flapping link cannot trigger a connect storm.
    pub fn disconnect(&mut self, mqtt: &mut impl MqttTransport) {
        if self.state != MqttConnState::Disconnected {
            info!("control: disconnecting ({:?})", self.state);
        }
        mqtt.disconnect();
        self.state = MqttConnState::Disconnected;
        self.assembler.clear();
    }

    /// Publish a status beacon.  Optional surface; only valid while
    /// connected.
    pub fn publish(
        &mut self,
        mqtt: &mut impl MqttTransport,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), OtaError> {
        if self.state != MqttConnState::Connected {
            return Err(OtaError::NotReady("control channel not connected"));
        }
        mqtt.publish(topic, payload)
            .map_err(|_| OtaError::NetworkFailure("publish failed"))
    }

    /// Advance the connection machine by one bounded, non-blocking tick.
    ///
    /// Returns a parsed announcement when a complete update message was
    /// received this tick.
    pub fn tick(
        &mut self,
        now_ms: u64,
        mqtt: &mut impl MqttTransport,
        connect_timeout_ms: u64,
    ) -> Result<Option<UpdateAnnouncement>, OtaError> {
        match self.state {
            MqttConnState::Disconnected => {
                if self.broker.is_some() && self.throttle_elapsed(now_ms) {
                    self.start_connect(now_ms, mqtt)?;
                }
                Ok(None)
            }
            MqttConnState::Connecting => self.tick_connecting(now_ms, mqtt, connect_timeout_ms),
            MqttConnState::Connected => self.tick_connected(mqtt),
            MqttConnState::Failed => {
                if self.throttle_elapsed(now_ms) {
                    self.state = MqttConnState::Disconnected;
                }
                Ok(None)
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn throttle_elapsed(&self, now_ms: u64) -> bool {
        match self.last_attempt_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= RECONNECT_THROTTLE_MS,
        }
    }

    fn start_connect(
        &mut self,
        now_ms: u64,
        mqtt: &mut impl MqttTransport,
    ) -> Result<(), OtaError> {
        self.last_attempt_ms = Some(now_ms);
        self.connect_start_ms = now_ms;

        let broker = self
            .broker
            .as_ref()
            .ok_or(OtaError::NotReady("broker endpoint not configured"))?;
        info!("control: connecting to {}:{}", broker.host, broker.port);

        if mqtt.configure(broker, &self.tls).is_err() || mqtt.connect().is_err() {
            self.state = MqttConnState::Failed;
            return Err(OtaError::NetworkFailure("mqtt connect initiation failed"));
        }
        self.state = MqttConnState::Connecting;
        Ok(())
    }

    fn tick_connecting(
        &mut self,
        now_ms: u64,
        mqtt: &mut impl MqttTransport,
        connect_timeout_ms: u64,
    ) -> Result<Option<UpdateAnnouncement>, OtaError> {
        for _ in 0..MAX_EVENTS_PER_TICK {
            match mqtt.poll() {
                Some(MqttEvent::Connected) => {
                    info!("control: connected, subscribing to '{}'", self.topic);
                    if mqtt.subscribe(&self.topic, QosLevel::AtLeastOnce).is_err() {
                        self.state = MqttConnState::Failed;
                        return Err(OtaError::NetworkFailure("subscribe failed"));
                    }
                    self.state = MqttConnState::Connected;
                    self.assembler.clear();
                    return Ok(None);
                }
                Some(MqttEvent::ConnectFailed) | Some(MqttEvent::Disconnected) => {
                    warn!("control: connect attempt rejected");
                    self.state = MqttConnState::Failed;
                    return Err(OtaError::NetworkFailure("mqtt connect failed"));
                }
                Some(MqttEvent::Message(_)) => {
                    // Cannot arrive before the subscribe; drop it.
                }
                None => break,
            }
        }

        if now_ms.saturating_sub(self.connect_start_ms) >= connect_timeout_ms {
            warn!("control: connect timeout after {connect_timeout_ms} ms");
            self.state = MqttConnState::Failed;
            return Err(OtaError::NetworkFailure("mqtt connect timeout"));
        }
        Ok(None)
    }

    fn tick_connected(
        &mut self,
        mqtt: &mut impl MqttTransport,
    ) -> Result<Option<UpdateAnnouncement>, OtaError> {
        for _ in 0..MAX_EVENTS_PER_TICK {
            match mqtt.poll() {
                Some(MqttEvent::Message(msg)) => {
                    if let Some(ann) = self.ingest(msg)? {
                        return Ok(Some(ann));
                    }
                }
                Some(MqttEvent::Disconnected) => {
                    warn!("control: connection lost");
                    self.state = MqttConnState::Disconnected;
                    self.assembler.clear();
                    return Ok(None);
                }
                Some(MqttEvent::Connected) | Some(MqttEvent::ConnectFailed) => {}
                None => break,
            }
        }
        Ok(None)
    }

    /// Feed one delivery into the reassembly accumulator; parse when the
    /// logical message is complete.
    fn ingest(&mut self, msg: transport::MqttMessage) -> Result<Option<UpdateAnnouncement>, OtaError> {
        if msg.topic != self.topic {
            return Ok(None);
        }

        if msg.index == 0 {
            self.assembler.clear();
        } else if msg.index != self.assembler.len() {
            // Interleaved or out-of-order fragments: drop both messages.
            self.assembler.clear();
            return Err(OtaError::MalformedAnnouncement(
                "interleaved partial message",
            ));
        }

        if msg.total > MAX_ANNOUNCEMENT_BYTES
            || self.assembler.extend_from_slice(&msg.payload).is_err()
        {
            self.assembler.clear();
            return Err(OtaError::MalformedAnnouncement("announcement too large"));
        }

        if msg.index + msg.payload.len() == msg.total {
            let result = announcement::parse(&self.assembler);
            self.assembler.clear();
            return result;
        }
        Ok(None)
    }
}
