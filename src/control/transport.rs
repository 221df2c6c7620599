//! Control-channel transport abstraction.
//!
//! Concrete implementations:
//! - ESP-IDF MQTT client (over plain TCP or TLS)
//! - test doubles driven by scripted event queues
//!
//! The [`ControlChannel`](super::ControlChannel) is generic over
//! `MqttTransport`, so swapping the broker client requires zero changes to
//! the connection state machine.  All operations are non-blocking: `connect`
//! only *initiates* a connection, and the outcome arrives later through
//! [`poll`](MqttTransport::poll).

use core::fmt;

use crate::config::{BrokerConfig, TlsSettings};

// ───────────────────────────────────────────────────────────────
// Events
// ───────────────────────────────────────────────────────────────

/// One inbound message delivery, possibly a fragment of a larger payload.
///
/// `index` is the byte offset of `payload` within the logical message and
/// `total` the logical message length; a complete single delivery has
/// `index == 0` and `total == payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub index: usize,
    pub total: usize,
}

/// Transport-level events, drained one per [`poll`](MqttTransport::poll).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent {
    Connected,
    Disconnected,
    ConnectFailed,
    Message(MqttMessage),
}

// ───────────────────────────────────────────────────────────────
// Errors / QoS
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotConfigured,
    ConnectFailed,
    SubscribeFailed,
    PublishFailed,
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "transport not configured"),
            Self::ConnectFailed => write!(f, "connect initiation failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::Io => write!(f, "transport I/O error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    /// Required for the update topic so a retained announcement published
    /// while the device was offline is delivered on (re)connect.
    AtLeastOnce,
}

// ───────────────────────────────────────────────────────────────
// Transport trait
// ───────────────────────────────────────────────────────────────

/// Pub/sub client capability set the control channel is written against.
pub trait MqttTransport {
    /// Apply endpoint and trust configuration.  No I/O.
    fn configure(&mut self, broker: &BrokerConfig, tls: &TlsSettings)
        -> Result<(), TransportError>;

    /// Initiate an asynchronous connection attempt.  The result surfaces as
    /// a [`MqttEvent::Connected`] / [`MqttEvent::ConnectFailed`] later.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the connection down.  Idempotent.
    fn disconnect(&mut self);

    fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Drain one queued event without blocking.
    fn poll(&mut self) -> Option<MqttEvent>;
}

// ───────────────────────────────────────────────────────────────
// Null transport
// ───────────────────────────────────────────────────────────────

/// A transport that never connects and never delivers.  Useful as a default
/// on hosts with no broker; the channel simply cycles through its
/// connect-timeout path.
pub struct NullTransport;

impl MqttTransport for NullTransport {
    fn configure(
        &mut self,
        _broker: &BrokerConfig,
        _tls: &TlsSettings,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn subscribe(&mut self, _topic: &str, _qos: QosLevel) -> Result<(), TransportError> {
        Ok(())
    }

    fn publish(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn poll(&mut self) -> Option<MqttEvent> {
        None
    }
}
