//! MQTT transport adapter — ESP-IDF `mqtt::client` behind the
//! [`MqttTransport`] port.
//!
//! The ESP-IDF client delivers events through a blocking connection
//! iterator, so the adapter runs a small `mqtt-rx` pump thread that maps
//! each event onto the port's [`MqttEvent`] model and queues it; the core's
//! `poll()` only ever drains the queue and never blocks.  Fragmented
//! deliveries (`Details::InitialChunk` / `SubsequentChunk`) keep their byte
//! offset and total so the control channel can reassemble them.
//!
//! On non-ESP-IDF targets this is a logging stub; host tests drive the
//! control channel with scripted transports instead.

use log::info;

use crate::config::{BrokerConfig, TlsSettings};
use crate::control::transport::{MqttEvent, MqttTransport, QosLevel, TransportError};

#[cfg(target_os = "espidf")]
use std::sync::mpsc;

pub struct EspMqttTransport {
    broker: Option<BrokerConfig>,
    #[cfg(target_os = "espidf")]
    tls: TlsSettings,
    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(target_os = "espidf")]
    rx: Option<mpsc::Receiver<MqttEvent>>,
}

impl EspMqttTransport {
    pub fn new() -> Self {
        Self {
            broker: None,
            #[cfg(target_os = "espidf")]
            tls: TlsSettings::default(),
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(target_os = "espidf")]
            rx: None,
        }
    }
}

impl Default for EspMqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl EspMqttTransport {
    fn broker_url(broker: &BrokerConfig) -> String {
        let scheme = if broker.use_tls { "mqtts" } else { "mqtt" };
        format!("{}://{}:{}", scheme, broker.host, broker.port)
    }

    /// NUL-terminate a PEM blob and hand it out with a 'static lifetime.
    ///
    /// The client configuration borrows certificate material for its
    /// whole lifetime; trust material is immutable once configured, so a
    /// one-time leak of the copy is the simplest way to satisfy the
    /// 'static bound.
    fn leak_x509(pem: &[u8]) -> Result<esp_idf_svc::tls::X509<'static>, TransportError> {
        let mut nul_terminated = pem.to_vec();
        nul_terminated.push(0);
        let blob: &'static [u8] = Box::leak(nul_terminated.into_boxed_slice());
        core::ffi::CStr::from_bytes_with_nul(blob)
            .map(esp_idf_svc::tls::X509::pem)
            .map_err(|_| TransportError::NotConfigured)
    }

    /// Pump the blocking connection iterator into the event queue.
    fn spawn_rx_pump(
        mut conn: esp_idf_svc::mqtt::client::EspMqttConnection,
        tx: mpsc::Sender<MqttEvent>,
    ) {
        use esp_idf_svc::mqtt::client::{Details, EventPayload};

        std::thread::Builder::new()
            .name("mqtt-rx".into())
            .stack_size(8 * 1024)
            .spawn(move || {
                // Fragments after the first carry no topic; remember it.
                let mut current_topic = String::new();
                loop {
                    let event = match conn.next() {
                        Ok(event) => event,
                        Err(_) => {
                            let _ = tx.send(MqttEvent::Disconnected);
                            break;
                        }
                    };
                    let mapped = match event.payload() {
                        EventPayload::Connected(_) => Some(MqttEvent::Connected),
                        EventPayload::Disconnected => Some(MqttEvent::Disconnected),
                        EventPayload::Error(_) => Some(MqttEvent::ConnectFailed),
                        EventPayload::Received {
                            topic,
                            data,
                            details,
                            ..
                        } => {
                            if let Some(t) = topic {
                                current_topic = t.to_string();
                            }
                            let (index, total) = match details {
                                Details::Complete => (0, data.len()),
                                Details::InitialChunk(c) => (0, c.total_data_size),
                                Details::SubsequentChunk(c) => {
                                    (c.current_data_offset, c.total_data_size)
                                }
                            };
                            Some(MqttEvent::Message(
                                crate::control::transport::MqttMessage {
                                    topic: current_topic.clone(),
                                    payload: data.to_vec(),
                                    index,
                                    total,
                                },
                            ))
                        }
                        _ => None,
                    };
                    if let Some(ev) = mapped {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn mqtt-rx thread");
    }
}

#[cfg(target_os = "espidf")]
impl MqttTransport for EspMqttTransport {
    fn configure(
        &mut self,
        broker: &BrokerConfig,
        tls: &TlsSettings,
    ) -> Result<(), TransportError> {
        self.broker = Some(broker.clone());
        self.tls = tls.clone();
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, MqttClientConfiguration};

        self.disconnect();
        let broker = self.broker.as_ref().ok_or(TransportError::NotConfigured)?;
        let url = Self::broker_url(broker);

        let server_certificate = match (&self.tls.ca_pem, self.tls.insecure) {
            (Some(pem), false) => Some(Self::leak_x509(pem)?),
            _ => None,
        };

        // Mutual TLS: present the client identity when one is configured.
        let (client_certificate, private_key) =
            match (&self.tls.client_cert_pem, &self.tls.client_key_pem) {
                (Some(cert), Some(key)) => {
                    (Some(Self::leak_x509(cert)?), Some(Self::leak_x509(key)?))
                }
                _ => (None, None),
            };

        let conf = MqttClientConfiguration {
            client_id: broker.client_id.as_deref(),
            username: broker.username.as_deref(),
            password: broker.password.as_deref(),
            server_certificate,
            client_certificate,
            private_key,
            ..Default::default()
        };

        let (client, conn) =
            EspMqttClient::new(&url, &conf).map_err(|_| TransportError::ConnectFailed)?;

        let (tx, rx) = mpsc::channel();
        Self::spawn_rx_pump(conn, tx);
        self.client = Some(client);
        self.rx = Some(rx);
        info!("mqtt: connect initiated to {url}");
        Ok(())
    }

    fn disconnect(&mut self) {
        // Dropping the client tears down the connection and ends the pump
        // thread's iterator.
        self.client.take();
        self.rx.take();
    }

    fn subscribe(&mut self, topic: &str, qos: QosLevel) -> Result<(), TransportError> {
        use esp_idf_svc::mqtt::client::QoS;

        let client = self.client.as_mut().ok_or(TransportError::NotConfigured)?;
        let qos = match qos {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        };
        client
            .subscribe(topic, qos)
            .map(|_| ())
            .map_err(|_| TransportError::SubscribeFailed)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        use esp_idf_svc::mqtt::client::QoS;

        let client = self.client.as_mut().ok_or(TransportError::NotConfigured)?;
        client
            .enqueue(topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())
            .map_err(|_| TransportError::PublishFailed)
    }

    fn poll(&mut self) -> Option<MqttEvent> {
        self.rx.as_ref()?.try_recv().ok()
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation stub
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl MqttTransport for EspMqttTransport {
    fn configure(
        &mut self,
        broker: &BrokerConfig,
        _tls: &TlsSettings,
    ) -> Result<(), TransportError> {
        self.broker = Some(broker.clone());
        Ok(())
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        let broker = self.broker.as_ref().ok_or(TransportError::NotConfigured)?;
        info!(
            "mqtt(sim): connect to {}:{} (no broker in simulation)",
            broker.host, broker.port
        );
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn subscribe(&mut self, topic: &str, _qos: QosLevel) -> Result<(), TransportError> {
        info!("mqtt(sim): subscribe '{topic}'");
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        info!("mqtt(sim): publish {} bytes to '{topic}'", payload.len());
        Ok(())
    }

    fn poll(&mut self) -> Option<MqttEvent> {
        None
    }
}
