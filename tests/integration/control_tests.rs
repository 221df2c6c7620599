//! Control-channel behavior through the full agent: reconnect pacing,
//! fragment reassembly, and announcement filtering as the agent sees them.

use crate::mock_hw::*;

use otalink::agent::service::OtaAgent;
use otalink::agent::OtaStatus;
use otalink::config::{BrokerConfig, OtaConfig};
use otalink::control::RECONNECT_THROTTLE_MS;

const TOPIC: &str = "device/fw/update";

struct Rig {
    clock: FakeClock,
    link: MockLink,
    mqtt: MockMqtt,
    sock: ScriptedSocket,
    flash: MockFlash,
    sys: MockSystem,
    obs: RecordingObserver,
    agent: OtaAgent,
}

impl Rig {
    fn new() -> Self {
        let mut agent = OtaAgent::new(TOPIC, OtaConfig::default()).unwrap();
        agent.configure_broker(BrokerConfig::new("broker.local", 1883));
        Self {
            clock: FakeClock::new(),
            link: MockLink::new(),
            mqtt: MockMqtt::new(),
            sock: ScriptedSocket::new(),
            flash: MockFlash::new(),
            sys: MockSystem::new(),
            obs: RecordingObserver::new(),
            agent,
        }
    }

    fn step(&mut self) {
        self.agent.step(
            &self.clock,
            &self.link,
            &mut self.mqtt,
            &mut self.sock,
            &mut self.flash,
            &mut self.sys,
            &mut self.obs,
        );
    }
}

#[test]
fn connect_attempts_respect_the_five_second_throttle() {
    let mut rig = Rig::new();
    rig.agent.start(&rig.link).unwrap();

    // First attempt fires immediately; the broker never answers, so the
    // attempt times out and the channel backs off.
    rig.step();
    assert_eq!(rig.mqtt.connects, 1);

    // Walk forward in 100 ms steps for a minute; count attempts.
    for _ in 0..600 {
        rig.clock.advance(100);
        rig.step();
    }

    // 15 s connect timeout then 5 s back-off per cycle: the attempt count
    // stays far below one per tick, and consecutive attempts are >= 5 s
    // apart by construction of the channel.
    assert!(rig.mqtt.connects >= 2, "must keep retrying");
    assert!(
        rig.mqtt.connects <= 4,
        "reconnects must be throttled, got {}",
        rig.mqtt.connects
    );
}

#[test]
fn resubscribes_after_reconnect() {
    let mut rig = Rig::new();
    rig.agent.start(&rig.link).unwrap();

    rig.step();
    rig.mqtt.accept();
    rig.step();
    assert_eq!(rig.mqtt.subscriptions.len(), 1);

    // Broker drops the connection; throttle elapses; reconnect succeeds.
    rig.mqtt
        .events
        .push_back(otalink::control::transport::MqttEvent::Disconnected);
    rig.step();
    rig.clock.advance(RECONNECT_THROTTLE_MS);
    rig.step();
    rig.mqtt.accept();
    rig.step();

    assert_eq!(rig.mqtt.subscriptions.len(), 2, "must subscribe on every connect");
}

#[test]
fn fragmented_announcement_reassembles_into_one_update() {
    let mut rig = Rig::new();
    rig.agent.start(&rig.link).unwrap();
    rig.step();
    rig.mqtt.accept();
    rig.step();

    let payload = announcement_json("1.0.1", "http://origin.local/fw.bin", "aa");
    let mid = payload.len() / 2;
    rig.mqtt
        .deliver_fragment(TOPIC, &payload[..mid], 0, payload.len());
    rig.mqtt
        .deliver_fragment(TOPIC, &payload[mid..], mid, payload.len());

    rig.step();
    assert_eq!(rig.agent.status(), OtaStatus::Downloading);
    assert_eq!(rig.agent.pending_version(), Some("1.0.1"));
}

#[test]
fn non_update_command_changes_nothing() {
    let mut rig = Rig::new();
    rig.agent.start(&rig.link).unwrap();
    rig.step();
    rig.mqtt.accept();
    rig.step();

    rig.mqtt.deliver(
        TOPIC,
        br#"{"command":"reboot","version":"9.9.9","firmware_url":"http://h/f","checksum":"aa"}"#,
    );
    rig.step();
    rig.step();

    assert_eq!(rig.agent.status(), OtaStatus::Idle);
    assert!(rig.obs.errors.is_empty());
    assert!(rig.obs.statuses.is_empty());
}

#[test]
fn messages_on_other_topics_are_ignored() {
    let mut rig = Rig::new();
    rig.agent.start(&rig.link).unwrap();
    rig.step();
    rig.mqtt.accept();
    rig.step();

    rig.mqtt.deliver(
        "some/other/topic",
        &announcement_json("2.0.0", "http://h/f", "aa"),
    );
    rig.step();

    assert_eq!(rig.agent.status(), OtaStatus::Idle);
}

#[test]
fn link_down_tears_the_channel_down() {
    let mut rig = Rig::new();
    rig.agent.start(&rig.link).unwrap();
    rig.step();
    rig.mqtt.accept();
    rig.step();

    rig.link.set_up(false);
    rig.step();
    assert!(rig.mqtt.disconnects >= 1);

    // While down, no reconnect attempts happen.
    let connects = rig.mqtt.connects;
    for _ in 0..10 {
        rig.clock.advance(1_000);
        rig.step();
    }
    assert_eq!(rig.mqtt.connects, connects);
}
