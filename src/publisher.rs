//! Telemetry publisher and broker connection state machine.
//!
//! ```text
//!   Disconnected ──step_connect──▶ Connecting{n} ──ok──▶ Connected
//!        ▲                           │  ▲                   │
//!        │                           └──┘ fail, delay       │
//!        └──────────── tick() sees the link down ───────────┘
//! ```
//!
//! `Connecting` only exists inside [`TelemetryPublisher::ensure_connected`],
//! which loops with a fixed delay until the broker accepts a connection.

use core::fmt::Write as _;
use core::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::MqttConfig;
use crate::error::{LinkError, PublishError};
use crate::ports::{BrokerLink, Entropy, LivenessIndicator, Timebase};
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// `attempt` counts connect attempts since the link was last up.
    Connecting { attempt: u32 },
    Connected,
}

/// Result of a single connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    Connected,
    /// Caller should wait this long before the next attempt.
    Retry { after_ms: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct PublisherStats {
    pub publish_count: u32,
    pub failed_publishes: u32,
    pub connect_attempts: u32,
    pub link_drops: u32,
    pub last_published_topic: heapless::String<64>,
    pub last_client_id: heapless::String<24>,
}

pub struct TelemetryPublisher<L, I, E> {
    link: L,
    indicator: I,
    entropy: E,
    state: ConnectionState,
    led_on: bool,
    client_id_prefix: heapless::String<16>,
    connect_timeout: Duration,
    reconnect_delay_ms: u32,
    stats: PublisherStats,
}

impl<L, I, E> TelemetryPublisher<L, I, E>
where
    L: BrokerLink,
    I: LivenessIndicator,
    E: Entropy,
{
    pub fn new(link: L, mut indicator: I, entropy: E, config: &MqttConfig) -> Self {
        info!("MQTT: publisher for {}", config.broker_url.as_str());
        indicator.set(false);
        Self {
            link,
            indicator,
            entropy,
            state: ConnectionState::Disconnected,
            led_on: false,
            client_id_prefix: config.client_id_prefix.clone(),
            connect_timeout: Duration::from_secs(config.socket_timeout_secs as u64),
            reconnect_delay_ms: config.reconnect_delay_ms,
            stats: PublisherStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Current level of the liveness indicator.
    pub fn led_on(&self) -> bool {
        self.led_on
    }

    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Service the link once; a dead link drops the state to `Disconnected`.
    pub fn tick(&mut self) {
        let up = self.link.service();
        if !up && self.state == ConnectionState::Connected {
            warn!("🔌 MQTT: link lost");
            self.state = ConnectionState::Disconnected;
            self.stats.link_drops = self.stats.link_drops.wrapping_add(1);
        }
    }

    /// One connect attempt with a fresh client id.
    pub fn step_connect(&mut self) -> ConnectStep {
        let attempt = match self.state {
            ConnectionState::Connected => return ConnectStep::Connected,
            ConnectionState::Connecting { attempt } => attempt + 1,
            ConnectionState::Disconnected => 1,
        };
        self.state = ConnectionState::Connecting { attempt };
        self.stats.connect_attempts = self.stats.connect_attempts.wrapping_add(1);

        let client_id = self.fresh_client_id();
        info!(
            "🔄 MQTT: attempting connection as '{}' (attempt {})",
            client_id, attempt
        );

        match self.link.connect(&client_id, self.connect_timeout) {
            Ok(()) => {
                info!("✅ MQTT: connected");
                self.state = ConnectionState::Connected;
                self.stats.last_client_id = client_id;
                ConnectStep::Connected
            }
            Err(e) => {
                warn!(
                    "❌ MQTT: connect failed ({}), retrying in {} ms",
                    e, self.reconnect_delay_ms
                );
                ConnectStep::Retry {
                    after_ms: self.reconnect_delay_ms,
                }
            }
        }
    }

    /// Block until connected, retrying forever with a fixed delay.
    /// Returns the number of attempts made (0 if already connected).
    pub fn ensure_connected<T: Timebase>(&mut self, timebase: &mut T) -> u32 {
        let mut attempts = 0;
        while !self.is_connected() {
            attempts += 1;
            match self.step_connect() {
                ConnectStep::Connected => break,
                ConnectStep::Retry { after_ms } => timebase.delay_ms(after_ms),
            }
        }
        attempts
    }

    /// Encode and send one payload. Returns the encoded length.
    pub fn publish<T: Serialize>(&mut self, topic: &str, payload: &T) -> Result<usize, PublishError> {
        let result = self.try_publish(topic, payload);
        match result {
            Ok(len) => {
                self.stats.publish_count = self.stats.publish_count.wrapping_add(1);
                self.stats.last_published_topic.clear();
                let _ = self.stats.last_published_topic.push_str(topic);
                self.toggle_indicator();
                info!("📤 MQTT: published {} bytes to '{}'", len, topic);
            }
            Err(e) => {
                self.stats.failed_publishes = self.stats.failed_publishes.wrapping_add(1);
                warn!("MQTT: publish to '{}' failed: {}", topic, e);
            }
        }
        result
    }

    fn try_publish<T: Serialize>(&mut self, topic: &str, payload: &T) -> Result<usize, PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let encoded = telemetry::encode(payload)?;
        debug!(
            "MQTT: {} <- {}",
            topic,
            core::str::from_utf8(encoded.as_bytes()).unwrap_or("<binary>")
        );

        if let Err(e) = self.link.publish(topic, encoded.as_bytes()) {
            if e == LinkError::NotConnected {
                self.state = ConnectionState::Disconnected;
            }
            return Err(e.into());
        }
        Ok(encoded.len())
    }

    fn toggle_indicator(&mut self) {
        self.led_on = !self.led_on;
        self.indicator.set(self.led_on);
    }

    fn fresh_client_id(&mut self) -> heapless::String<24> {
        let mut id = heapless::String::new();
        // 16-byte prefix + '-' + 4 hex digits always fits.
        let _ = write!(
            id,
            "{}-{:X}",
            self.client_id_prefix.as_str(),
            self.entropy.next_u16()
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeLink {
        connect_results: Vec<Result<(), LinkError>>,
        client_ids: Vec<String>,
        up: bool,
        published: Vec<(String, Vec<u8>)>,
        publish_error: Option<LinkError>,
    }

    impl BrokerLink for FakeLink {
        fn connect(&mut self, client_id: &str, _timeout: Duration) -> Result<(), LinkError> {
            self.client_ids.push(client_id.to_string());
            let result = if self.connect_results.is_empty() {
                Ok(())
            } else {
                self.connect_results.remove(0)
            };
            self.up = result.is_ok();
            result
        }

        fn service(&mut self) -> bool {
            self.up
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
            if let Some(e) = self.publish_error {
                return Err(e);
            }
            self.published.push((topic.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Led(Vec<bool>);

    impl LivenessIndicator for Led {
        fn set(&mut self, on: bool) {
            self.0.push(on);
        }
    }

    struct Counter(u16);

    impl Entropy for Counter {
        fn next_u16(&mut self) -> u16 {
            self.0 = self.0.wrapping_add(0x1111);
            self.0
        }
    }

    #[derive(Default)]
    struct Sleeps(Vec<u32>);

    impl Timebase for Sleeps {
        fn now_ms(&self) -> u32 {
            self.0.iter().sum()
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    fn publisher(link: FakeLink) -> TelemetryPublisher<FakeLink, Led, Counter> {
        TelemetryPublisher::new(link, Led::default(), Counter(0), &MqttConfig::default())
    }

    #[derive(Serialize)]
    struct Sample {
        x: u8,
    }

    #[test]
    fn starts_disconnected_with_indicator_off() {
        let p = publisher(FakeLink::default());
        assert_eq!(p.state(), ConnectionState::Disconnected);
        assert_eq!(p.indicator.0, vec![false]);
    }

    #[test]
    fn step_connect_counts_attempts() {
        let mut p = publisher(FakeLink {
            connect_results: vec![Err(LinkError::Refused), Ok(())],
            ..Default::default()
        });
        assert_eq!(p.step_connect(), ConnectStep::Retry { after_ms: 5_000 });
        assert_eq!(p.state(), ConnectionState::Connecting { attempt: 1 });
        assert_eq!(p.step_connect(), ConnectStep::Connected);
        assert_eq!(p.state(), ConnectionState::Connected);
        assert_eq!(p.stats().connect_attempts, 2);
    }

    #[test]
    fn each_attempt_uses_a_fresh_client_id() {
        let mut p = publisher(FakeLink {
            connect_results: vec![Err(LinkError::Timeout), Ok(())],
            ..Default::default()
        });
        let mut sleeps = Sleeps::default();
        assert_eq!(p.ensure_connected(&mut sleeps), 2);
        assert_eq!(p.link().client_ids, vec!["esp32-bridge-1111", "esp32-bridge-2222"]);
        assert_eq!(p.stats().last_client_id.as_str(), "esp32-bridge-2222");
    }

    #[test]
    fn ensure_connected_is_a_no_op_when_connected() {
        let mut p = publisher(FakeLink::default());
        let mut sleeps = Sleeps::default();
        p.ensure_connected(&mut sleeps);
        assert_eq!(p.ensure_connected(&mut sleeps), 0);
        assert!(sleeps.0.is_empty());
    }

    #[test]
    fn tick_detects_link_loss() {
        let mut p = publisher(FakeLink::default());
        p.ensure_connected(&mut Sleeps::default());
        p.link.up = false;
        p.tick();
        assert_eq!(p.state(), ConnectionState::Disconnected);
        assert_eq!(p.stats().link_drops, 1);
    }

    #[test]
    fn publish_requires_connection() {
        let mut p = publisher(FakeLink::default());
        assert_eq!(
            p.publish("t", &Sample { x: 1 }),
            Err(PublishError::NotConnected)
        );
        assert!(!p.led_on());
        assert_eq!(p.stats().failed_publishes, 1);
    }

    #[test]
    fn indicator_flips_once_per_publish() {
        let mut p = publisher(FakeLink::default());
        p.ensure_connected(&mut Sleeps::default());
        assert_eq!(p.publish("t", &Sample { x: 1 }), Ok(7));
        assert!(p.led_on());
        p.publish("t", &Sample { x: 2 }).unwrap();
        assert!(!p.led_on());
        assert_eq!(p.indicator.0, vec![false, true, false]);
        assert_eq!(p.link().published[0].1, br#"{"x":1}"#.to_vec());
        assert_eq!(p.stats().last_published_topic.as_str(), "t");
    }

    #[test]
    fn link_refusing_publish_drops_state() {
        let mut p = publisher(FakeLink::default());
        p.ensure_connected(&mut Sleeps::default());
        p.link.publish_error = Some(LinkError::NotConnected);
        assert_eq!(
            p.publish("t", &Sample { x: 1 }),
            Err(PublishError::Link(LinkError::NotConnected))
        );
        assert_eq!(p.state(), ConnectionState::Disconnected);
        assert!(!p.led_on());
    }
}
