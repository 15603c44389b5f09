use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use log::{debug, info, warn};

use super::wifi::WifiManager;
use crate::error::LinkError;
use crate::ports::BrokerLink;

const CONNECT_POLL_MS: u32 = 50;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// [`BrokerLink`] over the ESP-IDF MQTT client.
///
/// Each `connect` builds a fresh client with the requested id. The client's
/// event thread flips `connected`; a client that fails to come up within
/// the timeout is dropped, which also ends its thread.
pub struct EspBrokerLink {
    broker_url: String,
    wifi: WifiManager,
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
}

impl EspBrokerLink {
    pub fn new(broker_url: &str, wifi: WifiManager) -> Self {
        Self {
            broker_url: broker_url.to_string(),
            wifi,
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_client(&mut self, client_id: &str, timeout: Duration) -> anyhow::Result<()> {
        let config = MqttClientConfiguration {
            client_id: Some(client_id),
            keep_alive_interval: Some(KEEP_ALIVE),
            network_timeout: timeout,
            ..Default::default()
        };
        let (client, mut connection) = EspMqttClient::new(&self.broker_url, &config)?;

        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);
        std::thread::Builder::new()
            .stack_size(6144)
            .name("mqtt_conn".to_string())
            .spawn(move || {
                while let Ok(event) = connection.next() {
                    match event.payload() {
                        EventPayload::Connected(session_present) => {
                            debug!("MQTT: session_present={}", session_present);
                            flag.store(true, Ordering::Relaxed);
                        }
                        EventPayload::Disconnected => flag.store(false, Ordering::Relaxed),
                        EventPayload::Error(e) => debug!("MQTT: {:?}", e),
                        _ => {}
                    }
                }
                flag.store(false, Ordering::Relaxed);
                debug!("MQTT: connection handler exiting");
            })?;

        self.client = Some(client);
        self.connected = connected;
        Ok(())
    }
}

impl BrokerLink for EspBrokerLink {
    fn connect(&mut self, client_id: &str, timeout: Duration) -> Result<(), LinkError> {
        // Drop any previous client before building the next one.
        self.client = None;
        self.connected.store(false, Ordering::Relaxed);

        if !self.wifi.is_connected() {
            if let Err(e) = self.wifi.reconnect() {
                warn!("❌ WiFi: rejoin failed: {:?}", e);
                return Err(LinkError::NotConnected);
            }
        }

        if let Err(e) = self.spawn_client(client_id, timeout) {
            warn!("❌ MQTT: client setup failed: {:?}", e);
            return Err(LinkError::Refused);
        }

        let mut waited: u32 = 0;
        let limit = timeout.as_millis() as u32;
        while !self.connected.load(Ordering::Relaxed) {
            if waited >= limit {
                self.client = None;
                return Err(LinkError::Timeout);
            }
            FreeRtos::delay_ms(CONNECT_POLL_MS);
            waited += CONNECT_POLL_MS;
        }
        info!("✅ MQTT: broker {} accepted '{}'", self.broker_url, client_id);
        Ok(())
    }

    fn service(&mut self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Relaxed)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(LinkError::NotConnected);
        }
        let client = self.client.as_mut().ok_or(LinkError::NotConnected)?;
        client
            .enqueue(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| {
                warn!("❌ MQTT: enqueue to '{}' failed: {:?}", topic, e);
                LinkError::Enqueue
            })?;
        Ok(())
    }
}
