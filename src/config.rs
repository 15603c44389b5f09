use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Advertisers whose address starts with these two octets are decoded as thermometers.
pub const THERMO_VENDOR_PREFIX: [u8; 2] = [0xA4, 0xC1];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_url: heapless::String<128>,
    /// A random hex suffix is appended on every connect attempt.
    pub client_id_prefix: heapless::String<16>,
    /// Socket timeout, also the ceiling on a single connect attempt.
    pub socket_timeout_secs: u32,
    /// Pause between failed connect attempts.
    pub reconnect_delay_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeTopics {
    pub thermo: heapless::String<64>,
    pub water: heapless::String<64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// AGCCTRL2 value written once after reset (0x43 is the chip default for
    /// the wM-Bus profile; 0x6B caps MAX_LNA_GAIN at 011 to cut sensitivity).
    pub agc_ctrl2: u8,
    pub poll_interval_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub hostname: heapless::String<32>,
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub topics: BridgeTopics,
    pub radio: RadioConfig,
    pub scan_window_ms: u32,
    pub vendor_prefix: [u8; 2],
}

impl Default for WifiConfig {
    fn default() -> Self {
        let mut ssid = heapless::String::new();
        let mut password = heapless::String::new();
        let _ = ssid.push_str("YOUR_SSID");
        let _ = password.push_str("YOUR_PASSWORD");

        Self { ssid, password }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        let mut broker_url = heapless::String::new();
        let mut client_id_prefix = heapless::String::new();
        let _ = broker_url.push_str("mqtt://192.168.1.10:1883");
        let _ = client_id_prefix.push_str("esp32-bridge");

        Self {
            broker_url,
            client_id_prefix,
            socket_timeout_secs: 5,
            reconnect_delay_ms: 5_000,
        }
    }
}

impl Default for BridgeTopics {
    fn default() -> Self {
        let mut thermo = heapless::String::new();
        let mut water = heapless::String::new();
        let _ = thermo.push_str("esp/thermo");
        let _ = water.push_str("water/consumption");

        Self { thermo, water }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            agc_ctrl2: 0x6B,
            poll_interval_ms: 20_000,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut hostname = heapless::String::new();
        let _ = hostname.push_str("esp32-bridge");

        Self {
            hostname,
            wifi: WifiConfig::default(),
            mqtt: MqttConfig::default(),
            topics: BridgeTopics::default(),
            radio: RadioConfig::default(),
            scan_window_ms: 5_000,
            vendor_prefix: THERMO_VENDOR_PREFIX,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with whatever was set in the build environment.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(
            option_env!("BRIDGE_WIFI_SSID"),
            option_env!("BRIDGE_WIFI_PASSWORD"),
            option_env!("BRIDGE_HOSTNAME"),
            option_env!("BRIDGE_MQTT_URL"),
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        ssid: Option<&str>,
        password: Option<&str>,
        hostname: Option<&str>,
        broker_url: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(ssid) = ssid {
            self.wifi.ssid = bounded(ssid, "wifi ssid")?;
        }
        if let Some(password) = password {
            self.wifi.password = bounded(password, "wifi password")?;
        }
        if let Some(hostname) = hostname {
            self.hostname = bounded(hostname, "hostname")?;
        }
        if let Some(url) = broker_url {
            self.mqtt.broker_url = bounded(url, "broker url")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi.ssid.is_empty() {
            return Err(ConfigError::Empty("wifi ssid"));
        }
        if self.hostname.is_empty() {
            return Err(ConfigError::Empty("hostname"));
        }
        if self.mqtt.broker_url.is_empty() {
            return Err(ConfigError::Empty("broker url"));
        }
        if self.topics.thermo.is_empty() || self.topics.water.is_empty() {
            return Err(ConfigError::Empty("topic"));
        }
        if self.scan_window_ms == 0 {
            return Err(ConfigError::InvalidTiming("scan window"));
        }
        if self.radio.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidTiming("meter poll interval"));
        }
        if self.mqtt.socket_timeout_secs == 0 {
            return Err(ConfigError::InvalidTiming("socket timeout"));
        }
        Ok(())
    }
}

fn bounded<const N: usize>(
    value: &str,
    field: &'static str,
) -> Result<heapless::String<N>, ConfigError> {
    let mut out = heapless::String::new();
    out.push_str(value).map_err(|_| ConfigError::TooLong(field))?;
    Ok(out)
}
