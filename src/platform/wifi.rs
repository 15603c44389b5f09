use anyhow::Result;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};
use std::net::Ipv4Addr;

use crate::config::WifiConfig;

/// Station-mode Wi-Fi with a DHCP hostname.
pub struct WifiManager {
    wifi: Box<BlockingWifi<EspWifi<'static>>>,
    ssid: heapless::String<32>,
}

impl WifiManager {
    /// Join the configured network and wait for an address.
    pub fn connect(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: &WifiConfig,
        hostname: &str,
    ) -> Result<Self> {
        info!("🌐 WiFi: Creating EspWifi instance...");
        let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        esp_wifi.sta_netif_mut().set_hostname(hostname)?;
        info!("✅ WiFi: Hostname '{}'", hostname);

        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        esp_wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: config.ssid.clone(),
            auth_method,
            password: config.password.clone(),
            ..Default::default()
        }))?;

        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        info!("🌐 WiFi: Starting...");
        wifi.start()?;

        info!("🌐 WiFi: Connecting to '{}'...", config.ssid);
        wifi.connect()?;
        wifi.wait_netif_up()?;

        let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
        info!("✅ WiFi: Connected, IP address {}", ip_info.ip);

        Ok(Self {
            wifi: Box::new(wifi),
            ssid: config.ssid.clone(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    pub fn ip(&self) -> Result<Ipv4Addr> {
        Ok(self.wifi.wifi().sta_netif().get_ip_info()?.ip)
    }

    /// Rejoin the same network after the station dropped.
    pub fn reconnect(&mut self) -> Result<()> {
        warn!("🔌 WiFi: Station down, rejoining '{}'...", self.ssid);
        if let Err(e) = self.wifi.disconnect() {
            info!("WiFi: disconnect before rejoin: {:?}", e);
        }
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;
        info!("✅ WiFi: Rejoined, IP address {}", self.ip()?);
        Ok(())
    }
}
