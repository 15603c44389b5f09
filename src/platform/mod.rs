//! ESP-IDF adapters for the port traits.
//!
//! | Adapter   | Implements        | Connects to                   |
//! |-----------|-------------------|-------------------------------|
//! | `ble`     | BleScanner        | Bluedroid GAP observer        |
//! | `board`   | Timebase          | esp_timer + FreeRTOS delay    |
//! |           | Entropy           | hardware RNG                  |
//! |           | LivenessIndicator | GPIO2 LED                     |
//! | `mqtt`    | BrokerLink        | ESP-IDF MQTT client           |
//! | `ota`     | UpdateEndpoint    | HTTP server + OTA partitions  |
//! | `wifi`    | (used by `mqtt`)  | ESP-IDF Wi-Fi station         |
//!
//! The CC1101 receiver needs no adapter: [`crate::radio`] runs directly on
//! the HAL's SPI device driver.

pub mod ble;
pub mod board;
pub mod mqtt;
pub mod ota;
pub mod wifi;

pub use ble::BluedroidScanner;
pub use board::{start_mdns, EspEntropy, EspTimebase, StatusLed};
pub use mqtt::EspBrokerLink;
pub use ota::{mark_running_image_valid, HttpUpdateEndpoint};
pub use wifi::WifiManager;
