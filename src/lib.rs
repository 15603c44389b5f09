//! ESP32 Sensor Bridge Library
//!
//! Forwards BLE thermometer broadcasts and wireless M-Bus water meter
//! readings to an MQTT broker from a single cooperative loop. Everything
//! except [`platform`] is target-independent and tested on the host.

#![deny(unused_must_use)]

pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod ports;
pub mod publisher;
pub mod radio;
pub mod scan;
pub mod scheduler;
pub mod telemetry;
pub mod update;

#[cfg(target_os = "espidf")]
pub mod platform;

pub use config::{BridgeConfig, BridgeTopics, MqttConfig, RadioConfig, WifiConfig};
pub use decode::{Advertisement, BdAddr, BroadcastReading, MeterReading};
pub use dispatcher::{Dispatcher, IterationReport, LoopStats};
pub use error::{
    ConfigError, FetchError, LinkError, PublishError, RadioError, ScanError, UploadError,
};
pub use ports::{
    BleScanner, BrokerLink, Entropy, LivenessIndicator, MeterReceiver, Timebase, UpdateEndpoint,
};
pub use publisher::{ConnectionState, TelemetryPublisher};
pub use radio::Cc1101MeterReceiver;
pub use scan::{BroadcastScanDriver, ScanResults};
pub use scheduler::{MeterPollScheduler, PollOutcome};
pub use telemetry::{ThermoPayload, WaterPayload};
pub use update::UploadBody;
