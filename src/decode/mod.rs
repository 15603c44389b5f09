//! Frame decoders: pure functions from raw radio bytes to typed readings.

pub mod izar;
pub mod meter;
pub mod thermo;
pub mod wmbus;

pub use meter::MeterReading;
pub use thermo::{decode_advertisement, local_name, Advertisement, BdAddr, BroadcastReading};
pub use wmbus::decode_meter_frame;
