//! Sub-GHz meter receiver.
//!
//! ```text
//!   CC1101 (SPI) ──▶ Cc1101 registers ──▶ Cc1101MeterReceiver ──▶ decode::wmbus (──▶ decode::izar)
//! ```
//!
//! Generic over the embedded-hal SPI traits so the whole path runs on the
//! host against a register-file mock.

pub mod cc1101;
pub mod receiver;

pub use cc1101::{Cc1101, RxFifo, CAPTURE_LEN};
pub use receiver::Cc1101MeterReceiver;
