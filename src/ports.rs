//! Port traits between the scheduling core and the hardware.
//!
//! ```text
//!   platform adapter ──▶ port trait ──▶ Dispatcher / Publisher / Scheduler
//! ```
//!
//! The ESP-IDF adapters in [`crate::platform`] implement these on the
//! device; the integration tests implement them with recording mocks and a
//! fake clock. Every port is driven from the single dispatcher loop, so none
//! of them needs to be `Send` or `Sync`.

use core::time::Duration;

use crate::decode::{Advertisement, MeterReading};
use crate::error::{FetchError, LinkError, ScanError};

/// Monotonic millisecond tick source plus a blocking delay.
pub trait Timebase {
    /// Milliseconds since boot. Wraps at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Block the calling loop for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Short-range radio scanner.
pub trait BleScanner {
    /// Actively scan for `window` and return every advertisement seen, in
    /// discovery order. Blocks for the whole window.
    fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, ScanError>;

    /// Drop whatever result set the radio stack retained from the last scan.
    fn clear_results(&mut self);
}

/// Long-range meter receiver.
pub trait MeterReceiver {
    /// Take one decoded frame from the receiver, if a complete one is waiting.
    fn fetch_packet(&mut self) -> Result<MeterReading, FetchError>;

    /// Re-arm the receiver after a failed fetch.
    fn reset_receiver(&mut self);
}

/// Transport to the message broker.
pub trait BrokerLink {
    /// Make a single connect attempt, giving up after `timeout`.
    fn connect(&mut self, client_id: &str, timeout: Duration) -> Result<(), LinkError>;

    /// Service keepalive and inbound traffic. Returns whether the link is up.
    fn service(&mut self) -> bool;

    /// Send one message at-most-once, not retained.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError>;
}

/// On/off output flipped on every successful publish.
pub trait LivenessIndicator {
    fn set(&mut self, on: bool);
}

/// Source of pseudo-random client-id suffixes.
pub trait Entropy {
    fn next_u16(&mut self) -> u16;
}

/// Firmware-update endpoint sharing the loop.
pub trait UpdateEndpoint {
    /// Non-blocking; called once per dispatcher iteration.
    fn service(&mut self);
}
