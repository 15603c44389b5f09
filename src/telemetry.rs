//! JSON payloads for the two broker topics, encoded into a fixed buffer.

use serde::Serialize;

use crate::decode::{BroadcastReading, MeterReading};
use crate::error::PublishError;

/// Output buffer size for one encoded payload.
///
/// A thermometer payload with every numeric field at its widest and a full
/// 17-character address is 69 bytes before the name, so anything up to a
/// 123-byte plain-ASCII name fits. Longer or heavily escaped names fail the
/// publish rather than being cut.
pub const PAYLOAD_CAPACITY: usize = 192;

/// `esp/thermo` body. Field order is the wire order.
#[derive(Debug, Serialize)]
pub struct ThermoPayload<'a> {
    pub t: i16,
    pub h: u8,
    pub v: u16,
    pub b: u8,
    pub d: heapless::String<17>,
    pub n: &'a str,
}

impl<'a> From<&'a BroadcastReading> for ThermoPayload<'a> {
    fn from(r: &'a BroadcastReading) -> Self {
        let mut d = heapless::String::new();
        // Six octets always format to exactly 17 characters.
        let _ = core::fmt::write(&mut d, format_args!("{}", r.address));
        Self {
            t: r.temperature,
            h: r.humidity,
            v: r.battery_mv,
            b: r.battery_percent,
            d,
            n: &r.name,
        }
    }
}

/// `water/consumption` body.
#[derive(Debug, Serialize)]
pub struct WaterPayload {
    pub meter: u32,
    pub usg: u32,
}

impl From<&MeterReading> for WaterPayload {
    fn from(r: &MeterReading) -> Self {
        Self {
            meter: r.meter_id,
            usg: r.usage,
        }
    }
}

/// Stack buffer holding one encoded payload.
pub struct EncodedPayload {
    buf: [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl EncodedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encode `payload` as compact JSON.
///
/// Writes go through a slice writer that refuses to grow, so an oversized
/// payload surfaces as [`PublishError::PayloadTooLarge`] and nothing past
/// the buffer is touched.
pub fn encode<T: Serialize>(payload: &T) -> Result<EncodedPayload, PublishError> {
    let mut buf = [0u8; PAYLOAD_CAPACITY];
    let mut cursor: &mut [u8] = &mut buf;
    match serde_json::to_writer(&mut cursor, payload) {
        Ok(()) => {
            let len = PAYLOAD_CAPACITY - cursor.len();
            Ok(EncodedPayload { buf, len })
        }
        Err(e) if e.is_io() => Err(PublishError::PayloadTooLarge {
            capacity: PAYLOAD_CAPACITY,
        }),
        Err(_) => Err(PublishError::Encode),
    }
}
