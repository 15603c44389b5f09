//! BLE thermometer advertisement decoding.
//!
//! The thermometers broadcast a service-data AD structure (UUID 0x181A)
//! with fixed offsets into the raw advertisement payload:
//!
//! | Offset | Field                          |
//! |--------|--------------------------------|
//! | 4..10  | MAC, display order             |
//! | 10..12 | temperature, BE `i16`, 0.1 °C  |
//! | 12     | humidity, percent              |
//! | 13     | battery, percent               |
//! | 14..16 | battery, BE `u16`, millivolts  |
//! | 16     | frame counter (ignored)        |
//!
//! The payload carries no checksum, so the only guards are the vendor
//! prefix on the advertiser address and the length check below.

use core::fmt;

/// Shortest payload that still holds every decoded field.
pub const MIN_PAYLOAD_LEN: usize = 16;

const TEMPERATURE: usize = 10;
const HUMIDITY: usize = 12;
const BATTERY_PERCENT: usize = 13;
const BATTERY_MV: usize = 14;

/// 48-bit Bluetooth device address, most significant octet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn has_prefix(&self, prefix: [u8; 2]) -> bool {
        self.0[..2] == prefix
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

/// One advertisement as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: BdAddr,
    pub payload: Vec<u8>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReading {
    /// Tenths of a degree Celsius.
    pub temperature: i16,
    pub humidity: u8,
    pub battery_percent: u8,
    pub battery_mv: u16,
    pub address: BdAddr,
    pub name: String,
}

impl BroadcastReading {
    /// Temperature for log lines, e.g. `-0.5`.
    pub fn celsius(&self) -> DeciCelsius {
        DeciCelsius(self.temperature)
    }
}

/// Fixed-point tenths of a degree, displayed with one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeciCelsius(pub i16);

impl fmt::Display for DeciCelsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let tenths = self.0.unsigned_abs();
        write!(f, "{}{}.{}", sign, tenths / 10, tenths % 10)
    }
}

/// Decode a thermometer advertisement.
///
/// Returns `None` for foreign advertisers and for payloads too short to
/// hold every field; neither case is an error.
pub fn decode_advertisement(adv: &Advertisement, prefix: [u8; 2]) -> Option<BroadcastReading> {
    if !adv.address.has_prefix(prefix) {
        return None;
    }

    let fields = adv.payload.get(TEMPERATURE..MIN_PAYLOAD_LEN)?;
    let at = |offset: usize| fields[offset - TEMPERATURE];

    Some(BroadcastReading {
        temperature: i16::from_be_bytes([at(TEMPERATURE), at(TEMPERATURE + 1)]),
        humidity: at(HUMIDITY),
        battery_percent: at(BATTERY_PERCENT),
        battery_mv: u16::from_be_bytes([at(BATTERY_MV), at(BATTERY_MV + 1)]),
        address: adv.address,
        name: adv.name.clone().unwrap_or_default(),
    })
}

const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// Local name from the AD structures of an advertisement or scan response.
///
/// A complete name wins over a shortened one. Walking stops at the first
/// zero-length structure or one that overruns the payload.
pub fn local_name(payload: &[u8]) -> Option<String> {
    let mut short = None;
    let mut rest = payload;
    while let [len, tail @ ..] = rest {
        let len = *len as usize;
        if len == 0 || len > tail.len() {
            break;
        }
        let (structure, next) = tail.split_at(len);
        match structure[0] {
            AD_COMPLETE_NAME => return Some(String::from_utf8_lossy(&structure[1..]).into_owned()),
            AD_SHORT_NAME => short = Some(String::from_utf8_lossy(&structure[1..]).into_owned()),
            _ => {}
        }
        rest = next;
    }
    short
}
