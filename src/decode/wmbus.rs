//! Wireless M-Bus (EN 13757-4) frame decoding for water meters.
//!
//! Captures start right after the 0x543D sync word, which C1 and T1 share.
//! C1 captures begin with a two-byte frame-format marker and carry plain
//! bytes; T1 captures are 3-of-6 coded from the first bit. Both carry a
//! frame format A body: a 10-byte first block and 16-byte follow-up blocks,
//! each trailed by a big-endian CRC-16/EN-13757.
//!
//! ```text
//!  C1:  54 CD | L C M M A A A A V T | crc | CI ... (≤16) | crc | ...
//!  T1:  3-of-6( L C M M A A A A V T | crc | CI ... )
//! ```
//!
//! Standard payloads must be unencrypted; the usage value is taken from the
//! first instantaneous volume record (VIF 0x13..=0x17). IZAR payloads are
//! handed to [`super::izar`].

use super::izar;
use super::meter::MeterReading;
use crate::error::FetchError;

/// Marker bytes that follow the sync word in C-mode, frame format A.
pub const FORMAT_A_MARKER: [u8; 2] = [0x54, 0xCD];
/// Marker bytes for frame format B (not supported).
pub const FORMAT_B_MARKER: [u8; 2] = [0x54, 0x3D];

/// 6-bit code words for nibbles 0x0..=0xF, three bits set in each.
const THREE_OF_SIX: [u8; 16] = [
    0x16, 0x0D, 0x0E, 0x0B, 0x1C, 0x19, 0x1A, 0x13, 0x2C, 0x25, 0x26, 0x23, 0x34, 0x31, 0x32, 0x29,
];

/// Longest format A frame on air: L = 255 plus every block CRC.
const MAX_ON_AIR: usize = 290;

/// L + C + M + A, the part of the first block covered by its CRC.
const FIRST_BLOCK_LEN: usize = 10;
const BLOCK_LEN: usize = 16;
const CRC_LEN: usize = 2;
/// C, M and A fields counted by L inside the first block.
const LINK_HEADER_LEN: usize = 9;

const CI_NO_HEADER: u8 = 0x78;
const CI_SHORT_HEADER: u8 = 0x7A;
const CI_LONG_HEADER: u8 = 0x72;

const DIF_IDLE_FILLER: u8 = 0x2F;
const DIF_MANUFACTURER: u8 = 0x0F;
const DIF_MORE_RECORDS: u8 = 0x1F;
const EXTENSION_BIT: u8 = 0x80;

/// CRC-16/EN-13757: poly 0x3D65, init 0, no reflection, final XOR 0xFFFF.
pub fn crc16_en13757(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x3D65
            } else {
                crc << 1
            };
        }
    }
    !crc
}

/// Bytes on air for a format A frame with the given L-field, counting the
/// L-field itself and every block CRC but not the marker.
pub fn format_a_len(l_field: u8) -> Option<usize> {
    let l = l_field as usize;
    let rest = l.checked_sub(LINK_HEADER_LEN)?;
    let blocks = rest.div_ceil(BLOCK_LEN);
    Some(FIRST_BLOCK_LEN + CRC_LEN + rest + blocks * CRC_LEN)
}

/// Data link layer header (C, M and A fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub control: u8,
    pub manufacturer: u16,
    pub id: u32,
    pub version: u8,
    pub device_type: u8,
}

impl LinkHeader {
    fn parse(bytes: &[u8]) -> Result<Self, FetchError> {
        let [control, m0, m1, a0, a1, a2, a3, version, device_type] =
            *<&[u8; 9]>::try_from(bytes).map_err(|_| FetchError::Truncated)?;
        Ok(Self {
            control,
            manufacturer: u16::from_le_bytes([m0, m1]),
            id: u32::from_le_bytes([a0, a1, a2, a3]),
            version,
            device_type,
        })
    }

    /// Three-letter FLAG manufacturer code, e.g. `*b"SAP"`.
    pub fn manufacturer_code(&self) -> [u8; 3] {
        let m = self.manufacturer;
        [
            (((m >> 10) & 0x1F) as u8) + 64,
            (((m >> 5) & 0x1F) as u8) + 64,
            ((m & 0x1F) as u8) + 64,
        ]
    }
}

/// A CRC-checked frame with block CRCs removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: LinkHeader,
    pub ci: u8,
    /// Everything after the CI field.
    pub application: heapless::Vec<u8, 255>,
}

impl Frame {
    /// Parse a C1 or T1 capture.
    pub fn parse(capture: &[u8]) -> Result<Self, FetchError> {
        Self::from_deblocked(&deblock_capture(capture)?)
    }

    /// Build from frame bytes with the block CRCs already removed.
    fn from_deblocked(data: &[u8]) -> Result<Self, FetchError> {
        // data[0] is L, data[1..10] the link header, data[10] the CI field.
        let header = LinkHeader::parse(data.get(1..FIRST_BLOCK_LEN).ok_or(FetchError::Truncated)?)?;
        let ci = *data.get(FIRST_BLOCK_LEN).ok_or(FetchError::Malformed)?;
        let application = heapless::Vec::from_slice(&data[FIRST_BLOCK_LEN + 1..])
            .map_err(|_| FetchError::Malformed)?;

        Ok(Self {
            header,
            ci,
            application,
        })
    }

    /// Split the application layer into the meter identity and the data records.
    fn records(&self) -> Result<(u32, &[u8]), FetchError> {
        let app = self.application.as_slice();
        match self.ci {
            CI_NO_HEADER => Ok((self.header.id, app)),
            CI_SHORT_HEADER => {
                let header = app.get(..4).ok_or(FetchError::Truncated)?;
                check_unencrypted(header[2], header[3])?;
                Ok((self.header.id, &app[4..]))
            }
            CI_LONG_HEADER => {
                let header = app.get(..12).ok_or(FetchError::Truncated)?;
                check_unencrypted(header[10], header[11])?;
                let id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
                Ok((id, &app[12..]))
            }
            _ => Err(FetchError::Malformed),
        }
    }
}

/// Strip the coding and block CRCs from a capture, keeping the L-field.
fn deblock_capture(capture: &[u8]) -> Result<heapless::Vec<u8, 256>, FetchError> {
    match capture.first() {
        None => Err(FetchError::Truncated),
        Some(&b) if b == FORMAT_A_MARKER[0] => {
            let (marker, body) = capture.split_at_checked(2).ok_or(FetchError::Truncated)?;
            if marker != FORMAT_A_MARKER {
                return Err(FetchError::Malformed);
            }
            let l_field = *body.first().ok_or(FetchError::Truncated)?;
            let on_air = format_a_len(l_field).ok_or(FetchError::Malformed)?;
            deblock_format_a(body.get(..on_air).ok_or(FetchError::Truncated)?)
        }
        Some(_) => {
            let l_field = decode_3of6::<1>(capture, 1)?[0];
            let on_air = format_a_len(l_field).ok_or(FetchError::Malformed)?;
            deblock_format_a(&decode_3of6::<MAX_ON_AIR>(capture, on_air)?)
        }
    }
}

/// Decode `count` bytes from a 3-of-6 coded bit stream, high nibble first.
pub fn decode_3of6<const N: usize>(
    raw: &[u8],
    count: usize,
) -> Result<heapless::Vec<u8, N>, FetchError> {
    let mut out = heapless::Vec::new();
    let mut input = raw.iter();
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    while out.len() < count {
        while bits < 12 {
            let byte = *input.next().ok_or(FetchError::Truncated)?;
            acc = ((acc << 8) | byte as u32) & 0xF_FFFF;
            bits += 8;
        }
        bits -= 12;
        let word = acc >> bits;
        let hi = nibble((word >> 6) as u8 & 0x3F)?;
        let lo = nibble(word as u8 & 0x3F)?;
        out.push((hi << 4) | lo).map_err(|_| FetchError::Malformed)?;
    }
    Ok(out)
}

fn nibble(code: u8) -> Result<u8, FetchError> {
    THREE_OF_SIX
        .iter()
        .position(|&c| c == code)
        .map(|n| n as u8)
        .ok_or(FetchError::Coding)
}

/// Check and drop the CRC after each block of a format A body.
fn deblock_format_a(body: &[u8]) -> Result<heapless::Vec<u8, 256>, FetchError> {
    let mut data = heapless::Vec::new();
    let (first, mut rest) = body
        .split_at_checked(FIRST_BLOCK_LEN + CRC_LEN)
        .ok_or(FetchError::Truncated)?;
    push_block(&mut data, first)?;
    while !rest.is_empty() {
        let take = rest.len().min(BLOCK_LEN + CRC_LEN);
        let (block, tail) = rest.split_at(take);
        push_block(&mut data, block)?;
        rest = tail;
    }
    Ok(data)
}

fn push_block(out: &mut heapless::Vec<u8, 256>, block: &[u8]) -> Result<(), FetchError> {
    let (payload, crc) = block
        .split_at_checked(block.len().saturating_sub(CRC_LEN))
        .ok_or(FetchError::Truncated)?;
    if crc.len() != CRC_LEN || payload.is_empty() {
        return Err(FetchError::Truncated);
    }
    if crc16_en13757(payload) != u16::from_be_bytes([crc[0], crc[1]]) {
        return Err(FetchError::Crc);
    }
    out.extend_from_slice(payload)
        .map_err(|_| FetchError::Malformed)
}

/// Mode bits 8..=12 of the configuration word select the encryption scheme.
fn check_unencrypted(cw_lo: u8, cw_hi: u8) -> Result<(), FetchError> {
    let config_word = u16::from_le_bytes([cw_lo, cw_hi]);
    if (config_word >> 8) & 0x1F != 0 {
        return Err(FetchError::Encrypted);
    }
    Ok(())
}

/// Decode a raw capture into a meter reading.
pub fn decode_meter_frame(capture: &[u8]) -> Result<MeterReading, FetchError> {
    let data = deblock_capture(capture)?;
    let frame = Frame::from_deblocked(&data)?;
    if izar::is_prios(&frame.header, frame.ci) {
        return izar::decode_prios(&data, &frame.header);
    }
    let (meter_id, records) = frame.records()?;
    let usage = find_volume(records)?;
    Ok(MeterReading { meter_id, usage })
}

/// Walk DIF/VIF data records and return the first current volume in litres.
fn find_volume(records: &[u8]) -> Result<u32, FetchError> {
    let mut i = 0;
    while i < records.len() {
        let dif = records[i];
        i += 1;
        if dif == DIF_IDLE_FILLER {
            continue;
        }
        if dif == DIF_MANUFACTURER || dif == DIF_MORE_RECORDS {
            break;
        }

        let has_dife = dif & EXTENSION_BIT != 0;
        let mut ext = has_dife;
        while ext {
            let dife = *records.get(i).ok_or(FetchError::Truncated)?;
            i += 1;
            ext = dife & EXTENSION_BIT != 0;
        }

        let vif = *records.get(i).ok_or(FetchError::Truncated)?;
        i += 1;
        let mut ext = vif & EXTENSION_BIT != 0;
        while ext {
            let vife = *records.get(i).ok_or(FetchError::Truncated)?;
            i += 1;
            ext = vife & EXTENSION_BIT != 0;
        }

        let len = match dif & 0x0F {
            0x0 | 0x8 => 0,
            0x1 | 0x9 => 1,
            0x2 | 0xA => 2,
            0x3 | 0xB => 3,
            0x4 | 0x5 | 0xC => 4,
            0x6 | 0xE => 6,
            0x7 => 8,
            0xD => {
                let lvar = *records.get(i).ok_or(FetchError::Truncated)?;
                i += 1;
                if lvar >= 0xC0 {
                    return Err(FetchError::Malformed);
                }
                lvar as usize
            }
            _ => return Err(FetchError::Malformed),
        };
        let value = records.get(i..i + len).ok_or(FetchError::Truncated)?;
        i += len;

        // Function field and storage number both zero: current value.
        let current = dif & 0x70 == 0 && !has_dife;
        if current && (0x13..=0x17).contains(&vif) {
            let raw = match dif & 0x0F {
                0x4 => u32::from_le_bytes([value[0], value[1], value[2], value[3]]),
                0xC => bcd_to_u32(value)?,
                _ => continue,
            };
            let scale = 10u32.pow((vif - 0x13) as u32);
            return raw.checked_mul(scale).ok_or(FetchError::Malformed);
        }
    }
    Err(FetchError::NoVolume)
}

/// Packed BCD, least significant byte first.
fn bcd_to_u32(bytes: &[u8]) -> Result<u32, FetchError> {
    let mut value: u32 = 0;
    for &byte in bytes.iter().rev() {
        let (hi, lo) = (byte >> 4, byte & 0x0F);
        if hi > 9 || lo > 9 {
            return Err(FetchError::Malformed);
        }
        value = value * 100 + (hi as u32) * 10 + lo as u32;
    }
    Ok(value)
}
