//! Error types for the bridge core.
//!
//! All variants are `Copy` so they pass through the dispatcher and the
//! statistics counters without allocation. Platform adapters wrap their
//! ESP-IDF failures with `anyhow` at construction time and map runtime
//! failures onto these enums.

use core::fmt;

/// BLE scan failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// The radio stack refused to start the scan.
    StartFailed,
    /// The scan ended before the window elapsed.
    Aborted,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartFailed => write!(f, "scan start failed"),
            Self::Aborted => write!(f, "scan aborted"),
        }
    }
}

impl std::error::Error for ScanError {}

/// Register-level failures talking to the sub-GHz transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// SPI transfer failed.
    Spi,
    /// Chip did not answer with a known part/version number.
    UnknownChip(u8),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi => write!(f, "SPI transfer failed"),
            Self::UnknownChip(v) => write!(f, "unknown transceiver version 0x{:02X}", v),
        }
    }
}

impl std::error::Error for RadioError {}

/// Reasons a meter fetch produced no reading.
///
/// None of these are surfaced as errors to the operator: the scheduler
/// answers every one of them with a receiver reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    /// No complete frame waiting in the receiver.
    NoPacket,
    /// Receiver FIFO overflowed; contents are unusable.
    Overflow,
    /// Frame shorter than its length field claims.
    Truncated,
    /// A block CRC did not match.
    Crc,
    /// T-mode chip sequence is not a valid 3-of-6 code word.
    Coding,
    /// Frame structure not understood (bad marker, CI field, record layout).
    Malformed,
    /// Application payload is encrypted.
    Encrypted,
    /// Frame decoded but carried no volume record.
    NoVolume,
    /// Transceiver access failed.
    Radio(RadioError),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPacket => write!(f, "no packet"),
            Self::Overflow => write!(f, "RX FIFO overflow"),
            Self::Truncated => write!(f, "truncated frame"),
            Self::Crc => write!(f, "CRC mismatch"),
            Self::Coding => write!(f, "3-of-6 coding error"),
            Self::Malformed => write!(f, "malformed frame"),
            Self::Encrypted => write!(f, "encrypted payload"),
            Self::NoVolume => write!(f, "no volume record"),
            Self::Radio(e) => write!(f, "radio: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<RadioError> for FetchError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

/// Broker link failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Connect attempt did not complete within its timeout.
    Timeout,
    /// Broker or network refused the connection.
    Refused,
    /// Link is down.
    NotConnected,
    /// Client could not queue the message.
    Enqueue,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "connect timed out"),
            Self::Refused => write!(f, "connection refused"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Enqueue => write!(f, "enqueue failed"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Publish failures. A failed publish never flips the liveness indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// Publisher is not in the `Connected` state.
    NotConnected,
    /// Encoded payload does not fit the output buffer.
    PayloadTooLarge { capacity: usize },
    /// Payload could not be encoded.
    Encode,
    /// Link rejected the message.
    Link(LinkError),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::PayloadTooLarge { capacity } => {
                write!(f, "payload exceeds {capacity} byte buffer")
            }
            Self::Encode => write!(f, "payload encoding failed"),
            Self::Link(e) => write!(f, "link: {e}"),
        }
    }
}

impl std::error::Error for PublishError {}

impl From<LinkError> for PublishError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

/// Firmware upload rejected by the update endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    /// `multipart/form-data` without a boundary parameter.
    MissingBoundary,
    /// Multipart body did not start with the announced boundary.
    MalformedMultipart,
    /// Body ended before the closing boundary.
    Incomplete,
    /// No image bytes received.
    Empty,
    /// Flash write rejected a chunk.
    Write,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "multipart boundary missing"),
            Self::MalformedMultipart => write!(f, "malformed multipart body"),
            Self::Incomplete => write!(f, "upload ended early"),
            Self::Empty => write!(f, "empty upload"),
            Self::Write => write!(f, "flash write failed"),
        }
    }
}

impl std::error::Error for UploadError {}

/// Startup configuration rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A string value does not fit its fixed-capacity buffer.
    TooLong(&'static str),
    /// A required value is empty.
    Empty(&'static str),
    /// A timing value is zero or otherwise unusable.
    InvalidTiming(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(field) => write!(f, "{field} too long"),
            Self::Empty(field) => write!(f, "{field} must not be empty"),
            Self::InvalidTiming(field) => write!(f, "{field} must be non-zero"),
        }
    }
}

impl std::error::Error for ConfigError {}
