/// A successful water-meter fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterReading {
    /// Identification number as transmitted (BCD digits read little-endian).
    pub meter_id: u32,
    /// Cumulative volume in litres.
    pub usage: u32,
}
