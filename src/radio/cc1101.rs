//! CC1101 sub-GHz transceiver register access.
//!
//! Every SPI transaction starts with a header byte:
//!
//! ```text
//!   bit 7   R/W   (1 = read)
//!   bit 6   burst (status registers and FIFO bursts)
//!   5..0    address
//! ```
//!
//! Chip select is owned by the SPI device, one assertion per `transfer`.

use embedded_hal::blocking::spi::Transfer;
use log::{debug, info};

use crate::error::RadioError;

const READ: u8 = 0x80;
const BURST: u8 = 0x40;

/// Command strobes.
pub mod strobe {
    pub const SRES: u8 = 0x30;
    pub const SRX: u8 = 0x34;
    pub const SIDLE: u8 = 0x36;
    pub const SFRX: u8 = 0x3A;
    pub const SNOP: u8 = 0x3D;
}

/// Configuration register addresses.
pub mod reg {
    pub const IOCFG0: u8 = 0x02;
    pub const FIFOTHR: u8 = 0x03;
    pub const SYNC1: u8 = 0x04;
    pub const SYNC0: u8 = 0x05;
    pub const PKTLEN: u8 = 0x06;
    pub const PKTCTRL1: u8 = 0x07;
    pub const PKTCTRL0: u8 = 0x08;
    pub const FSCTRL1: u8 = 0x0B;
    pub const FREQ2: u8 = 0x0D;
    pub const FREQ1: u8 = 0x0E;
    pub const FREQ0: u8 = 0x0F;
    pub const MDMCFG4: u8 = 0x10;
    pub const MDMCFG3: u8 = 0x11;
    pub const MDMCFG2: u8 = 0x12;
    pub const MDMCFG1: u8 = 0x13;
    pub const MDMCFG0: u8 = 0x14;
    pub const DEVIATN: u8 = 0x15;
    pub const MCSM1: u8 = 0x17;
    pub const MCSM0: u8 = 0x18;
    pub const FOCCFG: u8 = 0x19;
    pub const AGCCTRL2: u8 = 0x1B;
    pub const FSCAL3: u8 = 0x23;
    pub const FSCAL2: u8 = 0x24;
    pub const FSCAL1: u8 = 0x25;
    pub const FSCAL0: u8 = 0x26;
    pub const TEST2: u8 = 0x2C;
    pub const TEST1: u8 = 0x2D;
    pub const TEST0: u8 = 0x2E;
}

/// Status register addresses (read with the burst bit set).
pub mod status {
    pub const PARTNUM: u8 = 0x30;
    pub const VERSION: u8 = 0x31;
    pub const MARCSTATE: u8 = 0x35;
    pub const RXBYTES: u8 = 0x3B;
}

pub const FIFO: u8 = 0x3F;
pub const FIFO_SIZE: usize = 64;

/// Bytes captured per frame after sync. The chip runs in fixed-length mode
/// so the whole capture lands in the FIFO before it is read.
pub const CAPTURE_LEN: u8 = 64;

/// MARCSTATE values.
pub const MARCSTATE_SLEEP: u8 = 0x00;
pub const MARCSTATE_IDLE: u8 = 0x01;
pub const MARCSTATE_RX: u8 = 0x0D;
pub const MARCSTATE_RXFIFO_OVERFLOW: u8 = 0x11;

const RXBYTES_OVERFLOW: u8 = 0x80;
const RXBYTES_COUNT: u8 = 0x7F;

/// Silicon revisions seen in the field.
const KNOWN_VERSIONS: [u8; 2] = [0x04, 0x14];

/// wM-Bus C1/T1 receive profile: 868.95 MHz, 26 MHz crystal, 2-FSK at
/// ~100 kchip/s, 16-bit sync 0x543D, fixed-length capture. The T1 preamble
/// tail and sync bits form the same 0x543D pattern, so both modes land here
/// and the decoder tells them apart by the first captured byte.
pub const WMBUS_CT_MODE: [(u8, u8); 26] = [
    (reg::IOCFG0, 0x06),
    (reg::FIFOTHR, 0x07),
    (reg::SYNC1, 0x54),
    (reg::SYNC0, 0x3D),
    (reg::PKTLEN, CAPTURE_LEN),
    (reg::PKTCTRL1, 0x00),
    (reg::PKTCTRL0, 0x00),
    (reg::FSCTRL1, 0x08),
    (reg::FREQ2, 0x21),
    (reg::FREQ1, 0x6B),
    (reg::FREQ0, 0xD1),
    (reg::MDMCFG4, 0x5B),
    (reg::MDMCFG3, 0xF8),
    (reg::MDMCFG2, 0x02),
    (reg::MDMCFG1, 0x22),
    (reg::MDMCFG0, 0xF8),
    (reg::DEVIATN, 0x46),
    (reg::MCSM1, 0x00),
    (reg::MCSM0, 0x18),
    (reg::FOCCFG, 0x2E),
    (reg::FSCAL3, 0xE9),
    (reg::FSCAL2, 0x2A),
    (reg::FSCAL1, 0x00),
    (reg::FSCAL0, 0x1F),
    (reg::TEST2, 0x81),
    (reg::TEST1, 0x35),
];

/// FIFO fill level as reported by RXBYTES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFifo {
    pub count: u8,
    pub overflow: bool,
}

pub struct Cc1101<SPI> {
    spi: SPI,
}

impl<SPI, E> Cc1101<SPI>
where
    SPI: Transfer<u8, Error = E>,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    #[cfg(test)]
    pub(crate) fn spi(&self) -> &SPI {
        &self.spi
    }

    /// Send a command strobe. Returns the chip status byte.
    pub fn strobe(&mut self, command: u8) -> Result<u8, RadioError> {
        let mut buf = [command];
        let out = self.spi.transfer(&mut buf).map_err(|_| RadioError::Spi)?;
        Ok(out[0])
    }

    pub fn write_register(&mut self, addr: u8, value: u8) -> Result<(), RadioError> {
        let mut buf = [addr, value];
        self.spi.transfer(&mut buf).map_err(|_| RadioError::Spi)?;
        Ok(())
    }

    pub fn read_register(&mut self, addr: u8) -> Result<u8, RadioError> {
        self.read_raw(addr | READ)
    }

    pub fn read_status(&mut self, addr: u8) -> Result<u8, RadioError> {
        self.read_raw(addr | READ | BURST)
    }

    fn read_raw(&mut self, header: u8) -> Result<u8, RadioError> {
        let mut buf = [header, 0];
        let out = self.spi.transfer(&mut buf).map_err(|_| RadioError::Spi)?;
        Ok(out[1])
    }

    /// Burst-read `buf.len()` bytes out of the RX FIFO.
    pub fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), RadioError> {
        let n = buf.len().min(FIFO_SIZE);
        let mut frame = [0u8; FIFO_SIZE + 1];
        frame[0] = FIFO | READ | BURST;
        let out = self
            .spi
            .transfer(&mut frame[..=n])
            .map_err(|_| RadioError::Spi)?;
        buf[..n].copy_from_slice(&out[1..=n]);
        Ok(())
    }

    pub fn rx_fifo(&mut self) -> Result<RxFifo, RadioError> {
        let raw = self.read_status(status::RXBYTES)?;
        Ok(RxFifo {
            count: raw & RXBYTES_COUNT,
            overflow: raw & RXBYTES_OVERFLOW != 0,
        })
    }

    pub fn marc_state(&mut self) -> Result<u8, RadioError> {
        Ok(self.read_status(status::MARCSTATE)? & 0x1F)
    }

    /// True while the state machine is in RX or calibrating on its way there.
    pub fn is_listening(&mut self) -> Result<bool, RadioError> {
        let state = self.marc_state()?;
        Ok(!matches!(
            state,
            MARCSTATE_SLEEP | MARCSTATE_IDLE | MARCSTATE_RXFIFO_OVERFLOW
        ))
    }

    /// Check the chip answers with a known silicon version.
    pub fn probe(&mut self) -> Result<u8, RadioError> {
        let version = self.read_status(status::VERSION)?;
        if !KNOWN_VERSIONS.contains(&version) {
            return Err(RadioError::UnknownChip(version));
        }
        let part = self.read_status(status::PARTNUM)?;
        info!("📻 CC1101: part 0x{:02X} version 0x{:02X}", part, version);
        Ok(version)
    }

    /// Reset, load the C1/T1 profile and the AGC setting, then enter RX.
    pub fn configure(&mut self, agc_ctrl2: u8) -> Result<(), RadioError> {
        self.strobe(strobe::SRES)?;
        for &(addr, value) in WMBUS_CT_MODE.iter() {
            self.write_register(addr, value)?;
        }
        self.write_register(reg::AGCCTRL2, agc_ctrl2)?;
        debug!("CC1101: AGCCTRL2 = 0x{:02X}", agc_ctrl2);
        self.enter_rx()
    }

    /// Idle, flush the RX FIFO and listen again.
    pub fn enter_rx(&mut self) -> Result<(), RadioError> {
        self.strobe(strobe::SIDLE)?;
        self.strobe(strobe::SFRX)?;
        self.strobe(strobe::SRX)?;
        Ok(())
    }
}
