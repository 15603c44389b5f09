use embedded_hal::blocking::spi::Transfer;
use log::{debug, warn};

use super::cc1101::{Cc1101, CAPTURE_LEN};
use crate::decode::{decode_meter_frame, MeterReading};
use crate::error::{FetchError, RadioError};
use crate::ports::MeterReceiver;

/// [`MeterReceiver`] backed by a CC1101 in fixed-length capture mode.
pub struct Cc1101MeterReceiver<SPI> {
    radio: Cc1101<SPI>,
    agc_ctrl2: u8,
    frames_decoded: u32,
    reconfigurations: u32,
}

impl<SPI, E> Cc1101MeterReceiver<SPI>
where
    SPI: Transfer<u8, Error = E>,
{
    /// Probe the chip, load the receive profile and start listening.
    pub fn start(spi: SPI, agc_ctrl2: u8) -> Result<Self, RadioError> {
        let mut radio = Cc1101::new(spi);
        radio.probe()?;
        radio.configure(agc_ctrl2)?;
        Ok(Self::armed(radio, agc_ctrl2))
    }

    fn armed(radio: Cc1101<SPI>, agc_ctrl2: u8) -> Self {
        Self {
            radio,
            agc_ctrl2,
            frames_decoded: 0,
            reconfigurations: 0,
        }
    }

    pub fn frames_decoded(&self) -> u32 {
        self.frames_decoded
    }

    /// Resets that had to reload the full register profile.
    pub fn reconfigurations(&self) -> u32 {
        self.reconfigurations
    }

    pub fn radio(&mut self) -> &mut Cc1101<SPI> {
        &mut self.radio
    }
}

impl<SPI, E> MeterReceiver for Cc1101MeterReceiver<SPI>
where
    SPI: Transfer<u8, Error = E>,
{
    fn fetch_packet(&mut self) -> Result<MeterReading, FetchError> {
        let fifo = self.radio.rx_fifo()?;
        if fifo.overflow {
            return Err(FetchError::Overflow);
        }
        if fifo.count < CAPTURE_LEN {
            return Err(FetchError::NoPacket);
        }

        let mut capture = [0u8; CAPTURE_LEN as usize];
        self.radio.read_fifo(&mut capture)?;
        // Listen for the next frame whatever this one turns out to be.
        self.radio.enter_rx()?;

        let reading = decode_meter_frame(&capture)?;
        self.frames_decoded = self.frames_decoded.wrapping_add(1);
        debug!("CC1101: frame from {:08X}", reading.meter_id);
        Ok(reading)
    }

    fn reset_receiver(&mut self) {
        let rearmed = self.radio.enter_rx().and_then(|_| self.radio.is_listening());
        if let Ok(true) = rearmed {
            return;
        }

        match rearmed {
            Ok(_) => warn!("CC1101: not in RX after re-arm, reloading profile"),
            Err(e) => warn!("CC1101: re-arm failed ({}), reloading profile", e),
        }
        self.reconfigurations = self.reconfigurations.wrapping_add(1);
        if let Err(e) = self.radio.configure(self.agc_ctrl2) {
            warn!("❌ CC1101: reconfigure failed: {}", e);
        }
    }
}
