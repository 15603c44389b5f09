//! Small board services: clock, entropy, status LED and mDNS.

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{Output, OutputPin, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_svc::sys;
use log::{error, info, warn};

use crate::ports::{Entropy, LivenessIndicator, Timebase};

/// High-resolution ESP timer truncated to wrapping milliseconds.
#[derive(Debug, Default)]
pub struct EspTimebase;

impl Timebase for EspTimebase {
    fn now_ms(&self) -> u32 {
        ((unsafe { sys::esp_timer_get_time() }) / 1000) as u32
    }

    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

/// Hardware RNG. Only random when the RF subsystem is up.
#[derive(Debug, Default)]
pub struct EspEntropy;

impl Entropy for EspEntropy {
    fn next_u16(&mut self) -> u16 {
        (unsafe { sys::esp_random() } & 0xFFFF) as u16
    }
}

/// On-board LED.
pub struct StatusLed<'d, P: OutputPin> {
    pin: PinDriver<'d, P, Output>,
}

impl<'d, P: OutputPin> StatusLed<'d, P> {
    pub fn new(pin: impl Peripheral<P = P> + 'd) -> anyhow::Result<Self> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl<P: OutputPin> LivenessIndicator for StatusLed<'_, P> {
    fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("LED: write failed: {:?}", e);
        }
    }
}

/// Advertise `<hostname>.local`. Call once the station has an address.
pub fn start_mdns(hostname: &str) {
    let mut buf = [0u8; 33];
    let len = hostname.len().min(32);
    buf[..len].copy_from_slice(&hostname.as_bytes()[..len]);

    unsafe {
        let ret = sys::mdns_init();
        if ret != sys::ESP_OK as i32 {
            error!("mDNS: mdns_init failed ({})", ret);
            return;
        }
        let ret = sys::mdns_hostname_set(buf.as_ptr() as *const _);
        if ret != sys::ESP_OK as i32 {
            error!("mDNS: hostname_set failed ({})", ret);
            return;
        }
    }
    info!("🌐 mDNS: advertising {}.local", hostname);
}
