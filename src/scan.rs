//! Broadcast scan driver.
//!
//! Pulls one bounded scan from the radio, decodes the advertisements in
//! discovery order and always clears the radio's result set afterwards.

use core::time::Duration;

use log::{debug, warn};

use crate::decode::{decode_advertisement, local_name, Advertisement, BdAddr, BroadcastReading};
use crate::error::ScanError;
use crate::ports::BleScanner;

/// Advertisers collected during one scan window, merged by address.
///
/// Advertisers stay in first-seen order. A scan response only supplies the
/// name; the advertisement payload is never replaced by it.
#[derive(Debug)]
pub struct ScanResults {
    advertisements: Vec<Advertisement>,
    capacity: usize,
}

impl ScanResults {
    pub const fn new(capacity: usize) -> Self {
        Self {
            advertisements: Vec::new(),
            capacity,
        }
    }

    /// Merge one report. Reports from new advertisers past capacity are dropped.
    pub fn record(&mut self, address: BdAddr, data: &[u8], scan_response: bool) {
        let name = local_name(data);
        if let Some(existing) = self
            .advertisements
            .iter_mut()
            .find(|a| a.address == address)
        {
            if existing.name.is_none() {
                existing.name = name;
            }
            if !scan_response && existing.payload.is_empty() {
                existing.payload = data.to_vec();
            }
            return;
        }
        if self.advertisements.len() >= self.capacity {
            return;
        }
        self.advertisements.push(Advertisement {
            address,
            payload: if scan_response { Vec::new() } else { data.to_vec() },
            name,
        });
    }

    pub fn advertisements(&self) -> &[Advertisement] {
        &self.advertisements
    }

    pub fn len(&self) -> usize {
        self.advertisements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advertisements.is_empty()
    }

    pub fn clear(&mut self) {
        self.advertisements.clear();
    }
}

pub struct BroadcastScanDriver<S> {
    scanner: S,
    window: Duration,
    vendor_prefix: [u8; 2],
    advertisements_seen: u32,
}

impl<S: BleScanner> BroadcastScanDriver<S> {
    pub fn new(scanner: S, window_ms: u32, vendor_prefix: [u8; 2]) -> Self {
        Self {
            scanner,
            window: Duration::from_millis(window_ms as u64),
            vendor_prefix,
            advertisements_seen: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    /// Advertisements reported by the radio since boot, recognised or not.
    pub fn advertisements_seen(&self) -> u32 {
        self.advertisements_seen
    }

    /// Run one scan window. Blocks for the full window.
    pub fn scan(&mut self) -> Result<Vec<BroadcastReading>, ScanError> {
        let result = self.scanner.scan(self.window);
        self.scanner.clear_results();

        let advertisements = result.inspect_err(|e| warn!("BLE: scan failed: {}", e))?;
        self.advertisements_seen = self
            .advertisements_seen
            .wrapping_add(advertisements.len() as u32);

        let readings: Vec<BroadcastReading> = advertisements
            .iter()
            .filter_map(|adv| decode_advertisement(adv, self.vendor_prefix))
            .collect();

        debug!(
            "BLE: {} advertisements, {} thermometer readings",
            advertisements.len(),
            readings.len()
        );
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneShot {
        result: Option<Result<Vec<Advertisement>, ScanError>>,
        windows: Vec<Duration>,
        clears: usize,
    }

    impl BleScanner for OneShot {
        fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, ScanError> {
            self.windows.push(window);
            self.result.take().unwrap_or(Ok(Vec::new()))
        }

        fn clear_results(&mut self) {
            self.clears += 1;
        }
    }

    fn thermo(last: u8, temp: i16) -> Advertisement {
        let mut payload = vec![0u8; 17];
        payload[10..12].copy_from_slice(&temp.to_be_bytes());
        Advertisement {
            address: BdAddr([0xA4, 0xC1, 0x38, 0, 0, last]),
            payload,
            name: None,
        }
    }

    #[test]
    fn keeps_discovery_order_and_drops_foreign() {
        let foreign = Advertisement {
            address: BdAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            payload: vec![0; 31],
            name: Some("phone".into()),
        };
        let mut driver = BroadcastScanDriver::new(
            OneShot {
                result: Some(Ok(vec![thermo(2, 200), foreign, thermo(1, 100)])),
                windows: Vec::new(),
                clears: 0,
            },
            5_000,
            [0xA4, 0xC1],
        );

        let readings = driver.scan().unwrap();
        let temps: Vec<i16> = readings.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![200, 100]);
        assert_eq!(driver.advertisements_seen(), 3);
        assert_eq!(driver.scanner().windows, vec![Duration::from_secs(5)]);
        assert_eq!(driver.scanner().clears, 1);
    }

    #[test]
    fn failed_scan_still_clears_results() {
        let mut driver = BroadcastScanDriver::new(
            OneShot {
                result: Some(Err(ScanError::StartFailed)),
                windows: Vec::new(),
                clears: 0,
            },
            5_000,
            [0xA4, 0xC1],
        );
        assert_eq!(driver.scan(), Err(ScanError::StartFailed));
        assert_eq!(driver.scanner().clears, 1);
    }

    const SENSOR: BdAddr = BdAddr([0xA4, 0xC1, 0x38, 0x0A, 0x1B, 0x2C]);
    const PHONE: BdAddr = BdAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

    fn named(name: &str) -> Vec<u8> {
        let mut ad = vec![name.len() as u8 + 1, 0x09];
        ad.extend_from_slice(name.as_bytes());
        ad
    }

    #[test]
    fn results_merge_by_address_in_first_seen_order() {
        let mut results = ScanResults::new(8);
        results.record(PHONE, &[0x02, 0x01, 0x06], false);
        results.record(SENSOR, &[0x03, 0x16, 0x1A, 0x18], false);
        results.record(PHONE, &[0x02, 0x01, 0x1A], false);

        let addrs: Vec<BdAddr> = results.advertisements().iter().map(|a| a.address).collect();
        assert_eq!(addrs, vec![PHONE, SENSOR]);
        assert_eq!(results.advertisements()[0].payload, vec![0x02, 0x01, 0x06]);
    }

    #[test]
    fn scan_response_only_supplies_name() {
        let mut results = ScanResults::new(8);
        results.record(SENSOR, &[0x03, 0x16, 0x1A, 0x18], false);
        results.record(SENSOR, &named("ATC_0A1B2C"), true);

        let adv = &results.advertisements()[0];
        assert_eq!(adv.payload, vec![0x03, 0x16, 0x1A, 0x18]);
        assert_eq!(adv.name.as_deref(), Some("ATC_0A1B2C"));
    }

    #[test]
    fn scan_response_first_leaves_payload_for_advertisement() {
        let mut results = ScanResults::new(8);
        results.record(SENSOR, &named("ATC_0A1B2C"), true);
        assert!(results.advertisements()[0].payload.is_empty());

        results.record(SENSOR, &[0x03, 0x16, 0x1A, 0x18], false);
        let adv = &results.advertisements()[0];
        assert_eq!(adv.payload, vec![0x03, 0x16, 0x1A, 0x18]);
        assert_eq!(adv.name.as_deref(), Some("ATC_0A1B2C"));
    }

    #[test]
    fn first_name_wins() {
        let mut results = ScanResults::new(8);
        results.record(SENSOR, &named("first"), false);
        results.record(SENSOR, &named("second"), true);
        assert_eq!(results.advertisements()[0].name.as_deref(), Some("first"));
    }

    #[test]
    fn new_advertisers_past_capacity_are_dropped() {
        let mut results = ScanResults::new(2);
        for last in 0..4 {
            results.record(BdAddr([0xA4, 0xC1, 0, 0, 0, last]), &[0x02, 0x01, 0x06], false);
        }
        assert_eq!(results.len(), 2);

        // Known advertisers still merge when full.
        results.record(BdAddr([0xA4, 0xC1, 0, 0, 0, 1]), &named("late"), true);
        assert_eq!(results.advertisements()[1].name.as_deref(), Some("late"));

        results.clear();
        assert!(results.is_empty());
    }
}
