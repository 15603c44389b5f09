//! Main dispatcher: the cooperative loop.
//!
//! Every iteration runs the same fixed sequence on one thread:
//!
//! 1. publisher `tick`, then `ensure_connected` (may block indefinitely)
//! 2. BLE scan window, publishing each thermometer reading
//! 3. meter poll if the interval has elapsed, publishing or resetting
//! 4. firmware-update endpoint service
//!
//! Nothing here yields during the blocking calls; all loop state lives in
//! the [`Dispatcher`] value rather than in globals.

use log::info;

use crate::config::BridgeTopics;
use crate::decode::BroadcastReading;
use crate::ports::{
    BleScanner, BrokerLink, Entropy, LivenessIndicator, MeterReceiver, Timebase, UpdateEndpoint,
};
use crate::publisher::TelemetryPublisher;
use crate::scan::BroadcastScanDriver;
use crate::scheduler::{MeterPollScheduler, PollOutcome};
use crate::telemetry::{ThermoPayload, WaterPayload};

/// Log a statistics line every this many iterations.
const STATS_EVERY: u32 = 60;

/// Loop counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u32,
    pub thermo_published: u32,
    pub meter_published: u32,
    pub failed_publishes: u32,
    pub scan_failures: u32,
    pub receiver_resets: u32,
    pub reconnect_attempts: u32,
}

/// What happened during one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub connect_attempts: u32,
    pub thermo_readings: u32,
    pub thermo_published: u32,
    pub meter: Option<PollOutcome>,
    pub meter_published: bool,
}

pub struct Dispatcher<T, S, R, L, I, E, U> {
    timebase: T,
    scan: BroadcastScanDriver<S>,
    meter: MeterPollScheduler,
    receiver: R,
    publisher: TelemetryPublisher<L, I, E>,
    updates: U,
    topics: BridgeTopics,
    stats: LoopStats,
}

impl<T, S, R, L, I, E, U> Dispatcher<T, S, R, L, I, E, U>
where
    T: Timebase,
    S: BleScanner,
    R: MeterReceiver,
    L: BrokerLink,
    I: LivenessIndicator,
    E: Entropy,
    U: UpdateEndpoint,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timebase: T,
        scan: BroadcastScanDriver<S>,
        meter: MeterPollScheduler,
        receiver: R,
        publisher: TelemetryPublisher<L, I, E>,
        updates: U,
        topics: BridgeTopics,
    ) -> Self {
        Self {
            timebase,
            scan,
            meter,
            receiver,
            publisher,
            updates,
            topics,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn publisher(&self) -> &TelemetryPublisher<L, I, E> {
        &self.publisher
    }

    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    pub fn scan_driver(&self) -> &BroadcastScanDriver<S> {
        &self.scan
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn updates(&self) -> &U {
        &self.updates
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        info!("Dispatcher: entering main loop");
        loop {
            self.run_iteration();
        }
    }

    pub fn run_iteration(&mut self) -> IterationReport {
        let mut report = IterationReport::default();

        // 1. Connectivity before any publish.
        self.publisher.tick();
        report.connect_attempts = self.publisher.ensure_connected(&mut self.timebase);
        self.stats.reconnect_attempts = self
            .stats
            .reconnect_attempts
            .wrapping_add(report.connect_attempts);

        // 2. Thermometers.
        match self.scan.scan() {
            Ok(readings) => {
                report.thermo_readings = readings.len() as u32;
                for reading in &readings {
                    if self.publish_thermo(reading) {
                        report.thermo_published += 1;
                    }
                }
            }
            Err(_) => self.stats.scan_failures = self.stats.scan_failures.wrapping_add(1),
        }

        // 3. Water meter.
        let now = self.timebase.now_ms();
        let outcome = self.meter.poll(now, &mut self.receiver);
        match outcome {
            PollOutcome::NotDue => {}
            PollOutcome::Reading(reading) => {
                report.meter = Some(outcome);
                match self
                    .publisher
                    .publish(&self.topics.water, &WaterPayload::from(&reading))
                {
                    Ok(_) => {
                        report.meter_published = true;
                        self.stats.meter_published = self.stats.meter_published.wrapping_add(1);
                    }
                    Err(_) => {
                        self.stats.failed_publishes = self.stats.failed_publishes.wrapping_add(1)
                    }
                }
            }
            PollOutcome::Reset(_) => {
                report.meter = Some(outcome);
                self.stats.receiver_resets = self.stats.receiver_resets.wrapping_add(1);
            }
        }

        // 4. Firmware update endpoint.
        self.updates.service();

        self.stats.iterations = self.stats.iterations.wrapping_add(1);
        if self.stats.iterations % STATS_EVERY == 0 {
            self.log_stats();
        }
        report
    }

    fn publish_thermo(&mut self, reading: &BroadcastReading) -> bool {
        info!(
            "Thermo: {} '{}' {} °C {} % batt {} % {} mV",
            reading.address,
            reading.name,
            reading.celsius(),
            reading.humidity,
            reading.battery_percent,
            reading.battery_mv
        );
        match self
            .publisher
            .publish(&self.topics.thermo, &ThermoPayload::from(reading))
        {
            Ok(_) => {
                self.stats.thermo_published = self.stats.thermo_published.wrapping_add(1);
                true
            }
            Err(_) => {
                self.stats.failed_publishes = self.stats.failed_publishes.wrapping_add(1);
                false
            }
        }
    }

    fn log_stats(&self) {
        let (fetch_ok, fetch_failed) = self.meter.stats();
        info!(
            "Stats: {} iterations | thermo {} | meter {} ({} ok / {} failed fetches) | \
             resets {} | failed publishes {} | reconnect attempts {} | adverts {}",
            self.stats.iterations,
            self.stats.thermo_published,
            self.stats.meter_published,
            fetch_ok,
            fetch_failed,
            self.stats.receiver_resets,
            self.stats.failed_publishes,
            self.stats.reconnect_attempts,
            self.scan.advertisements_seen()
        );
    }
}
