//! Meter poll scheduler.
//!
//! Two states: idle until the interval has elapsed, then one fetch attempt
//! in the same tick. A failed fetch re-arms the receiver and waits out a full
//! interval like a successful one; there is no early retry and no backoff.

use log::{debug, info};

use crate::decode::MeterReading;
use crate::error::FetchError;
use crate::ports::MeterReceiver;

/// What one call to [`MeterPollScheduler::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Interval not yet elapsed; the receiver was not touched.
    NotDue,
    /// Fetch succeeded.
    Reading(MeterReading),
    /// Fetch failed and the receiver was reset.
    Reset(FetchError),
}

#[derive(Debug, Clone)]
pub struct MeterPollScheduler {
    last_poll_ms: u32,
    interval_ms: u32,
    successful_fetches: u32,
    failed_fetches: u32,
}

impl MeterPollScheduler {
    /// The first poll happens one full interval after `started_at_ms`.
    pub fn new(interval_ms: u32, started_at_ms: u32) -> Self {
        Self {
            last_poll_ms: started_at_ms,
            interval_ms,
            successful_fetches: 0,
            failed_fetches: 0,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn last_poll_ms(&self) -> u32 {
        self.last_poll_ms
    }

    /// Wrapping subtraction keeps this correct across tick-counter rollover.
    pub fn is_due(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_poll_ms) >= self.interval_ms
    }

    pub fn poll<R: MeterReceiver>(&mut self, now_ms: u32, receiver: &mut R) -> PollOutcome {
        if !self.is_due(now_ms) {
            return PollOutcome::NotDue;
        }
        self.last_poll_ms = now_ms;

        match receiver.fetch_packet() {
            Ok(reading) => {
                self.successful_fetches = self.successful_fetches.wrapping_add(1);
                info!(
                    "Meter: id {:08X} usage {} l",
                    reading.meter_id, reading.usage
                );
                PollOutcome::Reading(reading)
            }
            Err(e) => {
                self.failed_fetches = self.failed_fetches.wrapping_add(1);
                debug!("Meter: fetch failed ({}), re-arming receiver", e);
                receiver.reset_receiver();
                PollOutcome::Reset(e)
            }
        }
    }

    /// (successful, failed) fetch counts since boot.
    pub fn stats(&self) -> (u32, u32) {
        (self.successful_fetches, self.failed_fetches)
    }
}
