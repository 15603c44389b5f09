//! Mock hardware for integration tests.
//!
//! Every mock appends to one shared [`EventLog`] so tests can assert on the
//! order in which the dispatcher touched the ports. The clock only moves
//! when something blocks: a scan advances it by the scan window and a
//! delay by the requested duration.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use esp32_sensor_bridge::config::BridgeTopics;
use esp32_sensor_bridge::decode::{Advertisement, BdAddr, MeterReading};
use esp32_sensor_bridge::error::{FetchError, LinkError, ScanError};
use esp32_sensor_bridge::ports::{
    BleScanner, BrokerLink, Entropy, LivenessIndicator, MeterReceiver, Timebase, UpdateEndpoint,
};
use esp32_sensor_bridge::{
    BroadcastScanDriver, Dispatcher, MeterPollScheduler, MqttConfig, TelemetryPublisher,
};

// ── Event record ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwEvent {
    Scan(Duration),
    ClearResults,
    Fetch,
    ResetReceiver,
    Connect(String),
    Publish { topic: String, payload: String },
    Led(bool),
    Delay(u32),
    UpdateService,
}

#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<HwEvent>>>);

#[allow(dead_code)]
impl EventLog {
    pub fn push(&self, event: HwEvent) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<HwEvent> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match e {
                HwEvent::Publish { topic, payload } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn delays(&self) -> Vec<u32> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match e {
                HwEvent::Delay(ms) => Some(*ms),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &HwEvent) -> usize {
        self.0.borrow().iter().filter(|e| *e == wanted).count()
    }

    pub fn position(&self, pred: impl Fn(&HwEvent) -> bool) -> Option<usize> {
        self.0.borrow().iter().position(pred)
    }
}

// ── Mocks ─────────────────────────────────────────────────────

pub struct FakeClock {
    pub now: Rc<Cell<u32>>,
    log: EventLog,
}

impl Timebase for FakeClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.log.push(HwEvent::Delay(ms));
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

pub struct MockScanner {
    pub windows: VecDeque<Result<Vec<Advertisement>, ScanError>>,
    clock: Rc<Cell<u32>>,
    log: EventLog,
}

impl BleScanner for MockScanner {
    fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, ScanError> {
        self.log.push(HwEvent::Scan(window));
        self.clock
            .set(self.clock.get().wrapping_add(window.as_millis() as u32));
        self.windows.pop_front().unwrap_or(Ok(Vec::new()))
    }

    fn clear_results(&mut self) {
        self.log.push(HwEvent::ClearResults);
    }
}

pub struct MockReceiver {
    pub fetches: VecDeque<Result<MeterReading, FetchError>>,
    log: EventLog,
}

impl MeterReceiver for MockReceiver {
    fn fetch_packet(&mut self) -> Result<MeterReading, FetchError> {
        self.log.push(HwEvent::Fetch);
        self.fetches.pop_front().unwrap_or(Err(FetchError::NoPacket))
    }

    fn reset_receiver(&mut self) {
        self.log.push(HwEvent::ResetReceiver);
    }
}

pub struct MockBroker {
    pub connects: VecDeque<Result<(), LinkError>>,
    pub up: Rc<Cell<bool>>,
    log: EventLog,
}

impl BrokerLink for MockBroker {
    fn connect(&mut self, client_id: &str, _timeout: Duration) -> Result<(), LinkError> {
        self.log.push(HwEvent::Connect(client_id.to_string()));
        let result = self.connects.pop_front().unwrap_or(Ok(()));
        self.up.set(result.is_ok());
        result
    }

    fn service(&mut self) -> bool {
        self.up.get()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        if !self.up.get() {
            return Err(LinkError::NotConnected);
        }
        self.log.push(HwEvent::Publish {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        });
        Ok(())
    }
}

pub struct MockLed {
    log: EventLog,
}

impl LivenessIndicator for MockLed {
    fn set(&mut self, on: bool) {
        self.log.push(HwEvent::Led(on));
    }
}

/// Counts up so every client id is distinct and predictable.
pub struct StepEntropy(u16);

impl Entropy for StepEntropy {
    fn next_u16(&mut self) -> u16 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}

pub struct MockUpdates {
    log: EventLog,
}

impl UpdateEndpoint for MockUpdates {
    fn service(&mut self) {
        self.log.push(HwEvent::UpdateService);
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type TestDispatcher = Dispatcher<
    FakeClock,
    MockScanner,
    MockReceiver,
    MockBroker,
    MockLed,
    StepEntropy,
    MockUpdates,
>;

pub const SCAN_WINDOW_MS: u32 = 5_000;
pub const POLL_INTERVAL_MS: u32 = 20_000;

/// Scripted inputs for one dispatcher.
#[derive(Default)]
pub struct Script {
    pub start_ms: u32,
    pub scans: Vec<Result<Vec<Advertisement>, ScanError>>,
    pub fetches: Vec<Result<MeterReading, FetchError>>,
    pub connects: Vec<Result<(), LinkError>>,
}

/// Handles the test keeps after the mocks move into the dispatcher.
pub struct Rig {
    pub log: EventLog,
    pub clock: Rc<Cell<u32>>,
    pub link_up: Rc<Cell<bool>>,
}

pub fn build(script: Script) -> (TestDispatcher, Rig) {
    let log = EventLog::default();
    let clock = Rc::new(Cell::new(script.start_ms));
    let link_up = Rc::new(Cell::new(false));

    let scanner = MockScanner {
        windows: script.scans.into(),
        clock: Rc::clone(&clock),
        log: log.clone(),
    };
    let receiver = MockReceiver {
        fetches: script.fetches.into(),
        log: log.clone(),
    };
    let broker = MockBroker {
        connects: script.connects.into(),
        up: Rc::clone(&link_up),
        log: log.clone(),
    };
    let publisher = TelemetryPublisher::new(
        broker,
        MockLed { log: log.clone() },
        StepEntropy(0),
        &MqttConfig::default(),
    );

    let dispatcher = Dispatcher::new(
        FakeClock {
            now: Rc::clone(&clock),
            log: log.clone(),
        },
        BroadcastScanDriver::new(scanner, SCAN_WINDOW_MS, [0xA4, 0xC1]),
        MeterPollScheduler::new(POLL_INTERVAL_MS, script.start_ms),
        receiver,
        publisher,
        MockUpdates { log: log.clone() },
        BridgeTopics::default(),
    );

    (
        dispatcher,
        Rig {
            log,
            clock,
            link_up,
        },
    )
}

// ── Fixtures ──────────────────────────────────────────────────

/// 21.5 °C, 55 %, 80 %, 3000 mV from `a4:c1:38:0a:1b:2c`.
pub fn thermometer(name: Option<&str>) -> Advertisement {
    Advertisement {
        address: BdAddr([0xA4, 0xC1, 0x38, 0x0A, 0x1B, 0x2C]),
        payload: vec![
            0x10, 0x16, 0x1A, 0x18, 0xA4, 0xC1, 0x38, 0x0A, 0x1B, 0x2C, 0x00, 0xD7, 0x37, 0x50,
            0x0B, 0xB8, 0x07,
        ],
        name: name.map(str::to_string),
    }
}

#[allow(dead_code)]
pub fn phone() -> Advertisement {
    Advertisement {
        address: BdAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
        payload: vec![0x02, 0x01, 0x06],
        name: Some("phone".to_string()),
    }
}

pub const WATER_READING: MeterReading = MeterReading {
    meter_id: 0x1234_5678,
    usage: 4200,
};

pub const THERMO_JSON: &str =
    r#"{"t":215,"h":55,"v":3000,"b":80,"d":"a4:c1:38:0a:1b:2c","n":"ATC_0A1B2C"}"#;
pub const WATER_JSON: &str = r#"{"meter":305419896,"usg":4200}"#;
