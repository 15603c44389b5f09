//! End-to-end dispatcher behaviour against mock hardware.

use std::time::Duration;

use esp32_sensor_bridge::error::{FetchError, LinkError, ScanError};
use esp32_sensor_bridge::{ConnectionState, PollOutcome};

use crate::mock_hw::*;

#[test]
fn thermometer_reading_published_as_json() {
    let (mut d, rig) = build(Script {
        scans: vec![Ok(vec![thermometer(Some("ATC_0A1B2C"))])],
        ..Default::default()
    });

    let report = d.run_iteration();

    assert_eq!(report.thermo_readings, 1);
    assert_eq!(report.thermo_published, 1);
    assert_eq!(
        rig.log.published(),
        vec![("esp/thermo".to_string(), THERMO_JSON.to_string())]
    );
}

#[test]
fn foreign_advertisers_are_not_published() {
    let (mut d, rig) = build(Script {
        scans: vec![Ok(vec![phone(), thermometer(Some("ATC_0A1B2C")), phone()])],
        ..Default::default()
    });

    d.run_iteration();

    assert_eq!(rig.log.published().len(), 1);
    assert_eq!(d.scan_driver().advertisements_seen(), 3);
}

#[test]
fn meter_reading_published_once_interval_elapses() {
    let (mut d, rig) = build(Script {
        fetches: vec![Ok(WATER_READING)],
        ..Default::default()
    });

    // Each iteration's scan moves the clock 5 s; the meter is due at 20 s.
    for _ in 0..3 {
        assert_eq!(d.run_iteration().meter, None);
    }
    assert_eq!(rig.log.count(&HwEvent::Fetch), 0);

    let report = d.run_iteration();
    assert_eq!(report.meter, Some(PollOutcome::Reading(WATER_READING)));
    assert!(report.meter_published);
    assert_eq!(
        rig.log.published(),
        vec![("water/consumption".to_string(), WATER_JSON.to_string())]
    );
    assert_eq!(rig.log.count(&HwEvent::Fetch), 1);
}

#[test]
fn three_refusals_then_success_gives_three_delays_and_one_publish() {
    let (mut d, rig) = build(Script {
        scans: vec![Ok(vec![thermometer(Some("ATC_0A1B2C"))])],
        connects: vec![
            Err(LinkError::Refused),
            Err(LinkError::Timeout),
            Err(LinkError::Refused),
            Ok(()),
        ],
        ..Default::default()
    });

    let report = d.run_iteration();

    assert_eq!(report.connect_attempts, 4);
    assert_eq!(rig.log.delays(), vec![5_000, 5_000, 5_000]);
    assert_eq!(rig.log.published().len(), 1);
    assert_eq!(d.stats().reconnect_attempts, 4);

    // Every attempt used a fresh client id.
    let ids: Vec<String> = rig
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            HwEvent::Connect(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(
        ids,
        vec!["esp32-bridge-1", "esp32-bridge-2", "esp32-bridge-3", "esp32-bridge-4"]
    );
}

#[test]
fn iteration_runs_steps_in_fixed_order() {
    let (mut d, rig) = build(Script {
        start_ms: 0,
        scans: vec![Ok(vec![thermometer(Some("ATC_0A1B2C"))])],
        fetches: vec![Ok(WATER_READING)],
        ..Default::default()
    });
    // Make the meter due on the first iteration.
    rig.clock.set(POLL_INTERVAL_MS);

    d.run_iteration();

    let connect = rig.log.position(|e| matches!(e, HwEvent::Connect(_))).unwrap();
    let scan = rig.log.position(|e| matches!(e, HwEvent::Scan(_))).unwrap();
    let clear = rig.log.position(|e| *e == HwEvent::ClearResults).unwrap();
    let thermo = rig
        .log
        .position(|e| matches!(e, HwEvent::Publish { topic, .. } if topic == "esp/thermo"))
        .unwrap();
    let fetch = rig.log.position(|e| *e == HwEvent::Fetch).unwrap();
    let water = rig
        .log
        .position(|e| matches!(e, HwEvent::Publish { topic, .. } if topic == "water/consumption"))
        .unwrap();
    let update = rig.log.position(|e| *e == HwEvent::UpdateService).unwrap();

    assert!(connect < scan);
    assert!(scan < clear);
    assert!(clear < thermo);
    assert!(thermo < fetch);
    assert!(fetch < water);
    assert!(water < update);
    assert_eq!(rig.log.events().last(), Some(&HwEvent::UpdateService));
}

#[test]
fn scan_uses_configured_window() {
    let (mut d, rig) = build(Script::default());
    d.run_iteration();
    assert_eq!(
        rig.log.count(&HwEvent::Scan(Duration::from_millis(SCAN_WINDOW_MS as u64))),
        1
    );
}

#[test]
fn failed_fetch_resets_receiver_without_publishing() {
    let (mut d, rig) = build(Script {
        fetches: vec![Err(FetchError::Crc)],
        ..Default::default()
    });
    rig.clock.set(POLL_INTERVAL_MS);

    let report = d.run_iteration();

    assert_eq!(report.meter, Some(PollOutcome::Reset(FetchError::Crc)));
    assert!(!report.meter_published);
    assert_eq!(rig.log.count(&HwEvent::ResetReceiver), 1);
    assert!(rig.log.published().is_empty());
    assert_eq!(d.stats().receiver_resets, 1);

    // No early retry: the next fetch waits a full interval.
    for _ in 0..3 {
        d.run_iteration();
    }
    assert_eq!(rig.log.count(&HwEvent::Fetch), 1);
    d.run_iteration();
    assert_eq!(rig.log.count(&HwEvent::Fetch), 2);
}

#[test]
fn failed_scan_still_runs_meter_and_updates() {
    let (mut d, rig) = build(Script {
        scans: vec![Err(ScanError::StartFailed)],
        ..Default::default()
    });

    let report = d.run_iteration();

    assert_eq!(report.thermo_readings, 0);
    assert_eq!(rig.log.count(&HwEvent::ClearResults), 1);
    assert_eq!(rig.log.count(&HwEvent::UpdateService), 1);
    assert_eq!(d.stats().scan_failures, 1);
}

#[test]
fn link_drop_reconnects_before_next_scan() {
    let (mut d, rig) = build(Script::default());
    d.run_iteration();
    assert_eq!(d.publisher().state(), ConnectionState::Connected);

    rig.link_up.set(false);
    rig.log.clear();
    d.run_iteration();

    let events = rig.log.events();
    assert_eq!(events[0], HwEvent::Connect("esp32-bridge-2".to_string()));
    assert!(matches!(events[1], HwEvent::Scan(_)));
    assert_eq!(d.publisher().stats().link_drops, 1);
}

#[test]
fn indicator_flips_once_per_successful_publish() {
    let (mut d, rig) = build(Script {
        scans: vec![Ok(vec![
            thermometer(Some("ATC_0A1B2C")),
            thermometer(Some("ATC_0A1B2C")),
            thermometer(Some("ATC_0A1B2C")),
        ])],
        ..Default::default()
    });

    d.run_iteration();

    let leds: Vec<bool> = rig
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            HwEvent::Led(on) => Some(on),
            _ => None,
        })
        .collect();
    // Initial off, then one flip per publish.
    assert_eq!(leds, vec![false, true, false, true]);
    assert!(d.publisher().led_on());
}

#[test]
fn meter_poll_survives_tick_wraparound() {
    let start = u32::MAX - 7_000;
    let (mut d, rig) = build(Script {
        start_ms: start,
        fetches: vec![Ok(WATER_READING)],
        ..Default::default()
    });

    for _ in 0..3 {
        d.run_iteration();
    }
    assert!(rig.clock.get() < start, "clock should have wrapped");
    assert_eq!(rig.log.count(&HwEvent::Fetch), 0);

    d.run_iteration();
    assert_eq!(rig.log.count(&HwEvent::Fetch), 1);
    assert_eq!(rig.log.published().len(), 1);
}

#[test]
fn stats_count_publishes_by_topic() {
    let (mut d, rig) = build(Script {
        scans: vec![Ok(vec![thermometer(None)])],
        fetches: vec![Ok(WATER_READING)],
        ..Default::default()
    });
    rig.clock.set(POLL_INTERVAL_MS);

    d.run_iteration();

    let stats = d.stats();
    assert_eq!(stats.iterations, 1);
    assert_eq!(stats.thermo_published, 1);
    assert_eq!(stats.meter_published, 1);
    assert_eq!(stats.failed_publishes, 0);
    assert!(rig.log.published()[0].1.ends_with(r#""n":""}"#));
}
