#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp32_sensor_bridge::platform::{
        mark_running_image_valid, start_mdns, BluedroidScanner, EspBrokerLink, EspEntropy,
        EspTimebase, HttpUpdateEndpoint, StatusLed, WifiManager,
    };
    use esp32_sensor_bridge::{
        BridgeConfig, BroadcastScanDriver, Cc1101MeterReceiver, Dispatcher, MeterPollScheduler,
        TelemetryPublisher, Timebase,
    };
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriverConfig};
    use esp_idf_hal::units::FromValueType;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys;

    sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("ESP32 Sensor Bridge v{}", env!("CARGO_PKG_VERSION"));
    mark_running_image_valid();

    let config = BridgeConfig::from_build_env()?;
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = WifiManager::connect(
        peripherals.modem,
        sysloop,
        nvs,
        &config.wifi,
        &config.hostname,
    )?;
    start_mdns(&config.hostname);
    let updates = HttpUpdateEndpoint::start(&config.hostname)?;

    // CC1101 on VSPI: SCK 18, MISO 19, MOSI 23, CS 5
    log::info!("📻 CC1101: Initializing SPI...");
    let spi = SpiDeviceDriver::new_single(
        peripherals.spi2,
        peripherals.pins.gpio18,
        peripherals.pins.gpio23,
        Some(peripherals.pins.gpio19),
        Some(peripherals.pins.gpio5),
        &SpiDriverConfig::new(),
        &SpiConfig::new().baudrate(4.MHz().into()),
    )?;
    let receiver = Cc1101MeterReceiver::start(spi, config.radio.agc_ctrl2)
        .map_err(|e| anyhow::anyhow!("CC1101 init failed: {}", e))?;
    log::info!("✅ CC1101: Listening on 868.95 MHz (C1/T1)");

    let scanner = BluedroidScanner::start()?;
    let led = StatusLed::new(peripherals.pins.gpio2)?;
    let link = EspBrokerLink::new(&config.mqtt.broker_url, wifi);
    let publisher = TelemetryPublisher::new(link, led, EspEntropy, &config.mqtt);

    let timebase = EspTimebase;
    let meter = MeterPollScheduler::new(config.radio.poll_interval_ms, timebase.now_ms());
    let scan = BroadcastScanDriver::new(scanner, config.scan_window_ms, config.vendor_prefix);

    let mut dispatcher = Dispatcher::new(
        timebase,
        scan,
        meter,
        receiver,
        publisher,
        updates,
        config.topics.clone(),
    );
    dispatcher.run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    println!(
        "sensor_bridge targets ESP-IDF; build with --target xtensa-esp32-espidf. \
         The host build only carries the library and its tests."
    );
}
