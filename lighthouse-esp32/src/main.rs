//! Lighthouse firmware for ESP32
//!
//! A blinking beacon on a WS2812 strip, a flickering two-channel outdoor
//! lamp, and a BLE remote control to switch both. Device logic lives in
//! `lighthouse-mcu`; this crate wires it to ESP-IDF and NimBLE.

mod beacon;
mod dimmer;
mod nvs;
mod radio;
mod spiffs;
mod strip;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use esp32_nimble::BLEDevice;
use esp_idf_svc::hal::gpio::AnyOutputPin;
use esp_idf_svc::hal::ledc::{CHANNEL0, CHANNEL1, TIMER0};
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::hal::spi::SPI2;
use esp_idf_svc::hal::timer::TIMER00;
use lighthouse_mcu::blink::{self, BlinkEngine, HandOff};
use lighthouse_mcu::light::{Lights, Switch, Unavailable};
use lighthouse_mcu::outdoor::OutdoorLamp;
use lighthouse_mcu::remote::bump_boot_count;
use lighthouse_mcu::{Config, RemoteControl, Settings};
use lighthouse_proto::keys;
use log::*;

const UART_DEMO_PERIOD: Duration = Duration::from_secs(5);
const UART_DEMO_TEXT: &str = "Hello from Lighthouse";

fn load_config() -> Config {
    Config::from_json(include_str!("../config.json")).unwrap_or_else(|e| {
        error!("Invalid config.json ({}), using defaults", e);
        Config::default()
    })
}

fn output_pin(pin: i32) -> AnyOutputPin {
    // SAFETY: pins come from config and are not claimed anywhere else
    unsafe { AnyOutputPin::new(pin) }
}

fn init_beacon(config: &Config, spi: SPI2, timer: TIMER00) -> anyhow::Result<BlinkEngine> {
    let mut strip = strip::Ws2812Strip::new(spi, output_pin(config.strip.pin), config.strip.pixels)?;
    blink::idle_pattern(&mut strip, config.strip.idle_color)?;
    info!("Pixel strip ready: {} pixels on GPIO{}", config.strip.pixels, config.strip.pin);

    let handoff: Arc<dyn HandOff> = Arc::new(beacon::Semaphore::new()?);
    let alarm = beacon::TimerAlarm::new(timer, config.beacon.period_ms, handoff.clone())?;

    let mut engine = BlinkEngine::new();
    engine.init(Box::new(alarm), handoff, strip, config.beacon.color)?;
    Ok(engine)
}

fn init_outdoor(
    config: &Config,
    timer: TIMER0,
    left: CHANNEL0,
    right: CHANNEL1,
) -> anyhow::Result<OutdoorLamp<dimmer::LedcDimmer>> {
    let timer = dimmer::timer(timer, config.outdoor.frequency_hz)?;
    let left = dimmer::LedcDimmer::new(left, timer.clone(), output_pin(config.outdoor.left_pin))?;
    let right = dimmer::LedcDimmer::new(right, timer, output_pin(config.outdoor.right_pin))?;
    Ok(OutdoorLamp::new(left, right))
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Lighthouse v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config();

    let peripherals = Peripherals::take()?;

    let settings = Arc::new(Settings::init(&mut nvs::NvsFlash::new(), keys::NAMESPACE)?);
    if let Err(e) = bump_boot_count(&settings) {
        warn!("Failed to update boot counter: {}", e);
    }

    // Without a strip or alarm the beacon stays uninitialized and refuses
    // to start; everything else still comes up.
    let beacon = init_beacon(&config, peripherals.spi2, peripherals.timer00).unwrap_or_else(|e| {
        error!("Beacon unavailable: {}", e);
        BlinkEngine::new()
    });
    let outdoor: Box<dyn Switch> = match init_outdoor(
        &config,
        peripherals.ledc.timer0,
        peripherals.ledc.channel0,
        peripherals.ledc.channel1,
    ) {
        Ok(lamp) => Box::new(lamp),
        Err(e) => {
            error!("Outdoor lamp unavailable: {}", e);
            Box::new(Unavailable)
        }
    };

    let mut lights = Lights::new(Box::new(beacon), outdoor);
    lights.reconcile(&settings);

    let radio = radio::NimbleRadio::new(BLEDevice::take().get_advertising());
    let remote = Arc::new(Mutex::new(RemoteControl::new(
        &config,
        radio,
        settings.clone(),
        lights,
        Box::new(spiffs::Spiffs::new()),
    )));

    let (subscribed, subscriptions) = mpsc::channel();
    radio::serve(&config, BLEDevice::take(), &remote, subscribed)?;

    loop {
        match subscriptions.recv_timeout(UART_DEMO_PERIOD) {
            Ok(conn) => {
                let sent = remote
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .notify_capabilities(conn);
                info!("Pushed capabilities to {} in {} notifications", conn, sent);
            }
            Err(RecvTimeoutError::Timeout) => {
                remote
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .send_uart(UART_DEMO_TEXT);
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    settings.deinit();
    Ok(())
}
