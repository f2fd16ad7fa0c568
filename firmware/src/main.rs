// Plank Board — Firmware Entry Point
//
// Boot sequence:
//   1. Bring up logging and peripherals.
//   2. Construct the four-channel scale bank (blocks until the cells answer,
//      clocking one throwaway conversion to latch the gain selection).
//   3. Tare the bank under a wall-clock deadline.
//   4. Open the UART link to the capacitive MCU.
//   5. Start the BLE beacon and advertise.
//   6. Spawn the acquisition and telemetry tasks.

mod ble;
mod config;
mod drivers;
mod events;
mod link;
mod packets;
mod tasks;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use esp_idf_hal::delay::Delay;
use esp_idf_hal::gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Input, InputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::prelude::*;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_svc::bt::BtDriver;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use hx711_multi::Hx711Multi;

use crate::config::*;
use crate::link::CapacitiveLink;

/// The four HX711 channels on their shared clock line, bound to concrete
/// ESP32 pins. Tasks refer to this alias instead of the generic driver.
pub type ScaleBank = Hx711Multi<
    PinDriver<'static, AnyOutputPin, Output>,
    PinDriver<'static, AnyInputPin, Input>,
    Delay,
    STRAIN_CHANNEL_COUNT,
>;

fn main() -> anyhow::Result<()> {
    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("Plank board firmware starting…");

    let peripherals = Peripherals::take()?;

    // ---- Strain gauge bank (4x HX711, shared clock) ------------------------
    let clock = PinDriver::output(peripherals.pins.gpio18.downgrade_output())?;
    let data = [
        PinDriver::input(peripherals.pins.gpio25.downgrade_input())?,
        PinDriver::input(peripherals.pins.gpio26.downgrade_input())?,
        PinDriver::input(peripherals.pins.gpio0.downgrade_input())?,
        PinDriver::input(peripherals.pins.gpio14.downgrade_input())?,
    ];
    let mut scales: ScaleBank = Hx711Multi::new(clock, data, Delay::new_default())
        .map_err(|e| anyhow::anyhow!("scale bank init failed: {:?}", e))?;
    log::info!("Scale bank up ({} channels)", scales.channel_count());

    tasks::acquisition::tare_with_deadline(&mut scales);

    // ---- Capacitive grid link (UART2 to the ATmega2560) --------------------
    let uart_config = UartConfig::new().baudrate(CAPACITIVE_BAUD_RATE.Hz().into());
    let uart = UartDriver::new(
        peripherals.uart2,
        peripherals.pins.gpio17, // TX
        peripherals.pins.gpio16, // RX
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let capacitive = CapacitiveLink::new(uart);

    // ---- BLE beacon --------------------------------------------------------
    let nvs = EspDefaultNvsPartition::take()?;
    let bt = Arc::new(BtDriver::new(peripherals.modem, Some(nvs))?);
    let ble = ble::BleServer::start(bt)?;
    log::info!("BLE beacon advertising as {}", BLE_DEVICE_NAME);

    // ---- Channels ----------------------------------------------------------
    let (telemetry_tx, telemetry_rx) = mpsc::channel();

    // ---- Spawn tasks (map to FreeRTOS tasks via std::thread) ---------------
    let acquisition_ble = Arc::clone(&ble);
    thread::Builder::new()
        .name("acquisition".into())
        .stack_size(STACK_ACQUISITION)
        .spawn(move || {
            tasks::acquisition::acquisition_task(scales, capacitive, telemetry_tx, acquisition_ble);
        })?;

    let telemetry_ble = Arc::clone(&ble);
    thread::Builder::new()
        .name("telemetry".into())
        .stack_size(STACK_TELEMETRY)
        .spawn(move || {
            tasks::telemetry::telemetry_task(telemetry_rx, telemetry_ble);
        })?;

    // Main thread has nothing left to do — park it forever.
    // (All work happens in the spawned FreeRTOS tasks.)
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
