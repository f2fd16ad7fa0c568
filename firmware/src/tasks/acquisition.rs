// Plank Board — Acquisition Task
//
// Cooperative interval scheduler for the three sensor groups: capacitive
// grid and strain gauges together at 10 Hz, piezo discs at 50 Hz. Also
// owns the scale power policy — with no BLE client connected for a while
// the HX711 bank is put into standby and woken when one returns.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::ble::BleServer;
use crate::config::*;
use crate::drivers::piezo::PiezoArray;
use crate::events::TelemetryEvent;
use crate::link::CapacitiveLink;
use crate::packets;
use crate::ScaleBank;

/// Retry tare until it sticks or the wall-clock deadline passes. The
/// driver attempts exactly once per call and reports a verdict; the retry
/// policy lives up here.
pub fn tare_with_deadline(scales: &mut ScaleBank) {
    let deadline = Instant::now() + Duration::from_millis(TARE_RETRY_DEADLINE_MS);

    loop {
        match scales.tare(TARE_SAMPLES, TARE_TOLERANCE) {
            Ok(()) => {
                log::info!("Tare successful: offsets {:?}", scales.offsets());
                return;
            }
            Err(e) => log::warn!("Tare failed ({:?}), retrying…", e),
        }

        if Instant::now() >= deadline {
            log::error!(
                "Tare did not stabilise within {} ms — keeping previous offsets",
                TARE_RETRY_DEADLINE_MS
            );
            return;
        }
    }
}

pub fn acquisition_task(
    mut scales: ScaleBank,
    mut link: CapacitiveLink<'static>,
    telemetry_tx: Sender<TelemetryEvent>,
    ble: Arc<BleServer>,
) {
    log::info!("Acquisition task started");

    // ADC setup stays inside the task that uses it.
    let mut piezo = match PiezoArray::new() {
        Ok(p) => p,
        Err(e) => {
            log::error!("Piezo ADC init failed: {}", e);
            return;
        }
    };

    let mut last_combined = Instant::now();
    let mut last_piezo = Instant::now();
    let mut last_client = Instant::now();
    let mut standby = false;

    loop {
        let now = Instant::now();

        // ---- Scale power policy ----
        if ble.has_subscriber() {
            last_client = now;
            if standby {
                log::info!("Client back — waking scale bank");
                if let Err(e) = scales.power_up() {
                    log::warn!("Scale power up failed: {:?}", e);
                }
                standby = false;
            }
        } else if !standby
            && now.duration_since(last_client).as_millis() as u64 > IDLE_POWER_DOWN_MS
        {
            log::info!("No client for {} ms — scale bank to standby", IDLE_POWER_DOWN_MS);
            if let Err(e) = scales.power_down() {
                log::warn!("Scale power down failed: {:?}", e);
            }
            standby = true;
        }

        // ---- Capacitive + strain tick (10 Hz) ----
        if now.duration_since(last_combined).as_millis() as u64 >= COMBINED_INTERVAL_MS {
            last_combined = now;
            link.poll();

            let strain = if standby {
                [0; STRAIN_CHANNEL_COUNT]
            } else {
                read_strain(&mut scales)
            };

            let event = TelemetryEvent::Combined {
                capacitive: link.latest(),
                strain,
            };
            if telemetry_tx.send(event).is_err() {
                log::warn!("Telemetry channel closed — exiting acquisition task");
                return;
            }
        }

        // ---- Piezo tick (50 Hz) ----
        if now.duration_since(last_piezo).as_millis() as u64 >= PIEZO_INTERVAL_MS {
            last_piezo = now;
            if telemetry_tx
                .send(TelemetryEvent::Piezo(piezo.read_all()))
                .is_err()
            {
                log::warn!("Telemetry channel closed — exiting acquisition task");
                return;
            }
        }

        thread::sleep(Duration::from_millis(SCHEDULER_TICK_MS));
    }
}

fn read_strain(scales: &mut ScaleBank) -> [u8; STRAIN_CHANNEL_COUNT] {
    match scales.read_timeout(STRAIN_READ_TIMEOUT_US) {
        Ok(samples) => {
            let mut levels = [0; STRAIN_CHANNEL_COUNT];
            for (level, sample) in levels.iter_mut().zip(samples) {
                *level = packets::strain_level(sample);
            }
            levels
        }
        Err(e) => {
            // Missed conversion window; ship zeros rather than wedge the tick.
            log::warn!("Strain read failed: {:?}", e);
            [0; STRAIN_CHANNEL_COUNT]
        }
    }
}
