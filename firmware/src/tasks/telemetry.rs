// Plank Board — Telemetry Task
//
// Drains acquisition events, frames them into the wire layouts and pushes
// BLE notifications to subscribed clients.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::ble::BleServer;
use crate::events::TelemetryEvent;
use crate::packets;

pub fn telemetry_task(rx: Receiver<TelemetryEvent>, ble: Arc<BleServer>) {
    log::info!("Telemetry task started");

    loop {
        let event = match rx.recv() {
            Ok(e) => e,
            Err(_) => {
                log::warn!("Acquisition channel closed — exiting telemetry task");
                return;
            }
        };

        match event {
            TelemetryEvent::Combined { capacitive, strain } => {
                ble.notify_capacitive(&packets::pack_capacitive(&capacitive));
                ble.notify_strain(&packets::pack_strain(&strain));
            }
            TelemetryEvent::Piezo(values) => {
                ble.notify_piezo(&packets::pack_piezo(&values));
            }
        }
    }
}
