// Plank Board — Telemetry Events

use crate::config::*;

// ---------------------------------------------------------------------------
// Telemetry Events — sent from the acquisition task to the telemetry task
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy)]
pub enum TelemetryEvent {
    /// Capacitive grid and strain gauges, sampled on the same tick.
    Combined {
        capacitive: [i16; CAPACITIVE_PAD_COUNT],
        strain: [u8; STRAIN_CHANNEL_COUNT],
    },
    /// Piezo impact readings, full 16-bit wire range.
    Piezo([u16; PIEZO_COUNT]),
}
