// Plank Board — BLE Payload Framing
//
// Byte layouts are fixed by the deployed desktop client: capacitive values
// travel little-endian between '<' and '>', strain bytes between '(' and
// ')', piezo values big-endian between "->" and "<-".

use crate::config::*;

pub const CAPACITIVE_PACKET_SIZE: usize = CAPACITIVE_PAD_COUNT * 2 + 2;
pub const STRAIN_PACKET_SIZE: usize = STRAIN_CHANNEL_COUNT + 2;
pub const PIEZO_PACKET_SIZE: usize = PIEZO_COUNT * 2 + 2;

pub fn pack_capacitive(values: &[i16; CAPACITIVE_PAD_COUNT]) -> [u8; CAPACITIVE_PACKET_SIZE] {
    let mut buf = [0u8; CAPACITIVE_PACKET_SIZE];
    buf[0] = b'<';
    for (i, &value) in values.iter().enumerate() {
        let raw = value as u16;
        buf[i * 2 + 1] = (raw & 0xFF) as u8;
        buf[i * 2 + 2] = (raw >> 8) as u8;
    }
    buf[CAPACITIVE_PACKET_SIZE - 1] = b'>';
    buf
}

pub fn pack_strain(levels: &[u8; STRAIN_CHANNEL_COUNT]) -> [u8; STRAIN_PACKET_SIZE] {
    let mut buf = [0u8; STRAIN_PACKET_SIZE];
    buf[0] = b'(';
    buf[1..=STRAIN_CHANNEL_COUNT].copy_from_slice(levels);
    buf[STRAIN_PACKET_SIZE - 1] = b')';
    buf
}

pub fn pack_piezo(values: &[u16; PIEZO_COUNT]) -> [u8; PIEZO_PACKET_SIZE] {
    let mut buf = [0u8; PIEZO_PACKET_SIZE];
    buf[0] = b'-';
    buf[1] = b'>';
    for (i, &value) in values.iter().enumerate() {
        buf[2 + i * 2] = (value >> 8) as u8;
        buf[3 + i * 2] = (value & 0xFF) as u8;
    }
    buf[PIEZO_PACKET_SIZE - 2] = b'<';
    buf[PIEZO_PACKET_SIZE - 1] = b'-';
    buf
}

/// Squash an offset-corrected strain reading into the one-byte wire scale:
/// negative readings clamp to zero, ~2500 g spans the byte range.
pub fn strain_level(raw: i32) -> u8 {
    let grams = raw.max(0) / STRAIN_COUNTS_PER_GRAM;
    (grams * 255 / STRAIN_FULL_SCALE_GRAMS).min(255) as u8
}
