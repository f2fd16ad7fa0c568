// Plank Board — Capacitive Grid Link
//
// The 16-pad capacitive grid hangs off a separate ATmega2560, which streams
// "<v0,v1,...,v15>" frames over UART and waits for an 'A' ack before the
// next frame. Polled from the acquisition task; the last complete frame is
// cached so a tick without fresh data still has values to ship.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::UartDriver;
use heapless::Vec;

use crate::config::*;

pub struct CapacitiveLink<'d> {
    uart: UartDriver<'d>,
    frame: Vec<u8, CAPACITIVE_FRAME_MAX>,
    latest: [i16; CAPACITIVE_PAD_COUNT],
}

impl<'d> CapacitiveLink<'d> {
    pub fn new(uart: UartDriver<'d>) -> Self {
        Self {
            uart,
            frame: Vec::new(),
            latest: [0; CAPACITIVE_PAD_COUNT],
        }
    }

    /// Last complete pad readings (zeros until the first frame lands).
    pub fn latest(&self) -> [i16; CAPACITIVE_PAD_COUNT] {
        self.latest
    }

    /// Drain pending UART bytes. Returns `true` when a complete, valid
    /// frame arrived during this poll.
    pub fn poll(&mut self) -> bool {
        let mut fresh = false;
        let mut byte = [0u8; 1];

        while matches!(self.uart.read(&mut byte, NON_BLOCK), Ok(1)) {
            match byte[0] {
                b'<' => {
                    self.frame.clear();
                    let _ = self.frame.push(b'<');
                }
                b'>' => {
                    if self.frame.first() == Some(&b'<') {
                        if let Some(values) = parse_frame(&self.frame[1..]) {
                            self.latest = values;
                            fresh = true;
                            // Ack releases the next frame on the sender side.
                            if let Err(e) = self.uart.write(b"A") {
                                log::warn!("Capacitive ack failed: {}", e);
                            }
                        }
                    }
                    self.frame.clear();
                }
                other => {
                    if self.frame.push(other).is_err() {
                        // Runaway frame without a terminator; resync.
                        self.frame.clear();
                    }
                }
            }
        }

        fresh
    }
}

fn parse_frame(body: &[u8]) -> Option<[i16; CAPACITIVE_PAD_COUNT]> {
    let text = core::str::from_utf8(body).ok()?;
    let mut values = [0i16; CAPACITIVE_PAD_COUNT];
    let mut count = 0;

    for token in text.split(',') {
        if count == CAPACITIVE_PAD_COUNT {
            return None;
        }
        values[count] = token.trim().parse().ok()?;
        count += 1;
    }

    (count == CAPACITIVE_PAD_COUNT).then_some(values)
}
