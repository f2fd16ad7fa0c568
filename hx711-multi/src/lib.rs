//! Driver for banks of HX711 24-bit load-cell ADCs wired in parallel:
//! one shared serial clock line, one data line per device.
//!
//! Every device sees the same clock pulses, so all channels shift out bit
//! *k* of their conversion on the same clock edge. That keeps the readings
//! of a multi-cell fixture temporally aligned, which a one-driver-per-chip
//! setup cannot guarantee.
//!
//! Built on [`embedded-hal`] 1.0 digital traits; platform agnostic.
//!
//! ```ignore
//! let mut scales = Hx711Multi::new(clock, [dout_a, dout_b, dout_c], delay)?;
//! scales.tare(20, 10_000)?;
//! let grams_raw = scales.read()?; // offset-corrected, one value per channel
//! ```
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/1.0

#![cfg_attr(not(test), no_std)]

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Largest value a conversion can take.
pub const MAX_VALUE: i32 = (1 << 23) - 1;

/// Smallest value a conversion can take.
pub const MIN_VALUE: i32 = -(1 << 23);

/// Interval between readiness polls when a read deadline is given, in
/// microseconds. The device converts at 10 or 80 SPS, so 100 us polling
/// adds at most 0.1 % latency.
const READY_POLL_US: u32 = 100;

/// Channel and gain selection for the *next* conversion.
///
/// The discriminant is the number of extra clock pulses issued after the
/// 24 data bits; that pulse count is how the device is told which channel
/// and gain to use. The selection latches only once a full conversion has
/// been clocked out, so a change takes effect one conversion late.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Gain {
    /// Channel A, gain factor 128.
    #[default]
    A128 = 1,
    /// Channel B, gain factor 32.
    B32 = 2,
    /// Channel A, gain factor 64.
    A64 = 3,
}

impl Gain {
    /// Extra clock pulses appended after the 24 data bits.
    pub const fn pulses(self) -> u8 {
        self as u8
    }

    /// Map a plain gain factor (128, 64 or 32) to a selection.
    ///
    /// Anything else returns `None`.
    pub const fn from_factor(factor: u32) -> Option<Self> {
        match factor {
            128 => Some(Self::A128),
            64 => Some(Self::A64),
            32 => Some(Self::B32),
            _ => None,
        }
    }

    /// The amplification factor of this selection.
    pub const fn factor(self) -> u32 {
        match self {
            Self::A128 => 128,
            Self::A64 => 64,
            Self::B32 => 32,
        }
    }
}

/// Errors reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// A clock or data pin failed. Infallible on most GPIO implementations.
    Pin(E),
    /// A tare attempt was rejected: one channel fluctuated more than the
    /// allowed tolerance across the sample window. No offsets were changed.
    Unstable {
        /// First channel that exceeded the tolerance.
        channel: usize,
        /// Observed `max - min` spread on that channel.
        spread: u32,
    },
    /// The channels did not all become ready within the given deadline.
    TimedOut,
}

/// A bank of `N` HX711 devices on one shared clock line.
///
/// The data pin array is owned by the driver for its whole lifetime; the
/// channel count is fixed at compile time. One instance per physical
/// channel group — there is no internal locking, and interleaving clock
/// sequences from two contexts would corrupt the bit alignment of every
/// device on the bus, so all calls must come from a single thread.
pub struct Hx711Multi<CLK, DIN, D, const N: usize> {
    clock: CLK,
    data: [DIN; N],
    delay: D,
    gain: Gain,
    offsets: [i32; N],
}

impl<CLK, DIN, D, E, const N: usize> Hx711Multi<CLK, DIN, D, N>
where
    CLK: OutputPin<Error = E>,
    DIN: InputPin<Error = E>,
    D: DelayNs,
{
    /// Create a driver with the default selection (channel A, gain 128).
    ///
    /// Drives the clock LOW and clocks out one throwaway conversion so the
    /// selection latches; this blocks until every channel has a conversion
    /// pending, exactly like [`read`](Self::read).
    pub fn new(clock: CLK, data: [DIN; N], delay: D) -> Result<Self, Error<E>> {
        Self::with_gain(clock, data, delay, Gain::default())
    }

    /// Create a driver with an explicit initial channel/gain selection.
    pub fn with_gain(
        mut clock: CLK,
        data: [DIN; N],
        delay: D,
        gain: Gain,
    ) -> Result<Self, Error<E>> {
        clock.set_low().map_err(Error::Pin)?;
        let mut bank = Self {
            clock,
            data,
            delay,
            gain,
            offsets: [0; N],
        };
        bank.flush()?;
        Ok(bank)
    }

    /// Number of channels in the bank.
    pub const fn channel_count(&self) -> usize {
        N
    }

    /// The channel/gain selection in effect for the next conversion.
    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// The zero-load offsets established by the last successful [`tare`](Self::tare).
    pub fn offsets(&self) -> [i32; N] {
        self.offsets
    }

    /// True when *every* channel holds a finished conversion (all data
    /// lines LOW). Reads are gated on this aggregate so no channel can
    /// lead or lag the others.
    pub fn is_ready(&mut self) -> Result<bool, Error<E>> {
        for line in &mut self.data {
            if line.is_high().map_err(Error::Pin)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read raw, sign-extended conversions from all channels.
    ///
    /// Blocks until aggregate readiness with no timeout; a disconnected
    /// data line keeps this spinning forever. Use
    /// [`read_raw_timeout`](Self::read_raw_timeout) where that is not
    /// acceptable.
    pub fn read_raw(&mut self) -> Result<[i32; N], Error<E>> {
        self.wait_ready(None)?;
        self.acquire()
    }

    /// [`read_raw`](Self::read_raw) with a readiness deadline in
    /// microseconds. Fails with [`Error::TimedOut`] instead of blocking;
    /// once acquisition has started it always runs to completion.
    pub fn read_raw_timeout(&mut self, timeout_us: u32) -> Result<[i32; N], Error<E>> {
        self.wait_ready(Some(timeout_us))?;
        self.acquire()
    }

    /// Read offset-corrected samples from all channels.
    ///
    /// Subtracts the per-channel tare offset; results can be negative and
    /// are not clamped. Blocks like [`read_raw`](Self::read_raw).
    pub fn read(&mut self) -> Result<[i32; N], Error<E>> {
        let raw = self.read_raw()?;
        Ok(self.correct(raw))
    }

    /// [`read`](Self::read) with a readiness deadline in microseconds.
    pub fn read_timeout(&mut self, timeout_us: u32) -> Result<[i32; N], Error<E>> {
        let raw = self.read_raw_timeout(timeout_us)?;
        Ok(self.correct(raw))
    }

    /// Change the channel/gain selection for subsequent conversions.
    ///
    /// The device only latches the new selection after one full conversion
    /// with the old timing, so one throwaway conversion is clocked out
    /// here; the call blocks for it.
    pub fn set_mode(&mut self, gain: Gain) -> Result<(), Error<E>> {
        self.gain = gain;
        self.clock.set_low().map_err(Error::Pin)?;
        self.flush()
    }

    /// Change the selection from a plain gain factor (128, 64 or 32).
    ///
    /// An unrecognized factor leaves the current selection untouched, so
    /// untrusted inputs (e.g. a wire command) cannot corrupt the mode; no
    /// error is signalled and the flush conversion is still clocked out
    /// with the old pulse count. Prefer [`set_mode`](Self::set_mode) when
    /// the gain is known at compile time.
    pub fn set_gain_factor(&mut self, factor: u32) -> Result<(), Error<E>> {
        if let Some(gain) = Gain::from_factor(factor) {
            self.gain = gain;
        }
        self.clock.set_low().map_err(Error::Pin)?;
        self.flush()
    }

    /// Establish per-channel zero-load offsets from `times` raw reads.
    ///
    /// Per channel the min, max and integer mean of the window are taken.
    /// If `tolerance` is non-zero and `times > 1`, a channel whose
    /// `max - min` spread exceeds `tolerance` rejects the whole attempt
    /// with [`Error::Unstable`] and leaves every offset untouched. On
    /// success all offsets are replaced with their channel means as a
    /// group. A spread of exactly `tolerance` passes.
    ///
    /// One attempt, one verdict: retry policy (and any wall-clock
    /// deadline) belongs to the caller.
    // TODO: track the best recently seen spread per channel across normal
    // reads and derive a default tolerance from it, so callers don't have
    // to guess one.
    pub fn tare(&mut self, times: u8, tolerance: u32) -> Result<(), Error<E>> {
        let times = times.max(1);
        let mut mins = [i32::MAX; N];
        let mut maxs = [i32::MIN; N];
        let mut sums = [0i64; N];

        for _ in 0..times {
            let raw = self.read_raw()?;
            for ch in 0..N {
                mins[ch] = mins[ch].min(raw[ch]);
                maxs[ch] = maxs[ch].max(raw[ch]);
                sums[ch] += i64::from(raw[ch]);
            }
        }

        if tolerance != 0 && times > 1 {
            for ch in 0..N {
                let spread = (maxs[ch] - mins[ch]) as u32;
                if spread > tolerance {
                    log::debug!("tare rejected: channel {} spread {}", ch, spread);
                    return Err(Error::Unstable { channel: ch, spread });
                }
            }
        }

        for ch in 0..N {
            self.offsets[ch] = (sums[ch] / i64::from(times)) as i32;
        }
        Ok(())
    }

    /// Put every device on the bus into low-power standby.
    ///
    /// Purely an instruction sequence (clock LOW then held HIGH); nothing
    /// tracks the power state, and reading while powered down is left to
    /// the device's own behaviour.
    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.clock.set_low().map_err(Error::Pin)?;
        self.clock.set_high().map_err(Error::Pin)
    }

    /// Wake the bus from standby. The first conversion afterwards takes a
    /// full settling time; [`read`](Self::read) absorbs that by blocking.
    pub fn power_up(&mut self) -> Result<(), Error<E>> {
        self.clock.set_low().map_err(Error::Pin)
    }

    fn correct(&self, mut raw: [i32; N]) -> [i32; N] {
        for (sample, offset) in raw.iter_mut().zip(self.offsets) {
            *sample -= offset;
        }
        raw
    }

    fn wait_ready(&mut self, timeout_us: Option<u32>) -> Result<(), Error<E>> {
        match timeout_us {
            // Historical contract: busy poll, no suspension point.
            None => {
                while !self.is_ready()? {}
                Ok(())
            }
            Some(limit) => {
                let mut waited = 0u32;
                while !self.is_ready()? {
                    if waited >= limit {
                        return Err(Error::TimedOut);
                    }
                    self.delay.delay_us(READY_POLL_US);
                    waited = waited.saturating_add(READY_POLL_US);
                }
                Ok(())
            }
        }
    }

    /// Shift one conversion out of every channel on the shared clock.
    ///
    /// Bit *k* of every channel is sampled during the same clock-high
    /// window; the pulse widths are fixed 1 us ticks, nothing with
    /// unbounded latency runs inside the loop.
    fn acquire(&mut self) -> Result<[i32; N], Error<E>> {
        let mut raw = [0i32; N];

        for bit in 0..24 {
            self.clock.set_high().map_err(Error::Pin)?;
            self.delay.delay_us(1);
            for (ch, line) in self.data.iter_mut().enumerate() {
                if line.is_high().map_err(Error::Pin)? {
                    raw[ch] |= 1 << (23 - bit);
                }
            }
            self.clock.set_low().map_err(Error::Pin)?;
            self.delay.delay_us(1);
        }

        self.select_next()?;

        for value in &mut raw {
            *value = stretch24(*value);
        }
        Ok(raw)
    }

    /// Clock out one conversion without sampling any data line. Keeps the
    /// devices' conversion/selection cycle consistent when only the side
    /// effect matters (construction, gain changes).
    fn flush(&mut self) -> Result<(), Error<E>> {
        self.wait_ready(None)?;
        for _ in 0..24 {
            self.pulse()?;
        }
        self.select_next()
    }

    /// Issue the selection pulses for the next conversion.
    fn select_next(&mut self) -> Result<(), Error<E>> {
        for _ in 0..self.gain.pulses() {
            self.pulse()?;
        }
        Ok(())
    }

    fn pulse(&mut self) -> Result<(), Error<E>> {
        self.clock.set_high().map_err(Error::Pin)?;
        self.delay.delay_us(1);
        self.clock.set_low().map_err(Error::Pin)?;
        self.delay.delay_us(1);
        Ok(())
    }
}

/// Stretch a 24-bit two's-complement value to 32 bits.
///
/// The accumulator is not guaranteed clean above bit 23, so the positive
/// branch masks instead of passing the value through.
const fn stretch24(value: i32) -> i32 {
    if value & 0x0080_0000 != 0 {
        value | !0x00FF_FFFF
    } else {
        value & 0x00FF_FFFF
    }
}

#[cfg(test)]
mod sim {
    //! A bank of simulated HX711 devices hanging off one clock line.
    //!
    //! Each channel holds a queue of pending conversion values. A rising
    //! clock edge while the bank is idle and every queue is non-empty
    //! starts a frame; the next 24 pulses present the bits MSB-first, and
    //! any further pulses are counted as selection pulses. The frame is
    //! closed on the next readiness poll (data-line read with the clock
    //! low), which is when the selection pulse count is recorded.
    //!
    //! Every data-line sample taken during a frame is logged together with
    //! the rising-edge number it happened under, so tests can prove that
    //! all channels were captured on the same physical edge.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::rc::Rc;

    use embedded_hal::delay::DelayNs;
    use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

    pub struct Bank {
        queues: Vec<VecDeque<i32>>,
        current: Vec<u32>,
        /// Pulses seen in the open frame; `None` when idle.
        pulses: Option<u32>,
        clock_high: bool,
        edge: u64,
        /// Selection pulses recorded per closed frame.
        pub pulse_log: Vec<u32>,
        /// `(channel, bit_order_index, rising_edge_number)` per data sample.
        pub sample_log: Vec<(usize, usize, u64)>,
    }

    impl Bank {
        fn new(channels: usize) -> Self {
            Self {
                queues: (0..channels).map(|_| VecDeque::new()).collect(),
                current: vec![0; channels],
                pulses: None,
                clock_high: false,
                edge: 0,
                pulse_log: Vec::new(),
                sample_log: Vec::new(),
            }
        }

        /// Queue one conversion frame, one value per channel.
        pub fn push_frame(&mut self, values: &[i32]) {
            assert_eq!(values.len(), self.queues.len());
            for (queue, &value) in self.queues.iter_mut().zip(values) {
                queue.push_back(value);
            }
        }

        /// Close a frame left open because no readiness poll followed it.
        pub fn settle(&mut self) {
            if let Some(pulses) = self.pulses.take() {
                assert!(pulses >= 24, "frame abandoned mid-shift");
                self.pulse_log.push(pulses - 24);
            }
        }

        pub fn clock_is_high(&self) -> bool {
            self.clock_high
        }

        fn all_pending(&self) -> bool {
            self.queues.iter().all(|q| !q.is_empty())
        }

        fn rising_edge(&mut self) {
            self.edge += 1;
            match self.pulses {
                Some(ref mut pulses) => *pulses += 1,
                None => {
                    // A pulse while idle only starts a frame when every
                    // device has a conversion pending (power-down pulses
                    // must not consume data).
                    if self.all_pending() {
                        for (slot, queue) in self.current.iter_mut().zip(&mut self.queues) {
                            *slot = (queue.pop_front().unwrap() as u32) & 0x00FF_FFFF;
                        }
                        self.pulses = Some(1);
                    }
                }
            }
        }

        fn read_line(&mut self, channel: usize) -> bool {
            match self.pulses {
                Some(pulses) if self.clock_high => {
                    if pulses as usize <= 24 {
                        let index = pulses as usize - 1;
                        self.sample_log.push((channel, index, self.edge));
                        (self.current[channel] >> (23 - index)) & 1 != 0
                    } else {
                        // Data bits exhausted; the line idles high until
                        // the next conversion finishes.
                        true
                    }
                }
                Some(pulses) => {
                    if pulses >= 24 {
                        self.pulse_log.push(pulses - 24);
                        self.pulses = None;
                        !self.all_pending()
                    } else {
                        true
                    }
                }
                None => !self.all_pending(),
            }
        }
    }

    #[derive(Clone)]
    pub struct Shared(pub Rc<RefCell<Bank>>);

    pub struct ClockPin(Shared);

    pub struct DataPin {
        bank: Shared,
        channel: usize,
    }

    pub struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    impl ErrorType for ClockPin {
        type Error = Infallible;
    }

    impl OutputPin for ClockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0 .0.borrow_mut().clock_high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut bank = self.0 .0.borrow_mut();
            if !bank.clock_high {
                bank.clock_high = true;
                bank.rising_edge();
            }
            Ok(())
        }
    }

    impl ErrorType for DataPin {
        type Error = Infallible;
    }

    impl InputPin for DataPin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.bank.0.borrow_mut().read_line(self.channel))
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    /// Build a simulated bank with `N` channels.
    pub fn bank<const N: usize>() -> (ClockPin, [DataPin; N], Shared) {
        let shared = Shared(Rc::new(RefCell::new(Bank::new(N))));
        let clock = ClockPin(shared.clone());
        let data = core::array::from_fn(|channel| DataPin {
            bank: shared.clone(),
            channel,
        });
        (clock, data, shared)
    }
}

#[cfg(test)]
mod tests {
    use super::sim::{bank, NoDelay, Shared};
    use super::*;

    type SimBank<const N: usize> =
        Hx711Multi<super::sim::ClockPin, super::sim::DataPin, NoDelay, N>;

    /// Queue `frames` identical conversion patterns and construct the
    /// driver; the first frame feeds the constructor's throwaway read.
    fn bank_with<const N: usize>(pattern: [i32; N], frames: usize) -> (SimBank<N>, Shared) {
        let (clock, data, shared) = bank::<N>();
        for _ in 0..frames {
            shared.0.borrow_mut().push_frame(&pattern);
        }
        let driver = Hx711Multi::new(clock, data, NoDelay).unwrap();
        (driver, shared)
    }

    #[test]
    fn stretches_negative_values() {
        assert_eq!(stretch24(0x00_0001), 1);
        assert_eq!(stretch24(0xFF_FFFF), -1);
        assert_eq!(stretch24(0xFF_FFF3), -13);
        assert_eq!(stretch24(0x80_0000), -8_388_608);
        assert_eq!(stretch24(0x7F_FFFF), 8_388_607);
    }

    #[test]
    fn stretch_masks_stale_high_bits() {
        // The accumulator is not cleared between conversions; anything
        // above bit 23 must be discarded when bit 23 is clear.
        assert_eq!(stretch24(0x7F00_0001), 1);
        assert_eq!(stretch24(-1 & !0x0080_0000), 0x007F_FFFF);
    }

    #[test]
    fn reads_raw_patterns() {
        let (mut scales, shared) = bank_with([0i32; 3], 1);
        shared
            .0
            .borrow_mut()
            .push_frame(&[100, -50, MAX_VALUE]);
        assert_eq!(scales.read_raw().unwrap(), [100, -50, MAX_VALUE]);
        shared.0.borrow_mut().push_frame(&[MIN_VALUE, -1, 0]);
        assert_eq!(scales.read_raw().unwrap(), [MIN_VALUE, -1, 0]);
    }

    #[test]
    fn channels_are_sampled_on_the_same_edge() {
        let (mut scales, shared) = bank_with([0i32; 4], 1);
        shared
            .0
            .borrow_mut()
            .push_frame(&[0x55_AA55, -1, 0, 0x12_3456]);
        scales.read_raw().unwrap();

        let log = shared.0.borrow().sample_log.clone();
        for bit in 0..24 {
            let edges: Vec<u64> = log
                .iter()
                .filter(|(_, index, _)| *index == bit)
                .map(|(_, _, edge)| *edge)
                .collect();
            assert_eq!(edges.len(), 4, "bit {} not sampled on all channels", bit);
            assert!(
                edges.iter().all(|&edge| edge == edges[0]),
                "bit {} sampled on different edges: {:?}",
                bit,
                edges
            );
        }
    }

    #[test]
    fn tare_on_constant_input_zeroes_reads() {
        let pattern = [4321, -876, 15, 0];
        // 1 constructor flush + 3 tare samples + 1 read.
        let (mut scales, _shared) = bank_with(pattern, 5);
        scales.tare(3, 50).unwrap();
        assert_eq!(scales.offsets(), pattern);
        assert_eq!(scales.read().unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn tare_accepts_spread_at_exactly_tolerance() {
        let (mut scales, shared) = bank_with([0i32; 2], 1);
        shared.0.borrow_mut().push_frame(&[0, 10]);
        shared.0.borrow_mut().push_frame(&[100, 10]);
        scales.tare(2, 100).unwrap();
        assert_eq!(scales.offsets(), [50, 10]);
    }

    #[test]
    fn tare_rejects_spread_over_tolerance_and_keeps_offsets() {
        let (mut scales, shared) = bank_with([1000, 2000], 3);
        scales.tare(2, 100).unwrap();
        assert_eq!(scales.offsets(), [1000, 2000]);

        shared.0.borrow_mut().push_frame(&[0, 2000]);
        shared.0.borrow_mut().push_frame(&[101, 2000]);
        assert_eq!(
            scales.tare(2, 100),
            Err(Error::Unstable {
                channel: 0,
                spread: 101
            })
        );
        // A rejected attempt commits nothing.
        assert_eq!(scales.offsets(), [1000, 2000]);
    }

    #[test]
    fn zero_tolerance_disables_the_stability_check() {
        let (mut scales, shared) = bank_with([0i32; 1], 1);
        shared.0.borrow_mut().push_frame(&[MIN_VALUE]);
        shared.0.borrow_mut().push_frame(&[MAX_VALUE]);
        scales.tare(2, 0).unwrap();
        // Full-scale spread accepted; the mean of the pair is trunc(-0.5).
        assert_eq!(scales.offsets(), [0]);
    }

    #[test]
    fn single_sample_tare_passes_any_tolerance() {
        let (mut scales, shared) = bank_with([0i32; 2], 1);
        shared.0.borrow_mut().push_frame(&[777, -777]);
        scales.tare(1, 1).unwrap();
        assert_eq!(scales.offsets(), [777, -777]);
    }

    #[test]
    fn tare_mean_truncates_toward_zero() {
        let (mut scales, shared) = bank_with([0i32; 1], 1);
        shared.0.borrow_mut().push_frame(&[-5]);
        shared.0.borrow_mut().push_frame(&[-6]);
        scales.tare(2, 10).unwrap();
        // -11 / 2 truncates to -5, not floor(-5.5) = -6.
        assert_eq!(scales.offsets(), [-5]);
    }

    #[test]
    fn gain_modes_issue_their_pulse_counts() {
        let (clock, data, shared) = bank::<1>();
        for _ in 0..5 {
            shared.0.borrow_mut().push_frame(&[0]);
        }
        let mut scales = Hx711Multi::with_gain(clock, data, NoDelay, Gain::A128).unwrap();

        scales.read_raw().unwrap(); // A128 -> 1 pulse
        scales.set_mode(Gain::A64).unwrap(); // flush with 3 pulses
        scales.set_mode(Gain::B32).unwrap(); // flush with 2 pulses
        scales.read_raw().unwrap();
        shared.0.borrow_mut().settle();

        assert_eq!(shared.0.borrow().pulse_log, vec![1, 1, 3, 2, 2]);
    }

    #[test]
    fn unknown_gain_factor_keeps_the_selection() {
        let (mut scales, shared) = bank_with([0i32; 1], 2);
        assert_eq!(scales.gain(), Gain::A128);

        // The selection survives an unknown factor, but the flush
        // conversion is still clocked out, with the old pulse count.
        scales.set_gain_factor(100).unwrap();
        assert_eq!(scales.gain(), Gain::A128);

        shared.0.borrow_mut().push_frame(&[0]);
        scales.set_gain_factor(32).unwrap();
        assert_eq!(scales.gain(), Gain::B32);
        shared.0.borrow_mut().settle();
        assert_eq!(shared.0.borrow().pulse_log, vec![1, 1, 2]);
    }

    #[test]
    fn gain_factor_roundtrip() {
        assert_eq!(Gain::from_factor(128), Some(Gain::A128));
        assert_eq!(Gain::from_factor(64), Some(Gain::A64));
        assert_eq!(Gain::from_factor(32), Some(Gain::B32));
        assert_eq!(Gain::from_factor(0), None);
        assert_eq!(Gain::from_factor(129), None);
        for gain in [Gain::A128, Gain::A64, Gain::B32] {
            assert_eq!(Gain::from_factor(gain.factor()), Some(gain));
        }
    }

    #[test]
    fn end_to_end_four_channel_plank() {
        let pattern = [100, -50, 0, MAX_VALUE];
        // Constructor flush + single-sample tare + one read.
        let (mut scales, _shared) = bank_with(pattern, 3);
        assert_eq!(scales.channel_count(), 4);
        scales.tare(1, 10_000).unwrap();
        assert_eq!(scales.offsets(), pattern);
        assert_eq!(scales.read().unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn bounded_read_times_out_when_nothing_is_pending() {
        let (mut scales, _shared) = bank_with([0i32; 2], 1);
        assert_eq!(scales.read_raw_timeout(1_000), Err(Error::TimedOut));
        assert_eq!(scales.read_timeout(0), Err(Error::TimedOut));
    }

    #[test]
    fn power_cycle_drives_the_clock_line() {
        let (mut scales, shared) = bank_with([0i32; 1], 1);
        scales.power_down().unwrap();
        assert!(shared.0.borrow().clock_is_high());
        scales.power_up().unwrap();
        assert!(!shared.0.borrow().clock_is_high());
    }
}
