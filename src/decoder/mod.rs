//! Edge-timing decoders.
//!
//! A receiver front end (for instance the [`EdgeSampler`](crate::sampler::EdgeSampler))
//! reports how long the line carried a signal and how long it paused. The
//! decoders in this module classify those durations into bits, assemble the
//! bits into bytes (MSB first), and detect byte and message boundaries from
//! pause lengths. Two line codes are supported:
//!
//! - [`UnitDecoder`]: on/off-width coding around a unit period derived from the
//!   bit rate. Full-unit signals are `1`, half-unit signals are `0`.
//! - [`PulseDecoder`]: lead-in plus pause-width coding. Every bit is a fixed
//!   signal followed by a short (`0`) or long (`1`) pause.
//!
//! Every comparison is made against a band `nominal * (1 ± factor)` (see
//! [`Tolerance`]). Durations outside all bands are noise: they are counted and
//! otherwise ignored, so a single corrupted edge never shifts the framing.
//!
//! Decoded bytes and message boundaries are delivered synchronously, in order,
//! to a [`DecoderListener`]. Listeners are registered after construction; until
//! then decoded data is discarded.

mod pulse;
mod unit;

pub use pulse::{PulseDecoder, PulseState, PulseTiming};
pub use unit::{DecoderState, UnitDecoder};

use crate::consts::DEFAULT_IMPRECISION;

/// Kind of a measured line interval.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum EdgeKind {
    /// The line carried a signal.
    Signal,
    /// The line was quiet.
    Pause,
}

/// One measured line interval.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TimingEvent {
    /// Signal or pause.
    pub kind: EdgeKind,
    /// Length of the interval in microseconds.
    pub duration_us: u32,
}

impl TimingEvent {
    /// A signal of `duration_us`.
    pub const fn signal(duration_us: u32) -> Self {
        Self {
            kind: EdgeKind::Signal,
            duration_us,
        }
    }

    /// A pause of `duration_us`.
    pub const fn pause(duration_us: u32) -> Self {
        Self {
            kind: EdgeKind::Pause,
            duration_us,
        }
    }
}

/// Consumer of measured line intervals.
pub trait EdgeListener {
    /// The line carried a signal for `us` microseconds.
    fn signal_detected(&mut self, us: u32);

    /// The line was quiet for `us` microseconds.
    fn pause_detected(&mut self, us: u32);

    /// Dispatches a [`TimingEvent`] to the matching callback.
    fn timing_event(&mut self, event: TimingEvent) {
        match event.kind {
            EdgeKind::Signal => self.signal_detected(event.duration_us),
            EdgeKind::Pause => self.pause_detected(event.duration_us),
        }
    }
}

impl<T: EdgeListener + ?Sized> EdgeListener for &mut T {
    fn signal_detected(&mut self, us: u32) {
        (**self).signal_detected(us);
    }

    fn pause_detected(&mut self, us: u32) {
        (**self).pause_detected(us);
    }
}

/// Consumer of decoded bytes.
pub trait DecoderListener {
    /// A complete byte was received.
    fn byte_received(&mut self, byte: u8);

    /// The current message ended; all of its bytes were delivered before this call.
    fn message_done(&mut self);
}

impl<T: DecoderListener + ?Sized> DecoderListener for &mut T {
    fn byte_received(&mut self, byte: u8) {
        (**self).byte_received(byte);
    }

    fn message_done(&mut self) {
        (**self).message_done();
    }
}

/// Accepted relative deviation around a nominal duration.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Tolerance {
    factor: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new(DEFAULT_IMPRECISION)
    }
}

impl Tolerance {
    /// Creates a tolerance of `± factor` (e.g. `0.25` for 25%).
    ///
    /// The factor is clamped to `[0, 1)`.
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 0.99),
        }
    }

    /// The relative deviation.
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Lower (exclusive) bound of the band around `nominal_us`.
    pub fn min(&self, nominal_us: u32) -> u32 {
        (nominal_us as f32 * (1.0 - self.factor)) as u32
    }

    /// Upper (exclusive) bound of the band around `nominal_us`.
    pub fn max(&self, nominal_us: u32) -> u32 {
        (nominal_us as f32 * (1.0 + self.factor)) as u32
    }

    /// Whether `us` lies strictly inside the band around `nominal_us`.
    pub fn contains(&self, nominal_us: u32, us: u32) -> bool {
        us > self.min(nominal_us) && us < self.max(nominal_us)
    }
}

/// Unit period in microseconds for a bit rate in bits per second.
///
/// A rate of zero is treated as one bit per second.
pub const fn unit_us(bits_per_second: u32) -> u32 {
    let bits_per_second = if bits_per_second == 0 {
        1
    } else {
        bits_per_second
    };
    1_000_000 / bits_per_second
}
