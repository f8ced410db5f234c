use crate::consts::{BYTE_GAP_UNITS, MESSAGE_GAP_UNITS};

use super::{DecoderListener, EdgeListener, Tolerance, unit_us};

/// Position of the [`UnitDecoder`] inside a bit.
///
/// The state only toggles on durations that fall into a valid band. It is never
/// reset by byte or message boundaries, which are recognised from pause lengths.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DecoderState {
    /// The next valid signal carries a bit.
    #[default]
    WaitForBitSignal,
    /// A bit was read; the next valid pause separates it from what follows.
    WaitForBitPause,
}

/// Duration bands derived once from the unit period.
#[derive(Clone, Copy, Debug)]
struct Bands {
    signal_min: u32,
    signal_max: u32,
    one_threshold: u32,
    separator_min: u32,
    separator_max: u32,
    byte_min: u32,
    message_min: u32,
}

impl Bands {
    fn new(unit: u32, tolerance: Tolerance) -> Self {
        let half = unit / 2;
        Self {
            signal_min: tolerance.min(half),
            signal_max: tolerance.max(unit),
            one_threshold: (unit + half) / 2,
            separator_min: tolerance.min(half),
            separator_max: tolerance.max(half),
            byte_min: tolerance.min(BYTE_GAP_UNITS * unit),
            message_min: MESSAGE_GAP_UNITS * unit,
        }
    }
}

/// Decoder for the unit-coded (on/off-width) infrared line code.
///
/// A signal close to one unit is a `1`, a signal close to half a unit is a `0`.
/// Bits are separated by half-unit pauses; a pause of two up to four units closes
/// a byte and a pause of four units or more closes the message.
///
/// ```rust
/// use sublink::decoder::{DecoderListener, EdgeListener, Tolerance, UnitDecoder};
///
/// #[derive(Default)]
/// struct Count(usize);
/// impl DecoderListener for Count {
///     fn byte_received(&mut self, _byte: u8) { self.0 += 1; }
///     fn message_done(&mut self) {}
/// }
///
/// let mut decoder = UnitDecoder::new(30, Tolerance::new(0.25));
/// decoder.set_listener(Count::default());
/// let unit = decoder.unit_us();
/// for _ in 0..8 {
///     decoder.signal_detected(unit);
///     decoder.pause_detected(unit / 2);
/// }
/// decoder.pause_detected(5 * unit);
/// assert_eq!(decoder.listener().map(|c| c.0), Some(1));
/// ```
#[derive(Debug)]
pub struct UnitDecoder<L> {
    unit_us: u32,
    bands: Bands,
    state: DecoderState,
    byte: u8,
    bits: u8,
    listener: Option<L>,
    /// Edges that fell outside every band, plus bytes closed with fewer or more than eight bits.
    pub noise: u32,
}

impl<L: DecoderListener> UnitDecoder<L> {
    /// Creates a decoder for `bits_per_second` without a listener.
    pub fn new(bits_per_second: u32, tolerance: Tolerance) -> Self {
        Self::with_unit_us(unit_us(bits_per_second), tolerance)
    }

    /// Creates a decoder for an explicit unit period.
    pub fn with_unit_us(unit_us: u32, tolerance: Tolerance) -> Self {
        Self {
            unit_us,
            bands: Bands::new(unit_us, tolerance),
            state: DecoderState::default(),
            byte: 0,
            bits: 0,
            listener: None,
            noise: 0,
        }
    }

    /// Registers the consumer of decoded bytes, replacing any previous one.
    pub fn set_listener(&mut self, listener: L) {
        self.listener = Some(listener);
    }

    /// The registered listener, if any.
    pub fn listener(&self) -> Option<&L> {
        self.listener.as_ref()
    }

    /// Mutable access to the registered listener, if any.
    pub fn listener_mut(&mut self) -> Option<&mut L> {
        self.listener.as_mut()
    }

    /// Unregisters and returns the listener.
    pub fn take_listener(&mut self) -> Option<L> {
        self.listener.take()
    }

    /// The configured unit period.
    pub fn unit_us(&self) -> u32 {
        self.unit_us
    }

    /// Current position inside a bit.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bits accumulated towards the next byte.
    pub fn pending_bits(&self) -> u8 {
        self.bits
    }

    /// Emits the accumulated byte if it holds exactly eight bits; any other
    /// non-empty accumulator is counted as noise and discarded.
    fn flush_byte(&mut self) {
        if self.bits == 8 {
            let byte = self.byte;
            trace!("unit decoder: byte {}", byte);
            if let Some(listener) = self.listener.as_mut() {
                listener.byte_received(byte);
            }
        } else if self.bits > 0 {
            self.noise = self.noise.wrapping_add(1);
            warn!("unit decoder: dropped byte of {} bits", self.bits);
        }
        self.byte = 0;
        self.bits = 0;
    }
}

impl<L: DecoderListener> EdgeListener for UnitDecoder<L> {
    fn signal_detected(&mut self, us: u32) {
        let in_band = us > self.bands.signal_min && us < self.bands.signal_max;
        if self.state != DecoderState::WaitForBitSignal || !in_band {
            self.noise = self.noise.wrapping_add(1);
            trace!("unit decoder: dropped signal of {} us", us);
            return;
        }
        let bit = u8::from(us >= self.bands.one_threshold);
        self.byte = (self.byte << 1) | bit;
        self.bits = self.bits.saturating_add(1);
        self.state = DecoderState::WaitForBitPause;
    }

    fn pause_detected(&mut self, us: u32) {
        if self.state != DecoderState::WaitForBitPause {
            return;
        }
        let bands = self.bands;
        if us > bands.separator_min && us < bands.separator_max {
            self.state = DecoderState::WaitForBitSignal;
        } else if us >= bands.message_min {
            self.flush_byte();
            debug!("unit decoder: message done");
            if let Some(listener) = self.listener.as_mut() {
                listener.message_done();
            }
            self.state = DecoderState::WaitForBitSignal;
        } else if us >= bands.byte_min {
            self.flush_byte();
            self.state = DecoderState::WaitForBitSignal;
        } else {
            self.noise = self.noise.wrapping_add(1);
            trace!("unit decoder: dropped pause of {} us", us);
        }
    }
}
