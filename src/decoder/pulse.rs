use crate::consts::{
    BIT_PAUSE_ONE_US, BIT_PAUSE_ZERO_US, BIT_SIGNAL_US, END_SIGNAL_US, LEAD_PAUSE_US,
    LEAD_SIGNAL_US, MAX_PAUSE_US,
};

use super::{DecoderListener, EdgeListener, Tolerance};

/// Nominal durations of the lead-in, pause-width line code.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct PulseTiming {
    /// Signal opening a message.
    pub lead_signal_us: u32,
    /// Pause after the lead signal.
    pub lead_pause_us: u32,
    /// Signal preceding every bit pause.
    pub bit_signal_us: u32,
    /// Pause encoding a `0`.
    pub zero_pause_us: u32,
    /// Pause encoding a `1`.
    pub one_pause_us: u32,
    /// Signal closing a message.
    pub end_signal_us: u32,
    /// Idle time after a message; longer than any in-message pause.
    pub max_pause_us: u32,
    /// Accepted deviation around every duration.
    pub tolerance: Tolerance,
}

impl Default for PulseTiming {
    fn default() -> Self {
        Self {
            lead_signal_us: LEAD_SIGNAL_US,
            lead_pause_us: LEAD_PAUSE_US,
            bit_signal_us: BIT_SIGNAL_US,
            zero_pause_us: BIT_PAUSE_ZERO_US,
            one_pause_us: BIT_PAUSE_ONE_US,
            end_signal_us: END_SIGNAL_US,
            max_pause_us: MAX_PAUSE_US,
            tolerance: Tolerance::default(),
        }
    }
}

impl PulseTiming {
    /// Pauses above this length are `1` bits.
    pub fn one_threshold(&self) -> u32 {
        (self.zero_pause_us + self.one_pause_us) / 2
    }

    fn is_lead_signal(&self, us: u32) -> bool {
        self.tolerance.contains(self.lead_signal_us, us)
    }

    fn is_lead_pause(&self, us: u32) -> bool {
        self.tolerance.contains(self.lead_pause_us, us)
    }

    fn is_bit_pause(&self, us: u32) -> bool {
        us > self.tolerance.min(self.zero_pause_us) && us < self.tolerance.max(self.one_pause_us)
    }
}

/// Position of the [`PulseDecoder`] inside a message.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PulseState {
    /// Idle line; waiting for the lead signal.
    #[default]
    WaitForLeadSignal,
    /// Lead signal seen; waiting for the lead pause.
    WaitForLeadPause,
    /// Inside a message; every pause is a bit until one falls outside the bit band.
    WaitForBitPause,
}

/// Decoder for the lead-in, pause-width infrared line code.
///
/// Bit signals carry no information; only the pause after each one is
/// classified. Eight bits make a byte. A pause that is not a bit pause (for
/// instance the idle time after the end signal) closes the message.
#[derive(Debug)]
pub struct PulseDecoder<L> {
    timing: PulseTiming,
    state: PulseState,
    byte: u8,
    bits: u8,
    bytes_in_message: u8,
    listener: Option<L>,
    /// Edges that fell outside every band, plus incomplete trailing bytes.
    pub noise: u32,
}

impl<L: DecoderListener> PulseDecoder<L> {
    /// Creates a decoder without a listener.
    pub fn new(timing: PulseTiming) -> Self {
        Self {
            timing,
            state: PulseState::default(),
            byte: 0,
            bits: 0,
            bytes_in_message: 0,
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

    /// The configured timing.
    pub fn timing(&self) -> &PulseTiming {
        &self.timing
    }

    /// Current position inside a message.
    pub fn state(&self) -> PulseState {
        self.state
    }

    fn push_bit(&mut self, one: bool) {
        self.byte = (self.byte << 1) | u8::from(one);
        self.bits += 1;
        if self.bits == 8 {
            let byte = self.byte;
            trace!("pulse decoder: byte {}", byte);
            if let Some(listener) = self.listener.as_mut() {
                listener.byte_received(byte);
            }
            self.bytes_in_message = self.bytes_in_message.saturating_add(1);
            self.byte = 0;
            self.bits = 0;
        }
    }

    fn end_message(&mut self) {
        if self.bits > 0 {
            self.noise = self.noise.wrapping_add(1);
            warn!("pulse decoder: dropped {} trailing bits", self.bits);
        }
        if self.bytes_in_message > 0 {
            debug!("pulse decoder: message of {} bytes", self.bytes_in_message);
            if let Some(listener) = self.listener.as_mut() {
                listener.message_done();
            }
        }
        self.byte = 0;
        self.bits = 0;
        self.bytes_in_message = 0;
        self.state = PulseState::WaitForLeadSignal;
    }
}

impl<L: DecoderListener> EdgeListener for PulseDecoder<L> {
    fn signal_detected(&mut self, us: u32) {
        if self.state == PulseState::WaitForLeadSignal {
            if self.timing.is_lead_signal(us) {
                self.state = PulseState::WaitForLeadPause;
            } else {
                self.noise = self.noise.wrapping_add(1);
            }
        }
    }

    fn pause_detected(&mut self, us: u32) {
        match self.state {
            PulseState::WaitForLeadSignal => {}
            PulseState::WaitForLeadPause => {
                if self.timing.is_lead_pause(us) {
                    self.byte = 0;
                    self.bits = 0;
                    self.bytes_in_message = 0;
                    self.state = PulseState::WaitForBitPause;
                } else {
                    self.noise = self.noise.wrapping_add(1);
                    self.state = PulseState::WaitForLeadSignal;
                }
            }
            PulseState::WaitForBitPause => {
                if self.timing.is_bit_pause(us) {
                    self.push_bit(us > self.timing.one_threshold());
                } else {
                    self.end_message();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[derive(Default, Debug)]
    struct Recorder {
        bytes: Vec<u8, 16>,
        done: usize,
    }

    impl DecoderListener for Recorder {
        fn byte_received(&mut self, byte: u8) {
            let _ = self.bytes.push(byte);
        }

        fn message_done(&mut self) {
            self.done += 1;
        }
    }

    fn decoder() -> PulseDecoder<Recorder> {
        let mut decoder = PulseDecoder::new(PulseTiming::default());
        decoder.set_listener(Recorder::default());
        decoder
    }

    fn feed_message(decoder: &mut PulseDecoder<Recorder>, bytes: &[u8]) {
        decoder.signal_detected(LEAD_SIGNAL_US);
        decoder.pause_detected(LEAD_PAUSE_US);
        for byte in bytes {
            for i in (0..8).rev() {
                decoder.signal_detected(BIT_SIGNAL_US);
                let one = (byte >> i) & 1 == 1;
                decoder.pause_detected(if one {
                    BIT_PAUSE_ONE_US
                } else {
                    BIT_PAUSE_ZERO_US
                });
            }
        }
        decoder.signal_detected(END_SIGNAL_US);
        decoder.pause_detected(MAX_PAUSE_US);
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(PulseTiming::default().one_threshold(), 1120);
    }

    #[test]
    fn test_decodes_message_msb_first() {
        let mut decoder = decoder();
        feed_message(&mut decoder, &[0b11_01_0010, 30, 50]);
        let rec = decoder.listener().unwrap();
        assert_eq!(rec.bytes.as_slice(), &[0b11_01_0010, 30, 50]);
        assert_eq!(rec.done, 1);
        assert_eq!(decoder.state(), PulseState::WaitForLeadSignal);
    }

    #[test]
    fn test_tolerates_skewed_pauses() {
        let mut decoder = decoder();
        decoder.signal_detected(8200);
        decoder.pause_detected(4900);
        for one in [true, false, false, true, true, false, true, false] {
            decoder.signal_detected(600);
            decoder.pause_detected(if one { 1500 } else { 650 });
        }
        decoder.pause_detected(MAX_PAUSE_US);
        let rec = decoder.listener().unwrap();
        assert_eq!(rec.bytes.as_slice(), &[0b1001_1010]);
        assert_eq!(rec.done, 1);
    }

    #[test]
    fn test_requires_lead_in() {
        let mut decoder = decoder();
        for _ in 0..8 {
            decoder.signal_detected(BIT_SIGNAL_US);
            decoder.pause_detected(BIT_PAUSE_ONE_US);
        }
        decoder.pause_detected(MAX_PAUSE_US);
        let rec = decoder.listener().unwrap();
        assert!(rec.bytes.is_empty());
        assert_eq!(rec.done, 0);
        assert_eq!(decoder.noise, 8);
    }

    #[test]
    fn test_bad_lead_pause_restarts() {
        let mut decoder = decoder();
        decoder.signal_detected(LEAD_SIGNAL_US);
        decoder.pause_detected(1000);
        assert_eq!(decoder.state(), PulseState::WaitForLeadSignal);
        feed_message(&mut decoder, &[0x81]);
        assert_eq!(decoder.listener().unwrap().bytes.as_slice(), &[0x81]);
    }

    #[test]
    fn test_partial_byte_is_dropped() {
        let mut decoder = decoder();
        decoder.signal_detected(LEAD_SIGNAL_US);
        decoder.pause_detected(LEAD_PAUSE_US);
        for _ in 0..5 {
            decoder.signal_detected(BIT_SIGNAL_US);
            decoder.pause_detected(BIT_PAUSE_ONE_US);
        }
        decoder.pause_detected(MAX_PAUSE_US);
        let rec = decoder.listener().unwrap();
        assert!(rec.bytes.is_empty());
        assert_eq!(rec.done, 0);
        assert_eq!(decoder.noise, 1);
    }
}
