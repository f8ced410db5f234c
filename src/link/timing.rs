//! Infrared timing-link senders.
//!
//! Both senders own the output pin driving the IR LED and a delay provider
//! that times every edge. They take one frame at a time from their outbox and
//! emit it as one message; a frame is never interleaved with another.
//!
//! Unit code ([`TimingSender`]), per bit, MSB first:
//!
//! ```text
//!   1:  ‾‾‾‾‾‾‾‾|____        (one unit high, half a unit low)
//!   0:  ‾‾‾‾|____            (half a unit high, half a unit low)
//! ```
//!
//! The low time after the last bit of a byte is stretched to
//! [`BYTE_GAP_UNITS`] units, after the last byte of a frame to more than
//! [`MESSAGE_GAP_UNITS`] units.
//!
//! Lead-in pause code ([`PulseSender`]): lead signal, lead pause, then per bit a
//! fixed signal followed by a short (`0`) or long (`1`) pause, closed by an end
//! signal and an idle gap.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, OutputPin};

use crate::consts::{BYTE_GAP_UNITS, MESSAGE_GAP_UNITS};
use crate::decoder::{PulseTiming, unit_us};
use crate::runtime::Task;

use super::OutboxReceiver;

/// Low time closing the last byte of a frame, in units.
const FRAME_GAP_UNITS: u32 = MESSAGE_GAP_UNITS + 1;

/// Unit-coded IR sender.
pub struct TimingSender<'a, TX, D> {
    tx: TX,
    delay: D,
    rx: OutboxReceiver<'a>,
    unit_us: u32,
    /// Frames transmitted.
    pub frames_sent: u32,
}

impl<'a, TX: OutputPin, D: DelayNs> TimingSender<'a, TX, D> {
    /// Creates a sender for `bits_per_second`.
    pub fn new(tx: TX, delay: D, rx: OutboxReceiver<'a>, bits_per_second: u32) -> Self {
        Self::with_unit_us(tx, delay, rx, unit_us(bits_per_second))
    }

    /// Creates a sender for an explicit unit period.
    pub fn with_unit_us(tx: TX, delay: D, rx: OutboxReceiver<'a>, unit_us: u32) -> Self {
        Self {
            tx,
            delay,
            rx,
            unit_us,
            frames_sent: 0,
        }
    }

    /// The configured unit period.
    pub fn unit_us(&self) -> u32 {
        self.unit_us
    }

    /// The delay provider.
    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Releases the pin and the delay provider.
    pub fn release(self) -> (TX, D) {
        (self.tx, self.delay)
    }

    /// Transmits the next queued frame, if there is one.
    ///
    /// Returns `Ok(true)` if a frame was sent.
    pub fn transmit_next(&mut self) -> Result<bool, TX::Error> {
        let Some(frame) = self.rx.dequeue() else {
            return Ok(false);
        };
        self.transmit(&frame)?;
        self.frames_sent = self.frames_sent.wrapping_add(1);
        Ok(true)
    }

    /// Emits `bytes` as one message, blocking until the final gap has elapsed.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<(), TX::Error> {
        let half = self.unit_us / 2;
        for (i, &byte) in bytes.iter().enumerate() {
            let gap_units = if i + 1 == bytes.len() {
                FRAME_GAP_UNITS
            } else {
                BYTE_GAP_UNITS
            };
            for bit in (0..8).rev() {
                let width = if (byte >> bit) & 1 == 1 {
                    self.unit_us
                } else {
                    half
                };
                self.tx.set_high()?;
                self.delay.delay_us(width);
                self.tx.set_low()?;
                self.delay
                    .delay_us(if bit == 0 { gap_units * self.unit_us } else { half });
            }
        }
        Ok(())
    }
}

impl<TX, D> fmt::Debug for TimingSender<'_, TX, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingSender")
            .field("unit_us", &self.unit_us)
            .field("pending", &self.rx.len())
            .field("frames_sent", &self.frames_sent)
            .finish_non_exhaustive()
    }
}

impl<TX: OutputPin, D: DelayNs> Task for TimingSender<'_, TX, D> {
    fn step(&mut self) {
        if let Err(_err) = self.transmit_next() {
            error!("timing sender: pin error {:?}", _err.kind());
            let _ = self.tx.set_low();
        }
    }
}

/// Lead-in pause-coded IR sender.
pub struct PulseSender<'a, TX, D> {
    tx: TX,
    delay: D,
    rx: OutboxReceiver<'a>,
    timing: PulseTiming,
    /// Frames transmitted.
    pub frames_sent: u32,
}

impl<'a, TX: OutputPin, D: DelayNs> PulseSender<'a, TX, D> {
    /// Creates a sender with the given timing.
    pub fn new(tx: TX, delay: D, rx: OutboxReceiver<'a>, timing: PulseTiming) -> Self {
        Self {
            tx,
            delay,
            rx,
            timing,
            frames_sent: 0,
        }
    }

    /// The delay provider.
    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Releases the pin and the delay provider.
    pub fn release(self) -> (TX, D) {
        (self.tx, self.delay)
    }

    /// Transmits the next queued frame, if there is one.
    pub fn transmit_next(&mut self) -> Result<bool, TX::Error> {
        let Some(frame) = self.rx.dequeue() else {
            return Ok(false);
        };
        self.transmit(&frame)?;
        self.frames_sent = self.frames_sent.wrapping_add(1);
        Ok(true)
    }

    fn mark(&mut self, high_us: u32, low_us: u32) -> Result<(), TX::Error> {
        self.tx.set_high()?;
        self.delay.delay_us(high_us);
        self.tx.set_low()?;
        self.delay.delay_us(low_us);
        Ok(())
    }

    /// Emits `bytes` as one message.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<(), TX::Error> {
        let t = self.timing;
        self.mark(t.lead_signal_us, t.lead_pause_us)?;
        for &byte in bytes {
            for bit in (0..8).rev() {
                let pause = if (byte >> bit) & 1 == 1 {
                    t.one_pause_us
                } else {
                    t.zero_pause_us
                };
                self.mark(t.bit_signal_us, pause)?;
            }
        }
        self.mark(t.end_signal_us, t.max_pause_us)
    }
}

impl<TX, D> fmt::Debug for PulseSender<'_, TX, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseSender")
            .field("timing", &self.timing)
            .field("pending", &self.rx.len())
            .field("frames_sent", &self.frames_sent)
            .finish_non_exhaustive()
    }
}

impl<TX: OutputPin, D: DelayNs> Task for PulseSender<'_, TX, D> {
    fn step(&mut self) {
        if let Err(_err) = self.transmit_next() {
            error!("pulse sender: pin error {:?}", _err.kind());
            let _ = self.tx.set_low();
        }
    }
}
