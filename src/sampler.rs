//! Photodiode edge sampler.
//!
//! [`EdgeSampler`] turns a periodically sampled receiver pin into
//! signal/pause durations for an [`EdgeListener`]. Call
//! [`tick()`](EdgeSampler::tick) once every `poll_us` microseconds, from a
//! timer interrupt or a [`run_task_loop`](crate::runtime) loop.
//!
//! Durations are measured in whole sampling periods. A pause that outlasts
//! `max_pause_us` is reported once, without waiting for the next signal, so
//! downstream decoders see the end of the last message on an idle line.

use embedded_hal::digital::{Error as _, InputPin};

use crate::decoder::EdgeListener;
use crate::runtime::Task;

/// What the sampler is currently measuring.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SamplerState {
    /// The line is quiet; measuring a pause.
    #[default]
    WaitForSignal,
    /// The line carries a signal; measuring it.
    WaitForPause,
}

/// Periodic sampler of a receiver pin.
#[derive(Debug)]
pub struct EdgeSampler<RX, L> {
    rx: RX,
    listener: Option<L>,
    poll_us: u32,
    max_pause_us: u32,
    active_low: bool,
    state: SamplerState,
    elapsed_us: u32,
    pause_reported: bool,
}

impl<RX: InputPin, L: EdgeListener> EdgeSampler<RX, L> {
    /// Creates a sampler polled every `poll_us` microseconds.
    ///
    /// With `active_low` the receiver pulls the pin low while it sees light.
    ///
    /// A pause is reported at most once, so `max_pause_us` caps every pause the
    /// decoder sees. It must exceed the longest in-message pause of the line
    /// code: more than four units for the unit code (133 ms at 30 bit/s), or
    /// every byte gap arrives truncated and is dropped as noise.
    /// [`MAX_PAUSE_US`](crate::consts::MAX_PAUSE_US) suits the pulse-width code.
    pub fn new(rx: RX, poll_us: u32, max_pause_us: u32, active_low: bool) -> Self {
        Self {
            rx,
            listener: None,
            poll_us: poll_us.max(1),
            max_pause_us,
            active_low,
            state: SamplerState::default(),
            elapsed_us: 0,
            // Start-up silence is not a pause worth reporting.
            pause_reported: true,
        }
    }

    /// Creates a sampler from a polling frequency in hertz.
    pub fn with_frequency(rx: RX, poll_hz: u32, max_pause_us: u32, active_low: bool) -> Self {
        Self::new(rx, 1_000_000 / poll_hz.max(1), max_pause_us, active_low)
    }

    /// Registers the consumer of measured durations, replacing any previous one.
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

    /// The sampling period.
    pub fn poll_us(&self) -> u32 {
        self.poll_us
    }

    /// Current measurement.
    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Releases the pin.
    pub fn release(self) -> RX {
        self.rx
    }

    /// Samples the pin once.
    pub fn tick(&mut self) -> Result<(), RX::Error> {
        let lit = self.rx.is_high()? != self.active_low;
        match (self.state, lit) {
            (SamplerState::WaitForSignal, true) => {
                if !self.pause_reported {
                    let us = self.elapsed_us;
                    if let Some(listener) = self.listener.as_mut() {
                        listener.pause_detected(us);
                    }
                }
                self.state = SamplerState::WaitForPause;
                self.elapsed_us = self.poll_us;
            }
            (SamplerState::WaitForSignal, false) => {
                self.elapsed_us = self.elapsed_us.saturating_add(self.poll_us);
                if !self.pause_reported && self.elapsed_us >= self.max_pause_us {
                    let us = self.elapsed_us;
                    if let Some(listener) = self.listener.as_mut() {
                        listener.pause_detected(us);
                    }
                    self.pause_reported = true;
                }
            }
            (SamplerState::WaitForPause, true) => {
                self.elapsed_us = self.elapsed_us.saturating_add(self.poll_us);
            }
            (SamplerState::WaitForPause, false) => {
                let us = self.elapsed_us;
                if let Some(listener) = self.listener.as_mut() {
                    listener.signal_detected(us);
                }
                self.state = SamplerState::WaitForSignal;
                self.elapsed_us = self.poll_us;
                self.pause_reported = false;
            }
        }
        Ok(())
    }
}

impl<RX: InputPin, L: EdgeListener> Task for EdgeSampler<RX, L> {
    fn step(&mut self) {
        if let Err(_err) = self.tick() {
            error!("edge sampler: pin error {:?}", _err.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::TimingEvent;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use std::vec::Vec;

    #[derive(Default, Debug)]
    struct Recorder {
        events: Vec<TimingEvent>,
    }

    impl EdgeListener for Recorder {
        fn signal_detected(&mut self, us: u32) {
            self.events.push(TimingEvent::signal(us));
        }

        fn pause_detected(&mut self, us: u32) {
            self.events.push(TimingEvent::pause(us));
        }
    }

    fn levels(pattern: &[(PinState, usize)]) -> Vec<PinTransaction> {
        pattern
            .iter()
            .flat_map(|&(state, n)| core::iter::repeat_n(PinTransaction::get(state), n))
            .collect()
    }

    fn run(sampler: &mut EdgeSampler<PinMock, Recorder>, ticks: usize) {
        for _ in 0..ticks {
            sampler.tick().unwrap();
        }
    }

    #[test]
    fn test_measures_signal_and_pause() {
        let pattern = [
            (PinState::Low, 3),
            (PinState::High, 4),
            (PinState::Low, 2),
            (PinState::High, 1),
            (PinState::Low, 1),
        ];
        let rx = PinMock::new(&levels(&pattern));
        let mut sampler = EdgeSampler::new(rx, 100, 10_000, false);
        sampler.set_listener(Recorder::default());
        run(&mut sampler, 11);

        let rec = sampler.listener().unwrap();
        assert_eq!(
            rec.events,
            [
                TimingEvent::signal(400),
                TimingEvent::pause(200),
                TimingEvent::signal(100),
            ]
        );
        assert_eq!(sampler.state(), SamplerState::WaitForSignal);
        sampler.release().done();
    }

    #[test]
    fn test_long_pause_is_reported_once() {
        let pattern = [
            (PinState::High, 2),
            (PinState::Low, 8),
            (PinState::High, 2),
            (PinState::Low, 1),
        ];
        let rx = PinMock::new(&levels(&pattern));
        let mut sampler = EdgeSampler::new(rx, 100, 500, false);
        sampler.set_listener(Recorder::default());
        run(&mut sampler, 13);

        // Light returning after the forced report adds no second pause.
        let rec = sampler.listener().unwrap();
        assert_eq!(
            rec.events,
            [
                TimingEvent::signal(200),
                TimingEvent::pause(500),
                TimingEvent::signal(200),
            ]
        );
        sampler.release().done();
    }

    #[test]
    fn test_active_low_receiver() {
        let pattern = [(PinState::High, 1), (PinState::Low, 3), (PinState::High, 1)];
        let rx = PinMock::new(&levels(&pattern));
        let mut sampler = EdgeSampler::with_frequency(rx, 10_000, 6_000, true);
        assert_eq!(sampler.poll_us(), 100);
        sampler.set_listener(Recorder::default());
        run(&mut sampler, 5);

        let rec = sampler.listener().unwrap();
        assert_eq!(rec.events, [TimingEvent::signal(300)]);
        sampler.release().done();
    }
}
