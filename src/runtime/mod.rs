//! Task and scheduling utilities.
//!
//! Every long-running component exposes one loop iteration through [`Task`].
//! How iterations are scheduled is up to the firmware. This module offers two
//! approaches: a blocking loop paced by a delay provider (`delay-loop`
//! feature), or a critical-section cell that lets components be stepped from
//! interrupt handlers and shared between them (`isr` feature).
//!
//! - [`run_task_loop`]: blocking loop for `DelayNs` (feature `delay-loop`)
//! - [`run_task_steps`]: the same loop, bounded (feature `delay-loop`)
//! - [`Shared`]: `critical_section::Mutex` cell implementing the listener and
//!   sink traits by delegation (feature `isr`)
//!
//! Common polling periods:
//!
//! | Component | Period |
//! |-----------|--------|
//! | [`EdgeSampler`](crate::sampler::EdgeSampler), unit code at 30 bit/s | 1 ms |
//! | [`EdgeSampler`](crate::sampler::EdgeSampler), lead-in pause code | 50 µs |
//! | [`MessageFramer`](crate::framer::MessageFramer), [`SubControl`](crate::control::SubControl) | 10 ms |
//! | [`RadioLink`](crate::link::radio::RadioLink) | 10 ms |

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "isr")]
mod isr;
#[cfg(feature = "isr")]
pub use isr::*;

/// One iteration of a long-running component.
pub trait Task {
    /// Runs one iteration. Must not block for longer than the component's own I/O.
    fn step(&mut self);
}

impl<T: Task + ?Sized> Task for &mut T {
    fn step(&mut self) {
        (**self).step();
    }
}

/// Sampling period in microseconds for a polling frequency in hertz.
///
/// A frequency of zero is treated as one hertz.
pub const fn poll_period_us(poll_hz: u32) -> u32 {
    let poll_hz = if poll_hz == 0 { 1 } else { poll_hz };
    1_000_000 / poll_hz
}

/// Sampling period giving `samples_per_unit` samples per unit-coded bit.
pub const fn samples_per_unit_period_us(bits_per_second: u32, samples_per_unit: u32) -> u32 {
    let samples = if samples_per_unit == 0 {
        1
    } else {
        samples_per_unit
    };
    crate::decoder::unit_us(bits_per_second) / samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_periods() {
        assert_eq!(poll_period_us(20_000), 50);
        assert_eq!(poll_period_us(0), 1_000_000);
        assert_eq!(samples_per_unit_period_us(30, 32), 1_041);
        assert_eq!(samples_per_unit_period_us(30, 0), 33_333);
    }

    #[test]
    fn test_task_through_reference() {
        struct Counter(u32);
        impl Task for Counter {
            fn step(&mut self) {
                self.0 += 1;
            }
        }

        let mut counter = Counter(0);
        {
            let mut by_ref = &mut counter;
            by_ref.step();
            by_ref.step();
        }
        assert_eq!(counter.0, 2);
    }
}
