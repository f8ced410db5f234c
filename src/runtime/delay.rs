use embedded_hal::delay::DelayNs;

use super::Task;

/// Runs a blocking loop that repeatedly calls `step()` on the provided task.
///
/// This is a simple scheduling loop for environments where interrupts are
/// unavailable or undesired. The period is the pause between two iterations;
/// time spent inside `step()` adds to it.
///
/// # Arguments
/// - `task`: the component to drive, or a tuple-like wrapper stepping several.
/// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL.
/// - `period_us`: pause between iterations in microseconds.
///
/// # Example
/// ```rust,no_run
/// # use embedded_hal_mock::eh1::delay::NoopDelay;
/// use sublink::framer::{FramerQueues, MessageFramer};
/// use sublink::console::LandRelay;
/// use sublink::link::{OutboxQueue, outbox};
/// use sublink::runtime::run_task_loop;
///
/// let mut queues = FramerQueues::new();
/// let (_input, rx) = queues.split();
/// let mut outbox_queue = OutboxQueue::new();
/// let (sink, _transport) = outbox(&mut outbox_queue);
/// let mut framer = MessageFramer::new(rx);
/// framer.set_listener(LandRelay::new(sink));
/// framer.activate();
/// run_task_loop(&mut framer, &mut NoopDelay::new(), 10_000);
/// ```
///
/// # Notes
/// - This loop never returns; it is intended for single-purpose polling firmware.
/// - For several components on one core, prefer interrupt-driven stepping with
///   [`Shared`](crate::runtime) cells or an executor.
pub fn run_task_loop<T: Task, D: DelayNs>(task: &mut T, delay: &mut D, period_us: u32) -> ! {
    loop {
        task.step();
        delay.delay_us(period_us);
    }
}

/// Runs `steps` iterations of [`run_task_loop`] and returns.
pub fn run_task_steps<T: Task, D: DelayNs>(
    task: &mut T,
    delay: &mut D,
    period_us: u32,
    steps: usize,
) {
    for _ in 0..steps {
        task.step();
        delay.delay_us(period_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Clock {
        elapsed_us: u64,
    }

    impl DelayNs for Clock {
        fn delay_ns(&mut self, ns: u32) {
            self.elapsed_us += u64::from(ns / 1_000);
        }

        fn delay_us(&mut self, us: u32) {
            self.elapsed_us += u64::from(us);
        }
    }

    struct Counter(u32);

    impl Task for Counter {
        fn step(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_run_task_steps_paces_iterations() {
        let mut counter = Counter(0);
        let mut clock = Clock::default();
        run_task_steps(&mut counter, &mut clock, 250, 8);
        assert_eq!(counter.0, 8);
        assert_eq!(clock.elapsed_us, 2_000);
    }
}
