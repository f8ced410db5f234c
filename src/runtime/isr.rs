use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;

use crate::decoder::{DecoderListener, EdgeListener};
use crate::framer::PacketListener;
use crate::link::ByteSink;
use crate::packet::{Instruction, Sensor, Update};

use super::Task;

/// A component shared between tasks or interrupt handlers.
///
/// Every access runs inside `critical_section::with`. A shared reference
/// implements the same listener, sink and task traits as the component, so it
/// can be registered as another component's listener while remaining reachable
/// from its own loop.
///
/// # Example
/// ```rust
/// use sublink::decoder::{EdgeListener, Tolerance, UnitDecoder};
/// use sublink::framer::{FramerInput, FramerQueues};
/// use sublink::runtime::Shared;
///
/// // Lives in a `static` in firmware; the timer interrupt feeds it edges.
/// let decoder: Shared<UnitDecoder<FramerInput<'static>>> =
///     Shared::new(UnitDecoder::new(30, Tolerance::default()));
///
/// let mut edges = &decoder;
/// edges.signal_detected(33_333);
/// assert_eq!(decoder.with(|d| d.pending_bits()), 1);
/// ```
pub struct Shared<T>(Mutex<RefCell<T>>);

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

impl<T> Shared<T> {
    /// Wraps `value`; usable in a `static`.
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(RefCell::new(value)))
    }

    /// Runs `f` on the component inside a critical section.
    ///
    /// # Panics
    /// If called again from within `f` on the same cell.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.0.borrow_ref_mut(cs)))
    }

    /// Replaces the component, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        critical_section::with(|cs| self.0.borrow(cs).replace(value))
    }

    /// Unwraps the component.
    pub fn into_inner(self) -> T {
        self.0.into_inner().into_inner()
    }
}

impl<T: EdgeListener> EdgeListener for &Shared<T> {
    fn signal_detected(&mut self, us: u32) {
        self.with(|inner| inner.signal_detected(us));
    }

    fn pause_detected(&mut self, us: u32) {
        self.with(|inner| inner.pause_detected(us));
    }
}

impl<T: DecoderListener> DecoderListener for &Shared<T> {
    fn byte_received(&mut self, byte: u8) {
        self.with(|inner| inner.byte_received(byte));
    }

    fn message_done(&mut self) {
        self.with(|inner| inner.message_done());
    }
}

impl<T: PacketListener> PacketListener for &Shared<T> {
    fn received_inst(&mut self, inst: Instruction) {
        self.with(|inner| inner.received_inst(inst));
    }

    fn received_update(&mut self, update: Update) {
        self.with(|inner| inner.received_update(update));
    }

    fn received_sens(&mut self, sensor: Sensor) {
        self.with(|inner| inner.received_sens(sensor));
    }
}

impl<T: ByteSink> ByteSink for &Shared<T> {
    fn send_bytes(&mut self, bytes: &[u8]) -> bool {
        self.with(|inner| inner.send_bytes(bytes))
    }
}

impl<T: Task> Task for &Shared<T> {
    fn step(&mut self) {
        self.with(|inner| inner.step());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlConfig, SubControl, SubControlState, ThermoSensor, TravelControl};
    use crate::framer::{FramerQueues, MessageFramer};
    use crate::link::{OutboxQueue, outbox};
    use crate::packet::Position;

    struct Still;

    impl TravelControl for Still {
        fn new_dest(&mut self, _dest: Position) {}
        fn update_cur_pos(&mut self, _pos: Position) {}
        fn stop(&mut self) {}
    }

    struct Cold;

    impl ThermoSensor for Cold {
        fn temperature(&mut self) -> f32 {
            4.0
        }
    }

    #[test]
    fn test_shared_controller_behind_framer() {
        let mut framer_queues = FramerQueues::new();
        let (mut input, rx) = framer_queues.split();
        let mut outbox_queue = OutboxQueue::new();
        let (sink, mut transport) = outbox(&mut outbox_queue);

        let control = Shared::new(SubControl::new(Still, sink, Cold, ControlConfig::default()));
        control.with(|c| c.activate());

        let mut framer = MessageFramer::new(rx);
        framer.set_listener(&control);
        framer.activate();

        for b in [0b01_001_011, 10, 20, 30] {
            input.byte_received(b);
        }
        input.message_done();
        assert!(framer.poll());

        let mut task = &control;
        task.step();
        assert_eq!(control.with(|c| c.state()), SubControlState::Travel);
        assert_eq!(transport.dequeue().unwrap().as_slice(), &[0b01_111_000]);
    }

    #[test]
    fn test_replace_and_into_inner() {
        let cell = Shared::new(1u8);
        assert_eq!(cell.replace(2), 1);
        cell.with(|v| *v += 1);
        assert_eq!(cell.into_inner(), 3);
    }
}
