//! Message framing and packet interpretation.
//!
//! Received bytes and "message done" notifications reach the framer through a
//! pair of single-producer, single-consumer queues (see [`FramerQueues`]). The
//! producer half, [`FramerInput`], is handed to whatever delivers bytes (a
//! [`decoder`](crate::decoder) or the [`RadioLink`](crate::link::radio::RadioLink));
//! the consumer half is owned by the [`MessageFramer`].
//!
//! Every notification carries the number of bytes that belong to its message.
//! The framer parses exactly one header (and payload where the header asks for
//! one) from those bytes, discards whatever is left over, and dispatches the
//! resulting [`Packet`] to its [`PacketListener`]. A message is never parsed
//! across the boundary of another one.
//!
//! ## States
//!
//! | State | Meaning |
//! |-------|---------|
//! | [`Idle`](FramerState::Idle) | suspended; queued input is left untouched |
//! | [`Read`](FramerState::Read) | waiting for the next message-done token |
//! | [`Message`](FramerState::Message) | parsing the message the token announced |
//!
//! Malformed messages are counted in [`MessageFramer::rejected`], logged and
//! dropped. They never stop the framer.

use core::fmt;

use heapless::spsc::{Consumer, Producer, Queue};
use thiserror::Error;

use crate::consts::{BYTE_QUEUE_LEN, MESSAGE_DONE_QUEUE_LEN, PAYLOAD_CAPACITY, SENSOR_PAYLOAD_LEN};
use crate::decoder::DecoderListener;
use crate::header::{Header, HeaderError, decode_header};
use crate::packet::{Instruction, Packet, Payload, Sensor, Update, merge_centi};
use crate::runtime::Task;

/// Consumer of parsed packets.
pub trait PacketListener {
    /// An instruction packet arrived.
    fn received_inst(&mut self, inst: Instruction);

    /// An update packet arrived.
    fn received_update(&mut self, update: Update);

    /// A sensor packet arrived.
    fn received_sens(&mut self, sensor: Sensor);

    /// Dispatches any packet to the matching callback.
    fn received_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Instruction(inst) => self.received_inst(inst),
            Packet::Update(update) => self.received_update(update),
            Packet::Sensor(sensor) => self.received_sens(sensor),
        }
    }
}

impl<T: PacketListener + ?Sized> PacketListener for &mut T {
    fn received_inst(&mut self, inst: Instruction) {
        (**self).received_inst(inst);
    }

    fn received_update(&mut self, update: Update) {
        (**self).received_update(update);
    }

    fn received_sens(&mut self, sensor: Sensor) {
        (**self).received_sens(sensor);
    }
}

/// Why a message was discarded.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FramerError {
    /// The message held no bytes at all.
    #[error("Empty message.")]
    EmptyMessage,
    /// The header byte could not be decoded.
    #[error("Invalid header: {0}")]
    Header(#[from] HeaderError),
    /// The header declares more payload than a packet can hold.
    #[error("Declared payload of {0} bytes exceeds the payload capacity.")]
    PayloadOverflow(u8),
    /// The message ended before the declared payload was complete.
    #[error("Message ended after {got} of {expected} payload bytes.")]
    Truncated {
        /// Declared payload length.
        expected: u8,
        /// Bytes actually received.
        got: u8,
    },
    /// A sensor packet must carry exactly an integer and a hundredths byte.
    #[error("Sensor packet declares {0} payload bytes.")]
    SensorLength(u8),
}

/// Backing storage of the framer input queues.
///
/// Split it once at start-up; both halves borrow the storage.
pub struct FramerQueues {
    bytes: Queue<u8, BYTE_QUEUE_LEN>,
    done: Queue<u8, MESSAGE_DONE_QUEUE_LEN>,
}

impl Default for FramerQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl FramerQueues {
    /// Empty queues; usable in a `static`.
    pub const fn new() -> Self {
        Self {
            bytes: Queue::new(),
            done: Queue::new(),
        }
    }

    /// Splits the storage into the producer and the consumer half.
    pub fn split(&mut self) -> (FramerInput<'_>, FramerReceiver<'_>) {
        let (bytes_tx, bytes_rx) = self.bytes.split();
        let (done_tx, done_rx) = self.done.split();
        (
            FramerInput {
                bytes: bytes_tx,
                done: done_tx,
                count: 0,
                dropped: 0,
            },
            FramerReceiver {
                bytes: bytes_rx,
                done: done_rx,
            },
        )
    }
}

/// Producer half of the framer input.
///
/// Full queues drop the byte (or postpone the token onto the next message);
/// delivery is best effort.
pub struct FramerInput<'a> {
    bytes: Producer<'a, u8, BYTE_QUEUE_LEN>,
    done: Producer<'a, u8, MESSAGE_DONE_QUEUE_LEN>,
    count: u8,
    /// Bytes lost to a full byte queue.
    pub dropped: u32,
}

impl DecoderListener for FramerInput<'_> {
    fn byte_received(&mut self, byte: u8) {
        if self.bytes.enqueue(byte).is_ok() {
            self.count = self.count.saturating_add(1);
        } else {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("framer input: byte queue full");
        }
    }

    fn message_done(&mut self) {
        // A lost token merges this message into the next one, which the framer
        // then parses from its first header only.
        if self.done.enqueue(self.count).is_ok() {
            self.count = 0;
        } else {
            warn!("framer input: message queue full");
        }
    }
}

/// Consumer half of the framer input.
pub struct FramerReceiver<'a> {
    bytes: Consumer<'a, u8, BYTE_QUEUE_LEN>,
    done: Consumer<'a, u8, MESSAGE_DONE_QUEUE_LEN>,
}

impl fmt::Debug for FramerQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramerQueues")
            .field("bytes", &self.bytes.len())
            .field("messages", &self.done.len())
            .finish()
    }
}

impl fmt::Debug for FramerInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramerInput")
            .field("count", &self.count)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for FramerReceiver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramerReceiver")
            .field("bytes", &self.bytes.len())
            .field("messages", &self.done.len())
            .finish()
    }
}

/// State of the [`MessageFramer`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FramerState {
    /// Suspended.
    #[default]
    Idle,
    /// Waiting for a complete message.
    Read,
    /// Parsing one message.
    Message,
}

/// Turns complete messages into packets.
#[derive(Debug)]
pub struct MessageFramer<'a, L> {
    rx: FramerReceiver<'a>,
    state: FramerState,
    remaining: u8,
    listener: Option<L>,
    /// Messages parsed and dispatched.
    pub accepted: u32,
    /// Messages discarded as malformed.
    pub rejected: u32,
    /// Error of the most recently rejected message.
    pub last_error: Option<FramerError>,
}

impl<'a, L: PacketListener> MessageFramer<'a, L> {
    /// Creates an idle framer over the consumer half of its input queues.
    pub fn new(rx: FramerReceiver<'a>) -> Self {
        Self {
            rx,
            state: FramerState::Idle,
            remaining: 0,
            listener: None,
            accepted: 0,
            rejected: 0,
            last_error: None,
        }
    }

    /// Registers the consumer of parsed packets, replacing any previous one.
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

    /// Current state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Starts waiting for messages.
    pub fn activate(&mut self) {
        debug!("framer: activate");
        self.state = FramerState::Read;
    }

    /// Suspends the framer.
    ///
    /// A message being parsed is abandoned; its remaining bytes are discarded.
    pub fn deactivate(&mut self) {
        debug!("framer: deactivate");
        self.discard_remaining();
        self.state = FramerState::Idle;
    }

    /// Runs one iteration: takes at most one message and dispatches its packet.
    ///
    /// Returns `true` if a packet was dispatched.
    pub fn poll(&mut self) -> bool {
        match self.next_packet() {
            Some(Ok(packet)) => {
                if let Some(listener) = self.listener.as_mut() {
                    listener.received_packet(packet);
                }
                true
            }
            _ => false,
        }
    }

    /// Parses the next complete message without dispatching it.
    ///
    /// Returns `None` while idle or while no message is complete. Rejected
    /// messages are counted and returned as an error.
    pub fn next_packet(&mut self) -> Option<Result<Packet, FramerError>> {
        match self.state {
            FramerState::Idle => return None,
            FramerState::Read => {
                self.remaining = self.rx.done.dequeue()?;
                self.state = FramerState::Message;
            }
            FramerState::Message => {}
        }

        let result = self.parse_message();
        self.discard_remaining();
        self.state = FramerState::Read;

        match &result {
            Ok(packet) => {
                self.accepted = self.accepted.wrapping_add(1);
                debug!("framer: {:?} packet", packet.class());
            }
            Err(err) => {
                self.rejected = self.rejected.wrapping_add(1);
                self.last_error = Some(*err);
                warn!("framer: rejected message: {:?}", err);
            }
        }
        Some(result)
    }

    fn take(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.rx.bytes.dequeue()
    }

    fn discard_remaining(&mut self) {
        while self.take().is_some() {}
        self.remaining = 0;
    }

    fn parse_message(&mut self) -> Result<Packet, FramerError> {
        let header = decode_header(self.take().ok_or(FramerError::EmptyMessage)?)?;
        let len = header.len();

        if matches!(header, Header::Sens { .. }) && len != SENSOR_PAYLOAD_LEN {
            return Err(FramerError::SensorLength(len));
        }

        let mut payload = Payload::new();
        if header.reads_payload() {
            if usize::from(len) > PAYLOAD_CAPACITY {
                return Err(FramerError::PayloadOverflow(len));
            }
            for got in 0..len {
                let byte = self.take().ok_or(FramerError::Truncated { expected: len, got })?;
                // Capacity was checked above.
                let _ = payload.push(byte);
            }
        }

        Ok(match header {
            Header::Inst { kind, .. } => Instruction { kind, payload }.into(),
            Header::Update { kind, .. } => Update { kind, payload }.into(),
            Header::Sens { kind, .. } => Sensor {
                kind,
                value: merge_centi(payload[0], payload[1]),
            }
            .into(),
        })
    }
}

impl<L: PacketListener> Task for MessageFramer<'_, L> {
    fn step(&mut self) {
        let _ = self.poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::encode_instruction_header;
    use crate::packet::{InstKind, PacketClass, SensKind, UpdateKind};
    use heapless::Vec;

    #[derive(Default, Debug)]
    struct Recorder {
        packets: Vec<Packet, 8>,
    }

    impl PacketListener for Recorder {
        fn received_inst(&mut self, inst: Instruction) {
            let _ = self.packets.push(inst.into());
        }

        fn received_update(&mut self, update: Update) {
            let _ = self.packets.push(update.into());
        }

        fn received_sens(&mut self, sensor: Sensor) {
            let _ = self.packets.push(sensor.into());
        }
    }

    fn send(input: &mut FramerInput<'_>, bytes: &[u8]) {
        for &b in bytes {
            input.byte_received(b);
        }
        input.message_done();
    }

    #[test]
    fn test_idle_framer_ignores_input() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        send(&mut input, &[0b01_111_000]);
        assert!(framer.next_packet().is_none());
        assert_eq!(framer.state(), FramerState::Idle);

        framer.activate();
        assert_eq!(
            framer.next_packet(),
            Some(Ok(Instruction::ack().into()))
        );
    }

    #[test]
    fn test_waits_for_message_done() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();
        input.byte_received(0b01_111_000);
        assert!(framer.next_packet().is_none());
        assert_eq!(framer.state(), FramerState::Read);
        input.message_done();
        assert!(framer.next_packet().is_some());
    }

    #[test]
    fn test_parses_new_pos_instruction() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer = MessageFramer::new(rx);
        framer.set_listener(Recorder::default());
        framer.activate();

        send(&mut input, &[0b01_001_011, 255, 0, 255]);
        assert!(framer.poll());
        let rec = framer.listener().unwrap();
        assert_eq!(
            rec.packets.as_slice(),
            &[Packet::Instruction(Instruction::new_pos(255, 0, 255))]
        );
        assert_eq!(framer.accepted, 1);
        assert_eq!(framer.state(), FramerState::Read);
    }

    #[test]
    fn test_parses_sensor_packet() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();

        send(&mut input, &[0b11_01_0010, 30, 50]);
        match framer.next_packet() {
            Some(Ok(Packet::Sensor(sensor))) => {
                assert_eq!(sensor.kind, SensKind::Temp);
                assert!((sensor.value - 30.5).abs() < 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parses_update() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();

        send(&mut input, &[0b10_001_011, 10, 20, 30]);
        assert_eq!(
            framer.next_packet(),
            Some(Ok(Packet::Update(Update::curr(10, 20, 30))))
        );
    }

    #[test]
    fn test_instruction_without_data_ignores_declared_bytes() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();

        send(&mut input, &[encode_instruction_header(InstKind::Stop, 2), 9, 9]);
        send(&mut input, &[0b01_010_000]);
        assert_eq!(
            framer.next_packet(),
            Some(Ok(Instruction::new(InstKind::Stop).into()))
        );
        assert_eq!(
            framer.next_packet(),
            Some(Ok(Instruction::new(InstKind::Arrived).into()))
        );
    }

    #[test]
    fn test_leftover_bytes_do_not_leak_into_next_message() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();

        send(&mut input, &[0b01_111_000, 0b01_100_000, 0xFF]);
        send(&mut input, &[0b10_001_001, 7]);
        assert_eq!(framer.next_packet(), Some(Ok(Instruction::ack().into())));
        assert_eq!(
            framer.next_packet(),
            Some(Ok(Packet::Update(Update {
                kind: UpdateKind::Curr,
                payload: Payload::from_iter([7]),
            })))
        );
        assert!(framer.next_packet().is_none());
    }

    #[test]
    fn test_rejects_payload_overflow() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.set_listener(Recorder::default());
        framer.activate();

        send(&mut input, &[0b10_001_101, 1, 2, 3, 4, 5]);
        send(&mut input, &[0b01_111_000]);
        assert!(!framer.poll());
        assert_eq!(framer.rejected, 1);
        assert_eq!(framer.last_error, Some(FramerError::PayloadOverflow(5)));
        assert!(framer.poll());
        assert_eq!(framer.listener().unwrap().packets.len(), 1);
    }

    #[test]
    fn test_rejects_truncated_and_malformed_messages() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();

        send(&mut input, &[0b01_001_011, 1]);
        send(&mut input, &[]);
        send(&mut input, &[0b00_000_000]);
        send(&mut input, &[0b11_01_0011, 1, 2, 3]);
        assert_eq!(
            framer.next_packet(),
            Some(Err(FramerError::Truncated {
                expected: 3,
                got: 1
            }))
        );
        assert_eq!(framer.next_packet(), Some(Err(FramerError::EmptyMessage)));
        assert_eq!(
            framer.next_packet(),
            Some(Err(FramerError::Header(HeaderError::ReservedClass(0))))
        );
        assert_eq!(framer.next_packet(), Some(Err(FramerError::SensorLength(3))));
        assert_eq!(framer.rejected, 4);
        assert!(framer.next_packet().is_none());
    }

    #[test]
    fn test_deactivate_discards_nothing_queued() {
        let mut queues = FramerQueues::new();
        let (mut input, rx) = queues.split();
        let mut framer: MessageFramer<'_, Recorder> = MessageFramer::new(rx);
        framer.activate();
        framer.deactivate();
        send(&mut input, &[0b01_111_000]);
        assert!(framer.next_packet().is_none());
        framer.activate();
        let packet = framer.next_packet().unwrap().unwrap();
        assert_eq!(packet.class(), PacketClass::Inst);
    }
}
