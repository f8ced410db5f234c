//! Byte transports.
//!
//! Everything that sends packets does so through a [`ByteSink`]. The sink
//! handed to application code is normally an [`Outbox`]: the producer half of a
//! single-producer, single-consumer frame queue whose consumer half is owned by
//! a transport adapter:
//!
//! - [`timing::TimingSender`] drives an IR LED with the unit code,
//! - [`timing::PulseSender`] drives an IR LED with the lead-in pause code,
//! - [`radio::RadioLink`] wraps frames in addressed radio packets.
//!
//! Queueing whole frames keeps every byte of a packet inside one transmission,
//! so the receiving side sees exactly one message boundary per packet.

pub mod radio;
pub mod timing;

use core::fmt;

use heapless::spsc::{Consumer, Producer, Queue};

use crate::consts::{INVALID_HEADER, MAX_FRAME_LEN, OUTBOX_LEN};
use crate::packet::{Frame, Packet};

/// Destination for outbound frames.
pub trait ByteSink {
    /// Queues `bytes` (a header followed by its payload) as one message.
    ///
    /// Returns `false` if the frame was dropped.
    fn send_bytes(&mut self, bytes: &[u8]) -> bool;

    /// Encodes and queues a packet.
    ///
    /// Returns `false` if the header could not be encoded or the frame was dropped.
    fn send_packet(&mut self, packet: &Packet) -> bool {
        match packet.encode() {
            Ok(frame) => self.send_bytes(&frame),
            Err(_err) => {
                warn!("refusing to send {:?} packet: {:?}", packet.class(), _err);
                false
            }
        }
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn send_bytes(&mut self, bytes: &[u8]) -> bool {
        (**self).send_bytes(bytes)
    }
}

/// Backing storage of an outbox.
pub type OutboxQueue = Queue<Frame, OUTBOX_LEN>;

/// Consumer half of an outbox, owned by a transport adapter.
pub type OutboxReceiver<'a> = Consumer<'a, Frame, OUTBOX_LEN>;

/// Producer half of an outbox.
pub struct Outbox<'a> {
    tx: Producer<'a, Frame, OUTBOX_LEN>,
    /// Frames queued.
    pub queued: u32,
    /// Frames refused (full queue or invalid frame).
    pub dropped: u32,
}

impl fmt::Debug for Outbox<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("pending", &self.tx.len())
            .field("queued", &self.queued)
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl<'a> Outbox<'a> {
    /// Wraps the producer half of an outbox queue.
    pub fn new(tx: Producer<'a, Frame, OUTBOX_LEN>) -> Self {
        Self {
            tx,
            queued: 0,
            dropped: 0,
        }
    }

    /// Frames waiting for the transport.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Splits outbox storage into the application side and the transport side.
pub fn outbox(queue: &mut OutboxQueue) -> (Outbox<'_>, OutboxReceiver<'_>) {
    let (tx, rx) = queue.split();
    (Outbox::new(tx), rx)
}

impl ByteSink for Outbox<'_> {
    fn send_bytes(&mut self, bytes: &[u8]) -> bool {
        let valid = !bytes.is_empty() && bytes[0] != INVALID_HEADER && bytes.len() <= MAX_FRAME_LEN;
        let queued = valid
            && Frame::from_slice(bytes)
                .ok()
                .is_some_and(|frame| self.tx.enqueue(frame).is_ok());
        if queued {
            self.queued = self.queued.wrapping_add(1);
        } else {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("outbox: dropped frame of {} bytes", bytes.len());
        }
        queued
    }
}
