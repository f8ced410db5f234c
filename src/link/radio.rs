//! Addressed radio link.
//!
//! Every radio frame is one station address followed by one packet frame:
//!
//! ```text
//! +---------+--------+-----------------+
//! | address | header | payload (0..=3) |
//! +---------+--------+-----------------+
//! ```
//!
//! The link prepends the peer's address when sending. On receive it forwards
//! the bytes of frames addressed to its own station, followed by a message-done
//! notification; frames for the other station are drained and dropped.
//!
//! The transceiver itself is behind the [`Radio`] trait, so any LoRa (or other
//! packet radio) driver can be plugged in.

use core::fmt;

use heapless::Vec;

use crate::consts::{LAND_ADDRESS, RADIO_FRAME_LEN, SUB_ADDRESS};
use crate::decoder::DecoderListener;
use crate::runtime::Task;

use super::OutboxReceiver;

/// Packet radio transceiver.
pub trait Radio {
    /// Transceiver error.
    type Error: fmt::Debug;

    /// Powers up and configures the transceiver.
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Transmits one packet.
    ///
    /// Returns [`nb::Error::WouldBlock`] while a previous transmission is still on air.
    fn transmit(&mut self, frame: &[u8]) -> nb::Result<(), Self::Error>;

    /// Checks for a received packet and returns its length, or zero if there is none.
    fn parse_packet(&mut self) -> usize;

    /// Reads the next byte of the received packet.
    fn read(&mut self) -> Option<u8>;
}

/// The two stations of the link.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Station {
    /// The submarine (`0x51`).
    Submarine,
    /// The land station (`0x11`).
    Land,
}

impl Station {
    /// Radio address of this station.
    pub const fn address(self) -> u8 {
        match self {
            Self::Submarine => SUB_ADDRESS,
            Self::Land => LAND_ADDRESS,
        }
    }

    /// The other station.
    pub const fn peer(self) -> Self {
        match self {
            Self::Submarine => Self::Land,
            Self::Land => Self::Submarine,
        }
    }
}

/// State of the [`RadioLink`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum LinkState {
    /// Suspended.
    #[default]
    Idle,
    /// Choosing between sending and receiving.
    Command,
    /// Sending one queued frame.
    Send,
    /// Receiving one packet.
    Read,
}

/// Radio transport adapter.
pub struct RadioLink<'a, R, L> {
    radio: R,
    station: Station,
    rx: OutboxReceiver<'a>,
    listener: Option<L>,
    state: LinkState,
    /// Frames transmitted.
    pub sent: u32,
    /// Frames received for this station.
    pub received: u32,
    /// Frames received for the other station.
    pub misaddressed: u32,
}

impl<R, L> fmt::Debug for RadioLink<'_, R, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadioLink")
            .field("station", &self.station)
            .field("state", &self.state)
            .field("pending", &self.rx.len())
            .field("sent", &self.sent)
            .field("received", &self.received)
            .field("misaddressed", &self.misaddressed)
            .finish_non_exhaustive()
    }
}

impl<'a, R: Radio, L: DecoderListener> RadioLink<'a, R, L> {
    /// Creates an idle link for `station`, sending the frames queued in `rx`.
    pub fn new(radio: R, station: Station, rx: OutboxReceiver<'a>) -> Self {
        Self {
            radio,
            station,
            rx,
            listener: None,
            state: LinkState::Idle,
            sent: 0,
            received: 0,
            misaddressed: 0,
        }
    }

    /// Registers the consumer of received bytes, replacing any previous one.
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

    /// The station this link plays.
    pub fn station(&self) -> Station {
        self.station
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The transceiver.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable access to the transceiver.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Starts the transceiver and the link.
    pub fn activate(&mut self) -> Result<(), R::Error> {
        self.radio.begin()?;
        debug!("radio link: activate as {:?}", self.station);
        self.state = LinkState::Command;
        Ok(())
    }

    /// Suspends the link.
    pub fn deactivate(&mut self) {
        debug!("radio link: deactivate");
        self.state = LinkState::Idle;
    }

    /// Runs one iteration: sends one queued frame if there is one, otherwise
    /// tries to receive one packet.
    pub fn poll(&mut self) -> Result<(), R::Error> {
        if self.state == LinkState::Idle {
            return Ok(());
        }
        self.state = if self.rx.ready() {
            LinkState::Send
        } else {
            LinkState::Read
        };
        let result = match self.state {
            LinkState::Send => self.send_next(),
            _ => {
                self.read_next();
                Ok(())
            }
        };
        self.state = LinkState::Command;
        result
    }

    fn send_next(&mut self) -> Result<(), R::Error> {
        let Some(frame) = self.rx.dequeue() else {
            return Ok(());
        };
        let mut packet: Vec<u8, RADIO_FRAME_LEN> = Vec::new();
        // An outbox frame always leaves room for the address.
        let _ = packet.push(self.station.peer().address());
        let _ = packet.extend_from_slice(&frame);
        nb::block!(self.radio.transmit(&packet))?;
        self.sent = self.sent.wrapping_add(1);
        trace!("radio link: sent {} bytes", packet.len());
        Ok(())
    }

    fn read_next(&mut self) {
        let size = self.radio.parse_packet();
        if size == 0 {
            return;
        }
        let Some(address) = self.radio.read() else {
            return;
        };
        if address != self.station.address() {
            while self.radio.read().is_some() {}
            self.misaddressed = self.misaddressed.wrapping_add(1);
            trace!("radio link: drained packet for {}", address);
            return;
        }

        for _ in 1..size {
            let Some(byte) = self.radio.read() else {
                break;
            };
            if let Some(listener) = self.listener.as_mut() {
                listener.byte_received(byte);
            }
        }
        while self.radio.read().is_some() {}
        if let Some(listener) = self.listener.as_mut() {
            listener.message_done();
        }
        self.received = self.received.wrapping_add(1);
        trace!("radio link: received {} bytes", size - 1);
    }
}

impl<R: Radio, L: DecoderListener> Task for RadioLink<'_, R, L> {
    fn step(&mut self) {
        if self.poll().is_err() {
            error!("radio link: transmit failed");
        }
    }
}
