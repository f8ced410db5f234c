//! Constants used across the link protocol implementation.
//!
//! This module defines the protocol-wide constants used for
//! header layout, station addressing, payload and queue sizing, and
//! the nominal timings of both infrared line codes.
//!
//! ## Key Concepts
//!
//! - **Header byte**: class in bits 7:6, sub-type and payload length below it.
//! - **Payload capacity**: every packet carries at most three data bytes.
//! - **Station addresses**: one byte prepended to every radio frame.
//! - **Timings**: nominal durations; receivers widen them with a [`Tolerance`](crate::decoder::Tolerance).
//!
//! Both firmware images (submarine and land station) must be built against the
//! same values; they are the wire contract between the two.

/// Reserved header value returned by the header encoders on invalid input.
///
/// No valid packet class is `0b00`, so this byte never collides with a real header.
pub const INVALID_HEADER: u8 = 0;

/// Number of data bytes that fit behind a header.
pub const PAYLOAD_CAPACITY: usize = 3;

/// Length (in bytes) of a full frame: one header plus the payload.
pub const MAX_FRAME_LEN: usize = 1 + PAYLOAD_CAPACITY;

/// Length (in bytes) of a radio frame: the station address plus a full frame.
pub const RADIO_FRAME_LEN: usize = 1 + MAX_FRAME_LEN;

/// Number of payload bytes carried by a sensor packet (integer part, hundredths).
pub const SENSOR_PAYLOAD_LEN: u8 = 2;

/// Radio address of the submarine.
pub const SUB_ADDRESS: u8 = 0x51;

/// Radio address of the land station.
pub const LAND_ADDRESS: u8 = 0x11;

/// Carrier frequency the radio transceiver is tuned to.
pub const RADIO_FREQUENCY_HZ: u32 = 868_000_000;

/// Default bit rate of the unit-coded infrared link.
pub const DEFAULT_BITS_PER_SECOND: u32 = 30;

/// Default relative imprecision accepted around every nominal duration.
pub const DEFAULT_IMPRECISION: f32 = 0.25;

/// Raw bytes buffered between a byte producer and the message framer.
///
/// `heapless::spsc` queues hold one element less than their size.
pub const BYTE_QUEUE_LEN: usize = 33;

/// Pending "message done" tokens buffered for the message framer.
pub const MESSAGE_DONE_QUEUE_LEN: usize = 11;

/// Instructions buffered by the submarine controller.
pub const INST_QUEUE_LEN: usize = 10;

/// Position updates buffered by the submarine controller.
pub const UPDATE_QUEUE_LEN: usize = 20;

/// Outbound frames buffered by a transport adapter.
pub const OUTBOX_LEN: usize = 11;

/// Sensor readings buffered by the land station until the operator asks for them.
pub const MEASURE_BUFFER_LEN: usize = 32;

/// Times the submarine re-sends a measurement before giving up on the acknowledgement.
pub const MAX_SENSOR_RETRIES: u8 = 5;

/// Nominal lead signal marking the start of a pulse-width coded message.
pub const LEAD_SIGNAL_US: u32 = 9000;

/// Nominal lead pause following the lead signal.
pub const LEAD_PAUSE_US: u32 = 4500;

/// Nominal signal preceding every bit pause.
pub const BIT_SIGNAL_US: u32 = 560;

/// Nominal pause encoding a `0` bit.
pub const BIT_PAUSE_ZERO_US: u32 = 560;

/// Nominal pause encoding a `1` bit.
pub const BIT_PAUSE_ONE_US: u32 = 1680;

/// Nominal signal closing a pulse-width coded message.
pub const END_SIGNAL_US: u32 = 560;

/// Longest pause the edge sampler measures before reporting it anyway.
pub const MAX_PAUSE_US: u32 = 6000;

/// Pauses of this many units (or more) close a unit-coded byte.
pub const BYTE_GAP_UNITS: u32 = 2;

/// Pauses of this many units (or more) close a unit-coded message.
pub const MESSAGE_GAP_UNITS: u32 = 4;
