//! Typed application packets.
//!
//! Every message on the link is one of three packet classes:
//!
//! | Class | Carries | Payload |
//! |-------|---------|---------|
//! | [`Instruction`] | a command (`NEW_POS`, `ARRIVED`, `STOP`, `ACK`) | up to 3 bytes (a destination for `NEW_POS`) |
//! | [`Update`] | fresh data for a running command (`CURR` position) | up to 3 bytes |
//! | [`Sensor`] | one scalar measurement | 2 bytes: integer part and hundredths |
//!
//! Packets are plain values. The [`framer`](crate::framer) builds them from
//! received bytes and hands each one to exactly one listener; senders turn them
//! back into bytes with [`Packet::encode`].

use heapless::Vec;
use libm::roundf;

use crate::consts::{INVALID_HEADER, MAX_FRAME_LEN, PAYLOAD_CAPACITY, SENSOR_PAYLOAD_LEN};
use crate::header::{
    HeaderError, encode_instruction_header, encode_sensor_header, encode_update_header,
};

/// Fixed-capacity payload buffer.
pub type Payload = Vec<u8, PAYLOAD_CAPACITY>;

/// Header plus payload, as handed to a transport.
pub type Frame = Vec<u8, MAX_FRAME_LEN>;

/// Packet class, stored in bits 7:6 of the header byte.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PacketClass {
    /// Instruction packet (`0b01`).
    Inst = 0b01,
    /// Update packet (`0b10`).
    Update = 0b10,
    /// Sensor packet (`0b11`).
    Sens = 0b11,
}

impl PacketClass {
    /// Raw two-bit class code.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Instruction sub-types.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum InstKind {
    /// Travel to the destination carried in the payload.
    NewPos = 0b001,
    /// The operator observed the submarine at its destination.
    Arrived = 0b010,
    /// Abort whatever is going on.
    Stop = 0b100,
    /// Acknowledge the last packet.
    Ack = 0b111,
    /// No instruction.
    #[default]
    None = 0b000,
}

impl InstKind {
    /// Raw three-bit sub-type code.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for InstKind {
    type Error = HeaderError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0b001 => Ok(Self::NewPos),
            0b010 => Ok(Self::Arrived),
            0b100 => Ok(Self::Stop),
            0b111 => Ok(Self::Ack),
            0b000 => Ok(Self::None),
            _ => Err(HeaderError::UnknownSubtype {
                class: PacketClass::Inst,
                bits,
            }),
        }
    }
}

/// Update sub-types.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum UpdateKind {
    /// Current position of the submarine.
    Curr = 0b001,
    /// No data.
    #[default]
    None = 0b000,
}

impl UpdateKind {
    /// Raw three-bit sub-type code.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for UpdateKind {
    type Error = HeaderError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0b001 => Ok(Self::Curr),
            0b000 => Ok(Self::None),
            _ => Err(HeaderError::UnknownSubtype {
                class: PacketClass::Update,
                bits,
            }),
        }
    }
}

/// Sensor sub-types.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SensKind {
    /// Water temperature in degrees Celsius.
    Temp = 0b01,
    /// Gyroscope reading.
    Gyro = 0b10,
}

impl SensKind {
    /// Raw two-bit sub-type code.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SensKind {
    type Error = HeaderError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0b01 => Ok(Self::Temp),
            0b10 => Ok(Self::Gyro),
            _ => Err(HeaderError::UnknownSubtype {
                class: PacketClass::Sens,
                bits,
            }),
        }
    }
}

/// A position in the unit cube, as shared between the operator and the submarine.
#[derive(PartialEq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Position {
    /// X coordinate in `[0, 1]`.
    pub x: f32,
    /// Y coordinate in `[0, 1]`.
    pub y: f32,
    /// Z coordinate in `[0, 1]`.
    pub z: f32,
}

impl Position {
    /// Decodes a position from the first three payload bytes (`byte / 255`).
    ///
    /// Missing bytes read as zero.
    pub fn from_payload(payload: &[u8]) -> Self {
        let axis = |i: usize| f32::from(payload.get(i).copied().unwrap_or(0)) / 255.0;
        Self {
            x: axis(0),
            y: axis(1),
            z: axis(2),
        }
    }
}

/// Maps a coordinate in `[0, 1]` onto a payload byte.
///
/// Mirrors the operator console: the value is taken in hundredths and mapped
/// linearly onto `[0, 255]`, clamped at both ends.
pub fn coord_to_byte(value: f32) -> u8 {
    let hundredths = (value * 100.0) as i32;
    (hundredths * 255 / 100).clamp(0, 255) as u8
}

/// Splits a measurement into its integer byte and its hundredths byte.
///
/// The value is rounded to the nearest hundredth. Values outside `[0, 255.99]`
/// are clamped.
pub fn split_centi(value: f32) -> [u8; 2] {
    let centi = roundf(value.clamp(0.0, 255.99) * 100.0) as u16;
    [(centi / 100) as u8, (centi % 100) as u8]
}

/// Rebuilds a measurement from an integer byte and a hundredths byte.
pub fn merge_centi(whole: u8, hundredths: u8) -> f32 {
    f32::from(whole) + f32::from(hundredths) * 0.01
}

/// An instruction packet.
#[derive(PartialEq, Eq, Clone, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Instruction {
    /// Instruction sub-type.
    pub kind: InstKind,
    /// Data bytes following the header.
    pub payload: Payload,
}

impl Instruction {
    /// Creates an instruction without payload.
    pub fn new(kind: InstKind) -> Self {
        Self {
            kind,
            payload: Payload::new(),
        }
    }

    /// Creates a `NEW_POS` instruction carrying a destination.
    pub fn new_pos(x: u8, y: u8, z: u8) -> Self {
        Self {
            kind: InstKind::NewPos,
            payload: Payload::from_iter([x, y, z]),
        }
    }

    /// Creates an `ACK` instruction.
    pub fn ack() -> Self {
        Self::new(InstKind::Ack)
    }

    /// Destination encoded in the payload.
    pub fn position(&self) -> Position {
        Position::from_payload(&self.payload)
    }
}

/// An update packet.
#[derive(PartialEq, Eq, Clone, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Update {
    /// Update sub-type.
    pub kind: UpdateKind,
    /// Data bytes following the header.
    pub payload: Payload,
}

impl Update {
    /// Creates a `CURR` update carrying the current position.
    pub fn curr(x: u8, y: u8, z: u8) -> Self {
        Self {
            kind: UpdateKind::Curr,
            payload: Payload::from_iter([x, y, z]),
        }
    }

    /// Position encoded in the payload.
    pub fn position(&self) -> Position {
        Position::from_payload(&self.payload)
    }
}

/// A sensor packet.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Sensor {
    /// Which sensor produced the value.
    pub kind: SensKind,
    /// The measurement, with two decimals of precision on the wire.
    pub value: f32,
}

/// Any packet travelling over the link.
#[derive(PartialEq, Clone, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Packet {
    /// See [`Instruction`].
    Instruction(Instruction),
    /// See [`Update`].
    Update(Update),
    /// See [`Sensor`].
    Sensor(Sensor),
}

impl Packet {
    /// Class of this packet.
    pub fn class(&self) -> PacketClass {
        match self {
            Self::Instruction(_) => PacketClass::Inst,
            Self::Update(_) => PacketClass::Update,
            Self::Sensor(_) => PacketClass::Sens,
        }
    }

    /// Encodes the packet as a header byte followed by its payload.
    ///
    /// # Errors
    /// Returns a [`HeaderError::LengthOverflow`] if the header encoder rejected
    /// the payload length.
    pub fn encode(&self) -> Result<Frame, HeaderError> {
        let mut frame = Frame::new();
        let sensor_bytes;
        let (header, payload): (u8, &[u8]) = match self {
            Self::Instruction(inst) => (
                encode_instruction_header(inst.kind, inst.payload.len() as u8),
                inst.payload.as_slice(),
            ),
            Self::Update(update) => (
                encode_update_header(update.kind, update.payload.len() as u8),
                update.payload.as_slice(),
            ),
            Self::Sensor(sens) => {
                sensor_bytes = split_centi(sens.value);
                (
                    encode_sensor_header(sens.kind, SENSOR_PAYLOAD_LEN),
                    sensor_bytes.as_slice(),
                )
            }
        };
        if header == INVALID_HEADER {
            return Err(HeaderError::LengthOverflow {
                class: self.class(),
                len: payload.len() as u8,
            });
        }
        // Header plus at most PAYLOAD_CAPACITY bytes always fits a frame.
        let _ = frame.push(header);
        let _ = frame.extend_from_slice(payload);
        Ok(frame)
    }
}

impl From<Instruction> for Packet {
    fn from(inst: Instruction) -> Self {
        Self::Instruction(inst)
    }
}

impl From<Update> for Packet {
    fn from(update: Update) -> Self {
        Self::Update(update)
    }
}

impl From<Sensor> for Packet {
    fn from(sens: Sensor) -> Self {
        Self::Sensor(sens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_scales_bytes_into_unit_range() {
        let pos = Instruction::new_pos(255, 0, 51).position();
        assert_eq!(pos.x, 1.0);
        assert_eq!(pos.y, 0.0);
        assert!((pos.z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_coord_to_byte_matches_console_mapping() {
        assert_eq!(coord_to_byte(0.0), 0);
        assert_eq!(coord_to_byte(0.5), 127);
        assert_eq!(coord_to_byte(1.0), 255);
        assert_eq!(coord_to_byte(1.7), 255);
        assert_eq!(coord_to_byte(-0.3), 0);
    }

    #[test]
    fn test_split_centi_keeps_two_decimals() {
        assert_eq!(split_centi(30.5), [30, 50]);
        assert_eq!(split_centi(21.0), [21, 0]);
        assert_eq!(split_centi(-4.0), [0, 0]);
        assert_eq!(split_centi(300.0)[0], 255);
    }

    #[test]
    fn test_split_centi_rounds_to_hundredths() {
        assert_eq!(split_centi(21.3), [21, 30]);
        assert_eq!(split_centi(19.9), [19, 90]);
        assert_eq!(split_centi(4.35), [4, 35]);
        assert_eq!(split_centi(12.996), [13, 0]);
        assert_eq!(split_centi(255.99), [255, 99]);
        for value in [21.3f32, 19.9, 4.35, 0.07] {
            let [whole, hundredths] = split_centi(value);
            assert!((merge_centi(whole, hundredths) - value).abs() < 1e-3);
        }
    }

    #[test]
    fn test_merge_centi() {
        assert!((merge_centi(30, 50) - 30.5).abs() < 1e-4);
        assert!((merge_centi(255, 0) - 255.0).abs() < 1e-4);
    }

    #[test]
    fn test_encode_new_pos_frame() {
        let frame = Packet::from(Instruction::new_pos(255, 0, 255)).encode().unwrap();
        assert_eq!(frame.as_slice(), &[0b01_001_011, 255, 0, 255]);
    }

    #[test]
    fn test_encode_ack_frame() {
        let frame = Packet::from(Instruction::ack()).encode().unwrap();
        assert_eq!(frame.as_slice(), &[0b01_111_000]);
    }

    #[test]
    fn test_encode_sensor_frame() {
        let frame = Packet::from(Sensor {
            kind: SensKind::Temp,
            value: 30.5,
        })
        .encode()
        .unwrap();
        assert_eq!(frame.as_slice(), &[0b11_01_0010, 30, 50]);
    }

    #[test]
    fn test_unknown_instruction_bits_are_rejected() {
        assert_eq!(
            InstKind::try_from(0b011),
            Err(HeaderError::UnknownSubtype {
                class: PacketClass::Inst,
                bits: 0b011
            })
        );
        assert!(SensKind::try_from(0b00).is_err());
        assert_eq!(UpdateKind::try_from(0b000), Ok(UpdateKind::None));
    }
}
