//! Header byte encoding and decoding.
//!
//! Every packet starts with a single header byte:
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! +-------+-----------+-----------+
//! | class |  subtype  |  length   |   INST / UPDATE
//! +-------+-------+---------------+
//! | class |subtype|    length     |   SENS
//! +-------+-------+---------------+
//! ```
//!
//! Sensor headers trade a sub-type bit for a longer length field. The layout is
//! `(class << 6) | (subtype << shift) | length` with the per-class shift and
//! masks below; [`decode_header`] inverts the encoders exactly.
//!
//! The encoders are total: invalid lengths yield
//! [`INVALID_HEADER`] instead of an error, and callers check for it before
//! sending.

use thiserror::Error;

use crate::consts::INVALID_HEADER;
use crate::packet::{InstKind, PacketClass, SensKind, UpdateKind};

/// Position of the packet class.
pub const CLASS_SHIFT: u8 = 6;
/// Mask of the packet class.
pub const CLASS_MASK: u8 = 0b1100_0000;

/// Position of the sub-type in instruction and update headers.
pub const INST_SUBTYPE_SHIFT: u8 = 3;
/// Mask of the sub-type in instruction and update headers.
pub const INST_SUBTYPE_MASK: u8 = 0b0011_1000;
/// Mask of the payload length in instruction and update headers.
pub const INST_LEN_MASK: u8 = 0b0000_0111;

/// Position of the sub-type in sensor headers.
pub const SENS_SUBTYPE_SHIFT: u8 = 4;
/// Mask of the sub-type in sensor headers.
pub const SENS_SUBTYPE_MASK: u8 = 0b0011_0000;
/// Mask of the payload length in sensor headers.
pub const SENS_LEN_MASK: u8 = 0b0000_1111;

/// An error decoding or encoding a header byte.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum HeaderError {
    /// The class bits are `0b00`, which no packet uses.
    #[error("Reserved packet class in header ({0}).")]
    ReservedClass(u8),
    /// The sub-type bits name no known sub-type of the class.
    #[error("Unknown {class:?} sub-type ({bits}).")]
    UnknownSubtype {
        /// Class the sub-type was read for.
        class: PacketClass,
        /// Raw sub-type bits.
        bits: u8,
    },
    /// The payload does not fit the length field of the class.
    #[error("Payload of {len} bytes does not fit a {class:?} header.")]
    LengthOverflow {
        /// Class of the rejected header.
        class: PacketClass,
        /// Requested payload length.
        len: u8,
    },
}

/// A decoded header byte.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Header {
    /// Instruction header.
    Inst {
        /// Instruction sub-type.
        kind: InstKind,
        /// Number of payload bytes that follow.
        len: u8,
    },
    /// Update header.
    Update {
        /// Update sub-type.
        kind: UpdateKind,
        /// Number of payload bytes that follow.
        len: u8,
    },
    /// Sensor header.
    Sens {
        /// Sensor sub-type.
        kind: SensKind,
        /// Number of payload bytes that follow.
        len: u8,
    },
}

impl Header {
    /// Class of this header.
    pub fn class(&self) -> PacketClass {
        match self {
            Self::Inst { .. } => PacketClass::Inst,
            Self::Update { .. } => PacketClass::Update,
            Self::Sens { .. } => PacketClass::Sens,
        }
    }

    /// Declared payload length.
    pub fn len(&self) -> u8 {
        match *self {
            Self::Inst { len, .. } | Self::Update { len, .. } | Self::Sens { len, .. } => len,
        }
    }

    /// Whether the header declares no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the framer reads the declared payload for this header.
    ///
    /// Only `NEW_POS` instructions carry data; other instructions are single-byte
    /// commands and any declared bytes are discarded with the message.
    pub fn reads_payload(&self) -> bool {
        match *self {
            Self::Inst { kind, len } => kind == InstKind::NewPos && len > 0,
            Self::Update { .. } | Self::Sens { .. } => true,
        }
    }

    /// Encodes the header back into its byte.
    pub fn encode(&self) -> u8 {
        match *self {
            Self::Inst { kind, len } => encode_instruction_header(kind, len),
            Self::Update { kind, len } => encode_update_header(kind, len),
            Self::Sens { kind, len } => encode_sensor_header(kind, len),
        }
    }
}

/// Generates an instruction header byte.
///
/// Returns [`INVALID_HEADER`] if `n_bytes` does not fit three bits.
pub fn encode_instruction_header(kind: InstKind, n_bytes: u8) -> u8 {
    if n_bytes > INST_LEN_MASK {
        return INVALID_HEADER;
    }
    (PacketClass::Inst.bits() << CLASS_SHIFT) | (kind.bits() << INST_SUBTYPE_SHIFT) | n_bytes
}

/// Generates an update header byte.
///
/// Returns [`INVALID_HEADER`] if `n_bytes` does not fit three bits.
pub fn encode_update_header(kind: UpdateKind, n_bytes: u8) -> u8 {
    if n_bytes > INST_LEN_MASK {
        return INVALID_HEADER;
    }
    (PacketClass::Update.bits() << CLASS_SHIFT) | (kind.bits() << INST_SUBTYPE_SHIFT) | n_bytes
}

/// Generates a sensor header byte.
///
/// Returns [`INVALID_HEADER`] if `n_bytes` does not fit four bits.
pub fn encode_sensor_header(kind: SensKind, n_bytes: u8) -> u8 {
    if n_bytes > SENS_LEN_MASK {
        return INVALID_HEADER;
    }
    (PacketClass::Sens.bits() << CLASS_SHIFT) | (kind.bits() << SENS_SUBTYPE_SHIFT) | n_bytes
}

/// Decodes a header byte.
///
/// # Errors
/// - [`HeaderError::ReservedClass`] for class bits `0b00` (including [`INVALID_HEADER`])
/// - [`HeaderError::UnknownSubtype`] for sub-type bits naming nothing
pub fn decode_header(byte: u8) -> Result<Header, HeaderError> {
    match (byte & CLASS_MASK) >> CLASS_SHIFT {
        0b01 => Ok(Header::Inst {
            kind: InstKind::try_from((byte & INST_SUBTYPE_MASK) >> INST_SUBTYPE_SHIFT)?,
            len: byte & INST_LEN_MASK,
        }),
        0b10 => Ok(Header::Update {
            kind: UpdateKind::try_from((byte & INST_SUBTYPE_MASK) >> INST_SUBTYPE_SHIFT)?,
            len: byte & INST_LEN_MASK,
        }),
        0b11 => Ok(Header::Sens {
            kind: SensKind::try_from((byte & SENS_SUBTYPE_MASK) >> SENS_SUBTYPE_SHIFT)?,
            len: byte & SENS_LEN_MASK,
        }),
        _ => Err(HeaderError::ReservedClass(byte)),
    }
}
