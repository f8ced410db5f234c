//! Land-station operator console.
//!
//! The operator drives the land station over a serial line with comma
//! separated ASCII commands:
//!
//! ```text
//! INST,NEW_POS,X=0.50,Y=1.00,Z=0.20
//! INST,STOP
//! UPDATE,CURR,X=0.40,Y=0.90,Z=0.20
//! ARRIVED
//! TRANSMIT
//! ```
//!
//! `INST` and `UPDATE` commands (and the bare `ARRIVED`, `STOP` and `ACK`
//! keywords) become packets for the submarine. Coordinates are floats in
//! `[0, 1]`, mapped onto a payload byte with [`coord_to_byte`]. `TRANSMIT` dumps
//! the buffered measurements.
//!
//! Telemetry lines written back to the operator:
//!
//! ```text
//! INST,ACK
//! SENS,TEMP,30.50
//! ```

use core::fmt;

use heapless::Deque;
use thiserror::Error;

use crate::consts::{MEASURE_BUFFER_LEN, PAYLOAD_CAPACITY};
use crate::framer::PacketListener;
use crate::link::ByteSink;
use crate::packet::{
    InstKind, Instruction, Packet, Payload, SensKind, Sensor, Update, UpdateKind, coord_to_byte,
};

/// A parsed console command.
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Command {
    /// Send an instruction.
    Inst(Instruction),
    /// Send an update.
    Update(Update),
    /// Write the buffered measurements to the console.
    Transmit,
}

impl Command {
    /// The packet this command sends, if any.
    pub fn packet(&self) -> Option<Packet> {
        match self {
            Self::Inst(inst) => Some(inst.clone().into()),
            Self::Update(update) => Some(update.clone().into()),
            Self::Transmit => None,
        }
    }
}

/// A console line that could not be handled.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ConsoleError {
    /// The line was empty.
    #[error("Empty command.")]
    Empty,
    /// The first field names no command.
    #[error("Unknown command.")]
    UnknownCommand,
    /// `INST` with an unknown instruction.
    #[error("Unknown instruction.")]
    UnknownInstruction,
    /// `UPDATE` with an unknown update type.
    #[error("Unknown update type.")]
    UnknownUpdate,
    /// A coordinate field is not a number.
    #[error("Coordinate {0} is not a number.")]
    InvalidCoordinate(usize),
    /// More coordinates than a packet can carry.
    #[error("Too many coordinates.")]
    TooManyCoordinates,
    /// The packet could not be queued for sending.
    #[error("Packet dropped by the transport.")]
    Dropped,
    /// The console output rejected a write.
    #[error("Console output failed.")]
    Output,
}

fn clean(field: &str) -> &str {
    field.trim_matches(|c: char| c.is_whitespace() || c == '\u{8}')
}

fn single_byte(keyword: &str) -> Option<InstKind> {
    match keyword {
        "ARRIVED" => Some(InstKind::Arrived),
        "STOP" => Some(InstKind::Stop),
        "ACK" => Some(InstKind::Ack),
        _ => None,
    }
}

fn coordinates<'a>(fields: impl Iterator<Item = &'a str>) -> Result<Payload, ConsoleError> {
    let mut payload = Payload::new();
    for (i, field) in fields.map(clean).filter(|f| !f.is_empty()).enumerate() {
        let value = field.rsplit('=').next().unwrap_or(field);
        let value: f32 = clean(value)
            .parse()
            .map_err(|_| ConsoleError::InvalidCoordinate(i))?;
        if i >= PAYLOAD_CAPACITY {
            return Err(ConsoleError::TooManyCoordinates);
        }
        let _ = payload.push(coord_to_byte(value));
    }
    Ok(payload)
}

/// Parses one console line.
pub fn parse_command(line: &str) -> Result<Command, ConsoleError> {
    let mut fields = line.split(',');
    let command = fields.next().map(clean).unwrap_or_default();
    if command.is_empty() {
        return Err(ConsoleError::Empty);
    }
    if command == "TRANSMIT" {
        return Ok(Command::Transmit);
    }
    if let Some(kind) = single_byte(command) {
        return Ok(Command::Inst(Instruction::new(kind)));
    }

    let kind = fields.next().map(clean).unwrap_or_default();
    match command {
        "INST" => {
            if let Some(kind) = single_byte(kind) {
                return Ok(Command::Inst(Instruction::new(kind)));
            }
            if kind != "NEW_POS" {
                return Err(ConsoleError::UnknownInstruction);
            }
            Ok(Command::Inst(Instruction {
                kind: InstKind::NewPos,
                payload: coordinates(fields)?,
            }))
        }
        "UPDATE" => {
            if kind != "CURR" {
                return Err(ConsoleError::UnknownUpdate);
            }
            Ok(Command::Update(Update {
                kind: UpdateKind::Curr,
                payload: coordinates(fields)?,
            }))
        }
        _ => Err(ConsoleError::UnknownCommand),
    }
}

/// Land-side end of the link.
///
/// As a [`PacketListener`] it buffers the measurements and counts the
/// acknowledgements that arrive from the submarine; console lines are parsed
/// and sent through its sink.
#[derive(Debug)]
pub struct LandRelay<S> {
    sink: S,
    measurements: Deque<f32, MEASURE_BUFFER_LEN>,
    acks: u16,
    /// Measurements lost because the buffer was full.
    pub overwritten: u32,
}

impl<S: ByteSink> LandRelay<S> {
    /// Creates a relay sending through `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            measurements: Deque::new(),
            acks: 0,
            overwritten: 0,
        }
    }

    /// The outbound sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Buffered measurements.
    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    /// Drops all buffered measurements.
    pub fn clear_measurements(&mut self) {
        info!("land relay: clearing {} measurements", self.measurements.len());
        self.measurements.clear();
    }

    /// Acknowledgements not yet reported to the operator.
    pub fn pending_acks(&self) -> u16 {
        self.acks
    }

    /// Handles one console line, writing any requested output to `out`.
    pub fn handle_line<W: fmt::Write>(
        &mut self,
        line: &str,
        out: &mut W,
    ) -> Result<(), ConsoleError> {
        let command = parse_command(line)?;
        match command.packet() {
            None => self
                .write_measurements(out)
                .map_err(|_| ConsoleError::Output),
            Some(packet) => {
                debug!("land relay: sending {:?}", packet.class());
                if self.sink.send_packet(&packet) {
                    Ok(())
                } else {
                    Err(ConsoleError::Dropped)
                }
            }
        }
    }

    /// Writes and clears the buffered measurements.
    ///
    /// A reading leaves the buffer only once its line was written, so a failed
    /// write keeps it for the next call.
    pub fn write_measurements<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        while let Some(value) = self.measurements.front().copied() {
            writeln!(out, "SENS,TEMP,{:.2}", value)?;
            let _ = self.measurements.pop_front();
        }
        Ok(())
    }

    /// Reports every acknowledgement received since the last call.
    pub fn write_acks<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        while self.acks > 0 {
            out.write_str("INST,ACK\n")?;
            self.acks -= 1;
        }
        Ok(())
    }
}

impl<S> PacketListener for LandRelay<S> {
    fn received_inst(&mut self, inst: Instruction) {
        if inst.kind == InstKind::Ack {
            self.acks = self.acks.saturating_add(1);
        }
    }

    fn received_update(&mut self, _update: Update) {}

    fn received_sens(&mut self, sensor: Sensor) {
        if sensor.kind != SensKind::Temp {
            return;
        }
        if self.measurements.is_full() {
            let _ = self.measurements.pop_front();
            self.overwritten = self.overwritten.wrapping_add(1);
        }
        let _ = self.measurements.push_back(sensor.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;
    use std::vec;
    use std::vec::Vec;

    #[derive(Default, Debug)]
    struct FrameLog {
        frames: Vec<Vec<u8>>,
    }

    impl ByteSink for FrameLog {
        fn send_bytes(&mut self, bytes: &[u8]) -> bool {
            self.frames.push(bytes.to_vec());
            true
        }
    }

    #[test]
    fn test_parse_new_pos() {
        assert_eq!(
            parse_command("INST,NEW_POS,X=0.50,Y=1.00,Z=0.20"),
            Ok(Command::Inst(Instruction::new_pos(127, 255, 51)))
        );
    }

    #[test]
    fn test_parse_update_clamps_coordinates() {
        assert_eq!(
            parse_command("UPDATE,CURR,X=1.70,Y=-0.5,Z=0"),
            Ok(Command::Update(Update::curr(255, 0, 0)))
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_command(" TRANSMIT\r\n"), Ok(Command::Transmit));
        assert_eq!(
            parse_command("\u{8}ARRIVED"),
            Ok(Command::Inst(Instruction::new(InstKind::Arrived)))
        );
        assert_eq!(
            parse_command("INST,STOP"),
            Ok(Command::Inst(Instruction::new(InstKind::Stop)))
        );
        assert_eq!(parse_command("ACK"), Ok(Command::Inst(Instruction::ack())));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("   "), Err(ConsoleError::Empty));
        assert_eq!(parse_command("HELLO"), Err(ConsoleError::UnknownCommand));
        assert_eq!(parse_command("INST,JUMP"), Err(ConsoleError::UnknownInstruction));
        assert_eq!(parse_command("UPDATE,NEXT"), Err(ConsoleError::UnknownUpdate));
        assert_eq!(
            parse_command("INST,NEW_POS,X=abc"),
            Err(ConsoleError::InvalidCoordinate(0))
        );
        assert_eq!(
            parse_command("INST,NEW_POS,X=0,Y=0,Z=0,W=0"),
            Err(ConsoleError::TooManyCoordinates)
        );
    }

    #[test]
    fn test_relay_sends_commands() {
        let mut relay = LandRelay::new(FrameLog::default());
        let mut out: String<64> = String::new();
        assert_eq!(
            relay.handle_line("INST,NEW_POS,X=1.00,Y=0.00,Z=1.00", &mut out),
            Ok(())
        );
        assert_eq!(relay.handle_line("STOP", &mut out), Ok(()));
        assert_eq!(
            relay.sink().frames,
            [vec![0b01_001_011, 255, 0, 255], vec![0b01_100_000]]
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_relay_reports_telemetry() {
        let mut relay = LandRelay::new(FrameLog::default());
        relay.received_sens(Sensor {
            kind: SensKind::Temp,
            value: 30.5,
        });
        relay.received_sens(Sensor {
            kind: SensKind::Temp,
            value: 21.25,
        });
        relay.received_inst(Instruction::ack());
        relay.received_inst(Instruction::new(InstKind::Arrived));
        assert_eq!(relay.measurement_count(), 2);
        assert_eq!(relay.pending_acks(), 1);

        let mut out: String<128> = String::new();
        relay.write_acks(&mut out).unwrap();
        assert_eq!(relay.handle_line("TRANSMIT", &mut out), Ok(()));
        assert_eq!(out.as_str(), "INST,ACK\nSENS,TEMP,30.50\nSENS,TEMP,21.25\n");
        assert_eq!(relay.measurement_count(), 0);
        assert_eq!(relay.pending_acks(), 0);
        assert!(relay.sink().frames.is_empty());
    }

    #[test]
    fn test_failed_output_keeps_unwritten_measurements() {
        let mut relay = LandRelay::new(FrameLog::default());
        for value in [30.5, 21.25] {
            relay.received_sens(Sensor {
                kind: SensKind::Temp,
                value,
            });
        }

        let mut short: String<20> = String::new();
        assert_eq!(
            relay.handle_line("TRANSMIT", &mut short),
            Err(ConsoleError::Output)
        );
        assert_eq!(short.as_str(), "SENS,TEMP,30.50\n");
        assert_eq!(relay.measurement_count(), 1);

        let mut out: String<64> = String::new();
        assert_eq!(relay.handle_line("TRANSMIT", &mut out), Ok(()));
        assert_eq!(out.as_str(), "SENS,TEMP,21.25\n");
        assert_eq!(relay.measurement_count(), 0);
    }

    #[test]
    fn test_relay_keeps_latest_measurements() {
        let mut relay = LandRelay::new(FrameLog::default());
        for i in 0..MEASURE_BUFFER_LEN + 3 {
            relay.received_sens(Sensor {
                kind: SensKind::Temp,
                value: i as f32,
            });
        }
        assert_eq!(relay.measurement_count(), MEASURE_BUFFER_LEN);
        assert_eq!(relay.overwritten, 3);

        let mut out: String<1024> = String::new();
        relay.write_measurements(&mut out).unwrap();
        assert!(out.starts_with("SENS,TEMP,3.00\n"));
    }
}
