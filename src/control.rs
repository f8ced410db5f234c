//! Submarine mission controller.
//!
//! [`SubControl`] receives packets as a [`PacketListener`], queues them, and
//! works through them one per [`poll()`](SubControl::poll), commanding the
//! travel subsystem, reading the temperature sensor and acknowledging the land
//! station through a [`ByteSink`].
//!
//! ```text
//!            activate()
//!   Idle ──────────────► Inst ◄─────────────────────────┐
//!                         │ NEW_POS / ACK               │ ACK, STOP
//!                         ▼                             │ (or retries exhausted)
//!                       Travel ── ARRIVED / ACK ──► Sens ──► WaitAck
//!                         │                          ▲        │
//!                         └── STOP / ACK ──► Inst    └────────┘ other instruction
//! ```
//!
//! Instructions and updates are processed in arrival order across both queues.
//! A `STOP` supersedes everything still queued: it empties both queues on
//! arrival and is then handled alone. Both queues are also emptied every time
//! the controller returns to [`Inst`](SubControlState::Inst).

use heapless::Deque;

use crate::consts::{INST_QUEUE_LEN, MAX_SENSOR_RETRIES, UPDATE_QUEUE_LEN};
use crate::framer::PacketListener;
use crate::link::ByteSink;
use crate::packet::{InstKind, Instruction, Position, SensKind, Sensor, Update, UpdateKind};
use crate::runtime::Task;

/// Travel subsystem (motors, steering, position control).
pub trait TravelControl {
    /// Starts travelling towards `dest`.
    fn new_dest(&mut self, dest: Position);

    /// Reports the position the operator measured.
    fn update_cur_pos(&mut self, pos: Position);

    /// Stops all motion.
    fn stop(&mut self);
}

/// Temperature sensor.
pub trait ThermoSensor {
    /// Reads the water temperature in degrees Celsius.
    fn temperature(&mut self) -> f32;
}

/// Mission phase of the [`SubControl`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SubControlState {
    /// Suspended.
    #[default]
    Idle,
    /// Waiting for an instruction.
    Inst,
    /// Travelling to a destination.
    Travel,
    /// Taking and sending a measurement.
    Sens,
    /// Waiting for the measurement to be acknowledged.
    WaitAck,
}

/// Controller configuration.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ControlConfig {
    /// Only accept a destination once a position update arrived since entering `Inst`.
    pub strict_travel: bool,
    /// Measurement re-sends in `WaitAck` before the mission is abandoned.
    pub max_sensor_retries: u8,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            strict_travel: false,
            max_sensor_retries: MAX_SENSOR_RETRIES,
        }
    }
}

#[derive(Clone, Debug)]
struct Stamped<T> {
    seq: u16,
    item: T,
}

/// Whether sequence number `a` was issued before `b`.
fn older(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) < 0
}

/// The submarine's mission state machine.
#[derive(Debug)]
pub struct SubControl<T, S, M> {
    travel: T,
    sink: S,
    sensor: M,
    config: ControlConfig,
    state: SubControlState,
    instructions: Deque<Stamped<Instruction>, INST_QUEUE_LEN>,
    updates: Deque<Stamped<Update>, UPDATE_QUEUE_LEN>,
    seq: u16,
    update_seen: bool,
    retries: u8,
    /// Packets dropped because their queue was full.
    pub dropped: u32,
}

impl<T: TravelControl, S: ByteSink, M: ThermoSensor> SubControl<T, S, M> {
    /// Creates an idle controller.
    pub fn new(travel: T, sink: S, sensor: M, config: ControlConfig) -> Self {
        Self {
            travel,
            sink,
            sensor,
            config,
            state: SubControlState::Idle,
            instructions: Deque::new(),
            updates: Deque::new(),
            seq: 0,
            update_seen: false,
            retries: 0,
            dropped: 0,
        }
    }

    /// Current mission phase.
    pub fn state(&self) -> SubControlState {
        self.state
    }

    /// The configuration.
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// The travel subsystem.
    pub fn travel(&self) -> &T {
        &self.travel
    }

    /// The outbound sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the outbound sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Instructions waiting to be handled.
    pub fn pending_instructions(&self) -> usize {
        self.instructions.len()
    }

    /// Updates waiting to be handled.
    pub fn pending_updates(&self) -> usize {
        self.updates.len()
    }

    /// Measurement re-sends since the last one was sent fresh.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Starts the mission loop with empty queues.
    pub fn activate(&mut self) {
        self.reset_queues();
        self.retries = 0;
        self.transition(SubControlState::Inst);
    }

    /// Suspends the controller.
    pub fn deactivate(&mut self) {
        self.transition(SubControlState::Idle);
    }

    /// Runs one iteration of the mission loop.
    pub fn poll(&mut self) {
        match self.state {
            SubControlState::Idle => {}
            SubControlState::Inst => self.on_inst(),
            SubControlState::Travel => self.on_travel(),
            SubControlState::Sens => self.on_sens(),
            SubControlState::WaitAck => self.on_wait_ack(),
        }
    }

    fn transition(&mut self, next: SubControlState) {
        if next != self.state {
            debug!("sub control: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    fn reset_queues(&mut self) {
        self.instructions.clear();
        self.updates.clear();
        self.update_seen = false;
    }

    fn send_ack(&mut self) {
        if !self.sink.send_packet(&Instruction::ack().into()) {
            warn!("sub control: ACK dropped");
        }
    }

    fn discard_updates_before(&mut self, seq: u16) {
        while self.updates.front().is_some_and(|u| older(u.seq, seq)) {
            let _ = self.updates.pop_front();
        }
    }

    fn on_inst(&mut self) {
        // Updates are only consumed while travelling; whatever arrived before
        // the next instruction is stale.
        let Some(Stamped { seq, item: inst }) = self.instructions.pop_front() else {
            self.updates.clear();
            return;
        };
        self.discard_updates_before(seq);
        match inst.kind {
            InstKind::Stop => {
                self.send_ack();
                self.reset_queues();
            }
            InstKind::NewPos => {
                if self.config.strict_travel && !self.update_seen {
                    debug!("sub control: no position update yet, destination ignored");
                    return;
                }
                self.travel.new_dest(inst.position());
                self.send_ack();
                self.transition(SubControlState::Travel);
            }
            _kind => trace!("sub control: {:?} ignored in Inst", _kind),
        }
    }

    fn on_travel(&mut self) {
        let update_first = match (self.updates.front(), self.instructions.front()) {
            (None, None) => return,
            (Some(update), Some(inst)) => older(update.seq, inst.seq),
            (Some(_), None) => true,
            (None, Some(_)) => false,
        };

        if update_first {
            if let Some(Stamped { item: update, .. }) = self.updates.pop_front() {
                if update.kind == UpdateKind::Curr {
                    self.travel.update_cur_pos(update.position());
                }
            }
            return;
        }

        let Some(Stamped { item: inst, .. }) = self.instructions.pop_front() else {
            return;
        };
        match inst.kind {
            // Already under way; the new destination is acknowledged only.
            InstKind::NewPos => self.send_ack(),
            InstKind::Stop => {
                self.travel.stop();
                self.send_ack();
                self.reset_queues();
                self.transition(SubControlState::Inst);
            }
            InstKind::Arrived => {
                self.travel.stop();
                self.send_ack();
                self.transition(SubControlState::Sens);
            }
            _kind => trace!("sub control: {:?} ignored in Travel", _kind),
        }
    }

    fn on_sens(&mut self) {
        let sensor = Sensor {
            kind: SensKind::Temp,
            value: self.sensor.temperature(),
        };
        if self.sink.send_packet(&sensor.into()) {
            info!("sub control: sent temperature {}", sensor.value);
        } else {
            warn!("sub control: measurement dropped");
        }
        self.transition(SubControlState::WaitAck);
    }

    fn finish_mission(&mut self) {
        self.reset_queues();
        self.retries = 0;
        self.transition(SubControlState::Inst);
    }

    fn on_wait_ack(&mut self) {
        let Some(Stamped { item: inst, .. }) = self.instructions.pop_front() else {
            return;
        };
        match inst.kind {
            InstKind::Ack => self.finish_mission(),
            InstKind::Stop => {
                self.send_ack();
                self.finish_mission();
            }
            InstKind::Arrived => self.send_ack(),
            _ => {
                if self.retries >= self.config.max_sensor_retries {
                    error!(
                        "sub control: measurement unacknowledged after {} retries, mission abandoned",
                        self.retries
                    );
                    self.finish_mission();
                } else {
                    self.retries += 1;
                    self.transition(SubControlState::Sens);
                }
            }
        }
    }
}

impl<T, S, M> SubControl<T, S, M> {
    fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }
}

impl<T, S, M> PacketListener for SubControl<T, S, M> {
    fn received_inst(&mut self, inst: Instruction) {
        let seq = self.next_seq();
        if inst.kind == InstKind::Stop {
            self.instructions.clear();
            self.updates.clear();
        }
        if self.instructions.push_back(Stamped { seq, item: inst }).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("sub control: instruction queue full");
        }
    }

    fn received_update(&mut self, update: Update) {
        let seq = self.next_seq();
        if update.kind == UpdateKind::Curr {
            self.update_seen = true;
        }
        // Outside Travel nothing consumes updates, so the newest ones are kept.
        if self.state != SubControlState::Travel && self.updates.is_full() {
            let _ = self.updates.pop_front();
        }
        if self.updates.push_back(Stamped { seq, item: update }).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("sub control: update queue full");
        }
    }

    fn received_sens(&mut self, _sensor: Sensor) {
        trace!("sub control: sensor packet ignored");
    }
}

impl<T: TravelControl, S: ByteSink, M: ThermoSensor> Task for SubControl<T, S, M> {
    fn step(&mut self) {
        self.poll();
    }
}
