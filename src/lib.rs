//! # sublink
//!
//! A portable, no_std Rust implementation of the telemetry and remote-control
//! link between a small submarine and its land station.
//!
//! Both ends are built from the same pieces:
//! - `embedded-hal` traits for digital I/O and timing
//! - software line-code decoders fed with signal and pause durations
//! - a one-byte packet header carrying class, sub-type and payload length
//! - lock-free `heapless` queues between interrupt context and the main loop
//! - optional scheduling through either a blocking delay loop or `critical-section` cells
//!
//! ## Crate features
//! | Feature         | Description |
//! |-----------------|-------------|
//! | `std`           | Disables `#![no_std]` |
//! | `delay-loop`    | Enables [`runtime::run_task_loop`] over `embedded_hal::delay::DelayNs` |
//! | `isr` (default) | Enables [`runtime::Shared`], backed by `critical_section::Mutex` |
//! | `defmt-0-3`     | Uses `defmt` logging and derives `defmt::Format` on public types |
//! | `log`           | Uses `log` logging |
//!
//! ## Data path
//!
//! ```text
//!  pin ──► EdgeSampler ──► UnitDecoder / PulseDecoder ──► FramerInput ══► MessageFramer ──► listener
//!  radio ─► RadioLink ────────────────────────────────────┘
//!
//!  listener ──► Outbox ══► TimingSender / PulseSender / RadioLink ──► pin or radio
//! ```
//!
//! `══►` marks an SPSC queue: the left side may run in an interrupt handler,
//! the right side runs in the main loop.
//!
//! ## Usage
//!
//! ```rust
//! use sublink::decoder::{EdgeListener, Tolerance, UnitDecoder};
//! use sublink::framer::{FramerQueues, MessageFramer, PacketListener};
//! use sublink::packet::Instruction;
//!
//! #[derive(Default)]
//! struct Print(Option<Instruction>);
//!
//! impl PacketListener for Print {
//!     fn received_inst(&mut self, inst: Instruction) {
//!         self.0 = Some(inst);
//!     }
//!     fn received_update(&mut self, _: sublink::packet::Update) {}
//!     fn received_sens(&mut self, _: sublink::packet::Sensor) {}
//! }
//!
//! let mut queues = FramerQueues::new();
//! let (input, rx) = queues.split();
//! let mut decoder = UnitDecoder::new(30, Tolerance::default());
//! decoder.set_listener(input);
//!
//! // STOP: header 0b01_100_000, sent MSB first; the last bit ends the message.
//! let bits = [0, 1, 1, 0, 0, 0, 0, 0];
//! for (i, bit) in bits.iter().enumerate() {
//!     decoder.signal_detected(if *bit == 1 { 33_333 } else { 16_666 });
//!     decoder.pause_detected(if i == bits.len() - 1 { 5 * 33_333 } else { 16_666 });
//! }
//!
//! let mut framer = MessageFramer::new(rx);
//! framer.set_listener(Print::default());
//! framer.activate();
//! assert!(framer.poll());
//! let stop = framer.listener().and_then(|p| p.0.as_ref()).map(|inst| inst.kind);
//! assert_eq!(stop, Some(sublink::packet::InstKind::Stop));
//! ```
//!
//! ## Integration Notes
//!
//! - Unit-coded infrared runs at 30 bit/s by default; sample the receiver at least
//!   every millisecond
//! - Pulse-width coded infrared needs edges resolved to about 50 µs
//! - Both firmware images must agree on [`consts`]; they are the wire contract

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod logging;

#[cfg(feature = "isr")]
pub use critical_section;
pub use heapless;

pub mod consts;
pub mod console;
pub mod control;
pub mod decoder;
pub mod framer;
pub mod header;
pub mod link;
pub mod packet;
pub mod runtime;
pub mod sampler;
