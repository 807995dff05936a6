//! Channel driver core for multi-line telephony hardware.
//!
//! The hardware SDK delivers asynchronous events per `(device, channel)`
//! and accepts synchronous commands; the host call-processing runtime
//! owns sessions and asks for calls, answers and hangups. This crate
//! sits between the two: per-device event and command workers serialize
//! everything that happens on a board, and each channel runs a call
//! state machine specialized by its line signaling (analog trunk,
//! analog station, ISDN, R2/MFC per country, GSM).
//!
//! Entry points: [`Driver::start`] builds the boards; the SDK callback
//! feeds [`Driver::on_hardware_event`]; the host posts [`AppCommand`]s
//! and calls the blocking channel operations (DTMF, fax, SMS) directly.

pub mod board;
pub mod bridge;
pub mod call;
pub mod cause;
pub mod channel;
pub mod config;
pub mod errors;
pub mod host;
pub mod hw;
pub mod transfer;

pub use board::{Board, CommandEnvelope, Driver, EventEnvelope};
pub use channel::{AppCommand, ChanTimer, Channel, ChannelState, CleanupKind};
pub use errors::{Error, Result};
