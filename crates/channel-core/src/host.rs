//! Boundary with the host call-processing runtime.
//!
//! The host owns session lifetime; a channel only holds the id of the
//! session currently bound to it. Everything a call surfaces upward
//! (answer, hangup cause, per-call variables, inbound DTMF and SMS) goes
//! through [`SessionSink`].

use std::fmt;

use thiserror::Error;

use crate::cause::Cause;
use crate::hw::{ChannelIndex, DeviceId};

/// Opaque handle to a host-owned session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// The host could not provide a session for an incoming call.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no session available")]
pub struct AllocFailure;

/// Answer-info classification surfaced to the host scripting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerInfo {
    MessageBox,
    HumanAnswer,
    AnsweringMachine,
    CarrierMessage,
    Fax,
    Unknown,
}

impl AnswerInfo {
    /// Decode the hardware's answer-info classification payload.
    pub fn from_code(code: i32) -> AnswerInfo {
        match code {
            1 => AnswerInfo::MessageBox,
            2 => AnswerInfo::HumanAnswer,
            3 => AnswerInfo::AnsweringMachine,
            4 => AnswerInfo::CarrierMessage,
            5 => AnswerInfo::Fax,
            _ => AnswerInfo::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerInfo::MessageBox => "MessageBox",
            AnswerInfo::HumanAnswer => "HumanAnswer",
            AnswerInfo::AnsweringMachine => "AnsweringMachine",
            AnswerInfo::CarrierMessage => "CarrierMessage",
            AnswerInfo::Fax => "Fax",
            AnswerInfo::Unknown => "Unknown",
        }
    }
}

/// An inbound SMS assembled from hardware events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsIn {
    pub originator: String,
    pub timestamp: String,
    pub body: String,
    /// Delivery confirmation for a previously sent message, rather than
    /// a fresh inbound text.
    pub confirmation: bool,
}

/// Everything the engine needs from the host runtime.
///
/// Implementations must be callable from event workers, command workers
/// and timer callbacks alike.
pub trait SessionSink: Send + Sync {
    /// Request a session for an incoming call. Failure means the call is
    /// refused at signaling level.
    fn allocate(
        &self,
        device: DeviceId,
        channel: ChannelIndex,
        orig: &str,
        dest: &str,
    ) -> Result<SessionId, AllocFailure>;

    /// Incoming leg answered by the application.
    fn answer(&self, session: SessionId);

    /// Outgoing leg answered by the far end.
    fn mark_answered(&self, session: SessionId);

    /// Far end is ringing.
    fn mark_ring_ready(&self, session: SessionId);

    /// Early media path is open.
    fn mark_pre_answered(&self, session: SessionId);

    /// Hang the session up with a cause.
    fn hangup(&self, session: SessionId, cause: Cause);

    /// Deliver an inbound DTMF digit.
    fn queue_dtmf(&self, session: SessionId, digit: char);

    /// Export a per-call variable to the scripting layer.
    fn set_variable(&self, session: SessionId, name: &str, value: &str);

    /// Hangup cause the host recorded for this session, if any. Used to
    /// propagate an application-chosen cause into signaling.
    fn current_cause(&self, session: SessionId) -> Option<Cause>;

    /// Surface an inbound SMS (no session involved).
    fn sms_received(&self, device: DeviceId, channel: ChannelIndex, sms: SmsIn);
}
