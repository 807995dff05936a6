//! Per-call mutable state.
//!
//! Instead of one bag of boolean flags, the call is a composition of
//! small orthogonal machines: the lifecycle proper, the locally played
//! indication, audio-processing overrides, DTMF transmission state, and
//! a variant payload for whatever the line signaling needs to remember.
//! `clear()` returns everything to defaults; the variant identity itself
//! is fixed for the channel's lifetime.

use std::time::{Duration, Instant};

use trunkline_infra_common::timer::TimerIndex;

use crate::cause::r2::R2Country;
use crate::cause::Cause;
use crate::host::SmsIn;
use crate::transfer::{TransferMode, TransferState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// The call lifecycle proper. `Connected` is signaling-level connection;
/// `Established` means media is confirmed flowing both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Dialing(Direction),
    Connected(Direction),
    Established(Direction),
}

impl Lifecycle {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Lifecycle::Idle => None,
            Lifecycle::Dialing(d) | Lifecycle::Connected(d) | Lifecycle::Established(d) => {
                Some(*d)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Lifecycle::Idle)
    }

    pub fn is_dialing(&self) -> bool {
        matches!(self, Lifecycle::Dialing(_))
    }

    /// Connected or better.
    pub fn is_connected(&self) -> bool {
        matches!(self, Lifecycle::Connected(_) | Lifecycle::Established(_))
    }

    pub fn is_established(&self) -> bool {
        matches!(self, Lifecycle::Established(_))
    }
}

/// Indication currently played towards the near end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indication {
    #[default]
    None,
    Ring,
    Busy,
    FastBusy,
}

/// A three-valued override: unset means "leave the hardware default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unset,
    On,
    Off,
}

impl TriState {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TriState::Unset => None,
            TriState::On => Some(true),
            TriState::Off => Some(false),
        }
    }
}

/// Audio-processing overrides active for this call. Cleared (and the
/// hardware returned to configured defaults) on hard cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioControls {
    pub dtmf_suppression: TriState,
    pub echo_cancel: TriState,
    pub auto_gain: TriState,
    pub input_volume: Option<i32>,
    pub output_volume: Option<i32>,
}

impl AudioControls {
    pub fn any_volume_override(&self) -> bool {
        self.input_volume.is_some() || self.output_volume.is_some()
    }
}

/// Outbound DTMF transmission: the hardware dials one string at a time,
/// extra digits queue until `DtmfSendFinish`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DtmfSending {
    #[default]
    Idle,
    Sending {
        queued: String,
    },
}

/// Ring-generation timers for station lines (physical ring) and trunk
/// lines (delayed local ringback). Armed iff the index is valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingGen {
    pub pbx: TimerIndex,
    pub co: TimerIndex,
}

impl RingGen {
    pub fn clear(&mut self) {
        self.pbx.reset();
        self.co.reset();
    }
}

/// R2 incoming number collection progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberDial {
    #[default]
    Idle,
    Ongoing,
    Finished,
}

/// ISDN user-to-user information element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserToUser {
    pub descriptor: i64,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxoCall {
    pub transfer: TransferState,
    /// Pole-reversal answer supervision seen on this call.
    pub reversal_seen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxsCall {
    pub transfer: TransferState,
    /// Digits collected from the station while dialing.
    pub digits: String,
    pub dial_timer: TimerIndex,
    /// Station is off-hook.
    pub offhook: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsdnCall {
    pub transfer: TransferState,
    /// Raw Q.931 cause from the last disconnect, surfaced to scripting.
    pub isdn_cause: Option<i32>,
    pub uui: Option<UserToUser>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct R2Call {
    pub country: R2Country,
    /// Caller category received in group-A signaling.
    pub category: Option<i32>,
    /// Group-B condition sent on answer.
    pub condition: Option<i32>,
    /// Digits collected before end-of-number.
    pub incoming_exten: String,
    pub number_dial: NumberDial,
    pub dial_timer: TimerIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GsmCall {
    /// Inbound SMS being assembled from info/data events.
    pub sms_in: SmsIn,
    pub sms_in_progress: bool,
}

/// Variant payload, fixed per channel by the line signaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallVariant {
    Fxo(FxoCall),
    Fxs(FxsCall),
    Isdn(IsdnCall),
    R2(R2Call),
    Gsm(GsmCall),
}

impl CallVariant {
    pub fn fxo(trigger: &str) -> Self {
        CallVariant::Fxo(FxoCall {
            transfer: TransferState::new(TransferMode::Flash, trigger),
            reversal_seen: false,
        })
    }

    pub fn fxs(trigger: &str) -> Self {
        CallVariant::Fxs(FxsCall {
            transfer: TransferState::new(TransferMode::Flash, trigger),
            digits: String::new(),
            dial_timer: TimerIndex::INVALID,
            offhook: false,
        })
    }

    pub fn isdn(trigger: &str) -> Self {
        CallVariant::Isdn(IsdnCall {
            transfer: TransferState::new(TransferMode::SsTransfer, trigger),
            isdn_cause: None,
            uui: None,
        })
    }

    pub fn r2(country: R2Country) -> Self {
        CallVariant::R2(R2Call {
            country,
            category: None,
            condition: None,
            incoming_exten: String::new(),
            number_dial: NumberDial::Idle,
            dial_timer: TimerIndex::INVALID,
        })
    }

    pub fn gsm() -> Self {
        CallVariant::Gsm(GsmCall::default())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CallVariant::Fxo(_) => "fxo",
            CallVariant::Fxs(_) => "fxs",
            CallVariant::Isdn(_) => "isdn",
            CallVariant::R2(_) => "r2",
            CallVariant::Gsm(_) => "gsm",
        }
    }

    /// Reset per-call fields, keeping the variant identity and its
    /// static configuration (trigger digits, R2 country).
    pub fn clear(&mut self) {
        match self {
            CallVariant::Fxo(v) => {
                v.transfer.clear();
                v.reversal_seen = false;
            }
            CallVariant::Fxs(v) => {
                v.transfer.clear();
                v.digits.clear();
                v.dial_timer.reset();
                // offhook tracks the physical hook, not the call
            }
            CallVariant::Isdn(v) => {
                v.transfer.clear();
                v.isdn_cause = None;
                v.uui = None;
            }
            CallVariant::R2(v) => {
                v.category = None;
                v.condition = None;
                v.incoming_exten.clear();
                v.number_dial = NumberDial::Idle;
                v.dial_timer.reset();
            }
            CallVariant::Gsm(v) => {
                v.sms_in = SmsIn::default();
                v.sms_in_progress = false;
            }
        }
    }

    pub fn transfer_mut(&mut self) -> Option<&mut TransferState> {
        match self {
            CallVariant::Fxo(v) => Some(&mut v.transfer),
            CallVariant::Fxs(v) => Some(&mut v.transfer),
            CallVariant::Isdn(v) => Some(&mut v.transfer),
            CallVariant::R2(_) | CallVariant::Gsm(_) => None,
        }
    }
}

/// The per-call state a channel owns, replaced wholesale only at driver
/// initialization and reset in place between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub lifecycle: Lifecycle,
    /// A call-fail was reported for the current leg; trunk lines stay
    /// seized between legs and need this latch.
    pub call_fail: bool,
    pub indication: Indication,
    /// Name of the cadence currently playing, if any.
    pub cadence: Option<String>,
    pub ring_gen: RingGen,
    pub audio: AudioControls,
    pub dtmf_sending: DtmfSending,
    /// Collect call recognized on this leg.
    pub collect_call: bool,
    /// Resolved drop policy for collect calls.
    pub drop_collect: bool,
    /// Out-of-band DTMF delivery is active (hardware suppression on).
    pub out_of_band_dtmfs: bool,
    /// Host asked for early answer on the outgoing leg.
    pub pre_answer: bool,
    /// Progress already signaled upward for this leg.
    pub progress_sent: bool,
    pub fax_sending: bool,
    pub fax_receiving: bool,
    pub orig_addr: String,
    pub dest_addr: String,
    pub incoming_context: String,
    /// First cause recorded wins; later attempts are ignored.
    pub hangup_cause: Option<Cause>,
    /// Early audio path was opened towards the caller.
    pub pre_audio_sent: bool,
    /// The host asked us to tear down as soon as signaling allows.
    pub cleanup_upon_hangup: bool,
    /// Audio stream/listen paths currently up.
    pub stream_up: bool,
    pub listen_up: bool,
    pub variant: CallVariant,
}

impl Call {
    pub fn new(variant: CallVariant) -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            call_fail: false,
            indication: Indication::None,
            cadence: None,
            ring_gen: RingGen::default(),
            audio: AudioControls::default(),
            dtmf_sending: DtmfSending::Idle,
            collect_call: false,
            drop_collect: false,
            out_of_band_dtmfs: false,
            pre_answer: false,
            progress_sent: false,
            fax_sending: false,
            fax_receiving: false,
            orig_addr: String::new(),
            dest_addr: String::new(),
            incoming_context: String::new(),
            hangup_cause: None,
            pre_audio_sent: false,
            cleanup_upon_hangup: false,
            stream_up: false,
            listen_up: false,
            variant,
        }
    }

    /// Record a hangup cause; the first one recorded wins.
    pub fn set_hangup_cause(&mut self, cause: Cause) -> bool {
        if self.hangup_cause.is_none() {
            self.hangup_cause = Some(cause);
            true
        } else {
            false
        }
    }

    /// Reset to defaults between calls. Variant identity survives.
    pub fn clear(&mut self) {
        self.lifecycle = Lifecycle::Idle;
        self.call_fail = false;
        self.indication = Indication::None;
        self.cadence = None;
        self.ring_gen.clear();
        self.audio = AudioControls::default();
        self.dtmf_sending = DtmfSending::Idle;
        self.collect_call = false;
        self.drop_collect = false;
        self.out_of_band_dtmfs = false;
        self.pre_answer = false;
        self.progress_sent = false;
        self.fax_sending = false;
        self.fax_receiving = false;
        self.orig_addr.clear();
        self.dest_addr.clear();
        self.incoming_context.clear();
        self.hangup_cause = None;
        self.pre_audio_sent = false;
        self.cleanup_upon_hangup = false;
        self.stream_up = false;
        self.listen_up = false;
        self.variant.clear();
    }
}

/// Channel-lifetime counters, surviving call resets.
#[derive(Debug, Clone)]
pub struct CallStatistics {
    pub calls_incoming: u64,
    pub calls_outgoing: u64,
    pub channel_fails: u64,
    pub time_incoming: Duration,
    pub time_outgoing: Duration,
    connected_at: Option<(Instant, Direction)>,
    idle_since: Instant,
    pub time_idle: Duration,
}

impl CallStatistics {
    pub fn new() -> Self {
        Self {
            calls_incoming: 0,
            calls_outgoing: 0,
            channel_fails: 0,
            time_incoming: Duration::ZERO,
            time_outgoing: Duration::ZERO,
            connected_at: None,
            idle_since: Instant::now(),
            time_idle: Duration::ZERO,
        }
    }

    pub fn on_call_start(&mut self, direction: Direction) {
        match direction {
            Direction::Incoming => self.calls_incoming += 1,
            Direction::Outgoing => self.calls_outgoing += 1,
        }
        self.time_idle += self.idle_since.elapsed();
    }

    pub fn on_connect(&mut self, direction: Direction) {
        if self.connected_at.is_none() {
            self.connected_at = Some((Instant::now(), direction));
        }
    }

    pub fn on_call_end(&mut self) {
        if let Some((start, direction)) = self.connected_at.take() {
            match direction {
                Direction::Incoming => self.time_incoming += start.elapsed(),
                Direction::Outgoing => self.time_outgoing += start.elapsed(),
            }
        }
        self.idle_since = Instant::now();
    }

    pub fn on_channel_fail(&mut self) {
        self.channel_fails += 1;
    }
}

impl Default for CallStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_predicates() {
        assert!(Lifecycle::Idle.is_idle());
        assert!(Lifecycle::Dialing(Direction::Incoming).is_dialing());
        assert!(Lifecycle::Connected(Direction::Outgoing).is_connected());
        assert!(Lifecycle::Established(Direction::Outgoing).is_connected());
        assert_eq!(
            Lifecycle::Established(Direction::Incoming).direction(),
            Some(Direction::Incoming)
        );
        assert_eq!(Lifecycle::Idle.direction(), None);
    }

    #[test]
    fn first_hangup_cause_wins() {
        let mut call = Call::new(CallVariant::gsm());
        assert!(call.set_hangup_cause(Cause::UserBusy));
        assert!(!call.set_hangup_cause(Cause::NormalClearing));
        assert_eq!(call.hangup_cause, Some(Cause::UserBusy));
    }

    #[test]
    fn clear_keeps_variant_configuration() {
        let mut call = Call::new(CallVariant::r2(R2Country::Mexico));
        call.lifecycle = Lifecycle::Dialing(Direction::Incoming);
        if let CallVariant::R2(r2) = &mut call.variant {
            r2.incoming_exten.push_str("123");
            r2.number_dial = NumberDial::Ongoing;
        }
        call.clear();
        assert!(call.lifecycle.is_idle());
        match &call.variant {
            CallVariant::R2(r2) => {
                assert_eq!(r2.country, R2Country::Mexico);
                assert!(r2.incoming_exten.is_empty());
                assert_eq!(r2.number_dial, NumberDial::Idle);
            }
            other => panic!("variant changed: {:?}", other.kind()),
        }
    }

    #[test]
    fn statistics_accumulate_talk_time() {
        let mut stats = CallStatistics::new();
        stats.on_call_start(Direction::Outgoing);
        stats.on_connect(Direction::Outgoing);
        std::thread::sleep(Duration::from_millis(10));
        stats.on_call_end();
        assert_eq!(stats.calls_outgoing, 1);
        assert!(stats.time_outgoing >= Duration::from_millis(10));
        // ending again is harmless
        stats.on_call_end();
    }
}
