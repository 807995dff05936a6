//! One hardware channel and its call engine.
//!
//! A [`Channel`] owns the per-call state behind a [`ChanLock`]; event
//! workers, command workers, timer callbacks and blocking application
//! calls all funnel through it. Public entry points acquire the lock
//! (and give up observably under contention); the `on_*`/`do_*` helpers
//! below them take `&mut ChannelState` and assume it is held.
//!
//! Events are offered to the signaling variant first; whatever the
//! variant does not claim falls through to the base handlers in this
//! module, which implement the behavior every signaling shares.

mod fxo;
mod fxs;
mod isdn;
mod r2;

pub(crate) mod e1;
pub(crate) mod gsm;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use trunkline_infra_common::gate::CompletionGate;
use trunkline_infra_common::lock::{ChanLock, ChanLockGuard};
use trunkline_infra_common::timer::{TimerIndex, TimerSet};

use crate::bridge::fax::FaxResult;
use crate::bridge::sms::{SmsEngine, SmsSendOutcome};
use crate::call::{
    Call, CallStatistics, CallVariant, Direction, DtmfSending, Indication, Lifecycle, TriState,
};
use crate::cause::{self, Cause};
use crate::config::{cadence_names, Options};
use crate::errors::{Error, Result};
use crate::host::{AnswerInfo, SessionId, SessionSink};
use crate::hw::{
    ChannelIndex, DeviceId, EventCode, HardwareClient, HardwareCommand, HardwareEvent, MixerTone,
    Signaling, VolumeDir,
};
use crate::transfer::{TimerOp, TransferAction};

/// Per-device timer collection; callbacks hold a weak channel reference
/// so a stopped driver can drop its channels.
pub type ChanTimer = TimerSet<Weak<Channel>>;

/// Application-originated commands, serialized per device by the
/// command worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Answer the incoming call on this channel.
    Answer,
    /// Tear the current call down.
    Hangup,
    /// Place an outgoing call, binding `session` to this channel.
    MakeCall {
        session: SessionId,
        orig: String,
        dest: String,
        pre_answer: bool,
    },
}

/// How much state a cleanup throws away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    /// The call is gone: detach the session, reset everything.
    Hard,
    /// The leg failed but the channel stays seized; keep the call shell
    /// and its fail latch until the hardware frees the channel.
    Soft,
    /// An incoming call was refused before the host ever saw it.
    Fail,
}

/// Everything the channel lock protects.
#[derive(Debug)]
pub struct ChannelState {
    pub call: Call,
    pub session: Option<SessionId>,
    /// Hardware reported a channel fault; the channel is unusable until
    /// the next `ChannelFree`.
    pub has_fail: bool,
    pub stats: CallStatistics,
    /// Assisted-transfer inter-digit timer.
    pub(crate) xfer_timer: TimerIndex,
    /// Delayed disconnect confirmation on trunk lines.
    pub(crate) disc_timer: TimerIndex,
}

pub struct Channel {
    device: DeviceId,
    index: ChannelIndex,
    signaling: Signaling,
    pub(crate) hw: Arc<dyn HardwareClient>,
    pub(crate) host: Arc<dyn SessionSink>,
    pub(crate) options: Arc<Options>,
    pub(crate) timers: Arc<ChanTimer>,
    state: ChanLock<ChannelState>,
    /// Self-reference handed to timer callbacks.
    pub(crate) me: Weak<Channel>,
    pub(crate) fax_gate: CompletionGate<FaxResult>,
    pub(crate) sms_gate: CompletionGate<SmsSendOutcome>,
    /// GSM channels only; populated by the board after construction.
    pub(crate) sms: Mutex<Option<SmsEngine>>,
}

impl Channel {
    pub(crate) fn new(
        device: DeviceId,
        index: ChannelIndex,
        signaling: Signaling,
        variant: CallVariant,
        hw: Arc<dyn HardwareClient>,
        host: Arc<dyn SessionSink>,
        options: Arc<Options>,
        timers: Arc<ChanTimer>,
    ) -> Arc<Channel> {
        Arc::new_cyclic(|me| Channel {
            device,
            index,
            signaling,
            hw,
            host,
            options,
            timers,
            state: ChanLock::new(ChannelState {
                call: Call::new(variant),
                session: None,
                has_fail: false,
                stats: CallStatistics::new(),
                xfer_timer: TimerIndex::INVALID,
                disc_timer: TimerIndex::INVALID,
            }),
            me: me.clone(),
            fax_gate: CompletionGate::new(),
            sms_gate: CompletionGate::new(),
            sms: Mutex::new(None),
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn signaling(&self) -> Signaling {
        self.signaling
    }

    /// Take the channel lock, or fail observably under contention.
    pub(crate) fn lock(&self) -> Result<ChanLockGuard<'_, ChannelState>> {
        Ok(self.state.acquire()?)
    }

    /// Snapshot of the channel-lifetime counters.
    pub fn statistics(&self) -> Result<CallStatistics> {
        Ok(self.lock()?.stats.clone())
    }

    /// Idle, healthy, and (on station lines) on-hook.
    pub fn is_free(&self) -> bool {
        match self.state.acquire_for(Duration::from_millis(100)) {
            Ok(state) => {
                let hook_free = match &state.call.variant {
                    CallVariant::Fxs(v) => !v.offhook,
                    _ => true,
                };
                state.call.lifecycle.is_idle() && !state.has_fail && hook_free
            }
            Err(_) => false,
        }
    }

    // ------------------------------------------------------------------
    // hardware command plumbing

    pub(crate) fn command(&self, command: HardwareCommand) -> Result<()> {
        debug!(device = self.device, channel = self.index,
            command = command.name(), "hardware command");
        self.hw.command(self.device, self.index, command)?;
        Ok(())
    }

    /// Issue a command on a path that must keep going regardless.
    pub(crate) fn try_command(&self, command: HardwareCommand) {
        if let Err(err) = self.command(command) {
            warn!(device = self.device, channel = self.index, %err,
                "command failed, continuing");
        }
    }

    // ------------------------------------------------------------------
    // event dispatch

    /// Entry point for the device event worker. The signaling variant
    /// sees the event first; unclaimed events fall through to the base
    /// handlers.
    pub fn handle_event(self: &Arc<Self>, ev: &HardwareEvent) -> Result<()> {
        debug!(device = self.device, channel = self.index, code = ?ev.code,
            add_info = ev.add_info, "event");

        let handled = match self.signaling {
            Signaling::AnalogTrunk => fxo::handle(self, ev)?,
            Signaling::AnalogStation => fxs::handle(self, ev)?,
            Signaling::Isdn => isdn::handle(self, ev)?,
            Signaling::R2 => r2::handle(self, ev)?,
            Signaling::Gsm => gsm::handle(self, ev)?,
            Signaling::Inactive => {
                debug!(device = self.device, channel = self.index,
                    "event on inactive channel ignored");
                return Ok(());
            }
        };
        if handled {
            return Ok(());
        }

        let mut state = self.lock()?;
        match ev.code {
            EventCode::NewCall => self.on_new_call(&mut state, ev),
            EventCode::CallSuccess => self.on_call_success(&mut state),
            EventCode::CallFail => self.on_call_fail(&mut state, ev),
            EventCode::Connect => self.on_connect(&mut state),
            EventCode::Disconnect => self.on_disconnect(&mut state),
            EventCode::ChannelFree | EventCode::ChannelFail => {
                self.on_channel_release(&mut state, ev)
            }
            EventCode::NoAnswer => self.on_no_answer(&mut state),
            EventCode::AudioStatus => self.on_audio_status(&mut state),
            EventCode::CallAnswerInfo => self.on_call_answer_info(&mut state, ev),
            EventCode::DtmfDetected => self.on_dtmf_detected(&mut state, ev),
            EventCode::DtmfSendFinish => self.on_dtmf_send_finish(&mut state),
            EventCode::CollectCall => self.on_collect_call(&mut state),
            EventCode::SeizureStart => Ok(()),
            EventCode::FaxChannelFree | EventCode::FaxTxResult | EventCode::FaxRxResult => {
                self.on_fax_event(&mut state, ev);
                Ok(())
            }
            _ => self.on_untreated(ev),
        }
    }

    fn on_untreated(&self, ev: &HardwareEvent) -> Result<()> {
        debug!(device = self.device, channel = self.index, code = ?ev.code,
            "no treatment for event");
        Ok(())
    }

    // ------------------------------------------------------------------
    // base event handlers

    pub(crate) fn on_new_call(
        &self,
        state: &mut ChannelState,
        ev: &HardwareEvent,
    ) -> Result<()> {
        if state.has_fail {
            warn!(device = self.device, channel = self.index,
                "incoming call on failed channel refused");
            let fail = self.fail_code_for(state, Cause::NetworkOutOfOrder);
            self.report_fail_to_receive(state, fail);
            return Err(Error::ChannelBusy);
        }
        if !state.call.lifecycle.is_idle() {
            warn!(device = self.device, channel = self.index,
                "incoming call while busy refused");
            return Err(Error::ChannelBusy);
        }

        state.call.orig_addr = ev.param("orig_addr").unwrap_or("").to_string();
        // an empty destination still routes: "s" is the start extension
        state.call.dest_addr = ev.param("dest_addr").unwrap_or("s").to_string();
        state.call.incoming_context = self.options.context.clone();
        state.call.lifecycle = Lifecycle::Dialing(Direction::Incoming);
        state.stats.on_call_start(Direction::Incoming);

        let orig = state.call.orig_addr.clone();
        let dest = state.call.dest_addr.clone();
        match self.host.allocate(self.device, self.index, &orig, &dest) {
            Ok(session) => {
                info!(device = self.device, channel = self.index,
                    %session, orig, dest, "incoming call");
                state.session = Some(session);
                Ok(())
            }
            Err(_) => {
                warn!(device = self.device, channel = self.index,
                    "no session for incoming call, refusing at signaling level");
                state.call.set_hangup_cause(Cause::SwitchCongestion);
                let fail = self.fail_code_for(state, Cause::SwitchCongestion);
                self.report_fail_to_receive(state, fail);
                self.cleanup(state, CleanupKind::Fail);
                Err(Error::NoSessionAvailable)
            }
        }
    }

    pub(crate) fn on_call_success(&self, state: &mut ChannelState) -> Result<()> {
        if let Some(session) = state.session {
            self.host.mark_ring_ready(session);
        }
        Ok(())
    }

    pub(crate) fn on_call_fail(
        &self,
        state: &mut ChannelState,
        ev: &HardwareEvent,
    ) -> Result<()> {
        let cause = self.cause_for(state, ev.add_info);
        info!(device = self.device, channel = self.index,
            fail = ev.add_info, ?cause, "call failed");
        state.call.call_fail = true;
        state.call.set_hangup_cause(cause);
        if let Some(session) = state.session {
            self.host.hangup(session, cause);
        }
        self.cleanup(state, CleanupKind::Soft);
        Ok(())
    }

    pub(crate) fn on_connect(&self, state: &mut ChannelState) -> Result<()> {
        self.setup_connection(state)?;
        Ok(())
    }

    /// Bring the call to established: tear indications down, open the
    /// audio path, and tell the host. Returns false when the call went
    /// away before the connect arrived.
    pub(crate) fn setup_connection(&self, state: &mut ChannelState) -> Result<bool> {
        let Some(direction) = state.call.lifecycle.direction() else {
            warn!(device = self.device, channel = self.index,
                "connect without a call");
            return Ok(false);
        };

        self.cleanup_indications(state, true);
        self.disarm_ring_timers(state);

        let was_connected = state.call.lifecycle.is_connected();
        state.call.lifecycle = Lifecycle::Established(direction);
        state.stats.on_connect(direction);

        self.start_listen(state)?;
        self.start_stream(state)?;

        // out-of-band delivery wants inband digits suppressed from the
        // moment audio is up; a per-call override beats the option
        let suppress = state
            .call
            .audio
            .dtmf_suppression
            .as_bool()
            .unwrap_or(self.options.out_of_band_dtmfs);
        if suppress && !state.call.out_of_band_dtmfs {
            self.try_command(HardwareCommand::DtmfSuppression(true));
            state.call.out_of_band_dtmfs = true;
        }

        if !was_connected {
            if let Some(session) = state.session {
                match direction {
                    Direction::Incoming => self.host.answer(session),
                    Direction::Outgoing => self.host.mark_answered(session),
                }
            }
        }
        Ok(true)
    }

    /// Far-end hangup. Variants layer their own disconnect supervision
    /// on top (delayed confirm on E1); the shared part is reporting the
    /// hangup upward.
    pub(crate) fn on_disconnect(&self, state: &mut ChannelState) -> Result<()> {
        if state.call.lifecycle.is_idle() {
            return Ok(());
        }
        state.call.set_hangup_cause(Cause::NormalClearing);
        let cause = state.call.hangup_cause.unwrap_or(Cause::NormalClearing);
        if let Some(session) = state.session {
            self.host.hangup(session, cause);
        }
        Ok(())
    }

    pub(crate) fn on_channel_release(
        &self,
        state: &mut ChannelState,
        ev: &HardwareEvent,
    ) -> Result<()> {
        if ev.code == EventCode::ChannelFail {
            warn!(device = self.device, channel = self.index,
                fail = ev.add_info, "channel fault");
            state.has_fail = true;
            state.stats.on_channel_fail();
            state.call.set_hangup_cause(Cause::NetworkOutOfOrder);
        } else {
            state.has_fail = false;
            state.call.set_hangup_cause(Cause::NormalClearing);
        }
        self.cleanup(state, CleanupKind::Hard);
        Ok(())
    }

    pub(crate) fn on_no_answer(&self, state: &mut ChannelState) -> Result<()> {
        info!(device = self.device, channel = self.index, "no answer from far end");
        state.call.set_hangup_cause(Cause::NoAnswer);
        if let Some(session) = state.session {
            self.host.hangup(session, Cause::NoAnswer);
        }
        self.cleanup(state, CleanupKind::Soft);
        Ok(())
    }

    /// Audio showed up on the line. Kills the "silent far end" local
    /// ringback and doubles as early-media progress detection.
    pub(crate) fn on_audio_status(&self, state: &mut ChannelState) -> Result<()> {
        if state.call.ring_gen.pbx.is_valid() {
            self.timers.del(state.call.ring_gen.pbx);
            state.call.ring_gen.pbx.reset();
            self.stop_cadence_keeping_vm(state);
        }

        let outgoing = state.call.lifecycle.direction() == Some(Direction::Outgoing);
        if outgoing && !state.call.lifecycle.is_connected() && !state.call.progress_sent {
            state.call.progress_sent = true;
            if let Some(session) = state.session {
                self.host.mark_pre_answered(session);
            }
        }
        Ok(())
    }

    fn on_call_answer_info(&self, state: &mut ChannelState, ev: &HardwareEvent) -> Result<()> {
        let info = AnswerInfo::from_code(ev.add_info);
        debug!(device = self.device, channel = self.index, info = info.as_str(),
            "answer classification");
        if let Some(session) = state.session {
            self.host.set_variable(session, "answer_info", info.as_str());
        }
        Ok(())
    }

    pub(crate) fn on_dtmf_detected(
        &self,
        state: &mut ChannelState,
        ev: &HardwareEvent,
    ) -> Result<()> {
        let Some(digit) = ev.digit() else {
            return Ok(());
        };
        if self.options.ignore_letter_dtmfs && matches!(digit, 'A'..='D' | 'a'..='d') {
            debug!(device = self.device, channel = self.index, %digit,
                "letter digit ignored");
            return Ok(());
        }
        if let Some(session) = state.session {
            if state.call.lifecycle.is_connected() {
                self.host.queue_dtmf(session, digit);
            }
        }
        Ok(())
    }

    pub(crate) fn on_dtmf_send_finish(&self, state: &mut ChannelState) -> Result<()> {
        let queued = match &mut state.call.dtmf_sending {
            DtmfSending::Idle => return Ok(()),
            DtmfSending::Sending { queued } => std::mem::take(queued),
        };
        if queued.is_empty() {
            state.call.dtmf_sending = DtmfSending::Idle;
            return Ok(());
        }
        // stay in Sending: another finish event follows this send
        if let Err(err) = self.command(HardwareCommand::DialDtmf(queued)) {
            state.call.dtmf_sending = DtmfSending::Idle;
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn on_collect_call(&self, state: &mut ChannelState) -> Result<()> {
        state.call.collect_call = true;
        if let Some(session) = state.session {
            self.host.set_variable(session, "collect_call", "yes");
        }
        if state.call.drop_collect || self.options.drop_collect_call {
            info!(device = self.device, channel = self.index, "dropping collect call");
            self.try_command(HardwareCommand::Disconnect);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // application commands

    /// Entry point for the device command worker.
    pub fn handle_command(self: &Arc<Self>, command: &AppCommand) -> Result<()> {
        debug!(device = self.device, channel = self.index, ?command, "app command");
        match command {
            AppCommand::Answer => self.do_channel_answer(),
            AppCommand::Hangup => self.do_channel_hangup(),
            AppCommand::MakeCall {
                session,
                orig,
                dest,
                pre_answer,
            } => self.start_outgoing(*session, orig, dest, *pre_answer),
        }
    }

    /// Bind a session and dial. The host calls this directly on its own
    /// thread for outgoing calls.
    pub fn start_outgoing(
        self: &Arc<Self>,
        session: SessionId,
        orig: &str,
        dest: &str,
        pre_answer: bool,
    ) -> Result<()> {
        let mut state = self.lock()?;
        if !state.call.lifecycle.is_idle() || state.has_fail {
            return Err(Error::ChannelBusy);
        }
        if let CallVariant::Fxs(v) = &state.call.variant {
            if v.offhook {
                return Err(Error::ChannelBusy);
            }
        }

        info!(device = self.device, channel = self.index, %session,
            orig, dest, "outgoing call");
        state.session = Some(session);
        state.call.orig_addr = orig.to_string();
        state.call.dest_addr = dest.to_string();
        state.call.pre_answer = pre_answer;
        state.call.lifecycle = Lifecycle::Dialing(Direction::Outgoing);
        state.stats.on_call_start(Direction::Outgoing);

        let is_station = matches!(state.call.variant, CallVariant::Fxs(_));
        let result = if is_station {
            // station lines "dial" by ringing the phone set
            fxs::ring_station(self, &mut state)
        } else {
            self.command(HardwareCommand::MakeCall {
                orig: orig.to_string(),
                dest: dest.to_string(),
            })
        };
        if let Err(err) = result {
            warn!(device = self.device, channel = self.index, %err,
                "outgoing call refused by hardware");
            // no ChannelFree follows a call that never went out; the
            // host's hangup has to carry the full cleanup
            state.call.cleanup_upon_hangup = true;
            return Err(err);
        }
        Ok(())
    }

    pub fn do_channel_answer(self: &Arc<Self>) -> Result<()> {
        let mut state = self.lock()?;
        if state.call.lifecycle.direction() != Some(Direction::Incoming) {
            return Err(Error::NotConnected);
        }
        if state.call.lifecycle.is_connected() {
            return Ok(());
        }
        if matches!(state.call.variant, CallVariant::R2(_)) {
            r2::answer(self, &mut state)
        } else {
            self.command(HardwareCommand::Connect)
        }
    }

    pub fn do_channel_hangup(self: &Arc<Self>) -> Result<()> {
        let mut state = self.lock()?;
        if state.call.lifecycle.is_idle() {
            return Ok(());
        }

        let cause = state
            .session
            .and_then(|s| self.host.current_cause(s))
            .or(state.call.hangup_cause)
            .unwrap_or(Cause::NormalClearing);
        state.call.set_hangup_cause(cause);
        info!(device = self.device, channel = self.index, ?cause, "hangup");

        // the host initiated this; no further upward reports
        state.session = None;

        let incoming_unanswered = state.call.lifecycle.direction()
            == Some(Direction::Incoming)
            && !state.call.lifecycle.is_connected();
        if incoming_unanswered {
            // refuse politely at signaling level before dropping
            self.indicate_busy_unlocked(&mut state, cause, false);
        }
        self.try_command(HardwareCommand::Disconnect);
        self.stop_stream(&mut state);
        self.stop_listen(&mut state);

        if state.call.cleanup_upon_hangup {
            self.cleanup(&mut state, CleanupKind::Hard);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // indications

    pub fn indicate_ringing(self: &Arc<Self>) -> Result<()> {
        let mut state = self.lock()?;
        if state.call.indication != Indication::None || state.call.lifecycle.is_connected() {
            return Ok(());
        }
        state.call.indication = Indication::Ring;
        state.call.drop_collect = self.options.drop_collect_call;

        let refusal = if state.call.drop_collect && state.call.collect_call {
            Some(self.fail_code_for(&state, Cause::CallRejected))
        } else {
            None
        };
        self.send_pre_audio(&mut state, refusal)?;

        // if the network never produces audible ringback, generate it
        let delay = Duration::from_millis(self.options.ringback_co_delay_ms);
        state.call.ring_gen.co = self.timers.add(delay, co_ring_gen, self.me.clone());

        self.start_listen(&mut state)?;
        self.start_stream(&mut state)?;
        Ok(())
    }

    pub fn indicate_progress(self: &Arc<Self>) -> Result<()> {
        let mut state = self.lock()?;
        if state.call.lifecycle.is_connected() {
            return Ok(());
        }
        self.send_pre_audio(&mut state, None)?;
        self.start_listen(&mut state)?;
        self.start_stream(&mut state)?;
        Ok(())
    }

    pub fn indicate_busy(self: &Arc<Self>, cause: Cause) -> Result<()> {
        let mut state = self.lock()?;
        self.indicate_busy_unlocked(&mut state, cause, false);
        Ok(())
    }

    /// Switch whatever is playing to a busy indication. `sent_signaling`
    /// means the refusal already went out on the wire and only the local
    /// state needs to follow. Idempotent: an already-busy channel stays
    /// as it is.
    pub(crate) fn indicate_busy_unlocked(
        &self,
        state: &mut ChannelState,
        cause: Cause,
        sent_signaling: bool,
    ) -> bool {
        if state.call.lifecycle.is_idle() {
            return false;
        }
        state.call.set_hangup_cause(cause);

        match state.call.indication {
            Indication::Busy | Indication::FastBusy => return true,
            Indication::Ring => {
                self.cleanup_indications(state, true);
                self.disarm_ring_timers(state);
            }
            Indication::None => {}
        }
        state.call.indication = Indication::Busy;

        if !sent_signaling {
            if state.call.lifecycle.is_connected() {
                self.start_cadence(state, cadence_names::FAST_BUSY);
            } else {
                let fail = self.fail_code_for(state, cause);
                self.try_command(HardwareCommand::RingBack { cause: Some(fail) });
            }
        }
        true
    }

    /// Refuse an incoming call the host never accepted. A non-negative
    /// fail code goes out as signaling; lines with no fail vocabulary
    /// play fast-busy at the caller instead.
    pub(crate) fn report_fail_to_receive(&self, state: &mut ChannelState, fail: i32) {
        state.call.indication = Indication::FastBusy;
        if fail >= 0 {
            self.try_command(HardwareCommand::RingBack { cause: Some(fail) });
        } else {
            if let Err(err) = self.send_pre_audio(state, None) {
                warn!(device = self.device, channel = self.index, %err,
                    "pre-audio for refusal failed");
            }
            self.start_cadence(state, cadence_names::FAST_BUSY);
        }
    }

    /// Open the early audio path towards the caller, once per call.
    pub(crate) fn send_pre_audio(
        &self,
        state: &mut ChannelState,
        ringback_cause: Option<i32>,
    ) -> Result<()> {
        if state.call.pre_audio_sent {
            return Ok(());
        }
        if self.signaling == Signaling::Isdn {
            self.command(HardwareCommand::PreConnect)?;
        }
        self.command(HardwareCommand::RingBack {
            cause: ringback_cause,
        })?;
        if self.signaling == Signaling::R2 {
            // give the ringback signal time on the wire before opening
            // the audio path
            std::thread::sleep(Duration::from_millis(self.options.r2_preconnect_wait_ms));
            self.command(HardwareCommand::PreConnect)?;
        }
        state.call.pre_audio_sent = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // media helpers

    pub(crate) fn start_cadence(&self, state: &mut ChannelState, name: &str) {
        let Some(times) = self.options.cadence(name) else {
            warn!(device = self.device, channel = self.index, cadence = name,
                "cadence not configured");
            return;
        };
        self.try_command(HardwareCommand::StartCadence {
            on_ms: times.ring,
            off_ms: times.ring_s,
            on2_ms: times.ring_ext,
            off2_ms: times.ring_ext_s,
        });
        state.call.cadence = Some(name.to_string());
    }

    pub(crate) fn stop_cadence(&self, state: &mut ChannelState) {
        if state.call.cadence.take().is_some() {
            self.try_command(HardwareCommand::StopCadence);
        }
    }

    /// Stop any cadence except a voicemail tone, which outlives
    /// indication teardown on purpose.
    fn stop_cadence_keeping_vm(&self, state: &mut ChannelState) {
        match state.call.cadence.as_deref() {
            Some(cadence_names::VM_TONE) | None => {}
            Some(_) => self.stop_cadence(state),
        }
    }

    /// Tear down whatever indication is playing. `keep_vm_tone` spares
    /// a voicemail tone cadence.
    pub(crate) fn cleanup_indications(&self, state: &mut ChannelState, keep_vm_tone: bool) {
        let had_indication = state.call.indication != Indication::None;
        if keep_vm_tone {
            self.stop_cadence_keeping_vm(state);
        } else {
            self.stop_cadence(state);
        }
        state.call.indication = Indication::None;
        if had_indication {
            self.try_command(HardwareCommand::MixerSetup(MixerTone::Silence));
        }
    }

    pub(crate) fn start_stream(&self, state: &mut ChannelState) -> Result<()> {
        if !state.call.stream_up {
            self.command(HardwareCommand::StartStream)?;
            state.call.stream_up = true;
        }
        Ok(())
    }

    pub(crate) fn stop_stream(&self, state: &mut ChannelState) {
        if state.call.stream_up {
            self.try_command(HardwareCommand::StopStream);
            state.call.stream_up = false;
        }
    }

    pub(crate) fn start_listen(&self, state: &mut ChannelState) -> Result<()> {
        if !state.call.listen_up {
            self.command(HardwareCommand::StartListen)?;
            state.call.listen_up = true;
        }
        Ok(())
    }

    pub(crate) fn stop_listen(&self, state: &mut ChannelState) {
        if state.call.listen_up {
            self.try_command(HardwareCommand::StopListen);
            state.call.listen_up = false;
        }
    }

    // ------------------------------------------------------------------
    // DTMF out and assisted transfer

    /// Dial digits towards the line. On lines with a transfer trigger
    /// configured the digits pass through the trigger matcher first;
    /// whatever it does not consume is dialed.
    pub fn send_dtmf(self: &Arc<Self>, digits: &str) -> Result<()> {
        let mut state = self.lock()?;
        if !state.call.lifecycle.is_connected() {
            return Err(Error::NotConnected);
        }

        let intercept = state
            .call
            .variant
            .transfer_mut()
            .map(|x| x.is_enabled())
            .unwrap_or(false);

        if !intercept {
            return self.queue_dtmf_out(&mut state, digits);
        }

        let mut deliver = String::new();
        for digit in digits.chars() {
            let out = match state.call.variant.transfer_mut() {
                Some(xfer) => xfer.on_digit(digit),
                None => break,
            };
            self.apply_transfer_timer(&mut state, out.timer);
            deliver.extend(out.deliver);
            if let Some(action) = out.action {
                self.apply_transfer_action(action)?;
            }
        }
        if deliver.is_empty() {
            Ok(())
        } else {
            self.queue_dtmf_out(&mut state, &deliver)
        }
    }

    /// One dial command in flight at a time; extra digits queue until
    /// the hardware reports the send finished.
    pub(crate) fn queue_dtmf_out(&self, state: &mut ChannelState, digits: &str) -> Result<()> {
        match &mut state.call.dtmf_sending {
            DtmfSending::Sending { queued } => {
                queued.push_str(digits);
                Ok(())
            }
            DtmfSending::Idle => {
                self.command(HardwareCommand::DialDtmf(digits.to_string()))?;
                state.call.dtmf_sending = DtmfSending::Sending {
                    queued: String::new(),
                };
                Ok(())
            }
        }
    }

    fn apply_transfer_timer(&self, state: &mut ChannelState, op: TimerOp) {
        match op {
            TimerOp::Keep => {}
            TimerOp::Arm => {
                let delay = Duration::from_millis(self.options.transfer_digit_timeout_ms);
                state.xfer_timer = self.timers.add(delay, transfer_digit_timeout, self.me.clone());
            }
            TimerOp::Restart => {
                if state.xfer_timer.is_valid() {
                    self.timers.restart(state.xfer_timer);
                } else {
                    let delay = Duration::from_millis(self.options.transfer_digit_timeout_ms);
                    state.xfer_timer =
                        self.timers.add(delay, transfer_digit_timeout, self.me.clone());
                }
            }
            TimerOp::Cancel => {
                self.timers.del(state.xfer_timer);
                state.xfer_timer.reset();
            }
        }
    }

    fn apply_transfer_action(&self, action: TransferAction) -> Result<()> {
        match action {
            TransferAction::Flash => {
                info!(device = self.device, channel = self.index, "transfer: hook flash");
                self.command(HardwareCommand::Flash)
            }
            TransferAction::CollectStart => {
                debug!(device = self.device, channel = self.index,
                    "transfer: collecting destination");
                Ok(())
            }
            TransferAction::SsTransfer { dest } => {
                info!(device = self.device, channel = self.index, dest,
                    "transfer: supplementary service");
                self.command(HardwareCommand::SsTransfer {
                    dest,
                    await_connect: false,
                })
            }
        }
    }

    fn on_transfer_timeout(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.xfer_timer.reset();
        let out = match state.call.variant.transfer_mut() {
            Some(xfer) => xfer.on_timer(),
            None => return Ok(()),
        };
        if let Some(action) = out.action {
            self.apply_transfer_action(action)?;
        }
        if !out.deliver.is_empty() {
            let digits: String = out.deliver.into_iter().collect();
            self.queue_dtmf_out(&mut state, &digits)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // audio processing controls

    pub fn set_volume(&self, dir: VolumeDir, gain: i32) -> Result<()> {
        let mut state = self.lock()?;
        self.command(HardwareCommand::SetVolume { dir, gain })?;
        match dir {
            VolumeDir::Input => state.call.audio.input_volume = Some(gain),
            VolumeDir::Output => state.call.audio.output_volume = Some(gain),
        }
        Ok(())
    }

    pub fn echo_cancellation(&self, enable: bool) -> Result<()> {
        let mut state = self.lock()?;
        self.command(HardwareCommand::EchoCancel(enable))?;
        state.call.audio.echo_cancel = if enable { TriState::On } else { TriState::Off };
        Ok(())
    }

    pub fn auto_gain_control(&self, enable: bool) -> Result<()> {
        let mut state = self.lock()?;
        self.command(HardwareCommand::AutoGainControl(enable))?;
        state.call.audio.auto_gain = if enable { TriState::On } else { TriState::Off };
        Ok(())
    }

    pub fn dtmf_suppression(&self, enable: bool) -> Result<()> {
        let mut state = self.lock()?;
        self.command(HardwareCommand::DtmfSuppression(enable))?;
        state.call.audio.dtmf_suppression = if enable { TriState::On } else { TriState::Off };
        state.call.out_of_band_dtmfs = enable;
        Ok(())
    }

    // ------------------------------------------------------------------
    // cleanup

    /// Return the channel towards idle. Every step tolerates being run
    /// twice; a second hard cleanup on an already-idle channel is a
    /// no-op.
    pub(crate) fn cleanup(&self, state: &mut ChannelState, kind: CleanupKind) {
        debug!(device = self.device, channel = self.index, ?kind, "cleanup");
        state.call.dtmf_sending = DtmfSending::Idle;
        state.call.drop_collect = false;

        match kind {
            CleanupKind::Soft => {
                if state.call.indication == Indication::Ring {
                    self.cleanup_indications(state, true);
                    self.disarm_ring_timers(state);
                }
            }
            CleanupKind::Hard | CleanupKind::Fail => {
                self.disarm_ring_timers(state);
                self.cancel_variant_timers(state);
                if kind == CleanupKind::Hard {
                    self.cleanup_indications(state, false);
                }
                self.stop_stream(state);
                self.stop_listen(state);

                if state.call.audio.any_volume_override() {
                    self.try_command(HardwareCommand::SetVolume {
                        dir: VolumeDir::Input,
                        gain: self.options.input_volume,
                    });
                    self.try_command(HardwareCommand::SetVolume {
                        dir: VolumeDir::Output,
                        gain: self.options.output_volume,
                    });
                }
                if state.call.out_of_band_dtmfs {
                    self.try_command(HardwareCommand::DtmfSuppression(false));
                }

                let had_call = !state.call.lifecycle.is_idle();
                if let Some(session) = state.session.take() {
                    let cause = self
                        .host
                        .current_cause(session)
                        .or(state.call.hangup_cause)
                        .unwrap_or(Cause::NormalClearing);
                    self.host.hangup(session, cause);
                }
                if had_call {
                    state.stats.on_call_end();
                }
                // a refusal keeps its indication playing until the
                // hardware frees the channel
                let cadence = state.call.cadence.take();
                let indication = state.call.indication;
                state.call.clear();
                if kind == CleanupKind::Fail {
                    state.call.cadence = cadence;
                    state.call.indication = indication;
                }
            }
        }
    }

    pub(crate) fn disarm_ring_timers(&self, state: &mut ChannelState) {
        self.timers.del(state.call.ring_gen.pbx);
        self.timers.del(state.call.ring_gen.co);
        state.call.ring_gen.clear();
    }

    fn cancel_variant_timers(&self, state: &mut ChannelState) {
        self.timers.del(state.xfer_timer);
        state.xfer_timer.reset();
        self.timers.del(state.disc_timer);
        state.disc_timer.reset();
        match &mut state.call.variant {
            CallVariant::Fxs(v) => {
                self.timers.del(v.dial_timer);
                v.dial_timer.reset();
            }
            CallVariant::R2(v) => {
                self.timers.del(v.dial_timer);
                v.dial_timer.reset();
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // cause translation, per signaling variant

    pub(crate) fn cause_for(&self, state: &ChannelState, fail: i32) -> Cause {
        match &state.call.variant {
            CallVariant::Isdn(_) => cause::isdn::cause_from_call_fail(fail),
            CallVariant::R2(v) => cause::r2::cause_from_call_fail(v.country, fail),
            CallVariant::Gsm(_) => cause::gsm::cause_from_call_fail(fail),
            CallVariant::Fxo(_) | CallVariant::Fxs(_) => cause::analog::cause_from_call_fail(fail),
        }
    }

    pub(crate) fn fail_code_for(&self, state: &ChannelState, cause: Cause) -> i32 {
        match &state.call.variant {
            CallVariant::Isdn(_) => cause::isdn::call_fail_from_cause(cause),
            CallVariant::R2(v) => cause::r2::call_fail_from_cause(v.country, cause),
            CallVariant::Gsm(_) => cause::gsm::call_fail_from_cause(cause),
            CallVariant::Fxo(_) | CallVariant::Fxs(_) => cause::analog::call_fail_from_cause(cause),
        }
    }
}

// ----------------------------------------------------------------------
// timer callbacks: fire with no lock held, re-check everything

/// Run a fallible channel action from a timer callback, logging instead
/// of propagating: there is nobody above a timer to propagate to.
pub(crate) fn timer_entry<F>(chan: Weak<Channel>, what: &str, f: F)
where
    F: FnOnce(&Arc<Channel>) -> Result<()>,
{
    let Some(chan) = chan.upgrade() else {
        return;
    };
    if let Err(err) = f(&chan) {
        warn!(device = chan.device(), channel = chan.index(), timer = what, %err,
            "timer action failed");
    }
}

/// The far end of an outgoing call accepted but stays silent; ring the
/// caller locally.
pub(crate) fn pbx_ring_gen(chan: Weak<Channel>) {
    timer_entry(chan, "pbx-ring", |chan| {
        let mut state = chan.lock()?;
        if !state.call.ring_gen.pbx.is_valid() || state.call.lifecycle.is_connected() {
            return Ok(());
        }
        state.call.ring_gen.pbx.reset();
        chan.start_cadence(&mut state, cadence_names::RINGBACK);
        Ok(())
    });
}

/// An alerted incoming call produced no network ringback in time; play
/// it locally towards the caller.
pub(crate) fn co_ring_gen(chan: Weak<Channel>) {
    timer_entry(chan, "co-ring", |chan| {
        let mut state = chan.lock()?;
        if !state.call.ring_gen.co.is_valid()
            || state.call.indication != Indication::Ring
            || state.call.lifecycle.is_connected()
        {
            return Ok(());
        }
        state.call.ring_gen.co.reset();
        chan.start_cadence(&mut state, cadence_names::RINGBACK);
        Ok(())
    });
}

/// Assisted-transfer inter-digit silence: flush the digit buffer.
pub(crate) fn transfer_digit_timeout(chan: Weak<Channel>) {
    timer_entry(chan, "transfer-digit", |chan| chan.on_transfer_timeout());
}
