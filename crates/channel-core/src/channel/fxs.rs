//! Analog station (FXS) specifics: hook supervision, dialtone, digit
//! collection against the injected dialplan, and physically ringing the
//! set for calls towards it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::call::{CallVariant, Direction, Lifecycle};
use crate::cause::Cause;
use crate::channel::{timer_entry, Channel, ChannelState, CleanupKind};
use crate::config::{cadence_names, match_exten, ExtenMatch};
use crate::errors::Result;
use crate::hw::{EventCode, HardwareCommand, HardwareEvent, MixerTone};

pub(super) fn handle(chan: &Arc<Channel>, ev: &HardwareEvent) -> Result<bool> {
    match ev.code {
        EventCode::Offhook => {
            let mut state = chan.lock()?;
            on_offhook(chan, &mut state)?;
            Ok(true)
        }
        EventCode::Onhook => {
            let mut state = chan.lock()?;
            on_onhook(chan, &mut state)?;
            Ok(true)
        }
        EventCode::DtmfDetected => {
            let mut state = chan.lock()?;
            if is_dialing(&state) {
                if let Some(digit) = ev.digit() {
                    on_dial_digit(chan, &mut state, digit)?;
                }
                Ok(true)
            } else {
                // connected: ordinary inbound DTMF
                Ok(false)
            }
        }
        EventCode::FlashDetected => {
            // no hold/second-leg surface to drive yet; export the flash
            // so the application can react from scripting
            let state = chan.lock()?;
            info!(device = chan.device(), channel = chan.index(), "hook flash");
            if let Some(session) = state.session {
                chan.host.set_variable(session, "flash", "received");
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn is_dialing(state: &ChannelState) -> bool {
    match &state.call.variant {
        CallVariant::Fxs(v) => v.offhook && state.call.lifecycle.is_idle(),
        _ => false,
    }
}

fn on_offhook(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    if let CallVariant::Fxs(v) = &mut state.call.variant {
        v.offhook = true;
        v.digits.clear();
    }

    if state.call.lifecycle.is_idle() {
        // the station wants to dial
        debug!(device = chan.device(), channel = chan.index(), "offhook, dialtone");
        chan.try_command(HardwareCommand::MixerSetup(MixerTone::Dialtone));
        return Ok(());
    }

    // the set was ringing: picking up answers
    if !state.call.lifecycle.is_connected() {
        info!(device = chan.device(), channel = chan.index(), "offhook answers");
        chan.try_command(HardwareCommand::RingStop);
        chan.setup_connection(state)?;
    }
    Ok(())
}

fn on_onhook(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    if let CallVariant::Fxs(v) = &mut state.call.variant {
        v.offhook = false;
        chan.timers.del(v.dial_timer);
        v.dial_timer.reset();
    }

    if state.call.lifecycle.is_idle() {
        // abandoned dialing: drop dialtone or error tone
        chan.try_command(HardwareCommand::MixerSetup(MixerTone::Silence));
        chan.stop_cadence(state);
        return Ok(());
    }

    info!(device = chan.device(), channel = chan.index(), "onhook hangs up");
    state.call.set_hangup_cause(Cause::NormalClearing);
    chan.try_command(HardwareCommand::Disconnect);
    chan.cleanup(state, CleanupKind::Hard);
    Ok(())
}

fn on_dial_digit(chan: &Arc<Channel>, state: &mut ChannelState, digit: char) -> Result<()> {
    let dialplan = &chan.options.dialplan;
    let mut route: Option<String> = None;
    let mut dead_end = false;

    if let CallVariant::Fxs(v) = &mut state.call.variant {
        if v.digits.is_empty() {
            // first digit kills the dialtone
            chan.try_command(HardwareCommand::MixerSetup(MixerTone::Silence));
        }
        v.digits.push(digit);
        debug!(device = chan.device(), channel = chan.index(),
            digits = %v.digits, "station dialing");

        match match_exten(dialplan, &v.digits) {
            ExtenMatch::Exact => {
                chan.timers.del(v.dial_timer);
                v.dial_timer.reset();
                route = Some(v.digits.clone());
            }
            ExtenMatch::More => {
                if v.dial_timer.is_valid() {
                    chan.timers.restart(v.dial_timer);
                } else {
                    let delay = Duration::from_millis(chan.options.dial_timeout_ms);
                    v.dial_timer = chan.timers.add(delay, dial_timeout, chan.me.clone());
                }
            }
            ExtenMatch::None => {
                chan.timers.del(v.dial_timer);
                v.dial_timer.reset();
                dead_end = true;
            }
        }
    }

    if let Some(dest) = route {
        start_station_call(chan, state, &dest)?;
    } else if dead_end {
        warn!(device = chan.device(), channel = chan.index(),
            "dialed number matches nothing");
        chan.start_cadence(state, cadence_names::FAST_BUSY);
    }
    Ok(())
}

/// The station finished dialing: the collected digits become an
/// incoming call towards the host.
fn start_station_call(chan: &Arc<Channel>, state: &mut ChannelState, dest: &str) -> Result<()> {
    let orig = format!("{}", chan.index());
    state.call.orig_addr = orig.clone();
    state.call.dest_addr = dest.to_string();
    state.call.incoming_context = chan.options.context.clone();
    state.call.lifecycle = Lifecycle::Dialing(Direction::Incoming);
    state.stats.on_call_start(Direction::Incoming);

    match chan.host.allocate(chan.device(), chan.index(), &orig, dest) {
        Ok(session) => {
            info!(device = chan.device(), channel = chan.index(), %session,
                dest, "station call");
            state.session = Some(session);
            chan.start_listen(state)?;
            chan.start_stream(state)?;
            Ok(())
        }
        Err(_) => {
            warn!(device = chan.device(), channel = chan.index(),
                "no session for station call");
            state.call.set_hangup_cause(Cause::SwitchCongestion);
            chan.cleanup(state, CleanupKind::Fail);
            chan.start_cadence(state, cadence_names::FAST_BUSY);
            Ok(())
        }
    }
}

/// Ring the phone set for a call towards the station.
pub(super) fn ring_station(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    if let CallVariant::Fxs(v) = &state.call.variant {
        if v.offhook {
            return Err(crate::errors::Error::ChannelBusy);
        }
    }
    let times = chan
        .options
        .cadence(cadence_names::CO_RING)
        .unwrap_or(crate::config::CadenceTimes::simple(1000, 4000));
    chan.command(HardwareCommand::RingGenerate {
        on_ms: times.ring,
        off_ms: times.ring_s,
    })
}

/// Inter-digit silence while the station dials: route what we have, or
/// complain if there is nothing to route.
pub(crate) fn dial_timeout(chan: Weak<Channel>) {
    timer_entry(chan, "fxs-dial", |chan| {
        let mut state = chan.lock()?;
        if !state.call.lifecycle.is_idle() {
            return Ok(());
        }
        let mut route: Option<String> = None;
        if let CallVariant::Fxs(v) = &mut state.call.variant {
            if !v.dial_timer.is_valid() || !v.offhook {
                return Ok(());
            }
            v.dial_timer.reset();
            if !v.digits.is_empty() {
                route = Some(v.digits.clone());
            }
        }
        match route {
            Some(dest) => start_station_call(chan, &mut state, &dest),
            None => {
                chan.start_cadence(&mut state, cadence_names::FAST_BUSY);
                Ok(())
            }
        }
    });
}
