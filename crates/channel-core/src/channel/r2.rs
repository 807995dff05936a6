//! R2/MFC specifics: seizure and number collection, caller category,
//! group-B answer conditions, and the strict/relaxed refusal styles.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::call::{CallVariant, NumberDial};
use crate::cause::Cause;
use crate::channel::{e1, timer_entry, Channel, ChannelState};
use crate::config::{match_exten, ExtenMatch};
use crate::errors::{Error, Result};
use crate::hw::{EventCode, HardwareCommand, HardwareEvent};

impl Channel {
    /// Pick the group-B condition sent when this incoming call is
    /// answered. Only meaningful before the answer goes out.
    pub fn set_r2_condition(&self, condition: i32) -> Result<()> {
        let mut state = self.lock()?;
        match &mut state.call.variant {
            CallVariant::R2(v) => {
                v.condition = Some(condition);
                Ok(())
            }
            _ => Err(Error::UnsupportedSignaling),
        }
    }
}

pub(super) fn handle(chan: &Arc<Channel>, ev: &HardwareEvent) -> Result<bool> {
    match ev.code {
        EventCode::SeizureStart => {
            let mut state = chan.lock()?;
            on_seizure_start(chan, &mut state)?;
            Ok(true)
        }
        EventCode::NumberDetected => {
            let mut state = chan.lock()?;
            on_number_detected(chan, &mut state, ev)?;
            Ok(true)
        }
        EventCode::NewCall => {
            let mut state = chan.lock()?;
            if let CallVariant::R2(v) = &mut state.call.variant {
                v.category = Some(ev.add_info);
                v.number_dial = NumberDial::Finished;
                chan.timers.del(v.dial_timer);
                v.dial_timer.reset();
            }
            chan.on_new_call(&mut state, ev)?;
            if let Some(session) = state.session {
                chan.host
                    .set_variable(session, "r2_category", &ev.add_info.to_string());
            }
            Ok(true)
        }
        EventCode::CallSuccess => {
            let mut state = chan.lock()?;
            e1::on_call_success(chan, &mut state)?;
            Ok(true)
        }
        EventCode::Disconnect => {
            let mut state = chan.lock()?;
            e1::on_disconnect(chan, &mut state)?;
            Ok(true)
        }
        EventCode::ChannelFree | EventCode::ChannelFail => {
            let mut state = chan.lock()?;
            e1::on_channel_release(chan, &mut state, ev)?;
            Ok(true)
        }
        EventCode::CollectCall => {
            let mut state = chan.lock()?;
            state.call.collect_call = true;
            if let Some(session) = state.session {
                chan.host.set_variable(session, "collect_call", "yes");
            }
            if state.call.drop_collect || chan.options.drop_collect_call {
                info!(device = chan.device(), channel = chan.index(),
                    "dropping collect call");
                if chan.options.r2_strict_behaviour {
                    // strict style: answer the seizure with a refusal
                    // code instead of dropping the line
                    let fail = chan.fail_code_for(&state, Cause::CallRejected);
                    chan.try_command(HardwareCommand::RingBack { cause: Some(fail) });
                } else {
                    chan.try_command(HardwareCommand::Disconnect);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// The far exchange seized the channel: start collecting the dialed
/// number. The inter-digit timer declares end-of-number on silence.
fn on_seizure_start(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    debug!(device = chan.device(), channel = chan.index(), "seizure start");
    if let CallVariant::R2(v) = &mut state.call.variant {
        v.incoming_exten.clear();
        v.number_dial = NumberDial::Ongoing;
        let delay = Duration::from_millis(chan.options.dial_timeout_ms);
        v.dial_timer = chan.timers.add(delay, number_dial_timeout, chan.me.clone());
    }
    Ok(())
}

fn on_number_detected(
    chan: &Arc<Channel>,
    state: &mut ChannelState,
    ev: &HardwareEvent,
) -> Result<()> {
    let Some(digit) = ev.digit() else {
        return Ok(());
    };
    let dialplan = &chan.options.dialplan;

    let mut complete = false;
    if let CallVariant::R2(v) = &mut state.call.variant {
        if v.number_dial != NumberDial::Ongoing {
            debug!(device = chan.device(), channel = chan.index(), %digit,
                "digit outside number collection ignored");
            return Ok(());
        }
        v.incoming_exten.push(digit);

        // with no dialplan injected only the timer ends the number
        let verdict = if dialplan.is_empty() {
            ExtenMatch::More
        } else {
            match_exten(dialplan, &v.incoming_exten)
        };
        match verdict {
            ExtenMatch::More => {
                if v.dial_timer.is_valid() {
                    chan.timers.restart(v.dial_timer);
                } else {
                    let delay = Duration::from_millis(chan.options.dial_timeout_ms);
                    v.dial_timer = chan.timers.add(delay, number_dial_timeout, chan.me.clone());
                }
            }
            // an exact match completes; a dead end completes too and
            // lets the host refuse the number
            ExtenMatch::Exact | ExtenMatch::None => {
                chan.timers.del(v.dial_timer);
                v.dial_timer.reset();
                v.number_dial = NumberDial::Finished;
                complete = true;
            }
        }
    }
    if complete {
        chan.command(HardwareCommand::EndOfNumber)?;
    }
    Ok(())
}

/// Group-B answer: send the condition picked for this call, then
/// connect.
pub(super) fn answer(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    let condition = match &state.call.variant {
        CallVariant::R2(v) => v.condition.unwrap_or(0),
        _ => 0,
    };
    chan.command(HardwareCommand::SeizeAnswer { condition })?;
    chan.command(HardwareCommand::Connect)
}

/// Inter-digit silence while collecting the incoming number: whatever
/// arrived is the whole number.
pub(crate) fn number_dial_timeout(chan: Weak<Channel>) {
    timer_entry(chan, "r2-number", |chan| {
        let mut state = chan.lock()?;
        let mut complete = false;
        if let CallVariant::R2(v) = &mut state.call.variant {
            if v.dial_timer.is_valid() && v.number_dial == NumberDial::Ongoing {
                v.dial_timer.reset();
                v.number_dial = NumberDial::Finished;
                complete = true;
            }
        }
        if complete {
            chan.command(HardwareCommand::EndOfNumber)?;
        }
        Ok(())
    });
}
