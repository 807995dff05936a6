//! Behavior shared by the digital trunk signalings (ISDN and R2): local
//! ringback towards a silent far end, delayed disconnect confirmation,
//! and fax teardown when the channel goes away mid-transfer.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::channel::{pbx_ring_gen, timer_entry, Channel, ChannelState};
use crate::errors::Result;
use crate::hw::{HardwareCommand, HardwareEvent};

/// Far end accepted the call. With pre-answer requested the audio path
/// opens right away; otherwise local ringback is armed in case the far
/// end never produces audible progress.
pub(super) fn on_call_success(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    chan.on_call_success(state)?;
    if state.call.pre_answer {
        chan.start_listen(state)?;
        chan.start_stream(state)?;
        if let Some(session) = state.session {
            chan.host.mark_pre_answered(session);
        }
    } else {
        let delay = Duration::from_millis(chan.options.ringback_pbx_delay_ms);
        state.call.ring_gen.pbx = chan.timers.add(delay, pbx_ring_gen, chan.me.clone());
    }
    Ok(())
}

/// Far-end disconnect. The base handler reports upward; the trunk side
/// must also confirm the release with its own disconnect, optionally
/// after a grace period that lets the application finish.
pub(super) fn on_disconnect(chan: &Arc<Channel>, state: &mut ChannelState) -> Result<()> {
    chan.on_disconnect(state)?;

    let delay = chan.options.disconnect_delay_ms;
    if delay > 0 && state.call.lifecycle.is_established() {
        state.disc_timer =
            chan.timers
                .add(Duration::from_millis(delay), delayed_disconnect, chan.me.clone());
    } else {
        chan.try_command(HardwareCommand::Disconnect);
    }
    Ok(())
}

pub(super) fn on_channel_release(
    chan: &Arc<Channel>,
    state: &mut ChannelState,
    ev: &HardwareEvent,
) -> Result<()> {
    chan.fax_abort(state);
    chan.timers.del(state.disc_timer);
    state.disc_timer.reset();
    chan.on_channel_release(state, ev)
}

/// Grace period after a far-end disconnect expired: confirm the release.
pub(crate) fn delayed_disconnect(chan: Weak<Channel>) {
    timer_entry(chan, "delayed-disconnect", |chan| {
        let mut state = chan.lock()?;
        if !state.disc_timer.is_valid() {
            return Ok(());
        }
        state.disc_timer.reset();
        chan.try_command(HardwareCommand::Disconnect);
        Ok(())
    });
}
