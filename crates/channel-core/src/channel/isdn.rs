//! ISDN (Q.931) specifics: raw-cause bookkeeping, progress indicators,
//! user-to-user information, and supplementary-service transfer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::call::{CallVariant, Direction, UserToUser};
use crate::cause;
use crate::channel::{e1, Channel};
use crate::errors::Result;
use crate::hw::{EventCode, HardwareEvent};

pub(super) fn handle(chan: &Arc<Channel>, ev: &HardwareEvent) -> Result<bool> {
    match ev.code {
        EventCode::NewCall => {
            let mut state = chan.lock()?;
            chan.on_new_call(&mut state, ev)?;
            // UUI may have arrived ahead of the setup
            export_uui(chan, &state);
            Ok(true)
        }
        EventCode::CallSuccess => {
            let mut state = chan.lock()?;
            e1::on_call_success(chan, &mut state)?;
            Ok(true)
        }
        EventCode::Disconnect => {
            let mut state = chan.lock()?;
            // the wire carries the raw Q.931 cause; keep it verbatim for
            // scripting and map it for the host
            if let CallVariant::Isdn(v) = &mut state.call.variant {
                v.isdn_cause = Some(ev.add_info);
            }
            state
                .call
                .set_hangup_cause(cause::isdn::cause_from_call_fail(ev.add_info));
            if let Some(session) = state.session {
                chan.host
                    .set_variable(session, "isdn_cause", &ev.add_info.to_string());
            }
            e1::on_disconnect(chan, &mut state)?;
            Ok(true)
        }
        EventCode::ChannelFree | EventCode::ChannelFail => {
            let mut state = chan.lock()?;
            e1::on_channel_release(chan, &mut state, ev)?;
            Ok(true)
        }
        EventCode::IsdnProgressIndicator => {
            let mut state = chan.lock()?;
            debug!(device = chan.device(), channel = chan.index(),
                descriptor = ev.add_info, "progress indicator");
            let outgoing = state.call.lifecycle.direction() == Some(Direction::Outgoing);
            if outgoing && !state.call.lifecycle.is_connected() {
                // in-band information is available: open early media
                chan.start_listen(&mut state)?;
                chan.start_stream(&mut state)?;
                if !state.call.progress_sent {
                    state.call.progress_sent = true;
                    if let Some(session) = state.session {
                        chan.host.mark_pre_answered(session);
                    }
                }
            }
            Ok(true)
        }
        EventCode::UserInformation => {
            let mut state = chan.lock()?;
            if let CallVariant::Isdn(v) = &mut state.call.variant {
                v.uui = Some(UserToUser {
                    descriptor: i64::from(ev.add_info),
                    data: ev.param("uui_data").unwrap_or("").to_string(),
                });
            }
            export_uui(chan, &state);
            Ok(true)
        }
        EventCode::SsTransferFail => {
            let mut state = chan.lock()?;
            warn!(device = chan.device(), channel = chan.index(),
                status = ev.add_info, "supplementary-service transfer failed");
            if let Some(xfer) = state.call.variant.transfer_mut() {
                xfer.clear();
            }
            chan.timers.del(state.xfer_timer);
            state.xfer_timer.reset();
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn export_uui(chan: &Arc<Channel>, state: &crate::channel::ChannelState) {
    let Some(session) = state.session else {
        return;
    };
    if let CallVariant::Isdn(v) = &state.call.variant {
        if let Some(uui) = &v.uui {
            chan.host
                .set_variable(session, "uui_descriptor", &uui.descriptor.to_string());
            chan.host.set_variable(session, "uui_data", &uui.data);
        }
    }
}
