//! Analog trunk (FXO) specifics. The loop has no real answer or
//! disconnect signaling, so the board's tone and polarity detectors
//! stand in: pole reversal is answer supervision, a recognized busy
//! cadence is a far-end hangup.

use std::sync::Arc;

use tracing::{debug, info};

use crate::call::{CallVariant, Direction};
use crate::cause::Cause;
use crate::channel::Channel;
use crate::errors::Result;
use crate::hw::{EventCode, HardwareCommand, HardwareEvent};

pub(super) fn handle(chan: &Arc<Channel>, ev: &HardwareEvent) -> Result<bool> {
    match ev.code {
        EventCode::RingDetected => {
            debug!(device = chan.device(), channel = chan.index(), "ring burst");
            Ok(true)
        }
        EventCode::PoleReversal => {
            let mut state = chan.lock()?;
            if let CallVariant::Fxo(v) = &mut state.call.variant {
                v.reversal_seen = true;
            }
            let outgoing = state.call.lifecycle.direction() == Some(Direction::Outgoing);
            if outgoing && !state.call.lifecycle.is_connected() {
                info!(device = chan.device(), channel = chan.index(),
                    "pole reversal: far end answered");
                chan.setup_connection(&mut state)?;
            }
            Ok(true)
        }
        EventCode::CadenceRecognized => {
            // the detector heard busy tone: the far end hung up and the
            // loop has no other way to tell us
            let mut state = chan.lock()?;
            if state.call.lifecycle.is_idle() {
                return Ok(true);
            }
            info!(device = chan.device(), channel = chan.index(),
                "busy cadence recognized, treating as disconnect");
            state.call.set_hangup_cause(Cause::NormalClearing);
            if let Some(session) = state.session {
                chan.host.hangup(session, Cause::NormalClearing);
            }
            chan.try_command(HardwareCommand::Disconnect);
            Ok(true)
        }
        _ => Ok(false),
    }
}
