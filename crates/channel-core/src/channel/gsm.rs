//! GSM module specifics: SMS assembly from the two-part info/data event
//! sequence and completion of pending sends.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bridge::sms::SmsSendOutcome;
use crate::call::CallVariant;
use crate::channel::Channel;
use crate::errors::Result;
use crate::host::SmsIn;
use crate::hw::{EventCode, HardwareEvent};

pub(crate) fn handle(chan: &Arc<Channel>, ev: &HardwareEvent) -> Result<bool> {
    match ev.code {
        EventCode::SmsInfo => {
            let mut state = chan.lock()?;
            if let CallVariant::Gsm(v) = &mut state.call.variant {
                v.sms_in = SmsIn {
                    originator: ev.param("sms_originator").unwrap_or("").to_string(),
                    timestamp: ev.param("sms_timestamp").unwrap_or("").to_string(),
                    body: String::new(),
                    confirmation: ev.param("sms_type") == Some("confirm"),
                };
                v.sms_in_progress = true;
            }
            Ok(true)
        }
        EventCode::SmsData => {
            let mut state = chan.lock()?;
            let mut delivered: Option<SmsIn> = None;
            if let CallVariant::Gsm(v) = &mut state.call.variant {
                if !v.sms_in_progress {
                    warn!(device = chan.device(), channel = chan.index(),
                        "sms body without header, dropping");
                    return Ok(true);
                }
                v.sms_in.body = ev.param("sms_body").unwrap_or("").to_string();
                v.sms_in_progress = false;
                delivered = Some(std::mem::take(&mut v.sms_in));
            }
            drop(state);
            if let Some(sms) = delivered {
                debug!(device = chan.device(), channel = chan.index(),
                    originator = %sms.originator, "sms received");
                chan.host.sms_received(chan.device(), chan.index(), sms);
            }
            Ok(true)
        }
        EventCode::SmsSendResult => {
            let outcome = if ev.add_info == 0 {
                SmsSendOutcome::Sent
            } else {
                SmsSendOutcome::Failed(ev.add_info)
            };
            chan.sms_gate.complete(outcome);
            Ok(true)
        }
        _ => Ok(false),
    }
}
