//! Blocking fax transmission and reception.
//!
//! A fax call holds the application thread: start the hardware fax
//! engine under the channel lock, release the lock, and park on the
//! completion gate until the result event arrives on the event worker.
//! One fax operation per channel at a time.

use tracing::{info, warn};

use crate::channel::{Channel, ChannelState};
use crate::errors::{Error, Result};
use crate::hw::{EventCode, HardwareCommand, HardwareEvent};

/// Outcome of a fax operation, as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaxResult {
    Done,
    Failed(i32),
}

impl Channel {
    /// Send `files` (a hardware-formatted list) as a fax. Blocks until
    /// the transmission finishes or fails.
    pub fn start_fax_tx(&self, files: &str, orig: &str) -> Result<FaxResult> {
        {
            let mut state = self.lock()?;
            if !state.call.lifecycle.is_established() {
                return Err(Error::NotConnected);
            }
            if state.call.fax_sending || state.call.fax_receiving {
                return Err(Error::OperationInProgress);
            }
            self.fax_gate.reset();
            self.command(HardwareCommand::StartFaxTx {
                files: files.to_string(),
                orig: orig.to_string(),
            })?;
            state.call.fax_sending = true;
            info!(device = self.device(), channel = self.index(), "fax tx started");
        }
        // lock released: the event worker needs it to complete us
        Ok(self.fax_gate.wait())
    }

    /// Receive a fax into `file`. Blocks like [`start_fax_tx`].
    ///
    /// [`start_fax_tx`]: Channel::start_fax_tx
    pub fn start_fax_rx(&self, file: &str) -> Result<FaxResult> {
        {
            let mut state = self.lock()?;
            if !state.call.lifecycle.is_established() {
                return Err(Error::NotConnected);
            }
            if state.call.fax_sending || state.call.fax_receiving {
                return Err(Error::OperationInProgress);
            }
            self.fax_gate.reset();
            self.command(HardwareCommand::StartFaxRx {
                file: file.to_string(),
            })?;
            state.call.fax_receiving = true;
            info!(device = self.device(), channel = self.index(), "fax rx started");
        }
        Ok(self.fax_gate.wait())
    }

    /// Queue another document behind an ongoing transmission.
    pub fn add_fax_file(&self, file: &str, last: bool) -> Result<()> {
        let state = self.lock()?;
        if !state.call.fax_sending {
            return Err(Error::NotConnected);
        }
        self.command(HardwareCommand::AddFaxFile {
            file: file.to_string(),
            last,
        })
    }

    /// Abort whichever fax operation is in flight. The busy flags fall
    /// when the result event arrives.
    pub fn stop_fax(&self) -> Result<()> {
        let state = self.lock()?;
        if state.call.fax_sending {
            self.command(HardwareCommand::StopFaxTx)
        } else if state.call.fax_receiving {
            self.command(HardwareCommand::StopFaxRx)
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Fax completion events, called from the event dispatcher with the
    /// lock held.
    pub(crate) fn on_fax_event(&self, state: &mut ChannelState, ev: &HardwareEvent) {
        match ev.code {
            EventCode::FaxTxResult => {
                state.call.fax_sending = false;
                self.fax_gate.complete(result_from(ev.add_info));
            }
            EventCode::FaxRxResult => {
                state.call.fax_receiving = false;
                self.fax_gate.complete(result_from(ev.add_info));
            }
            EventCode::FaxChannelFree => {
                // normally arrives after the result; with a fax still
                // flagged it means the engine bailed out
                if state.call.fax_sending || state.call.fax_receiving {
                    warn!(device = self.device(), channel = self.index(),
                        "fax engine released the channel mid-operation");
                    state.call.fax_sending = false;
                    state.call.fax_receiving = false;
                    self.fax_gate.complete(FaxResult::Failed(-1));
                }
            }
            _ => {}
        }
    }

    /// The channel is going away with a fax possibly in flight: stop the
    /// engine and wake any parked caller.
    pub(crate) fn fax_abort(&self, state: &mut ChannelState) {
        if state.call.fax_sending {
            self.try_command(HardwareCommand::StopFaxTx);
            state.call.fax_sending = false;
            self.fax_gate.complete(FaxResult::Failed(-1));
        }
        if state.call.fax_receiving {
            self.try_command(HardwareCommand::StopFaxRx);
            state.call.fax_receiving = false;
            self.fax_gate.complete(FaxResult::Failed(-1));
        }
    }
}

fn result_from(status: i32) -> FaxResult {
    if status == 0 {
        FaxResult::Done
    } else {
        FaxResult::Failed(status)
    }
}
