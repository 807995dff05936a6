//! Error taxonomy for the channel engine.
//!
//! Lock contention is recoverable (abandon the invocation, the next
//! event retries fresh). Hardware command failures turn into a cause on
//! the call and a cleanup. Allocation failure refuses the call at
//! signaling level. Invalid indices abort one operation, never a worker.

use thiserror::Error;

use trunkline_infra_common::fifo::QueueError;
use trunkline_infra_common::lock::LockError;

use crate::hw::{ChannelIndex, CommandError, DeviceId};
use crate::host::AllocFailure;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    LockBusy(#[from] LockError),

    #[error(transparent)]
    CommandFailed(#[from] CommandError),

    #[error("no session available for incoming call")]
    NoSessionAvailable,

    #[error("invalid device {0}")]
    InvalidDevice(DeviceId),

    #[error("invalid channel {1} on device {0}")]
    InvalidChannel(DeviceId, ChannelIndex),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("channel has no active call")]
    NotConnected,

    #[error("channel is busy with another call")]
    ChannelBusy,

    #[error("operation already in progress")]
    OperationInProgress,

    #[error("sms engine is shut down")]
    SmsShutdown,

    #[error("operation not supported on this signaling")]
    UnsupportedSignaling,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<AllocFailure> for Error {
    fn from(_: AllocFailure) -> Self {
        Error::NoSessionAvailable
    }
}

pub type Result<T> = std::result::Result<T, Error>;
