//! Boundary with the hardware vendor SDK.
//!
//! The SDK registers a callback that delivers `(device, channel, event)`
//! tuples on its own thread and accepts synchronous command submissions.
//! Nothing here talks to real hardware: the trait is implemented by the
//! vendor shim outside this crate, and by mocks in tests.

use std::collections::BTreeMap;

use thiserror::Error;

pub type DeviceId = usize;
pub type ChannelIndex = usize;

/// Line signaling a channel speaks, reported per channel by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signaling {
    /// Analog trunk (loop start towards the central office).
    AnalogTrunk,
    /// Analog station (a phone set plugged into us).
    AnalogStation,
    /// Digital PRI, Q.931 signaling.
    Isdn,
    /// Digital R2/MFC, per-country register signaling.
    R2,
    /// GSM radio module.
    Gsm,
    /// Channel present but not configured for calls.
    Inactive,
}

/// Asynchronous notification codes delivered by the SDK.
///
/// Per-channel codes route through the device event queue; global codes
/// (hardware fail, watchdog) are handled at the driver callback and never
/// reach a channel handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    // call lifecycle
    NewCall,
    CallSuccess,
    CallFail,
    Connect,
    Disconnect,
    ChannelFree,
    ChannelFail,
    NoAnswer,
    // media / progress
    AudioStatus,
    CadenceRecognized,
    DtmfDetected,
    DtmfSendFinish,
    // trunk signaling detail
    SeizureStart,
    NumberDetected,
    CollectCall,
    CallAnswerInfo,
    RingDetected,
    PoleReversal,
    // station
    Offhook,
    Onhook,
    FlashDetected,
    // ISDN
    IsdnProgressIndicator,
    UserInformation,
    SsTransferFail,
    // fax
    FaxChannelFree,
    FaxTxResult,
    FaxRxResult,
    // GSM / SMS
    SmsInfo,
    SmsData,
    SmsSendResult,
    // global (driver-level, never enqueued)
    HardwareFail,
    WatchdogCount,
    ClientReconnect,
    AudioListenerTimeout,
    // anything the engine has no treatment for
    Untreated(i32),
}

/// One hardware notification as delivered by the SDK callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareEvent {
    pub code: EventCode,
    /// Code-specific integer payload (fail code, DTMF digit, status...).
    pub add_info: i32,
    /// Named string parameters attached to the event.
    pub params: BTreeMap<String, String>,
}

impl HardwareEvent {
    pub fn new(code: EventCode) -> Self {
        Self {
            code,
            add_info: 0,
            params: BTreeMap::new(),
        }
    }

    pub fn with_info(code: EventCode, add_info: i32) -> Self {
        Self {
            code,
            add_info,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The DTMF digit carried by `DtmfDetected`/`DtmfSendFinish`.
    pub fn digit(&self) -> Option<char> {
        u32::try_from(self.add_info).ok().and_then(char::from_u32)
    }
}

/// Mixer tone sources for local indication playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerTone {
    Silence,
    Dialtone,
    Ringback,
    Busy,
    FastBusy,
}

/// Audio path direction for gain adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDir {
    Input,
    Output,
}

/// Synchronous commands submitted to the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCommand {
    MakeCall {
        orig: String,
        dest: String,
    },
    /// Answer the incoming call.
    Connect,
    Disconnect,
    /// Signal ringback towards the caller; `cause` carries a signaling
    /// fail code when ringing is a polite refusal.
    RingBack {
        cause: Option<i32>,
    },
    /// Open the audio path before answer (early media).
    PreConnect,
    DialDtmf(String),
    Flash,
    SsTransfer {
        dest: String,
        await_connect: bool,
    },
    StartCadence {
        on_ms: u32,
        off_ms: u32,
        on2_ms: u32,
        off2_ms: u32,
    },
    StopCadence,
    MixerSetup(MixerTone),
    StartStream,
    StopStream,
    StartListen,
    StopListen,
    SetVolume {
        dir: VolumeDir,
        gain: i32,
    },
    EchoCancel(bool),
    DtmfSuppression(bool),
    AutoGainControl(bool),
    /// R2 incoming: the collected number is complete.
    EndOfNumber,
    /// R2 incoming: accept/refuse with a condition code.
    SeizeAnswer {
        condition: i32,
    },
    RingGenerate {
        on_ms: u32,
        off_ms: u32,
    },
    RingStop,
    SendSms {
        dest: String,
        body: String,
        confirmation: bool,
    },
    /// Ask the GSM modem for messages received while we were not looking.
    CheckNewSms,
    StartFaxTx {
        files: String,
        orig: String,
    },
    AddFaxFile {
        file: String,
        last: bool,
    },
    StopFaxTx,
    StartFaxRx {
        file: String,
    },
    StopFaxRx,
}

/// Failure status returned by the SDK for a rejected command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("hardware refused {command}: status {status}")]
pub struct CommandError {
    pub command: &'static str,
    pub status: i32,
}

impl HardwareCommand {
    /// Stable name used in logs and command-failure errors.
    pub fn name(&self) -> &'static str {
        match self {
            HardwareCommand::MakeCall { .. } => "MakeCall",
            HardwareCommand::Connect => "Connect",
            HardwareCommand::Disconnect => "Disconnect",
            HardwareCommand::RingBack { .. } => "RingBack",
            HardwareCommand::PreConnect => "PreConnect",
            HardwareCommand::DialDtmf(_) => "DialDtmf",
            HardwareCommand::Flash => "Flash",
            HardwareCommand::SsTransfer { .. } => "SsTransfer",
            HardwareCommand::StartCadence { .. } => "StartCadence",
            HardwareCommand::StopCadence => "StopCadence",
            HardwareCommand::MixerSetup(_) => "MixerSetup",
            HardwareCommand::StartStream => "StartStream",
            HardwareCommand::StopStream => "StopStream",
            HardwareCommand::StartListen => "StartListen",
            HardwareCommand::StopListen => "StopListen",
            HardwareCommand::SetVolume { .. } => "SetVolume",
            HardwareCommand::EchoCancel(_) => "EchoCancel",
            HardwareCommand::DtmfSuppression(_) => "DtmfSuppression",
            HardwareCommand::AutoGainControl(_) => "AutoGainControl",
            HardwareCommand::EndOfNumber => "EndOfNumber",
            HardwareCommand::SeizeAnswer { .. } => "SeizeAnswer",
            HardwareCommand::RingGenerate { .. } => "RingGenerate",
            HardwareCommand::RingStop => "RingStop",
            HardwareCommand::SendSms { .. } => "SendSms",
            HardwareCommand::CheckNewSms => "CheckNewSms",
            HardwareCommand::StartFaxTx { .. } => "StartFaxTx",
            HardwareCommand::AddFaxFile { .. } => "AddFaxFile",
            HardwareCommand::StopFaxTx => "StopFaxTx",
            HardwareCommand::StartFaxRx { .. } => "StartFaxRx",
            HardwareCommand::StopFaxRx => "StopFaxRx",
        }
    }
}

/// The command/query side of the vendor SDK.
///
/// Implementations must be callable from any thread; the command router
/// guarantees per-device submission order, not this trait.
pub trait HardwareClient: Send + Sync {
    fn device_count(&self) -> usize;

    fn channel_count(&self, device: DeviceId) -> usize;

    fn signaling(&self, device: DeviceId, channel: ChannelIndex) -> Signaling;

    fn command(
        &self,
        device: DeviceId,
        channel: ChannelIndex,
        command: HardwareCommand,
    ) -> Result<(), CommandError>;
}
