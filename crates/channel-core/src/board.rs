//! Device composition: channels, queues, workers and timers per board,
//! and the driver that owns all boards.
//!
//! The hardware callback thread never blocks: it pushes an envelope and
//! returns. Each board runs one event worker and one command worker, so
//! everything on one device is strictly ordered while devices proceed
//! independently. Global events (hardware fault, watchdog) are handled
//! at the driver callback and never enter a queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use trunkline_infra_common::fifo::{DispatchQueue, Worker};

use crate::bridge::sms::{sms_poll, SmsEngine};
use crate::call::CallVariant;
use crate::channel::{AppCommand, ChanTimer, Channel};
use crate::config::Options;
use crate::errors::{Error, Result};
use crate::host::SessionSink;
use crate::hw::{ChannelIndex, DeviceId, EventCode, HardwareClient, HardwareEvent, Signaling};

/// Per-device queue depth. Sized for the burst a full E1 produces when
/// the far exchange drops every call at once.
const QUEUE_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub channel: ChannelIndex,
    pub event: HardwareEvent,
}

#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub channel: ChannelIndex,
    pub command: AppCommand,
}

/// One physical device: its channels and their serialization machinery.
pub struct Board {
    device: DeviceId,
    channels: Vec<Arc<Channel>>,
    timers: Arc<ChanTimer>,
    event_queue: Arc<DispatchQueue<EventEnvelope>>,
    command_queue: Arc<DispatchQueue<CommandEnvelope>>,
    event_worker: Option<Worker>,
    command_worker: Option<Worker>,
}

impl Board {
    fn new(
        device: DeviceId,
        hw: Arc<dyn HardwareClient>,
        host: Arc<dyn SessionSink>,
        options: Arc<Options>,
    ) -> Result<Board> {
        let timers = Arc::new(ChanTimer::new(&format!("dev{}", device))?);

        let mut channels = Vec::with_capacity(hw.channel_count(device));
        for index in 0..hw.channel_count(device) {
            let signaling = hw.signaling(device, index);
            let trigger = options.transfer_trigger_digits.as_str();
            let variant = match signaling {
                Signaling::AnalogTrunk | Signaling::Inactive => CallVariant::fxo(trigger),
                Signaling::AnalogStation => CallVariant::fxs(trigger),
                Signaling::Isdn => CallVariant::isdn(trigger),
                Signaling::R2 => CallVariant::r2(options.r2_country),
                Signaling::Gsm => CallVariant::gsm(),
            };
            let chan = Channel::new(
                device,
                index,
                signaling,
                variant,
                hw.clone(),
                host.clone(),
                options.clone(),
                timers.clone(),
            );
            if signaling == Signaling::Gsm {
                *chan.sms.lock() = Some(SmsEngine::start(&chan)?);
                let delay = Duration::from_millis(options.sms_poll_interval_ms);
                timers.add(delay, sms_poll, Arc::downgrade(&chan));
            }
            channels.push(chan);
        }

        let event_queue = DispatchQueue::new(QUEUE_CAPACITY);
        let event_channels = channels.clone();
        let event_worker = Worker::spawn(
            &format!("dev{}-events", device),
            event_queue.clone(),
            move |env: EventEnvelope| -> Result<()> {
                let chan = event_channels
                    .get(env.channel)
                    .ok_or(Error::InvalidChannel(device, env.channel))?;
                chan.handle_event(&env.event)
            },
        )?;

        let command_queue = DispatchQueue::new(QUEUE_CAPACITY);
        let command_channels = channels.clone();
        let command_worker = Worker::spawn(
            &format!("dev{}-commands", device),
            command_queue.clone(),
            move |env: CommandEnvelope| -> Result<()> {
                let chan = command_channels
                    .get(env.channel)
                    .ok_or(Error::InvalidChannel(device, env.channel))?;
                chan.handle_command(&env.command)
            },
        )?;

        info!(device, channels = channels.len(), "board up");
        Ok(Board {
            device,
            channels,
            timers,
            event_queue,
            command_queue,
            event_worker: Some(event_worker),
            command_worker: Some(command_worker),
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    pub fn channel(&self, index: ChannelIndex) -> Result<&Arc<Channel>> {
        self.channels
            .get(index)
            .ok_or(Error::InvalidChannel(self.device, index))
    }

    /// Enqueue a hardware event for the event worker. Never blocks; a
    /// full queue is the caller's error to log.
    pub fn post_event(&self, channel: ChannelIndex, event: HardwareEvent) -> Result<()> {
        self.event_queue.push(EventEnvelope { channel, event })?;
        Ok(())
    }

    /// Enqueue an application command for the command worker.
    pub fn post_command(&self, channel: ChannelIndex, command: AppCommand) -> Result<()> {
        self.command_queue.push(CommandEnvelope { channel, command })?;
        Ok(())
    }

    /// Cooperative teardown: timers first so no callback races the
    /// draining workers, then the workers themselves.
    fn stop(&mut self) {
        self.timers.stop();
        for chan in &self.channels {
            chan.stop_sms();
        }
        self.event_queue.shutdown();
        self.command_queue.shutdown();
        if let Some(worker) = &mut self.event_worker {
            worker.stop();
        }
        if let Some(worker) = &mut self.command_worker {
            worker.stop();
        }
        info!(device = self.device, "board down");
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The whole driver: every board the hardware reports, plus the global
/// event filter.
pub struct Driver {
    boards: Vec<Board>,
}

impl Driver {
    pub fn start(
        hw: Arc<dyn HardwareClient>,
        host: Arc<dyn SessionSink>,
        options: Options,
    ) -> Result<Driver> {
        let options = Arc::new(options);
        let mut boards = Vec::with_capacity(hw.device_count());
        for device in 0..hw.device_count() {
            boards.push(Board::new(device, hw.clone(), host.clone(), options.clone())?);
        }
        info!(boards = boards.len(), "driver started");
        Ok(Driver { boards })
    }

    pub fn board(&self, device: DeviceId) -> Result<&Board> {
        self.boards.get(device).ok_or(Error::InvalidDevice(device))
    }

    pub fn channel(&self, device: DeviceId, channel: ChannelIndex) -> Result<&Arc<Channel>> {
        self.board(device)?.channel(channel)
    }

    /// SDK callback entry point. Runs on the SDK's thread and must
    /// return quickly: global events are logged here, everything else
    /// is enqueued for the device's event worker.
    pub fn on_hardware_event(
        &self,
        device: DeviceId,
        channel: ChannelIndex,
        event: HardwareEvent,
    ) -> Result<()> {
        match event.code {
            EventCode::HardwareFail => {
                error!(device, status = event.add_info, "hardware failure reported");
                Ok(())
            }
            EventCode::WatchdogCount => {
                warn!(device, count = event.add_info, "watchdog");
                Ok(())
            }
            EventCode::ClientReconnect => {
                info!(device, "client link reestablished");
                Ok(())
            }
            EventCode::AudioListenerTimeout => {
                warn!(device, channel, "audio listener timed out");
                Ok(())
            }
            _ => self.board(device)?.post_event(channel, event),
        }
    }

    /// Application command entry point; serialized per device.
    pub fn post_command(
        &self,
        device: DeviceId,
        channel: ChannelIndex,
        command: AppCommand,
    ) -> Result<()> {
        self.board(device)?.post_command(channel, command)
    }

    pub fn stop(&mut self) {
        for board in &mut self.boards {
            board.stop();
        }
    }
}
