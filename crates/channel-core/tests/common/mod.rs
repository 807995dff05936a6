//! Shared mocks: a scriptable hardware client and a recording host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use trunkline_channel_core::cause::Cause;
use trunkline_channel_core::host::{AllocFailure, SessionId, SessionSink, SmsIn};
use trunkline_channel_core::hw::{
    ChannelIndex, CommandError, DeviceId, HardwareClient, HardwareCommand, Signaling,
};

/// `RUST_LOG=trunkline_channel_core=debug cargo test` shows the engine's
/// own tracing alongside failures.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct MockHardware {
    devices: Vec<Vec<Signaling>>,
    commands: Mutex<Vec<(DeviceId, ChannelIndex, HardwareCommand)>>,
    /// Command name to refuse once with status -10.
    refuse: Mutex<Option<&'static str>>,
}

impl MockHardware {
    pub fn new(devices: Vec<Vec<Signaling>>) -> Arc<MockHardware> {
        init_logging();
        Arc::new(MockHardware {
            devices,
            commands: Mutex::new(Vec::new()),
            refuse: Mutex::new(None),
        })
    }

    pub fn single(signaling: Signaling, channels: usize) -> Arc<MockHardware> {
        Self::new(vec![vec![signaling; channels]])
    }

    pub fn refuse_next(&self, command: &'static str) {
        *self.refuse.lock().unwrap() = Some(command);
    }

    pub fn commands(&self) -> Vec<(DeviceId, ChannelIndex, HardwareCommand)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn command_names(&self, device: DeviceId, channel: ChannelIndex) -> Vec<&'static str> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, c, _)| *d == device && *c == channel)
            .map(|(_, _, cmd)| cmd.name())
            .collect()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    /// Poll until a command with this name shows up.
    pub fn wait_for_command(&self, device: DeviceId, channel: ChannelIndex, name: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.command_names(device, channel).contains(&name) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

impl HardwareClient for MockHardware {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn channel_count(&self, device: DeviceId) -> usize {
        self.devices.get(device).map(Vec::len).unwrap_or(0)
    }

    fn signaling(&self, device: DeviceId, channel: ChannelIndex) -> Signaling {
        self.devices[device][channel]
    }

    fn command(
        &self,
        device: DeviceId,
        channel: ChannelIndex,
        command: HardwareCommand,
    ) -> Result<(), CommandError> {
        let mut refuse = self.refuse.lock().unwrap();
        if *refuse == Some(command.name()) {
            let name = refuse.take().unwrap();
            return Err(CommandError {
                command: name,
                status: -10,
            });
        }
        drop(refuse);
        self.commands.lock().unwrap().push((device, channel, command));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Allocated(SessionId),
    Answered(SessionId),
    MarkedAnswered(SessionId),
    RingReady(SessionId),
    PreAnswered(SessionId),
    Hangup(SessionId, Cause),
    Dtmf(SessionId, char),
    Variable(SessionId, String, String),
    Sms(DeviceId, ChannelIndex, SmsIn),
}

pub struct MockHost {
    next_session: AtomicU64,
    actions: Mutex<Vec<HostAction>>,
    refuse_alloc: AtomicBool,
    /// Application-side cause per session, consulted on hangup.
    causes: Mutex<HashMap<u64, Cause>>,
}

impl MockHost {
    pub fn new() -> Arc<MockHost> {
        Arc::new(MockHost {
            next_session: AtomicU64::new(1),
            actions: Mutex::new(Vec::new()),
            refuse_alloc: AtomicBool::new(false),
            causes: Mutex::new(HashMap::new()),
        })
    }

    pub fn refuse_allocations(&self, refuse: bool) {
        self.refuse_alloc.store(refuse, Ordering::SeqCst);
    }

    pub fn set_cause(&self, session: SessionId, cause: Cause) {
        self.causes.lock().unwrap().insert(session.0, cause);
    }

    pub fn actions(&self) -> Vec<HostAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn dtmf_digits(&self) -> String {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                HostAction::Dtmf(_, d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn last_session(&self) -> Option<SessionId> {
        self.actions().into_iter().rev().find_map(|a| match a {
            HostAction::Allocated(s) => Some(s),
            _ => None,
        })
    }

    /// Poll until a predicate over the recorded actions holds.
    pub fn wait_until<F: Fn(&[HostAction]) -> bool>(&self, pred: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if pred(&self.actions()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn record(&self, action: HostAction) {
        self.actions.lock().unwrap().push(action);
    }
}

impl SessionSink for MockHost {
    fn allocate(
        &self,
        _device: DeviceId,
        _channel: ChannelIndex,
        _orig: &str,
        _dest: &str,
    ) -> Result<SessionId, AllocFailure> {
        if self.refuse_alloc.load(Ordering::SeqCst) {
            return Err(AllocFailure);
        }
        let session = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
        self.record(HostAction::Allocated(session));
        Ok(session)
    }

    fn answer(&self, session: SessionId) {
        self.record(HostAction::Answered(session));
    }

    fn mark_answered(&self, session: SessionId) {
        self.record(HostAction::MarkedAnswered(session));
    }

    fn mark_ring_ready(&self, session: SessionId) {
        self.record(HostAction::RingReady(session));
    }

    fn mark_pre_answered(&self, session: SessionId) {
        self.record(HostAction::PreAnswered(session));
    }

    fn hangup(&self, session: SessionId, cause: Cause) {
        self.record(HostAction::Hangup(session, cause));
    }

    fn queue_dtmf(&self, session: SessionId, digit: char) {
        self.record(HostAction::Dtmf(session, digit));
    }

    fn set_variable(&self, session: SessionId, name: &str, value: &str) {
        self.record(HostAction::Variable(
            session,
            name.to_string(),
            value.to_string(),
        ));
    }

    fn current_cause(&self, session: SessionId) -> Option<Cause> {
        self.causes.lock().unwrap().get(&session.0).copied()
    }

    fn sms_received(&self, device: DeviceId, channel: ChannelIndex, sms: SmsIn) {
        self.record(HostAction::Sms(device, channel, sms));
    }
}
