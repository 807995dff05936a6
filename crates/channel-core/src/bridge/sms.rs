//! SMS sending through a per-channel worker.
//!
//! Sends are serialized by a small dispatch queue: the application
//! enqueues a job and parks on its gate; the worker takes the channel
//! lock, issues the send command, and waits for the modem's result
//! event before touching the next job. Jobs dropped unprocessed (engine
//! shutdown, full queue teardown) complete their gate with a failure so
//! no caller is left parked.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use trunkline_infra_common::fifo::{DispatchQueue, Worker};
use trunkline_infra_common::gate::CompletionGate;

use crate::channel::{timer_entry, Channel};
use crate::errors::{Error, Result};
use crate::hw::HardwareCommand;

/// Outcome of one SMS send, from the modem's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsSendOutcome {
    Sent,
    /// Modem error code.
    Failed(i32),
}

const SMS_QUEUE_CAPACITY: usize = 16;

struct SmsJob {
    dest: String,
    body: String,
    confirmation: bool,
    /// Taken on completion; still present at drop means nobody answered
    /// the caller yet.
    done: Option<Arc<CompletionGate<SmsSendOutcome>>>,
}

impl SmsJob {
    fn finish(&mut self, outcome: SmsSendOutcome) {
        if let Some(gate) = self.done.take() {
            gate.complete(outcome);
        }
    }
}

impl Drop for SmsJob {
    fn drop(&mut self) {
        self.finish(SmsSendOutcome::Failed(-1));
    }
}

impl fmt::Debug for SmsJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsJob")
            .field("dest", &self.dest)
            .field("body_len", &self.body.len())
            .field("confirmation", &self.confirmation)
            .finish()
    }
}

/// One send worker per GSM channel.
pub struct SmsEngine {
    queue: Arc<DispatchQueue<SmsJob>>,
    worker: Option<Worker>,
    stopping: Arc<AtomicBool>,
}

impl SmsEngine {
    pub(crate) fn start(chan: &Arc<Channel>) -> std::io::Result<SmsEngine> {
        let queue = DispatchQueue::new(SMS_QUEUE_CAPACITY);
        let stopping = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(chan);
        let flag = stopping.clone();
        let name = format!("sms-{}-{}", chan.device(), chan.index());
        let worker = Worker::spawn(&name, queue.clone(), move |mut job: SmsJob| {
            let Some(chan) = weak.upgrade() else {
                return Err(Error::SmsShutdown);
            };
            chan.sms_do_send(&mut job, &flag)
        })?;
        Ok(SmsEngine {
            queue,
            worker: Some(worker),
            stopping,
        })
    }

    /// Shutdown must wake the worker wherever it is parked: the queue
    /// when it is between jobs, or the channel's result gate when the
    /// modem never answered a send in flight. Jobs still queued are
    /// drained so their callers get a failure instead of staying parked.
    pub(crate) fn stop(&mut self, gate: &CompletionGate<SmsSendOutcome>) {
        self.stopping.store(true, Ordering::SeqCst);
        self.queue.shutdown();
        self.queue.drain();
        gate.complete(SmsSendOutcome::Failed(-1));
        if let Some(worker) = &mut self.worker {
            worker.stop();
        }
    }
}

impl Channel {
    pub(crate) fn stop_sms(&self) {
        if let Some(engine) = self.sms.lock().as_mut() {
            engine.stop(&self.sms_gate);
        }
    }
    /// Send an SMS and block until the modem reports the outcome.
    pub fn send_sms(&self, dest: &str, body: &str, confirmation: bool) -> Result<SmsSendOutcome> {
        let done = Arc::new(CompletionGate::new());
        let job = SmsJob {
            dest: dest.to_string(),
            body: body.to_string(),
            confirmation,
            done: Some(done.clone()),
        };
        {
            let engine = self.sms.lock();
            match engine.as_ref() {
                Some(engine) => engine.queue.push(job)?,
                None => return Err(Error::SmsShutdown),
            }
        }
        Ok(done.wait())
    }

    /// Worker side of one job: command the modem under the channel
    /// lock, then wait unlocked for the result event.
    fn sms_do_send(&self, job: &mut SmsJob, stopping: &AtomicBool) -> Result<()> {
        let issued = {
            let _state = self.lock()?;
            self.sms_gate.reset();
            self.command(HardwareCommand::SendSms {
                dest: job.dest.clone(),
                body: job.body.clone(),
                confirmation: job.confirmation,
            })
        };
        match issued {
            Ok(()) => {
                // checked after the reset above: a stop that completed
                // the gate before the reset still sets the flag first
                if stopping.load(Ordering::SeqCst) {
                    job.finish(SmsSendOutcome::Failed(-1));
                    return Err(Error::SmsShutdown);
                }
                let outcome = self.sms_gate.wait();
                job.finish(outcome);
                Ok(())
            }
            Err(err) => {
                job.finish(SmsSendOutcome::Failed(-1));
                Err(err)
            }
        }
    }
}

/// Periodic modem poll for messages missed while the event stream was
/// down. One-shot timers re-arm themselves each period.
pub(crate) fn sms_poll(chan: Weak<Channel>) {
    timer_entry(chan, "sms-poll", |chan| {
        chan.try_command(HardwareCommand::CheckNewSms);
        let delay = Duration::from_millis(chan.options.sms_poll_interval_ms);
        let _ = chan.timers.add(delay, sms_poll, chan.me.clone());
        Ok(())
    });
}
