//! Condition-variable handshake between a blocked application call and
//! the event worker that eventually learns the outcome.
//!
//! The fax and SMS bridges park the calling thread here after issuing
//! the start command; the matching completion event posts the result and
//! wakes it. There is deliberately no timeout on [`wait`]: the hardware
//! is relied upon to always deliver a completion (or failure) event.
//! Test harnesses use [`wait_for`] instead.
//!
//! [`wait`]: CompletionGate::wait
//! [`wait_for`]: CompletionGate::wait_for

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

pub struct CompletionGate<R> {
    result: Mutex<Option<R>>,
    signal: Condvar,
}

impl<R: Clone> CompletionGate<R> {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(None),
            signal: Condvar::new(),
        }
    }

    /// Discard any stale result before starting a new operation.
    pub fn reset(&self) {
        *self.result.lock() = None;
    }

    /// Post the outcome and wake the waiter.
    pub fn complete(&self, result: R) {
        *self.result.lock() = Some(result);
        self.signal.notify_all();
    }

    /// Block until a result is posted. No timeout by design.
    pub fn wait(&self) -> R {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            self.signal.wait(&mut slot);
        }
    }

    /// Bounded wait, for tests and harnesses only.
    pub fn wait_for(&self, bound: Duration) -> Option<R> {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.take() {
                return Some(result);
            }
            if self.signal.wait_for(&mut slot, bound).timed_out() {
                return slot.take();
            }
        }
    }

    /// Non-blocking peek used by pollers.
    pub fn try_take(&self) -> Option<R> {
        self.result.lock().take()
    }
}

impl<R: Clone> Default for CompletionGate<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn complete_wakes_waiter() {
        let gate = Arc::new(CompletionGate::new());
        let waiter = gate.clone();
        let handle = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(20));
        gate.complete(42u32);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn wait_for_times_out_without_result() {
        let gate: CompletionGate<u32> = CompletionGate::new();
        assert_eq!(gate.wait_for(Duration::from_millis(20)), None);
    }

    #[test]
    fn reset_discards_stale_result() {
        let gate = CompletionGate::new();
        gate.complete(1u32);
        gate.reset();
        assert_eq!(gate.try_take(), None);
    }

    #[test]
    fn result_consumed_once() {
        let gate = CompletionGate::new();
        gate.complete(7u32);
        assert_eq!(gate.wait(), 7);
        assert_eq!(gate.try_take(), None);
    }
}
