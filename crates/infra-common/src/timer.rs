//! Named, cancellable one-shot timers, one collection per device.
//!
//! A timer fires its callback once after the configured delay unless it
//! is deleted or restarted first. Indices are generation-checked:
//! restarting or deleting an index that already fired (or was never
//! armed) is a no-op, not an error. The scheduler thread invokes
//! callbacks with no lock pre-acquired; a callback must re-check the
//! state that armed it, because the target may have been cleaned up
//! between scheduling and firing.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Opaque handle into a [`TimerSet`]. The default value is invalid and
/// safe to `restart`/`del` (both are no-ops).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerIndex {
    slot: usize,
    generation: u64,
}

impl TimerIndex {
    pub const INVALID: TimerIndex = TimerIndex {
        slot: usize::MAX,
        generation: 0,
    };

    pub fn reset(&mut self) {
        *self = TimerIndex::INVALID;
    }

    pub fn is_valid(&self) -> bool {
        self.slot != usize::MAX
    }
}

impl Default for TimerIndex {
    fn default() -> Self {
        TimerIndex::INVALID
    }
}

struct Entry<T> {
    deadline: Instant,
    delay: Duration,
    callback: fn(T),
    data: T,
    generation: u64,
}

struct TimerState<T> {
    slots: Vec<Option<Entry<T>>>,
    free: Vec<usize>,
    next_generation: u64,
    shutdown: bool,
}

struct TimerShared<T> {
    state: Mutex<TimerState<T>>,
    wake: Condvar,
}

/// A collection of one-shot timers driven by a single scheduler thread.
pub struct TimerSet<T: Clone + Send + 'static> {
    shared: Arc<TimerShared<T>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + 'static> TimerSet<T> {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                slots: Vec::new(),
                free: Vec::new(),
                next_generation: 1,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-timer", name))
            .spawn(move || Self::run(thread_shared))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Arm a one-shot timer. The callback receives `data` when it fires.
    pub fn add(&self, delay: Duration, callback: fn(T), data: T) -> TimerIndex {
        let mut state = self.shared.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;

        let entry = Entry {
            deadline: Instant::now() + delay,
            delay,
            callback,
            data,
            generation,
        };

        let slot = match state.free.pop() {
            Some(slot) => {
                state.slots[slot] = Some(entry);
                slot
            }
            None => {
                state.slots.push(Some(entry));
                state.slots.len() - 1
            }
        };
        drop(state);
        self.shared.wake.notify_one();

        TimerIndex { slot, generation }
    }

    /// Push an armed timer's deadline back by its original delay.
    /// No-op for dead indices.
    pub fn restart(&self, index: TimerIndex) {
        let mut state = self.shared.state.lock();
        let rearmed = match Self::entry_mut(&mut state, index) {
            Some(entry) => {
                entry.deadline = Instant::now() + entry.delay;
                true
            }
            None => false,
        };
        drop(state);
        if rearmed {
            self.shared.wake.notify_one();
        }
    }

    /// Cancel an armed timer. Returns whether it was still armed.
    pub fn del(&self, index: TimerIndex) -> bool {
        let mut state = self.shared.state.lock();
        if Self::entry_mut(&mut state, index).is_some() {
            state.slots[index.slot] = None;
            state.free.push(index.slot);
            drop(state);
            self.shared.wake.notify_one();
            true
        } else {
            false
        }
    }

    /// Stop the scheduler thread. Armed timers never fire after this.
    /// Safe to call from any holder of the set; later calls are no-ops.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn entry_mut<'a>(
        state: &'a mut TimerState<T>,
        index: TimerIndex,
    ) -> Option<&'a mut Entry<T>> {
        if !index.is_valid() {
            return None;
        }
        let slot = state.slots.get_mut(index.slot)?;
        match slot {
            Some(entry) if entry.generation == index.generation => Some(entry),
            _ => None,
        }
    }

    fn run(shared: Arc<TimerShared<T>>) {
        debug!("timer scheduler started");
        let mut state = shared.state.lock();
        loop {
            if state.shutdown {
                break;
            }

            let now = Instant::now();
            let mut due: Option<(usize, Instant)> = None;
            for (slot, entry) in state.slots.iter().enumerate() {
                if let Some(entry) = entry {
                    match due {
                        Some((_, deadline)) if entry.deadline >= deadline => {}
                        _ => due = Some((slot, entry.deadline)),
                    }
                }
            }

            match due {
                None => {
                    shared.wake.wait(&mut state);
                }
                Some((_, deadline)) if deadline > now => {
                    // re-evaluated on wake: the nearest timer may change
                    let _ = shared.wake.wait_until(&mut state, deadline);
                }
                Some((slot, _)) => {
                    // expired: take it out before invoking, so the
                    // callback can re-arm freely
                    let entry = state.slots[slot].take();
                    state.free.push(slot);
                    if let Some(entry) = entry {
                        drop(state);
                        (entry.callback)(entry.data);
                        state = shared.state.lock();
                    }
                }
            }
        }
        debug!("timer scheduler stopped");
    }
}

impl<T: Clone + Send + 'static> Drop for TimerSet<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Counter = Arc<AtomicUsize>;

    fn bump(counter: Counter) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_for(counter: &Counter, value: usize, max: Duration) -> bool {
        let deadline = Instant::now() + max;
        while counter.load(Ordering::SeqCst) < value {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    #[test]
    fn fires_once_after_delay() {
        let timers = TimerSet::new("t0").unwrap();
        let counter: Counter = Arc::new(AtomicUsize::new(0));
        timers.add(Duration::from_millis(20), bump, counter.clone());
        assert!(wait_for(&counter, 1, Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn del_prevents_firing() {
        let timers = TimerSet::new("t1").unwrap();
        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let idx = timers.add(Duration::from_millis(30), bump, counter.clone());
        assert!(timers.del(idx));
        thread::sleep(Duration::from_millis(80));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        // deleting again is a no-op
        assert!(!timers.del(idx));
    }

    #[test]
    fn restart_extends_deadline() {
        let timers = TimerSet::new("t2").unwrap();
        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let idx = timers.add(Duration::from_millis(60), bump, counter.clone());
        thread::sleep(Duration::from_millis(30));
        timers.restart(idx);
        thread::sleep(Duration::from_millis(40));
        // without the restart this would have fired by now
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(wait_for(&counter, 1, Duration::from_secs(2)));
    }

    #[test]
    fn stale_index_is_noop() {
        let timers = TimerSet::new("t3").unwrap();
        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let idx = timers.add(Duration::from_millis(10), bump, counter.clone());
        assert!(wait_for(&counter, 1, Duration::from_secs(2)));
        // fired: both restart and del must be inert now
        timers.restart(idx);
        assert!(!timers.del(idx));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_default_index_is_safe() {
        let timers: TimerSet<Counter> = TimerSet::new("t4").unwrap();
        let idx = TimerIndex::default();
        assert!(!idx.is_valid());
        timers.restart(idx);
        assert!(!timers.del(idx));
    }

    #[test]
    fn slot_reuse_does_not_resurrect_old_index() {
        let timers = TimerSet::new("t5").unwrap();
        let counter: Counter = Arc::new(AtomicUsize::new(0));
        let old = timers.add(Duration::from_secs(30), bump, counter.clone());
        assert!(timers.del(old));
        // the freed slot gets a new generation
        let fresh = timers.add(Duration::from_secs(30), bump, counter.clone());
        assert!(!timers.del(old));
        assert!(timers.del(fresh));
    }
}
