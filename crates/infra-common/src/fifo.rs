//! Bounded dispatch queues and their worker threads.
//!
//! One queue + one worker per physical device, twice over (events in,
//! commands out). The producer side never blocks: the hardware callback
//! thread enqueues and returns, and a full queue is an error it can log,
//! not a stall. The worker pops one envelope at a time and only reclaims
//! queue capacity after the handler has returned (consume-commit), so a
//! burst cannot overwrite an envelope that is still being processed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue full (capacity {0})")]
    Full(usize),
    #[error("queue shut down")]
    Shutdown,
}

struct QueueState<T> {
    items: VecDeque<T>,
    /// Envelopes handed to the worker but not yet committed. Counts
    /// against capacity.
    in_flight: usize,
    shutdown: bool,
}

/// A bounded FIFO shared between producers and exactly one worker.
pub struct DispatchQueue<T> {
    state: Mutex<QueueState<T>>,
    wake: Condvar,
    capacity: usize,
}

impl<T> DispatchQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                in_flight: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue without ever blocking the caller beyond the mutex.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(QueueError::Shutdown);
        }
        if state.items.len() + state.in_flight >= self.capacity {
            return Err(QueueError::Full(self.capacity));
        }
        state.items.push_back(item);
        drop(state);
        self.wake.notify_one();
        Ok(())
    }

    /// Worker side: block until an envelope is available or shutdown is
    /// requested. The returned envelope stays counted against capacity
    /// until [`commit`](Self::commit).
    pub fn begin_consume(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                state.in_flight += 1;
                return Some(item);
            }
            self.wake.wait(&mut state);
        }
    }

    /// Worker side: the envelope handed out by `begin_consume` has been
    /// fully processed; reclaim its capacity.
    pub fn commit(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0);
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        // a producer may be waiting to learn there is room again; it
        // never blocks, but wake the worker in case of races on shutdown
        self.wake.notify_one();
    }

    /// Request cooperative shutdown. Remaining envelopes are dropped,
    /// not processed.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        drop(state);
        self.wake.notify_all();
    }

    /// Take everything still queued, typically after
    /// [`shutdown`](Self::shutdown) so the owner can dispose of the
    /// unprocessed envelopes.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.items.drain(..).collect()
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

/// A dedicated worker thread draining one [`DispatchQueue`].
///
/// Handler errors are logged with the envelope identity and the loop
/// moves on: a single bad envelope must never kill the worker.
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    stop: Box<dyn Fn() + Send + Sync>,
}

impl Worker {
    pub fn spawn<T, E, F>(
        name: &str,
        queue: Arc<DispatchQueue<T>>,
        mut handler: F,
    ) -> std::io::Result<Self>
    where
        T: fmt::Debug + Send + 'static,
        E: fmt::Display,
        F: FnMut(T) -> Result<(), E> + Send + 'static,
    {
        let thread_queue = queue.clone();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(worker = %thread_name, "worker started");
                while let Some(item) = thread_queue.begin_consume() {
                    let identity = format!("{:?}", item);
                    if let Err(err) = handler(item) {
                        error!(worker = %thread_name, envelope = %identity, %err,
                            "handler failed, continuing");
                    }
                    thread_queue.commit();
                }
                debug!(worker = %thread_name, "worker stopped");
            })?;

        let stop_queue = queue;
        Ok(Worker {
            name: name.to_string(),
            handle: Some(handle),
            stop: Box::new(move || stop_queue.shutdown()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal shutdown and join the thread.
    pub fn stop(&mut self) {
        (self.stop)();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn push_full_is_error_not_block() {
        let queue = DispatchQueue::new(2);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(QueueError::Full(2)));
    }

    #[test]
    fn push_after_shutdown_is_error() {
        let queue = DispatchQueue::new(2);
        queue.shutdown();
        assert_eq!(queue.push(1u32), Err(QueueError::Shutdown));
    }

    #[test]
    fn capacity_reclaimed_only_after_commit() {
        let queue = DispatchQueue::new(1);
        queue.push(1u32).unwrap();
        let item = queue.begin_consume().unwrap();
        assert_eq!(item, 1);
        // popped but uncommitted: still full
        assert_eq!(queue.push(2), Err(QueueError::Full(1)));
        queue.commit();
        queue.push(2).unwrap();
    }

    #[test]
    fn worker_processes_in_fifo_order() {
        let queue = DispatchQueue::new(64);
        let (tx, rx) = mpsc::channel();
        let mut worker = Worker::spawn("test-fifo", queue.clone(), move |n: u32| {
            tx.send(n).unwrap();
            Ok::<(), QueueError>(())
        })
        .unwrap();

        for n in 0..32u32 {
            queue.push(n).unwrap();
        }
        let got: Vec<u32> = (0..32).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(got, (0..32).collect::<Vec<_>>());
        worker.stop();
    }

    #[test]
    fn worker_survives_handler_errors() {
        let queue = DispatchQueue::new(8);
        let ok = Arc::new(AtomicUsize::new(0));
        let seen = ok.clone();
        let mut worker = Worker::spawn("test-errs", queue.clone(), move |n: u32| {
            if n % 2 == 0 {
                Err(QueueError::Full(0))
            } else {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        for n in 0..6u32 {
            queue.push(n).unwrap();
        }
        // give the worker time to drain
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ok.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ok.load(Ordering::SeqCst), 3);
        worker.stop();
    }

    #[test]
    fn drain_returns_leftovers_after_shutdown() {
        let queue = DispatchQueue::new(8);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        queue.shutdown();
        assert_eq!(queue.drain(), vec![1, 2]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn shutdown_exits_without_draining() {
        let queue = DispatchQueue::new(8);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        queue.shutdown();
        assert!(queue.begin_consume().is_none());
    }
}
