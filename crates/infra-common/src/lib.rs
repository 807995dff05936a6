//! Common infrastructure for the trunkline channel driver.
//!
//! This crate carries the concurrency plumbing the per-device engine is
//! built on, with no knowledge of calls or signaling:
//!
//! - [`lock`]: per-channel bounded-wait mutual exclusion
//! - [`fifo`]: bounded dispatch queues + worker threads (consume-commit)
//! - [`timer`]: cancellable one-shot timer collections
//! - [`gate`]: completion handshakes for blocking application calls

pub mod fifo;
pub mod gate;
pub mod lock;
pub mod timer;

pub use fifo::{DispatchQueue, QueueError, Worker};
pub use gate::CompletionGate;
pub use lock::{ChanLock, ChanLockGuard, LockError};
pub use timer::{TimerIndex, TimerSet};
