//! Per-channel mutual exclusion with a bounded acquisition wait.
//!
//! Every event handler, command handler and timer callback that touches
//! call state must hold the channel lock for the duration of that touch.
//! Acquisition is allowed to fail: the caller logs the failure and
//! abandons the current invocation instead of blocking forever. The next
//! event or command re-enters the handler fresh.
//!
//! The lock owns the state it protects; the guard is the only way to
//! reach it, and releases on drop on every exit path.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

/// Bound on how long `acquire` waits before giving up.
///
/// A handler stuck behind a lock for longer than this is a sign the
/// owner is wedged; the contract says fail observably rather than pile
/// up behind it.
pub const ACQUIRE_BOUND: Duration = Duration::from_millis(2500);

/// Lock acquisition failure. Recoverable by contract: abandon the
/// current operation, the next event retries fresh.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("channel lock busy after {0:?}")]
    Busy(Duration),
}

/// A per-channel lock owning the channel's mutable state.
#[derive(Debug, Default)]
pub struct ChanLock<T> {
    inner: Mutex<T>,
}

/// Guard returned by a successful [`ChanLock::acquire`].
pub struct ChanLockGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> ChanLock<T> {
    pub fn new(state: T) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Try to take the lock, waiting up to [`ACQUIRE_BOUND`].
    pub fn acquire(&self) -> Result<ChanLockGuard<'_, T>, LockError> {
        self.acquire_for(ACQUIRE_BOUND)
    }

    /// Same as [`acquire`](Self::acquire) with an explicit bound.
    pub fn acquire_for(&self, bound: Duration) -> Result<ChanLockGuard<'_, T>, LockError> {
        match self.inner.try_lock_for(bound) {
            Some(guard) => Ok(ChanLockGuard { guard }),
            None => Err(LockError::Busy(bound)),
        }
    }
}

impl<'a, T> Deref for ChanLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> DerefMut for ChanLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
