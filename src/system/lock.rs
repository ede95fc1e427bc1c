//! Cooperative locks guarding shared client resources.
//!
//! The MQTT client guards three independent resources: its connection state,
//! its TX path and its RX path. Each is protected by a [`Lock`] and acquired
//! according to a [`LockPolicy`]. Single-threaded firmware uses [`NoLock`];
//! firmware that shares a link with an interrupt handler or a second task can
//! hand the client `&SpinLock` references it also holds elsewhere.

use core::sync::atomic::{AtomicBool, Ordering};

/// How a lock is acquired.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockPolicy {
    /// Try once and fail fast with a busy error.
    #[default]
    TryOnce,
    /// Spin until the lock is acquired.
    Block,
}

/// The lock is held by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Busy;

/// A mutual-exclusion primitive.
pub trait Lock {
    /// Attempt to take the lock without waiting.
    fn try_lock(&self) -> bool;

    /// Release a lock taken by [`try_lock`](Lock::try_lock).
    fn unlock(&self);

    /// Take the lock according to `policy`, returning a guard that releases
    /// it when dropped.
    fn acquire(&self, policy: LockPolicy) -> Result<LockGuard<'_, Self>, Busy> {
        loop {
            if self.try_lock() {
                return Ok(LockGuard { lock: self });
            }
            if policy == LockPolicy::TryOnce {
                return Err(Busy);
            }
            core::hint::spin_loop();
        }
    }
}

impl<L: Lock + ?Sized> Lock for &L {
    fn try_lock(&self) -> bool {
        (**self).try_lock()
    }

    fn unlock(&self) {
        (**self).unlock()
    }
}

/// Releases its lock on drop.
#[derive(Debug)]
pub struct LockGuard<'l, L: Lock + ?Sized> {
    lock: &'l L,
}

impl<L: Lock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// A lock that is always free.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl Lock for NoLock {
    fn try_lock(&self) -> bool {
        true
    }

    fn unlock(&self) {}
}

/// A test-and-set spin lock.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// An unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Lock for SpinLock {
    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}
