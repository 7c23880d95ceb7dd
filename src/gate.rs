#[cfg(doc)]
use crate::reader_guard::ReaderGuard;
use {
    parking_lot::{RawRwLock, lock_api::RawRwLock as RawRwLockTrait},
    run_on_drop::on_drop,
    static_assertions::assert_impl_all,
    std::{
        fmt::{Debug, Formatter},
        sync::atomic::{
            AtomicBool, AtomicUsize,
            Ordering::{AcqRel, Acquire, Release},
        },
        thread,
    },
};

#[cfg(test)]
mod tests;

/// A gate that admits any number of readers while it is open and lets a writer close it
/// once it has observed quiescence.
///
/// The gate consists of a reader/writer lock and a `busy` flag.
///
/// - Readers call [`Gate::acquire_shared`]. The call blocks only while a writer is in
///   the middle of a busy transition. Afterwards it observes the flag exactly once: if
///   the gate is busy, the reader is turned away and holds nothing.
/// - Writers call [`Gate::begin_busy`] to close the gate and [`Gate::end_busy`] to
///   reopen it. Both wait until no reader holds the gate, flip the flag, and release the
///   lock again immediately.
///
/// The writer never holds the lock while it does its own work. Closing the gate waits
/// for every reader that currently holds it, and afterwards no new reader gets in until
/// the gate is reopened. Readers that come back while the writer works are turned away
/// rather than excluded by a lock. [`Gate::wait_for_quiescence`] waits for the current
/// readers without touching the flag.
///
/// Most code should use [`ReaderGuard`] or [`Gate::try_read`] instead of pairing
/// [`Gate::acquire_shared`] and [`Gate::release_shared`] by hand.
///
/// # Example
///
/// ```
/// use quiescence_gate::Gate;
///
/// let gate = Gate::new();
/// let reader = gate.try_read().unwrap();
/// assert!(!gate.try_begin_busy());
/// drop(reader);
/// assert!(gate.try_begin_busy());
/// assert!(gate.try_read().is_none());
/// assert!(gate.end_busy());
/// assert!(gate.try_read().is_some());
/// ```
pub struct Gate {
    // We enforce the following invariants:
    // 1. busy is only stored to while raw is locked exclusively.
    // 2. shared_holders is at most the number of shared locks on raw that were taken by
    //    a successful acquire_shared and have not been released yet.
    raw: RawRwLock,
    busy: AtomicBool,
    shared_holders: AtomicUsize,
}

assert_impl_all!(Gate: Send, Sync);
// release_shared unlocks shared locks that may have been taken on another thread.
assert_impl_all!(<RawRwLock as RawRwLockTrait>::GuardMarker: Send);

impl Gate {
    /// Creates a new, open gate.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// static GATE: Gate = Gate::new();
    /// assert!(!GATE.is_busy());
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self {
            raw: RawRwLock::INIT,
            busy: AtomicBool::new(false),
            shared_holders: AtomicUsize::new(0),
        }
    }

    /// Attempts to acquire the gate in shared mode.
    ///
    /// This function blocks while a writer is between acquiring and releasing the
    /// exclusive mode. It never waits for the gate to stop being busy: if the gate is
    /// busy once shared mode has been granted, the shared mode is released again and
    /// `false` is returned.
    ///
    /// On success, the caller owns a shared acquisition and must pass it to
    /// [`Gate::release_shared`] exactly once.
    ///
    /// Do not call this while the current thread already holds the gate. A writer waiting
    /// in [`Gate::begin_busy`] blocks new shared acquisitions, so a recursive call can
    /// deadlock.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// assert!(gate.acquire_shared());
    /// assert!(gate.acquire_shared());
    /// assert_eq!(gate.shared_holders(), 2);
    /// assert!(gate.release_shared());
    /// assert!(gate.release_shared());
    ///
    /// gate.begin_busy();
    /// assert!(!gate.acquire_shared());
    /// assert_eq!(gate.shared_holders(), 0);
    /// # gate.end_busy();
    /// ```
    #[must_use]
    pub fn acquire_shared(&self) -> bool {
        self.raw.lock_shared();
        if self.busy.load(Acquire) {
            // SAFETY: - We've just locked the lock in shared mode and this lock is not
            //           accounted for in shared_holders.
            unsafe {
                self.raw.unlock_shared();
            }
            tracing::trace!(gate = ?self.addr(), "shared acquisition rejected: gate is busy");
            return false;
        }
        self.shared_holders.fetch_add(1, Release);
        true
    }

    /// Releases a shared acquisition obtained from [`Gate::acquire_shared`].
    ///
    /// Returns `false` if there is no outstanding shared acquisition. In that case the
    /// underlying lock is left untouched. This only happens if the caller released an
    /// acquisition twice or released one it never had. The gate is then in an
    /// inconsistent state from the caller's point of view and the caller should not
    /// continue.
    ///
    /// Shared acquisitions are not tied to threads. Any thread can release an
    /// acquisition made on another thread.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// assert!(gate.acquire_shared());
    /// assert!(gate.release_shared());
    /// // There is nothing left to release.
    /// assert!(!gate.release_shared());
    /// ```
    #[must_use]
    pub fn release_shared(&self) -> bool {
        let res = self
            .shared_holders
            .fetch_update(AcqRel, Acquire, |n| n.checked_sub(1));
        if res.is_err() {
            tracing::error!(
                gate = ?self.addr(),
                "shared release without a matching shared acquisition",
            );
            return false;
        }
        // SAFETY: - shared_holders was > 0 before we decremented it.
        //         - By the invariants, there was a shared lock on raw that we have now
        //           taken responsibility for.
        //         - parking_lot is built with send_guard, so shared locks can be
        //           released on any thread. This is asserted next to the struct.
        unsafe {
            self.raw.unlock_shared();
        }
        true
    }

    /// Waits until no reader holds the gate, marks the gate busy, and returns.
    ///
    /// The exclusive mode is only held while the flag is flipped. After this function
    /// returns, [`Gate::acquire_shared`] fails until [`Gate::end_busy`] is called.
    ///
    /// Always returns `true`.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// assert!(gate.begin_busy());
    /// assert!(gate.is_busy());
    /// assert!(gate.try_read().is_none());
    /// ```
    pub fn begin_busy(&self) -> bool {
        self.raw.lock_exclusive();
        // SAFETY: - We've just locked the lock exclusively.
        unsafe {
            self.store_busy_and_unlock(true);
        }
        true
    }

    /// Marks the gate busy if that is possible without blocking.
    ///
    /// Returns `false` without any effect if any reader or writer currently holds the
    /// underlying lock. Otherwise this behaves like [`Gate::begin_busy`].
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// let reader = gate.try_read().unwrap();
    /// assert!(!gate.try_begin_busy());
    /// assert!(!gate.is_busy());
    /// drop(reader);
    /// assert!(gate.try_begin_busy());
    /// assert!(gate.is_busy());
    /// ```
    #[must_use]
    pub fn try_begin_busy(&self) -> bool {
        if !self.raw.try_lock_exclusive() {
            return false;
        }
        // SAFETY: - We've just locked the lock exclusively.
        unsafe {
            self.store_busy_and_unlock(true);
        }
        true
    }

    /// Waits until no reader holds the gate, clears the busy flag, and returns.
    ///
    /// Always returns `true`.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// gate.begin_busy();
    /// assert!(gate.try_read().is_none());
    /// assert!(gate.end_busy());
    /// assert!(gate.try_read().is_some());
    /// ```
    pub fn end_busy(&self) -> bool {
        self.raw.lock_exclusive();
        // SAFETY: - We've just locked the lock exclusively.
        unsafe {
            self.store_busy_and_unlock(false);
        }
        true
    }

    /// Blocks until no reader holds the gate.
    ///
    /// This acquires and immediately releases the exclusive mode. The busy flag is not
    /// touched, so an open gate stays open. Readers that acquire the gate after this
    /// function has returned are not waited for.
    ///
    /// # Example
    ///
    /// ```
    /// use std::thread;
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// let reader = gate.try_read().unwrap();
    /// thread::scope(|s| {
    ///     s.spawn(move || drop(reader));
    ///     gate.wait_for_quiescence();
    ///     assert_eq!(gate.shared_holders(), 0);
    ///     assert!(!gate.is_busy());
    /// });
    /// ```
    pub fn wait_for_quiescence(&self) {
        self.raw.lock_exclusive();
        // SAFETY: - We've just locked the lock exclusively.
        unsafe {
            self.raw.unlock_exclusive();
        }
    }

    /// # Safety
    ///
    /// - The current thread must have locked raw exclusively.
    #[inline]
    unsafe fn store_busy_and_unlock(&self, busy: bool) {
        let _unlock = on_drop(|| {
            // SAFETY: - By the requirements of this function, we're holding the
            //           exclusive lock and nothing else releases it.
            unsafe {
                self.raw.unlock_exclusive();
            }
        });
        // Invariant 1: we're holding the exclusive lock.
        self.busy.store(busy, Release);
        tracing::trace!(gate = ?self.addr(), busy, "busy flag changed");
    }

    /// Returns whether the gate is currently busy.
    ///
    /// The result is a snapshot. A writer can change it immediately afterwards.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Acquire)
    }

    /// Returns the number of outstanding shared acquisitions.
    ///
    /// The result is a snapshot. It does not include readers that are about to be turned
    /// away by a busy gate.
    ///
    /// # Example
    ///
    /// ```
    /// use quiescence_gate::Gate;
    ///
    /// let gate = Gate::new();
    /// let _reader = gate.try_read().unwrap();
    /// assert_eq!(gate.shared_holders(), 1);
    /// ```
    #[inline]
    pub fn shared_holders(&self) -> usize {
        self.shared_holders.load(Acquire)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> &RawRwLock {
        &self.raw
    }

    #[inline]
    pub(crate) fn addr(&self) -> *const u8 {
        let addr: *const Self = self;
        addr.cast()
    }
}

impl Default for Gate {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        let holders = *self.shared_holders.get_mut();
        if holders != 0 && !thread::panicking() {
            tracing::error!(gate = ?self.addr(), holders, "gate dropped while held");
            panic!("gate dropped with {holders} outstanding shared acquisitions");
        }
    }
}

impl Debug for Gate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("id", &self.addr())
            .field("busy", &self.is_busy())
            .field("shared_holders", &self.shared_holders())
            .finish_non_exhaustive()
    }
}
