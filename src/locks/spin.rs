//! Spin-based exclusive locks.
//!
//! - [`Lock`]: a flag acquired with a few compare-and-swap attempts followed
//!   by a yield, repeated until it succeeds. Low latency under light
//!   contention, degrades to yielding under heavy contention.
//! - [`SpinLock`]: a test-and-test-and-set flag that can be taken once
//!   ([`LockMode::TryOnce`]) or spun on ([`LockMode::Wait`]).
//! - [`SpinMutex`]: a data-carrying mutex built on [`Lock`], used for the
//!   shards of [`ShardedMap`](crate::map::ShardedMap).
//!
//! Releasing any of these locks is a `Release` store, acquiring is an
//! `Acquire` read-modify-write, so everything done while holding the lock
//! happens-before the next holder's critical section.

use std::cell::UnsafeCell;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Number of compare-and-swap attempts [`Lock::lock`] makes before yielding.
pub const LOCK_TRIES: usize = 3;

/// Exclusive flag acquired by bounded CAS retries, then a yield.
///
/// # Examples
///
/// ```rust
/// use ripartito::locks::spin::Lock;
///
/// let lock = Lock::new();
/// lock.lock();
/// assert!(!lock.try_lock());
/// lock.unlock();
/// assert!(lock.try_lock());
/// lock.unlock();
/// ```
#[derive(Default)]
pub struct Lock {
    flag: AtomicBool,
}

impl Lock {
    /// Creates an unlocked lock.
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Attempts to acquire the lock once. Returns `true` on success.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquires the lock, yielding the thread between bursts of attempts.
    pub fn lock(&self) {
        loop {
            for _ in 0..LOCK_TRIES {
                if self
                    .flag
                    .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
            thread::yield_now();
        }
    }

    /// Releases the lock.
    ///
    /// Calling this without holding the lock releases someone else's hold.
    #[inline]
    pub fn unlock(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Returns `true` if the lock is currently held (racy).
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// How a [`SpinLock`] acquisition behaves when the lock is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Make a single attempt and report whether it succeeded.
    TryOnce,
    /// Spin until the lock is acquired.
    Wait,
}

/// Test-and-test-and-set spin lock.
///
/// While waiting, the lock is only read, so spinning threads share the cache
/// line instead of bouncing it between cores.
///
/// # Examples
///
/// ```rust
/// use ripartito::locks::spin::{LockMode, SpinLock};
///
/// let lock = SpinLock::new();
/// assert!(lock.lock(LockMode::Wait));
/// assert!(!lock.lock(LockMode::TryOnce));
/// lock.unlock();
/// assert!(lock.lock(LockMode::TryOnce));
/// ```
#[derive(Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock according to `mode`.
    ///
    /// With [`LockMode::Wait`] this always returns `true`.
    pub fn lock(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::TryOnce => !self.locked.swap(true, Ordering::Acquire),
            LockMode::Wait => {
                while self.locked.swap(true, Ordering::Acquire) {
                    while self.locked.load(Ordering::Relaxed) {
                        std::hint::spin_loop();
                    }
                }
                true
            }
        }
    }

    /// Releases the lock.
    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Returns `true` if the lock is currently held (racy).
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// A mutual-exclusion primitive protecting a value, built on [`Lock`].
///
/// # Examples
///
/// ```rust
/// use ripartito::locks::spin::SpinMutex;
///
/// let items = SpinMutex::new(Vec::new());
/// items.lock().push(1);
/// items.lock().push(2);
/// assert_eq!(*items.lock(), vec![1, 2]);
/// ```
pub struct SpinMutex<T: ?Sized> {
    lock: Lock,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `lock`.
unsafe impl<T: ?Sized + Send> Send for SpinMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    /// Creates an unlocked mutex holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            lock: Lock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Consumes the mutex, returning the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> SpinMutex<T> {
    /// Acquires the mutex, blocking until it is available.
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.lock.lock();
        SpinMutexGuard {
            mutex: self,
            _marker: PhantomData,
        }
    }

    /// Attempts to acquire the mutex without waiting.
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        self.lock.try_lock().then(|| SpinMutexGuard {
            mutex: self,
            _marker: PhantomData,
        })
    }

    /// Returns a mutable reference to the value without locking.
    ///
    /// The exclusive borrow of `self` guarantees no guard is alive.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Returns `true` if the mutex is currently held (racy).
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<T: ?Sized + Debug> Debug for SpinMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinMutex").field("value", &&*guard).finish(),
            None => f
                .debug_struct("SpinMutex")
                .field("value", &format_args!("<locked>"))
                .finish(),
        }
    }
}

/// RAII guard of a [`SpinMutex`]; unlocks on drop.
#[must_use = "if unused the SpinMutex will immediately unlock"]
pub struct SpinMutexGuard<'a, T: ?Sized> {
    mutex: &'a SpinMutex<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T: ?Sized> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held, and `&mut self` makes
        // this the only live reference through the guard.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.unlock();
    }
}

impl<T: ?Sized + Debug> Debug for SpinMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_try_lock() {
        let lock = Lock::new();
        assert!(lock.try_lock());
        assert!(lock.is_locked());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lock_mutual_exclusion() {
        struct Shared {
            lock: Lock,
            value: UnsafeCell<usize>,
        }
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            lock: Lock::new(),
            value: UnsafeCell::new(0),
        });
        let mut handles = vec![];

        for _ in 0..4 {
            let shared = Arc::clone(&shared);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    shared.lock.lock();
                    unsafe { *shared.value.get() += 1 };
                    shared.lock.unlock();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(unsafe { *shared.value.get() }, 4000);
    }

    #[test]
    fn test_spinlock_modes() {
        let lock = SpinLock::new();
        assert!(lock.lock(LockMode::TryOnce));
        assert!(!lock.lock(LockMode::TryOnce));
        lock.unlock();
        assert!(lock.lock(LockMode::Wait));
        assert!(lock.is_locked());
        lock.unlock();
    }

    #[test]
    fn test_spinlock_wait_blocks_until_release() {
        let lock = Arc::new(SpinLock::new());
        assert!(lock.lock(LockMode::Wait));

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let acquired = lock.lock(LockMode::Wait);
                lock.unlock();
                acquired
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());
        lock.unlock();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_spin_mutex_counts() {
        let counter = Arc::new(SpinMutex::new(0u64));
        let mut handles = vec![];

        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *counter.lock() += 1;
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), 8000);
    }

    #[test]
    fn test_spin_mutex_try_lock() {
        let mutex = SpinMutex::new(5);
        let guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
        assert!(mutex.is_locked());
        drop(guard);
        assert_eq!(*mutex.try_lock().unwrap(), 5);
    }

    #[test]
    fn test_spin_mutex_get_mut_and_into_inner() {
        let mut mutex = SpinMutex::new(String::from("a"));
        mutex.get_mut().push('b');
        assert_eq!(mutex.into_inner(), "ab");
    }

    #[test]
    fn test_debug() {
        let mutex = SpinMutex::new(42);
        assert_eq!(format!("{:?}", mutex), "SpinMutex { value: 42 }");
        let _guard = mutex.lock();
        assert_eq!(format!("{:?}", mutex), "SpinMutex { value: <locked> }");
        assert_eq!(format!("{:?}", Lock::new()), "Lock { locked: false }");
    }
}
