use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of test-and-set attempts before yielding the CPU.
const MAX_TRY_TIMES: u32 = 10;

/// A test-and-set spin lock with bounded spin.
///
/// Intended only for tiny critical sections (page metadata updates). After
/// `MAX_TRY_TIMES` failed attempts the spinning thread yields cooperatively
/// instead of burning the core. There is no fairness guarantee.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// The lock provides the required exclusion for `value`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning with a bounded number of attempts between
    /// cooperative yields.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let mut try_count = 0;
        while self.locked.swap(true, Ordering::Acquire) {
            try_count += 1;
            if try_count == MAX_TRY_TIMES {
                try_count = 0;
                std::thread::yield_now();
            }
        }
        SpinGuard { lock: self }
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard holds the lock.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard holds the lock.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
