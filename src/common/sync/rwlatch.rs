use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct LatchState {
    readers: usize,
    writer_active: bool,
    writers_waiting: usize,
}

/// A reader/writer latch over a value.
///
/// Readers proceed concurrently; a writer is exclusive. The latch is
/// writer-preferring: new readers do not enter while a writer is waiting,
/// which keeps writers from starving under a continuous reader load.
pub struct RwLatch<T> {
    state: Mutex<LatchState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
    value: UnsafeCell<T>,
}

// Guards hand out &T to multiple readers or &mut T to one writer, with the
// exclusion enforced by `state`.
unsafe impl<T: Send> Send for RwLatch<T> {}
unsafe impl<T: Send + Sync> Sync for RwLatch<T> {}

impl<T> RwLatch<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LatchState::default()),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the latch in shared mode.
    pub fn read(&self) -> ReadLatchGuard<'_, T> {
        let mut state = self.state.lock();
        while state.writer_active || state.writers_waiting > 0 {
            self.readers_cv.wait(&mut state);
        }
        state.readers += 1;
        ReadLatchGuard { latch: self }
    }

    /// Acquire the latch in exclusive mode.
    pub fn write(&self) -> WriteLatchGuard<'_, T> {
        let mut state = self.state.lock();
        state.writers_waiting += 1;
        while state.writer_active || state.readers > 0 {
            self.writers_cv.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer_active = true;
        WriteLatchGuard { latch: self }
    }
}

impl<T: Default> Default for RwLatch<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct ReadLatchGuard<'a, T> {
    latch: &'a RwLatch<T>,
}

impl<T> Deref for ReadLatchGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: shared access is held.
        unsafe { &*self.latch.value.get() }
    }
}

impl<T> Drop for ReadLatchGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.latch.state.lock();
        state.readers -= 1;
        if state.readers == 0 && state.writers_waiting > 0 {
            self.latch.writers_cv.notify_one();
        }
    }
}

pub struct WriteLatchGuard<'a, T> {
    latch: &'a RwLatch<T>,
}

impl<T> Deref for WriteLatchGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: exclusive access is held.
        unsafe { &*self.latch.value.get() }
    }
}

impl<T> DerefMut for WriteLatchGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: exclusive access is held.
        unsafe { &mut *self.latch.value.get() }
    }
}

impl<T> Drop for WriteLatchGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.latch.state.lock();
        state.writer_active = false;
        if state.writers_waiting > 0 {
            self.latch.writers_cv.notify_one();
        } else {
            self.latch.readers_cv.notify_all();
        }
    }
}
