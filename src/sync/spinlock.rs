//! A non-sleeping mutual-exclusion primitive, generalized from a bare
//! `AtomicBool` flag into a guard that also owns the data it protects,
//! the way a production rewrite of that type would.
//!
//! Spinlocks never block: acquiring one spins. They are leaves in the
//! lock order except for the coremap spinlock, which the Evictor
//! deliberately drops before touching a PTE mutex.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct Spinlock<T> {
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(value: T) -> Spinlock<T> {
        Spinlock {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
        SpinlockGuard { lock: self }
    }

    /// Non-blocking variant used where a caller must not spin, e.g. when it
    /// already holds a lock earlier in the order.
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        if self.locked.swap(true, Ordering::Acquire) {
            None
        } else {
            Some(SpinlockGuard { lock: self })
        }
    }

    /// # Safety
    /// Caller must hold the lock and must not alias this reference.
    pub unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

pub struct SpinlockGuard<'l, T> {
    lock: &'l Spinlock<T>,
}

impl<'l, T> Deref for SpinlockGuard<'l, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<'l, T> DerefMut for SpinlockGuard<'l, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<'l, T> Drop for SpinlockGuard<'l, T> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock() }
    }
}
