//! Binary, owner-tracked sleeping mutex lock, generalized like
//! [`super::spinlock::Spinlock`] to own the data it guards rather than
//! being a bare flag. Not reentrant: a thread that calls `lock` while
//! already holding the lock deadlocks itself, the same contract as
//! OS/161's `struct lock`.
//!
//! `sync/mutex.rs` historically carried a commented-out sketch of exactly
//! this type (`Mutex<T>` guarded by an `AtomicBool`, with `spin_lock` and
//! `sleep_lock` acquire paths); this is that sketch completed against the
//! owner-tracked, sleeping contract this crate specifies for it.

use super::spinlock::Spinlock;
use super::wchan::WaitChannel;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

struct State {
    held: bool,
    holder: Option<ThreadId>,
}

pub struct Mutex<T> {
    state: Spinlock<State>,
    wchan: WaitChannel,
    inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Mutex<T> {
        Mutex {
            state: Spinlock::new(State {
                held: false,
                holder: None,
            }),
            wchan: WaitChannel::new(),
            inner: UnsafeCell::new(value),
        }
    }

    fn acquire(&self) {
        loop {
            let guard = self.state.lock();
            if !guard.held {
                let mut guard = guard;
                guard.held = true;
                guard.holder = Some(thread::current().id());
                return;
            }
            self.wchan.sleep(move || drop(guard));
        }
    }

    /// # Panics
    /// If the calling thread does not hold the lock.
    fn release(&self) {
        let mut guard = self.state.lock();
        assert!(
            guard.held && guard.holder == Some(thread::current().id()),
            "Mutex::release by non-owner"
        );
        guard.held = false;
        guard.holder = None;
        drop(guard);
        self.wchan.wake_one();
    }

    pub fn do_i_hold(&self) -> bool {
        let guard = self.state.lock();
        guard.held && guard.holder == Some(thread::current().id())
    }

    /// RAII acquire; releases on drop.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.acquire();
        MutexGuard { mutex: self }
    }
}

pub struct MutexGuard<'m, T> {
    mutex: &'m Mutex<T>,
}

impl<'m, T> MutexGuard<'m, T> {
    pub(super) fn mutex(&self) -> &'m Mutex<T> {
        self.mutex
    }
}

impl<'m, T> Deref for MutexGuard<'m, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.inner.get() }
    }
}

impl<'m, T> DerefMut for MutexGuard<'m, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.inner.get() }
    }
}

impl<'m, T> Drop for MutexGuard<'m, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn do_i_hold_reflects_ownership() {
        let m = Mutex::new(0i32);
        assert!(!m.do_i_hold());
        let guard = m.lock();
        assert!(m.do_i_hold());
        drop(guard);
        assert!(!m.do_i_hold());
    }

    #[test]
    #[should_panic(expected = "non-owner")]
    fn release_by_non_owner_panics() {
        let m = Arc::new(Mutex::new(0i32));
        let guard = m.lock();
        let m2 = m.clone();
        thread::spawn(move || m2.release()).join().unwrap();
        drop(guard);
    }

    #[test]
    fn serializes_increments_across_threads() {
        let m = Arc::new(Mutex::new(0u32));
        let mut handles = vec![];
        for _ in 0..8 {
            let m = m.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    *m.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*m.lock(), 800);
    }
}
