//! Condition variable bound to a caller-held [`Mutex`], Mesa
//! semantics: a woken waiter re-checks its predicate rather than being
//! guaranteed the condition still holds.

use super::mutex::{Mutex, MutexGuard};
use super::wchan::WaitChannel;

pub struct CondVar {
    wchan: WaitChannel,
}

impl CondVar {
    pub const fn new() -> CondVar {
        CondVar {
            wchan: WaitChannel::new(),
        }
    }

    /// Atomically release `guard`'s mutex and sleep; re-acquires the same
    /// mutex before returning.
    pub fn wait<'m, T>(&self, guard: MutexGuard<'m, T>) -> MutexGuard<'m, T> {
        let mutex = guard.mutex();
        self.wchan.sleep(move || drop(guard));
        mutex.lock()
    }

    /// # Panics
    /// If the caller does not hold `m`.
    pub fn signal<T>(&self, m: &Mutex<T>) {
        assert!(m.do_i_hold(), "CondVar::signal without holding the mutex");
        self.wchan.wake_one();
    }

    /// # Panics
    /// If the caller does not hold `m`.
    pub fn broadcast<T>(&self, m: &Mutex<T>) {
        assert!(m.do_i_hold(), "CondVar::broadcast without holding the mutex");
        self.wchan.wake_all();
    }
}

impl Default for CondVar {
    fn default() -> CondVar {
        CondVar::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn waiter_wakes_after_signal_and_observes_predicate() {
        let m = Arc::new(Mutex::new(false));
        let cv = Arc::new(CondVar::new());

        let waiter = {
            let m = m.clone();
            let cv = cv.clone();
            thread::spawn(move || {
                let mut guard = m.lock();
                while !*guard {
                    guard = cv.wait(guard);
                }
            })
        };

        thread::sleep(Duration::from_millis(30));
        let mut guard = m.lock();
        *guard = true;
        cv.signal(&m);
        drop(guard);

        waiter.join().unwrap();
    }
}
