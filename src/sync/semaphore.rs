//! Counting, non-strict-FIFO semaphore.

use super::spinlock::Spinlock;
use super::wchan::WaitChannel;

pub struct Semaphore {
    count: Spinlock<i64>,
    wchan: WaitChannel,
}

impl Semaphore {
    pub const fn new(initial: i64) -> Semaphore {
        Semaphore {
            count: Spinlock::new(initial),
            wchan: WaitChannel::new(),
        }
    }

    /// Must not be called from interrupt context.
    pub fn p(&self) {
        loop {
            let guard = self.count.lock();
            if *guard > 0 {
                let mut guard = guard;
                *guard -= 1;
                return;
            }
            self.wchan.sleep(move || drop(guard));
        }
    }

    pub fn v(&self) {
        let mut guard = self.count.lock();
        *guard += 1;
        drop(guard);
        self.wchan.wake_one();
    }

    pub fn count(&self) -> i64 {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn count_never_goes_negative() {
        let sem = Semaphore::new(0);
        sem.v();
        sem.v();
        sem.p();
        assert_eq!(sem.count(), 1);
        sem.p();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn n_vs_and_m_ps_settle_at_initial_plus_n_minus_m() {
        let sem = Arc::new(Semaphore::new(2));
        for _ in 0..5 {
            sem.v();
        }
        for _ in 0..3 {
            sem.p();
        }
        assert_eq!(sem.count(), 2 + 5 - 3);
    }

    #[test]
    fn p_blocks_until_a_v_arrives() {
        let sem = Arc::new(Semaphore::new(0));
        let worker = {
            let sem = sem.clone();
            thread::spawn(move || sem.p())
        };
        thread::sleep(std::time::Duration::from_millis(30));
        sem.v();
        worker.join().unwrap();
        assert_eq!(sem.count(), 0);
    }
}
