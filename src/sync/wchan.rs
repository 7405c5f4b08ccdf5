//! Wait channels: anonymous queues a thread sleeps on while
//! atomically releasing whatever lock it held, woken one-at-a-time or all at
//! once. `spinlock`/`wchan` are named as external, thread-layer-owned
//! collaborators a real kernel supplies; this type is the concrete stand-in
//! a host-testable build of this crate wires them to, in the spirit of a
//! classic `sync::sleeplock`, which calls straight into
//! `proc::scheduler::{sleep, wakeup}` rather than treating sleep/wake as
//! opaque.
//!
//! The missed-wakeup race (`V`/`signal` arriving between "observed count==0"
//! and "gone to sleep") is closed with a generation counter: the sleeper
//! snapshots the generation before releasing its lock, and only blocks if
//! the generation is still unchanged once it reaches the condvar wait.

use std::sync::{Condvar, Mutex};

pub struct WaitChannel {
    generation: Mutex<u64>,
    cvar: Condvar,
}

impl WaitChannel {
    pub const fn new() -> WaitChannel {
        WaitChannel {
            generation: Mutex::new(0),
            cvar: Condvar::new(),
        }
    }

    /// Atomically release the caller's lock (via `release`) and block until
    /// a wake arrives that postdates this call.
    pub fn sleep(&self, release: impl FnOnce()) {
        let seen = {
            let guard = self.generation.lock().unwrap();
            *guard
        };
        release();

        let mut guard = self.generation.lock().unwrap();
        while *guard == seen {
            guard = self.cvar.wait(guard).unwrap();
        }
    }

    /// Wake exactly one sleeper.
    pub fn wake_one(&self) {
        let mut guard = self.generation.lock().unwrap();
        *guard = guard.wrapping_add(1);
        drop(guard);
        self.cvar.notify_one();
    }

    /// Wake every current sleeper.
    pub fn wake_all(&self) {
        let mut guard = self.generation.lock().unwrap();
        *guard = guard.wrapping_add(1);
        drop(guard);
        self.cvar.notify_all();
    }
}

impl Default for WaitChannel {
    fn default() -> WaitChannel {
        WaitChannel::new()
    }
}
