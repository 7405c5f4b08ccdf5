//! ProcTable: the process-wide PID registry. One mutex and one
//! condition variable guard the whole table; `waitpid` blocks on the CV and
//! every `_exit` broadcasts it, since there is no per-PID wait queue —
//! waiters simply re-check their own target's status on every wake (Mesa
//! semantics, matching [`crate::sync::CondVar`]).

use crate::errno::Errno;
use crate::param::{NPROC, PID_MAX, PID_MIN};
use crate::proc::process::Process;
use crate::sync::{CondVar, Mutex};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcStatus {
    Ready,
    Running,
    Zombie,
    Orphan,
}

struct Inner {
    procs: Vec<Option<Arc<Process>>>,
    status: Vec<ProcStatus>,
    waitcode: Vec<i32>,
    pid_available: i32,
    pid_next: i32,
}

impl Inner {
    fn idx(pid: i32) -> usize {
        (pid - PID_MIN) as usize
    }

    /// Scans upward from `start` (wrapping through the valid PID range)
    /// for the next `Ready` slot; returns `PID_MAX + 1` as a "table full"
    /// sentinel if none exists.
    fn next_ready_from(&self, start: i32) -> i32 {
        for offset in 0..NPROC as i32 {
            let candidate = PID_MIN + (start - PID_MIN + offset).rem_euclid(NPROC as i32);
            if self.status[Self::idx(candidate)] == ProcStatus::Ready {
                return candidate;
            }
        }
        PID_MAX + 1
    }
}

pub struct ProcTable {
    inner: Mutex<Inner>,
    cv: CondVar,
}

impl ProcTable {
    /// Bootstrap: reserves PID_MIN for the kernel proc (Running, no
    /// `Process` record of its own — this crate does not model the kernel
    /// thread), every other slot starts `Ready`.
    pub fn bootstrap() -> ProcTable {
        let mut status = vec![ProcStatus::Ready; NPROC];
        status[Inner::idx(PID_MIN)] = ProcStatus::Running;
        ProcTable {
            inner: Mutex::new(Inner {
                procs: vec![None; NPROC],
                status,
                waitcode: vec![0; NPROC],
                pid_available: NPROC as i32 - 1,
                pid_next: PID_MIN + 1,
            }),
            cv: CondVar::new(),
        }
    }

    /// `proc_table_add`: reserves a PID, builds the process via `build`
    /// (which needs the reserved PID to construct the record), attaches it
    /// as a child of `parent_pid`, and installs it Running.
    pub fn add_child(
        &self,
        parent_pid: i32,
        build: impl FnOnce(i32) -> Process,
    ) -> Result<(i32, Arc<Process>), Errno> {
        let mut inner = self.inner.lock();
        if inner.pid_available < 1 {
            return Err(Errno::Enproc);
        }
        let pid = inner.pid_next;
        if pid > PID_MAX {
            return Err(Errno::Enproc);
        }
        let process = Arc::new(build(pid));
        let idx = Inner::idx(pid);
        inner.status[idx] = ProcStatus::Running;
        inner.procs[idx] = Some(process.clone());
        inner.pid_available -= 1;
        inner.pid_next = inner.next_ready_from(pid + 1);
        drop(inner);

        if let Some(parent) = self.get(parent_pid) {
            parent.add_child(pid);
        }
        log::debug!("pid {pid} created, parent {parent_pid}");
        Ok((pid, process))
    }

    /// Rolls back a reservation that was never actually used (e.g.
    /// `thread_fork` failing after the PID was assigned).
    pub fn free_pid(&self, pid: i32) {
        let mut inner = self.inner.lock();
        let idx = Inner::idx(pid);
        inner.procs[idx] = None;
        inner.status[idx] = ProcStatus::Ready;
        inner.waitcode[idx] = 0;
        inner.pid_available += 1;
        if pid < inner.pid_next {
            inner.pid_next = pid;
        }
    }

    pub fn get(&self, pid: i32) -> Option<Arc<Process>> {
        if !(PID_MIN..=PID_MAX).contains(&pid) {
            return None;
        }
        self.inner.lock().procs[Inner::idx(pid)].clone()
    }

    pub fn status(&self, pid: i32) -> Option<ProcStatus> {
        if !(PID_MIN..=PID_MAX).contains(&pid) {
            return None;
        }
        Some(self.inner.lock().status[Inner::idx(pid)])
    }

    /// `sys__exit`. Reparents Running children to Orphan, destroys any
    /// Zombie children outright (their parent, the exiting process, is the
    /// only one who could ever have reaped them), then either zombifies
    /// itself (a parent remains to reap it) or destroys itself immediately
    /// (nothing ever will).
    pub fn exit(&self, pid: i32, waitcode: i32) {
        let mut inner = self.inner.lock();
        let children = inner.procs[Inner::idx(pid)]
            .as_ref()
            .map(|p| p.children())
            .unwrap_or_default();
        for child in children {
            let cidx = Inner::idx(child);
            match inner.status[cidx] {
                ProcStatus::Running => inner.status[cidx] = ProcStatus::Orphan,
                ProcStatus::Zombie => {
                    inner.procs[cidx] = None;
                    inner.status[cidx] = ProcStatus::Ready;
                    inner.waitcode[cidx] = 0;
                    inner.pid_available += 1;
                    if child < inner.pid_next {
                        inner.pid_next = child;
                    }
                }
                ProcStatus::Ready | ProcStatus::Orphan => {}
            }
        }

        let idx = Inner::idx(pid);
        match inner.status[idx] {
            ProcStatus::Running => {
                inner.status[idx] = ProcStatus::Zombie;
                inner.waitcode[idx] = waitcode;
            }
            ProcStatus::Orphan => {
                inner.procs[idx] = None;
                inner.status[idx] = ProcStatus::Ready;
                inner.waitcode[idx] = 0;
                inner.pid_available += 1;
                if pid < inner.pid_next {
                    inner.pid_next = pid;
                }
            }
            ProcStatus::Ready | ProcStatus::Zombie => {
                panic!("_exit: process {pid} exited from status {:?}", inner.status[idx])
            }
        }
        log::debug!("pid {pid} exited, waitcode {waitcode}");
        self.cv.broadcast(&self.inner);
        drop(inner);
    }

    /// `sys_waitpid`. `options` must be 0. Destroys the target once its
    /// exit status has been collected, freeing its PID.
    pub fn waitpid(&self, caller_pid: i32, target_pid: i32, options: i32) -> Result<i32, Errno> {
        if options != 0 {
            return Err(Errno::Einval);
        }
        if !(PID_MIN..=PID_MAX).contains(&target_pid) {
            return Err(Errno::Esrch);
        }

        let mut guard = self.inner.lock();
        if guard.status[Inner::idx(target_pid)] == ProcStatus::Ready {
            return Err(Errno::Esrch);
        }
        let is_child = guard.procs[Inner::idx(caller_pid)]
            .as_ref()
            .is_some_and(|p| p.children().contains(&target_pid));
        if !is_child {
            return Err(Errno::Echild);
        }

        while guard.status[Inner::idx(target_pid)] != ProcStatus::Zombie {
            log::trace!("pid {caller_pid} blocking in waitpid for {target_pid}");
            guard = self.cv.wait(guard);
        }

        let idx = Inner::idx(target_pid);
        let waitcode = guard.waitcode[idx];
        guard.procs[idx] = None;
        guard.status[idx] = ProcStatus::Ready;
        guard.waitcode[idx] = 0;
        guard.pid_available += 1;
        if target_pid < guard.pid_next {
            guard.pid_next = target_pid;
        }
        drop(guard);

        if let Some(parent) = self.get(caller_pid) {
            parent.remove_child(target_pid);
        }
        Ok(waitcode)
    }
}
