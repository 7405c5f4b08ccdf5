//! Per-process state. One spinlock guards every pointer-like field at once
//! — parent, children, address space, and working directory — the same
//! bundling a classic `struct proc::p_lock` performs.

use crate::fs::FileTable;
use crate::param::NPROC;
use crate::vm::AddressSpace;
use arrayvec::ArrayVec;
use std::sync::Arc;

struct MutableState {
    name: String,
    parent: Option<i32>,
    children: ArrayVec<i32, NPROC>,
    addrspace: Option<Arc<AddressSpace>>,
    cwd: String,
}

pub struct Process {
    pid: i32,
    state: crate::sync::Spinlock<MutableState>,
    pub files: FileTable,
}

impl Process {
    pub fn new(pid: i32, name: impl Into<String>, parent: Option<i32>, files: FileTable) -> Process {
        Process {
            pid,
            state: crate::sync::Spinlock::new(MutableState {
                name: name.into(),
                parent,
                children: ArrayVec::new(),
                addrspace: None,
                cwd: "/".to_string(),
            }),
            files,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    pub fn parent(&self) -> Option<i32> {
        self.state.lock().parent
    }

    pub fn set_parent(&self, parent: Option<i32>) {
        self.state.lock().parent = parent;
    }

    pub fn children(&self) -> Vec<i32> {
        self.state.lock().children.iter().copied().collect()
    }

    /// Fails closed (silently dropping the child reference) if the bounded
    /// children list is somehow already full; `NPROC` slots is the most
    /// children any process table configuration could ever hand out, so
    /// this can only happen if a bug lets a child outlive its own `_exit`
    /// cleanup.
    pub fn add_child(&self, pid: i32) {
        let _ = self.state.lock().children.try_push(pid);
    }

    pub fn remove_child(&self, pid: i32) {
        self.state.lock().children.retain(|&mut p| p != pid);
    }

    pub fn addrspace(&self) -> Option<Arc<AddressSpace>> {
        self.state.lock().addrspace.clone()
    }

    pub fn set_addrspace(&self, asp: Arc<AddressSpace>) {
        self.state.lock().addrspace = Some(asp);
    }

    pub fn cwd(&self) -> String {
        self.state.lock().cwd.clone()
    }

    pub fn set_cwd(&self, path: impl Into<String>) {
        self.state.lock().cwd = path.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_list_reflects_add_and_remove() {
        let p = Process::new(2, "child", Some(1), FileTable::empty());
        p.add_child(5);
        p.add_child(6);
        assert_eq!(p.children(), vec![5, 6]);
        p.remove_child(5);
        assert_eq!(p.children(), vec![6]);
    }
}
