//! Process table and lifecycle: PID allocation, fork/wait/exit, and the
//! parent/child/orphan/zombie state machine.

pub mod process;
pub mod table;

pub use process::Process;
pub use table::{ProcStatus, ProcTable};
