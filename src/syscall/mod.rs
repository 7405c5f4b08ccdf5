pub mod dispatcher;
pub mod elf;
pub mod kernel;
pub mod sysfile;
pub mod sysproc;
pub mod trapframe;

pub use dispatcher::{dispatch, SyscallNumber};
pub use elf::{ElfLoader, FixedEntryLoader};
pub use kernel::Kernel;
pub use trapframe::{ArgDecoder, Trapframe};
