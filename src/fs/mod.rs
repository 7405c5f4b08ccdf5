//! File-descriptor table and the minimal VFS stand-in it's built on.

pub mod file;
pub mod filetable;
pub mod vnode;

pub use file::{AccessMode, FileHandle, OpenFlags};
pub use filetable::FileTable;
pub use vnode::{InMemoryVfs, Vnode};
