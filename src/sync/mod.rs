pub mod condvar;
pub mod mutex;
pub mod semaphore;
pub mod spinlock;
pub mod wchan;

pub use condvar::CondVar;
pub use mutex::Mutex;
pub use semaphore::Semaphore;
pub use spinlock::Spinlock;
pub use wchan::WaitChannel;
