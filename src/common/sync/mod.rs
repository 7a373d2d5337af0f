pub mod rwlatch;
pub mod spinlock;

pub use rwlatch::RwLatch;
pub use spinlock::SpinLock;
