//! # chirp-core
//!
//! Concurrency primitives used by the chirp feed server.
//!
//! This crate knows nothing about feeds or requests. It provides the
//! three building blocks the dispatcher is assembled from.
//!
//! ## Modules
//!
//! - `rwlock` - Reader/writer lock with a reader cap and writer priority
//! - `queue` - Unbounded lock-free MPMC queue (Michael-Scott)
//! - `signal` - Wait/wake monitor carrying the shutdown flag
//! - `env` - Environment variable utilities

pub mod rwlock;
pub mod queue;
pub mod signal;
pub mod env;

// Re-exports for convenience
pub use rwlock::{ReadWriteLock, ReadGuard, WriteGuard, READER_CAP};
pub use queue::LockFreeQueue;
pub use signal::{WakeSignal, Wakeup};
pub use env::env_get_opt;
