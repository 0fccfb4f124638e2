//! Synchronization primitives.
//!
//! Re-exports the tokio primitives used across the core. The session
//! components lean on three of them:
//!
//! - `mpsc` for actor inboxes (single consumer, ordered delivery)
//! - `watch` for latest-wins state views (snapshots and queues)
//! - `oneshot` for command replies
//!
//! [`CancellationToken`] is re-exported from `tokio-util` so long-lived tasks
//! can be torn down from `release()`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let (tx, rx) = watch::channel(0u32);
//!     tx.send_replace(7);
//!     assert_eq!(*rx.borrow(), 7);
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Barrier, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
