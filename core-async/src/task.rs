//! Task spawning and execution.
//!
//! Thin wrappers over `tokio::task` so callers never import tokio directly.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current Tokio runtime.
///
/// The spawned task may run on a different worker thread, so the future must
/// be `Send`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}
