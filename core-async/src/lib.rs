//! Async abstraction layer for the playback session core.
//!
//! All `core-*` and `bridge-*` crates depend on this crate instead of reaching
//! for tokio directly, so the runtime surface the core relies on stays small
//! and in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Time-related operations (sleep, timeout, instant)
//! - `sync`: Synchronization primitives, channels and cancellation tokens
//! - `timer`: Cancellable periodic timer with cancel-then-restart semantics
//! - `backoff`: Exponential backoff schedule for reconnect loops
//! - `runtime`: Runtime handles and `block_on`
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod backoff;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;
pub mod timer;

pub use backoff::Backoff;
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
pub use timer::PeriodicTimer;
