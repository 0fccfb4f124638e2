//! # Periodic Timer
//!
//! A cancellable repeating timer that owns at most one background task.
//!
//! [`PeriodicTimer::start`] always cancels the running task before spawning a
//! new one, so calling it twice (for example because a "playing" signal was
//! delivered twice) never leaves two tickers alive. [`PeriodicTimer::stop`]
//! and `Drop` cancel the task; a tick that is already executing is aborted at
//! its next await point.
//!
//! ```rust
//! use core_async::timer::PeriodicTimer;
//! use core_async::time::Duration;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let mut timer = PeriodicTimer::new("example");
//! let counter = Arc::clone(&ticks);
//! timer.start(Duration::from_secs(1), move || {
//!     let counter = Arc::clone(&counter);
//!     async move {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }
//! });
//! timer.stop();
//! # }
//! ```

use std::future::Future;

use tracing::trace;

use crate::sync::CancellationToken;
use crate::task::{self, JoinHandle};
use crate::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Repeating timer with explicit stop semantics.
#[derive(Debug)]
pub struct PeriodicTimer {
    name: &'static str,
    generation: u64,
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTimer {
    /// Create an idle timer. `name` only appears in trace logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            running: None,
        }
    }

    /// Start ticking every `period`, first tick one period from now.
    ///
    /// Any previously running ticker is cancelled first. Returns the
    /// generation number of the new ticker, which increases on every start.
    pub fn start<F, Fut>(&mut self, period: Duration, mut on_tick: F) -> u64
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        self.generation += 1;

        let token = CancellationToken::new();
        let child = token.clone();
        let name = self.name;
        let generation = self.generation;

        let handle = task::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!(timer = name, generation, "tick");
                        on_tick().await;
                    }
                }
            }
        });

        self.running = Some(Running { token, handle });
        self.generation
    }

    /// Cancel the running ticker, if any.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            running.handle.abort();
            trace!(timer = self.name, generation = self.generation, "stopped");
        }
    }

    /// Whether a ticker is currently active.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Generation of the most recently started ticker (0 if never started).
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
