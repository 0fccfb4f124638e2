//! Runtime handles.
//!
//! `block_on` is used by the logging layer to forward events to a host
//! `LoggerSink` when no runtime is running on the current thread.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs a future to completion on a fresh current-thread runtime.
///
/// Returns an error if the runtime cannot be built.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_runs_future() {
        let value = block_on(async { 21 * 2 }).unwrap();
        assert_eq!(value, 42);
    }
}
