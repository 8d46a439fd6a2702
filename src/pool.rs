//! Bounded rayon pools for the pipeline stages.

use rayon::{ThreadPool, ThreadPoolBuilder};

/// Build a dedicated pool of `threads` workers named `{name}-{idx}`.
///
/// Returns `None` for `threads == 0`, meaning "use the global pool", and
/// also when the pool cannot be built (a warning is logged).
pub(crate) fn build_pool(threads: usize, name: &'static str) -> Option<ThreadPool> {
    if threads == 0 {
        return None;
    }

    match ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |idx| format!("{name}-{idx}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!(
                "Failed to create {} pool with {} threads, using global pool with {} threads: {}",
                name,
                threads,
                rayon::current_num_threads(),
                e
            );
            None
        }
    }
}

/// Run `op` inside a dedicated pool of `threads` workers.
///
/// Falls back to the global pool as described in [`build_pool`].
pub(crate) fn run_in_pool<R, F>(threads: usize, name: &'static str, op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match build_pool(threads, name) {
        Some(pool) => pool.install(op),
        None => op(),
    }
}
