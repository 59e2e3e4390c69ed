//! Concurrency management for stackcheck.
//! Sizes the global rayon pool used for parsing and per-guard verification.

use anyhow::Result;

/// Worker count: the requested `jobs`, or one per logical core.
pub fn worker_count(jobs: Option<usize>) -> usize {
    jobs.unwrap_or_else(num_cpus::get).max(1)
}

/// Initialize the global rayon thread pool.
/// Fails if the global pool was already built.
pub fn init_thread_pool(jobs: Option<usize>) -> Result<()> {
    let workers = worker_count(jobs);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()?;

    log::info!(
        "Initialized thread pool: {} workers (system has {} cores)",
        workers,
        num_cpus::get()
    );

    Ok(())
}
