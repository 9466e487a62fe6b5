use std::sync::{Mutex, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::{config::Config, net::error::Error};

pub mod merge;
pub mod reduce;
pub mod sort;

/// Which implementation of an operation to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Single control thread.
    Basic,
    /// Spread over the session's thread pool.
    Fast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Sum,
    Max,
    Sort,
}

/// Runs reductions and sorts over a local partition.
///
/// Owns the rayon pool used by [`Mode::Fast`]; [`Mode::Basic`] never touches
/// it. Also owns the sort scratch buffer, allocated on the first sort and
/// reused for the rest of the session.
pub struct Engine {
    pool: ThreadPool,
    parallel_threshold: usize,
    scratch: Mutex<Vec<f32>>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("tandem-worker-{i}"))
            .build()?;
        debug!(
            threads = pool.current_num_threads(),
            threshold = config.parallel_threshold,
            "engine ready"
        );
        Ok(Self {
            pool,
            parallel_threshold: config.parallel_threshold,
            scratch: Mutex::new(Vec::new()),
        })
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Sum of every value's key.
    pub fn sum(&self, data: &[f32], mode: Mode) -> f32 {
        match mode {
            Mode::Basic => reduce::sum(data),
            Mode::Fast => self
                .pool
                .install(|| reduce::sum_parallel(data, self.threads())),
        }
    }

    /// Stored value with the greatest key, or [`reduce::EMPTY_MAX`].
    pub fn max(&self, data: &[f32], mode: Mode) -> f32 {
        match mode {
            Mode::Basic => reduce::max(data),
            Mode::Fast => self
                .pool
                .install(|| reduce::max_parallel(data, self.threads())),
        }
    }

    /// A copy of `data` sorted stably by key.
    pub fn sort(&self, data: &[f32], mode: Mode) -> Vec<f32> {
        // The buffer is fully overwritten by every sort, so a poisoned lock
        // leaves nothing inconsistent behind.
        let mut guard = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        let scratch: &mut Vec<f32> = &mut guard;
        match mode {
            Mode::Basic => sort::sort_with(data, scratch, None),
            Mode::Fast => self.pool.install(|| {
                sort::sort_with(data, scratch, Some(self.parallel_threshold))
            }),
        }
    }

    #[cfg(test)]
    fn scratch_len(&self) -> usize {
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
