//! Worker pool shared by every case of a run.

use anyhow::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

pub struct ExecutionEnv {
    pool: Option<ThreadPool>,
}

impl ExecutionEnv {
    /// Builds the pool once; `threads == 0` means kernels always run inline.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Ok(Self::single_threaded());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("kernelcheck-{index}"))
            .build()?;
        debug!(threads, "worker pool ready");
        Ok(Self { pool: Some(pool) })
    }

    pub fn single_threaded() -> Self {
        Self { pool: None }
    }

    pub fn pool(&self) -> Option<&ThreadPool> {
        self.pool.as_ref()
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(0, ThreadPool::current_num_threads)
    }

    /// Threading variants this environment can run.
    pub fn threadings(&self) -> Vec<Threading> {
        match self.pool {
            Some(_) => vec![Threading::SingleThread, Threading::Threaded],
            None => vec![Threading::SingleThread],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Threading {
    SingleThread,
    Threaded,
}

impl Threading {
    pub fn label(&self) -> &'static str {
        match self {
            Threading::SingleThread => "SingleThread",
            Threading::Threaded => "Threaded",
        }
    }

    /// Pool handed to the kernel for this variant.
    pub fn pool<'a>(&self, env: &'a ExecutionEnv) -> Option<&'a ThreadPool> {
        match self {
            Threading::SingleThread => None,
            Threading::Threaded => env.pool(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_has_no_pool() {
        let env = ExecutionEnv::new(0).expect("env");
        assert!(env.pool().is_none());
        assert_eq!(env.threads(), 0);
        assert_eq!(env.threadings(), vec![Threading::SingleThread]);
        assert!(Threading::Threaded.pool(&env).is_none());
    }

    #[test]
    fn pool_is_sized_once() {
        let env = ExecutionEnv::new(2).expect("env");
        assert_eq!(env.threads(), 2);
        assert!(Threading::Threaded.pool(&env).is_some());
        assert!(Threading::SingleThread.pool(&env).is_none());
    }
}
