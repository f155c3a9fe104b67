use std::thread;

use tracing::debug;

use crate::error::ProcessError;

pub(crate) fn create_threadpool(num_threads: usize) -> Result<rayon::ThreadPool, ProcessError> {
    let num_threads = if num_threads > 0 {
        num_threads
    } else {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    };
    debug!("Using {} threads", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| ProcessError::ThreadPool(e.to_string()))
}

/// Run `op` on a dedicated pool of `num_threads` workers, or on the pool the
/// caller is already running in when `num_threads` is zero.
pub(crate) fn install<T: Send>(
    num_threads: usize,
    op: impl FnOnce() -> T + Send,
) -> Result<T, ProcessError> {
    if num_threads == 0 {
        Ok(op())
    } else {
        Ok(create_threadpool(num_threads)?.install(op))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_install_sizes_pool() {
        let n = install(3, rayon::current_num_threads).unwrap();
        assert_eq!(n, 3);
    }
}
