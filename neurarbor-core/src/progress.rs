//! Progress reporting for list construction and dispatch.
//!
//! ```ignore
//! use neurarbor_core::Progress;
//!
//! let progress = Progress::new(|current, total, message| {
//!     eprintln!("[{current}/{total}] {message}");
//! });
//! let config = ListConfig::default().with_progress(progress);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A progress callback receiving `(current, total, message)`.
#[derive(Clone)]
pub struct Progress {
    callback: Arc<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Create a no-op progress reporter that discards all updates.
    #[must_use]
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }

    /// Counter that reports once per completed item; safe to share across workers.
    #[must_use]
    pub fn counter(&self, total: usize, message: &str) -> ProgressCounter {
        ProgressCounter {
            progress: self.clone(),
            done: AtomicUsize::new(0),
            total,
            message: message.to_string(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// Shared completion counter, see [`Progress::counter`].
#[derive(Debug)]
pub struct ProgressCounter {
    progress: Progress,
    done: AtomicUsize,
    total: usize,
    message: String,
}

impl ProgressCounter {
    /// Marks one item as done and reports.
    pub fn tick(&self) {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.progress.report(current, self.total, &self.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::sync::Mutex;

    #[test]
    fn test_counter_reports_every_item() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |current, total, _| {
            sink.lock().unwrap().push((current, total));
        });
        let counter = progress.counter(20, "work");
        (0..20).into_par_iter().for_each(|_| counter.tick());
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen.last(), Some(&(20, 20)));
    }
}
