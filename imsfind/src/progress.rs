//! Progress reporting sinks shared across worker threads
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A sink for progress updates. Implementations are called from many
/// worker threads at once.
pub trait ReportProgress: Send + Sync {
    /// Report completion as a fraction in `[0, 1]`
    fn report(&self, fraction: f64);

    fn report_count(&self, current: usize, total: usize) {
        if total == 0 {
            self.report(1.0);
        } else {
            self.report((current as f64 / total as f64).clamp(0.0, 1.0))
        }
    }
}

/// Discards all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ReportProgress for NullProgress {
    fn report(&self, _fraction: f64) {}
}

impl<F: Fn(f64) + Send + Sync> ReportProgress for F {
    fn report(&self, fraction: f64) {
        (self)(fraction)
    }
}

/// Keeps every reported value, mostly useful for inspecting a run after the fact
#[derive(Debug, Default)]
pub struct RecordingProgress {
    values: Mutex<Vec<f64>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportProgress for RecordingProgress {
    fn report(&self, fraction: f64) {
        if let Ok(mut values) = self.values.lock() {
            values.push(fraction);
        }
    }
}

/// Maps `[0, 1]` onto a `[start, start + span]` sub-range of another sink so that
/// several stages can share one outer progress bar.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ReportProgress,
    start: f64,
    span: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ReportProgress, start: f64, span: f64) -> Self {
        Self { inner, start, span }
    }
}

impl ReportProgress for ScaledProgress<'_> {
    fn report(&self, fraction: f64) {
        self.inner.report(self.start + self.span * fraction.clamp(0.0, 1.0))
    }
}

/// Counts finished units of work across threads and forwards the running
/// fraction to a sink.
pub(crate) struct WorkCounter<'a> {
    done: AtomicUsize,
    total: usize,
    sink: &'a dyn ReportProgress,
}

impl<'a> WorkCounter<'a> {
    pub(crate) fn new(total: usize, sink: &'a dyn ReportProgress) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            sink,
        }
    }

    pub(crate) fn increment(&self) {
        let current = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        self.sink.report_count(current, self.total);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scaled() {
        let sink = RecordingProgress::new();
        let scaled = ScaledProgress::new(&sink, 0.5, 0.25);
        scaled.report(0.0);
        scaled.report(1.0);
        assert_eq!(sink.values(), vec![0.5, 0.75]);
    }

    #[test]
    fn test_counter() {
        let sink = RecordingProgress::new();
        let counter = WorkCounter::new(4, &sink);
        for _ in 0..4 {
            counter.increment();
        }
        assert_eq!(sink.values(), vec![0.25, 0.5, 0.75, 1.0]);
    }
}
