//! Progress reporting for discovery and extraction
//!
//! Workers bump atomic counters on a shared [`ProgressTracker`]; the bar is
//! redrawn from those counters and nobody waits on it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Create a progress bar for a known number of items
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create a spinner for work of unknown size
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Shared counters for one pool run
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<Counters>,
    bar: ProgressBar,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl ProgressTracker {
    pub fn new(bar: ProgressBar) -> Self {
        Self {
            inner: Arc::new(Counters::default()),
            bar,
        }
    }

    /// Tracker that draws nothing
    pub fn hidden(total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
        Self::new(bar)
    }

    pub fn record_success(&self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    pub fn record_failure(&self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    pub fn record_skip(&self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
        self.inner.skipped.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.inner.skipped.load(Ordering::Relaxed)
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar() {
        let pb = create_progress_bar(100, "Extracting");
        assert_eq!(pb.length(), Some(100));
        pb.finish_and_clear();
    }

    #[test]
    fn test_create_spinner() {
        let pb = create_spinner("Discovering");
        pb.finish_and_clear();
    }

    #[test]
    fn test_tracker_counts_across_clones() {
        let tracker = ProgressTracker::hidden(10);
        let worker = tracker.clone();
        worker.record_success();
        worker.record_failure();
        tracker.record_skip();

        assert_eq!(tracker.completed(), 3);
        assert_eq!(tracker.failed(), 1);
        assert_eq!(tracker.skipped(), 1);
    }

    #[test]
    fn test_tracker_counts_from_threads() {
        let tracker = ProgressTracker::hidden(400);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record_success();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.completed(), 400);
    }
}
