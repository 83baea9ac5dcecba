//! Thread-safe problem accumulator.

use crate::problem::Problem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A thread-safe accumulator for problems recorded during a save.
///
/// The host may evaluate build logic on multiple threads, so recording
/// must be safe from any of them. The total count is tracked atomically
/// for fast checks without locking the problem vector. Only the first
/// `max_problems` problems are retained verbatim; later ones bump the
/// total count so the report can state how much was truncated.
pub struct ProblemSink {
    problems: Mutex<Vec<Problem>>,
    total_count: AtomicUsize,
    max_problems: usize,
}

impl ProblemSink {
    /// Creates a new empty sink retaining at most `max_problems` records.
    pub fn new(max_problems: usize) -> Self {
        Self {
            problems: Mutex::new(Vec::new()),
            total_count: AtomicUsize::new(0),
            max_problems,
        }
    }

    /// Records a problem into the sink.
    ///
    /// Problems beyond the retention cap are counted but not stored.
    pub fn record(&self, problem: Problem) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
        let mut problems = self.problems.lock().unwrap();
        if problems.len() < self.max_problems {
            problems.push(problem);
        }
    }

    /// Returns `true` if any problem has been recorded.
    pub fn has_problems(&self) -> bool {
        self.total_count.load(Ordering::Relaxed) > 0
    }

    /// Returns the total number of problems recorded, including ones
    /// beyond the retention cap.
    pub fn total_count(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Returns the retention cap this sink was created with.
    pub fn max_problems(&self) -> usize {
        self.max_problems
    }

    /// Returns a snapshot of the retained problems without draining.
    pub fn problems(&self) -> Vec<Problem> {
        self.problems.lock().unwrap().clone()
    }

    /// Takes all retained problems, leaving the sink empty but keeping
    /// the total count.
    pub fn take_all(&self) -> Vec<Problem> {
        let mut problems = self.problems.lock().unwrap();
        std::mem::take(&mut *problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sink() {
        let sink = ProblemSink::new(8);
        assert!(!sink.has_problems());
        assert_eq!(sink.total_count(), 0);
        assert!(sink.problems().is_empty());
    }

    #[test]
    fn record_and_count() {
        let sink = ProblemSink::new(8);
        sink.record(Problem::failure("one"));
        sink.record(Problem::warning("two"));
        assert!(sink.has_problems());
        assert_eq!(sink.total_count(), 2);
        assert_eq!(sink.problems().len(), 2);
    }

    #[test]
    fn retention_cap_counts_overflow() {
        let sink = ProblemSink::new(2);
        for i in 0..5 {
            sink.record(Problem::failure(format!("problem {i}")));
        }
        assert_eq!(sink.total_count(), 5);
        assert_eq!(sink.problems().len(), 2);
    }

    #[test]
    fn take_all_drains_but_keeps_count() {
        let sink = ProblemSink::new(8);
        sink.record(Problem::failure("one"));
        let taken = sink.take_all();
        assert_eq!(taken.len(), 1);
        assert!(sink.problems().is_empty());
        assert_eq!(sink.total_count(), 1);
    }

    #[test]
    fn concurrent_recording() {
        use std::sync::Arc;
        let sink = Arc::new(ProblemSink::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        sink.record(Problem::warning(format!("t{t} p{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.total_count(), 40);
        assert_eq!(sink.problems().len(), 40);
    }
}
