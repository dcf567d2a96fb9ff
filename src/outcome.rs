use std::{fmt, time::Duration};

use crate::{Task, TransportError};

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The fetch completed and returned this status code.
    Success(u16),
    /// The fetch failed.
    Failure(TransportError),
    /// The task was aborted by its cancellation token, either before the fetch was started or by
    /// the fetch itself.
    Cancelled,
}

/// The single terminal result recorded for a [`Task`].
///
/// Exactly one [`Outcome`] is published per dispatched task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub task: Task,
    /// Position of the task in the sequence passed to the dispatcher.
    pub index: usize,
    pub status: Status,
    /// Time spent in the fetch. Zero if the fetch was never started.
    pub latency: Duration,
    /// Whether the cancellation token had already fired when this outcome was settled.
    ///
    /// A fetch that was in flight when the token fired keeps whatever result it returned. If that
    /// result is a success or a failure, this flag records that it raced with cancellation.
    pub settled_after_cancel: bool,
}

impl Outcome {
    #[inline]
    pub fn target(&self) -> &str {
        self.task.target()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, Status::Failure(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, Status::Cancelled)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.target();
        let latency = self.latency;
        match &self.status {
            Status::Success(code) => {
                write!(f, "Successfully fetched {target}: {code} (took {latency:?})")
            }
            Status::Failure(err) => write!(f, "Error fetching {target}: {err} (took {latency:?})"),
            Status::Cancelled => write!(f, "Cancelled {target} (took {latency:?})"),
        }
    }
}

/// Per-status tally of a set of [`Outcome`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome.status {
            Status::Success(_) => self.succeeded += 1,
            Status::Failure(_) => self.failed += 1,
            Status::Cancelled => self.cancelled += 1,
        }
    }
}

impl<'a> FromIterator<&'a Outcome> for Summary {
    fn from_iter<I: IntoIterator<Item = &'a Outcome>>(iter: I) -> Self {
        let mut summary = Summary::default();
        iter.into_iter().for_each(|outcome| summary.record(outcome));
        summary
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} cancelled",
            self.succeeded, self.failed, self.cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportErrorKind;

    fn outcome(target: &str, status: Status, millis: u64) -> Outcome {
        Outcome {
            task: Task::new(target),
            index: 0,
            status,
            latency: Duration::from_millis(millis),
            settled_after_cancel: false,
        }
    }

    #[test]
    fn display_matches_status() {
        assert_eq!(
            outcome("https://github.com", Status::Success(200), 12).to_string(),
            "Successfully fetched https://github.com: 200 (took 12ms)"
        );
        assert_eq!(
            outcome(
                "https://invalid.example",
                Status::Failure(TransportError::connect("dns lookup failed")),
                3
            )
            .to_string(),
            "Error fetching https://invalid.example: connect error: dns lookup failed (took 3ms)"
        );
        assert_eq!(
            outcome("https://golang.org", Status::Cancelled, 0).to_string(),
            "Cancelled https://golang.org (took 0ns)"
        );
    }

    #[test]
    fn summary_counts_each_status() {
        let outcomes = [
            outcome("a", Status::Success(200), 1),
            outcome("b", Status::Success(404), 1),
            outcome(
                "c",
                Status::Failure(TransportError::new(TransportErrorKind::Other, "boom")),
                1,
            ),
            outcome("d", Status::Cancelled, 0),
        ];
        let summary: Summary = outcomes.iter().collect();
        assert_eq!(
            summary,
            Summary {
                succeeded: 2,
                failed: 1,
                cancelled: 1
            }
        );
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.to_string(), "2 succeeded, 1 failed, 1 cancelled");
        assert!(outcomes[2].is_failure());
        assert!(outcomes[3].is_cancelled());
    }
}
