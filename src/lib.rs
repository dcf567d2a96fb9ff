//! Fan fetch-style tasks out onto owned threads and fan their outcomes back in, with cooperative
//! cancellation.
//!
//! (if you need to run tens of thousands of I/O tasks at once, an `async` runtime will serve you
//! better; this crate spends one OS thread per task)
//!
//! # Overview
//!
//! A session is started with [`dispatch`] (or [`Dispatcher::builder`]). It spawns one worker
//! thread per [`Task`], and each worker runs the caller's [`Fetch`] implementation and publishes
//! exactly one [`Outcome`] into a bounded channel sized to the number of tasks. Once the last
//! worker has exited, the channel is closed exactly once.
//!
//! The caller reads outcomes from the returned [`OutcomeStream`]. Every read races the channel
//! against the session's [`CancelToken`], so the caller can stop early on cancellation or on a
//! deadline without waiting for stragglers. Since publishing never needs a reader, workers still
//! run to completion on their own, and dropping the [`OutcomeStream`] cancels the session and joins
//! every thread it spawned. No thread outlives the session.
//!
//! Failures never cross the channel as panics or errors: a transport failure becomes
//! [`Status::Failure`], an aborted task becomes [`Status::Cancelled`].
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use fanin::{dispatch, CancelToken, End, FetchError, Status, Task, TransportError};
//!
//! fn fetch(task: &Task, token: &CancelToken) -> Result<u16, FetchError> {
//!     // Stand-in for real I/O: takes 10ms, unless the token fires first.
//!     if token.wait_timeout(Duration::from_millis(10)) {
//!         return Err(FetchError::Cancelled);
//!     }
//!     match task.target() {
//!         "https://invalid.example" => Err(TransportError::connect("no such host").into()),
//!         _ => Ok(200),
//!     }
//! }
//!
//! let targets = ["https://github.com", "https://invalid.example", "https://golang.org"];
//! let token = CancelToken::with_timeout(Duration::from_secs(5));
//! let mut stream = dispatch(targets, &token, fetch).unwrap();
//!
//! let mut seen = 0;
//! for outcome in &mut stream {
//!     println!("{outcome}");
//!     seen += 1;
//! }
//! assert_eq!(stream.end(), Some(End::Drained));
//! assert_eq!(seen, 3);
//! ```
//!
//! Stopping early: the stream ends as soon as the token fires, and dropping it joins the workers.
//!
//! ```
//! use fanin::{dispatch, CancelToken, End, FetchError, Task};
//!
//! fn hang(_: &Task, token: &CancelToken) -> Result<u16, FetchError> {
//!     token.wait();
//!     Err(FetchError::Cancelled)
//! }
//!
//! let token = CancelToken::new();
//! let mut stream = dispatch(["A", "B", "C"], &token, hang).unwrap();
//! token.cancel();
//!
//! assert!(stream.by_ref().all(|outcome| outcome.is_cancelled()));
//! assert_eq!(stream.end(), Some(End::Cancelled));
//! drop(stream); // joins all worker threads
//! ```

mod barrier;
pub mod cancel;
mod dispatcher;
mod error;
mod fetch;
mod outcome;
mod sink;
mod stream;
mod task;
#[cfg(test)]
mod test;
mod worker;

pub use cancel::CancelToken;
pub use dispatcher::{dispatch, Dispatcher, DispatcherBuilder};
pub use error::{Error, FetchError, Result, TransportError, TransportErrorKind};
pub use fetch::Fetch;
pub use outcome::{Outcome, Status, Summary};
pub use stream::{End, OutcomeStream};
pub use task::Task;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        test::{wait_until, Script, ScriptedFetch},
        *,
    };

    const GRACE: Duration = Duration::from_secs(5);

    /// Three tasks, no cancellation, generous deadline.
    #[test]
    fn scenario_all_resolve() {
        let token = CancelToken::with_timeout(Duration::from_secs(30));
        let fetch = ScriptedFetch::new(Script::respond(200, Duration::from_millis(5)))
            .with("B", Script::fail(TransportErrorKind::Connect, Duration::from_millis(5)));
        let mut stream = dispatch(["A", "B", "C"], &token, fetch).unwrap();

        let outcomes: Vec<Outcome> = stream.by_ref().collect();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(stream.end(), Some(End::Drained));

        let summary: Summary = outcomes.iter().collect();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }

    /// Three tasks, cancelled before the dispatcher returns.
    #[test]
    fn scenario_cancelled_up_front() {
        let token = CancelToken::new();
        token.cancel();
        let fetch = ScriptedFetch::new(Script::respond(200, Duration::from_millis(5)));
        let gauge = fetch.gauge();
        let mut stream = dispatch(["A", "B", "C"], &token, fetch).unwrap();

        let outcomes: Vec<Outcome> = stream.by_ref().collect();
        assert!(outcomes.len() <= 3);
        assert!(outcomes.iter().all(Outcome::is_cancelled));
        assert_eq!(stream.end(), Some(End::Cancelled));

        assert!(wait_until(GRACE, || stream.live_workers() == 0));
        assert!(wait_until(GRACE, || stream.is_finished()));
        assert_eq!(gauge.in_flight(), 0);
    }

    /// Two tasks, deadline shorter than one of the fetches.
    #[test]
    fn scenario_deadline_cuts_one_task_short() {
        let token = CancelToken::with_timeout(Duration::from_millis(50));
        let fetch = ScriptedFetch::new(Script::respond(200, Duration::ZERO))
            .with("B", Script::respond(200, Duration::from_secs(10)));
        let stream = dispatch(["A", "B"], &token, fetch).unwrap();

        let mut outcomes = stream.wait_all();
        outcomes.sort_by_key(|outcome| outcome.index);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].target(), "A");
        assert_eq!(outcomes[0].status, Status::Success(200));
        assert_eq!(outcomes[1].target(), "B");
        assert!(outcomes[1].is_cancelled());
    }

    /// The multiset of targets is stable across runs even though the order is not.
    #[test]
    fn outcome_order_is_irrelevant() {
        let tasks = ["A", "B", "C", "D", "E", "A"];
        let run = || {
            let fetch = ScriptedFetch::new(Script::respond(200, Duration::from_millis(1)))
                .with("C", Script::respond(200, Duration::from_millis(10)));
            let mut targets: Vec<String> = dispatch(tasks, &CancelToken::new(), fetch)
                .unwrap()
                .wait_all()
                .into_iter()
                .map(|outcome| outcome.target().to_string())
                .collect();
            targets.sort();
            targets
        };
        assert_eq!(run(), run());
        assert_eq!(run(), ["A", "A", "B", "C", "D", "E"]);
    }
}
