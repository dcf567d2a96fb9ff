use std::{
    iter::FusedIterator,
    panic::resume_unwind,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Select};

use crate::{barrier::JoinBarrier, sink::Sink, CancelToken, Outcome};

/// Why an [`OutcomeStream`] stopped yielding outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    /// Every worker has exited and every outcome was yielded.
    Drained,
    /// The session's token fired first. Workers may still be running, and outcomes may still be
    /// buffered; [`OutcomeStream::wait_all`] collects them.
    Cancelled,
}

/// The consuming end of an orchestration session.
///
/// Iterating an [`OutcomeStream`] yields [`Outcome`]s in completion order. Each call to
/// [`Iterator::next`] blocks until either an outcome arrives, the outcome channel is closed (every
/// worker has exited), or the session's [`CancelToken`] fires. In the latter two cases the stream
/// ends, and [`OutcomeStream::end`] reports which one it was. Ending on cancellation does not wait
/// for the workers that are still running, and a token that has already fired ends the stream even
/// if outcomes are buffered.
///
/// This type enforces structured concurrency: when it is dropped, the session is cancelled and
/// every thread it spawned is joined. If a fetch has panicked, the panic will be forwarded to the
/// thread dropping the [`OutcomeStream`] (or calling [`OutcomeStream::join`]).
pub struct OutcomeStream {
    name: String,
    total: usize,
    received: usize,
    end: Option<End>,
    outcomes: Receiver<Outcome>,
    token: CancelToken,
    barrier: Arc<JoinBarrier>,
    sink: Arc<Sink>,
    threads: Vec<JoinHandle<()>>,
}

enum Ready {
    Outcome(Outcome),
    Closed,
    Cancelled,
}

impl Drop for OutcomeStream {
    fn drop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        if !self.sink.is_closed() && !self.token.is_cancelled() {
            log::debug!("session '{}' dropped while running; cancelling", self.name);
            self.token.cancel();
        }
        self.wait_for_exit();
    }
}

impl OutcomeStream {
    pub(crate) fn new(
        name: String,
        total: usize,
        outcomes: Receiver<Outcome>,
        token: CancelToken,
        barrier: Arc<JoinBarrier>,
        sink: Arc<Sink>,
        threads: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            name,
            total,
            received: 0,
            end: None,
            outcomes,
            token,
            barrier,
            sink,
            threads,
        }
    }

    fn wait_for_exit(&mut self) {
        // Wait for all threads to exit and propagate a panic if one of them panicked.
        let mut payload = None;
        for handle in self.threads.drain(..) {
            if let Err(pl) = handle.join() {
                payload.get_or_insert(pl);
            }
        }
        if let Some(payload) = payload {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }

    /// Blocks until the next outcome, the end of the session, or cancellation.
    fn ready(&self) -> Ready {
        let fired = self.token.fire_receivers();
        let mut select = Select::new();
        let outcome_op = select.recv(&self.outcomes);
        for &receiver in &fired {
            select.recv(receiver);
        }

        let selected = match self.token.deadline() {
            Some(deadline) => select.select_deadline(deadline).ok(),
            None => Some(select.select()),
        };
        let Some(op) = selected else {
            return Ready::Cancelled;
        };
        let index = op.index();
        if index == outcome_op {
            match op.recv(&self.outcomes) {
                Ok(outcome) => Ready::Outcome(outcome),
                Err(_) => Ready::Closed,
            }
        } else {
            // Fire channels only become ready by disconnecting.
            let _ = op.recv(fired[index - 1]);
            Ready::Cancelled
        }
    }

    fn finish(&mut self, end: End) {
        log::debug!(
            "session '{}' stream ended ({end:?}) after {} of {} outcomes",
            self.name,
            self.received,
            self.total
        );
        self.end = Some(end);
    }

    /// Returns why the stream ended, or [`None`] while it can still yield outcomes.
    pub fn end(&self) -> Option<End> {
        self.end
    }

    /// Cancels the session.
    ///
    /// Workers that have not started their fetch yet will report [`Status::Cancelled`] without
    /// fetching; fetches in flight are asked to abort. The token passed to the dispatcher is not
    /// affected.
    ///
    /// [`Status::Cancelled`]: crate::Status::Cancelled
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The session's own token, a child of the one passed to the dispatcher.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Number of tasks dispatched in this session.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of outcomes yielded so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Number of worker threads that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.barrier.live()
    }

    /// Returns whether every thread of the session, including the one closing the outcome
    /// channel, has exited.
    pub fn is_finished(&self) -> bool {
        self.sink.is_closed() && self.threads.iter().all(JoinHandle::is_finished)
    }

    /// Collects every outcome not yielded yet, then joins the session's threads.
    ///
    /// Unlike iteration, this does not stop when the token fires: it keeps reading until the last
    /// worker has exited. Fetches are required to return promptly after cancellation, so this
    /// only blocks for as long as the slowest fetch takes to respond to its token.
    ///
    /// If a fetch has panicked, the panic is propagated to the caller.
    pub fn wait_all(mut self) -> Vec<Outcome> {
        let outcomes: Vec<Outcome> = self.outcomes.iter().collect();
        self.received += outcomes.len();
        if self.end.is_none() {
            self.finish(End::Drained);
        }
        self.wait_for_exit();
        outcomes
    }

    /// Blocks until every thread of the session has exited, without cancelling it.
    ///
    /// Outcomes not yielded yet are discarded. If a fetch has panicked, the panic is propagated to
    /// the caller.
    pub fn join(mut self) {
        self.wait_for_exit();
    }
}

impl Iterator for OutcomeStream {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        if self.end.is_some() {
            return None;
        }
        // Once fired, cancellation wins over outcomes that are already buffered.
        if self.token.is_cancelled() {
            self.finish(End::Cancelled);
            return None;
        }
        match self.ready() {
            Ready::Outcome(outcome) => {
                self.received += 1;
                Some(outcome)
            }
            Ready::Closed => {
                self.finish(End::Drained);
                None
            }
            Ready::Cancelled => {
                self.finish(End::Cancelled);
                None
            }
        }
    }
}

impl FusedIterator for OutcomeStream {}
