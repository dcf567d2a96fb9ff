//! The bounded aggregation channel workers publish their outcomes into.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::Outcome;

/// Creates a connected pair of [`Sink`] and the reading end of its channel.
///
/// `capacity` must be at least the number of outcomes that will ever be published, so that
/// [`Sink::publish`] never has to wait for the reader.
pub(crate) fn sink(capacity: usize) -> (Sink, Receiver<Outcome>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    (
        Sink {
            sender: Mutex::new(Some(sender)),
        },
        receiver,
    )
}

/// Write side of a session's outcome channel, shared by all of its workers.
///
/// The sink owns the only [`Sender`], so [`Sink::close`] disconnects the channel and the reader
/// observes the end of the stream once it has drained the buffer.
pub(crate) struct Sink {
    sender: Mutex<Option<Sender<Outcome>>>,
}

impl Sink {
    fn lock(&self) -> MutexGuard<'_, Option<Sender<Outcome>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes an outcome without blocking.
    ///
    /// # Panics
    ///
    /// Panics if the sink has already been closed, or if its capacity is exhausted. Both mean the
    /// one-outcome-per-task accounting is broken.
    pub(crate) fn publish(&self, outcome: Outcome) {
        let guard = self.lock();
        let Some(sender) = guard.as_ref() else {
            panic!(
                "outcome for task #{} ('{}') published after the sink was closed",
                outcome.index,
                outcome.target()
            );
        };
        match sender.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => panic!(
                "sink is full; outcome for task #{} ('{}') exceeds its capacity of {}",
                outcome.index,
                outcome.target(),
                sender.capacity().unwrap_or(0)
            ),
            Err(TrySendError::Disconnected(outcome)) => {
                // Nobody is reading anymore; the outcome has nowhere to go.
                log::trace!(
                    "dropping outcome for task #{} ('{}'): reader is gone",
                    outcome.index,
                    outcome.target()
                );
            }
        }
    }

    /// Closes the sink, ending the stream for the reader.
    ///
    /// # Panics
    ///
    /// Panics if the sink has already been closed.
    pub(crate) fn close(&self) {
        let sender = self.lock().take();
        assert!(sender.is_some(), "sink closed more than once");
        log::debug!("sink closed");
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}
