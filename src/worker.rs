use std::{
    any::Any,
    panic::{self, resume_unwind, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    barrier::Arrival, sink::Sink, CancelToken, Fetch, FetchError, Outcome, Status, Task,
    TransportError, TransportErrorKind,
};

/// Everything one worker thread needs to run its task.
///
/// A worker moves through `Pending → Running → {Succeeded | Failed | Cancelled}`: it is pending
/// until [`Worker::run`] is entered, running while the fetch is in progress, and publishes exactly
/// one [`Outcome`] describing its terminal state before arriving at the join barrier.
pub(crate) struct Worker<F: Fetch> {
    pub(crate) index: usize,
    pub(crate) task: Task,
    pub(crate) token: CancelToken,
    pub(crate) fetch: Arc<F>,
    pub(crate) sink: Arc<Sink>,
    pub(crate) arrival: Arrival,
}

impl<F: Fetch> Worker<F> {
    /// Runs the task to its outcome on the calling thread.
    ///
    /// If the fetch panics, a [`TransportErrorKind::Panicked`] failure is published first and the
    /// panic is then resumed, so that it reaches whoever joins this thread.
    pub(crate) fn run(self) {
        let Worker {
            index,
            task,
            token,
            fetch,
            sink,
            arrival,
        } = self;
        // `arrival` is dropped on return or unwind, after the outcome has been published.
        log::trace!("worker '{}' starting", arrival.name());

        if token.is_cancelled() {
            log::trace!("task #{index} ('{task}') cancelled before its fetch started");
            sink.publish(Outcome {
                task,
                index,
                status: Status::Cancelled,
                latency: Duration::ZERO,
                settled_after_cancel: true,
            });
            return;
        }

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| fetch.fetch(&task, &token)));
        let latency = start.elapsed();
        let settled_after_cancel = token.is_cancelled();

        let mut payload = None;
        let status = match result {
            Ok(Ok(code)) => Status::Success(code),
            Ok(Err(FetchError::Transport(err))) => Status::Failure(err),
            Ok(Err(FetchError::Cancelled)) => Status::Cancelled,
            Err(panic) => {
                let message = panic_message(&*panic);
                log::warn!("fetch for task #{index} ('{task}') panicked: {message}");
                payload = Some(panic);
                Status::Failure(TransportError::new(TransportErrorKind::Panicked, message))
            }
        };

        sink.publish(Outcome {
            task,
            index,
            status,
            latency,
            settled_after_cancel,
        });

        if let Some(payload) = payload {
            resume_unwind(payload);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
