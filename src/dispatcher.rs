use std::{sync::Arc, thread};

use crate::{
    barrier::{Arrival, JoinBarrier},
    sink::sink,
    stream::OutcomeStream,
    worker::Worker,
    CancelToken, Error, Fetch, Result, Task,
};

/// Spawns one worker thread per task and returns the stream their outcomes arrive on.
///
/// Shorthand for `Dispatcher::builder().spawn(tasks, token, fetch)`.
pub fn dispatch<I, F>(tasks: I, token: &CancelToken, fetch: F) -> Result<OutcomeStream>
where
    I: IntoIterator,
    I::Item: Into<Task>,
    F: Fetch,
{
    Dispatcher::builder().spawn(tasks, token, fetch)
}

/// Starts orchestration sessions.
///
/// A session runs every task on its own thread, funnels the outcomes into one bounded channel
/// and closes that channel once the last worker has exited. See [`OutcomeStream`] for the
/// consuming side.
#[derive(Debug)]
pub struct Dispatcher {
    _p: (),
}

impl Dispatcher {
    /// Returns a builder that can be used to configure and start a session.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder {
            name: None,
            stack_size: None,
        }
    }
}

/// Configures and starts an orchestration session.
///
/// Returned by [`Dispatcher::builder`].
#[derive(Debug, Clone)]
pub struct DispatcherBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl DispatcherBuilder {
    /// Sets the session name.
    ///
    /// Threads are named after it: `{name}-worker-{index}` for workers and `{name}-closer` for
    /// the thread that closes the outcome channel. Defaults to `fanin`.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the stack size of every spawned thread, in bytes.
    #[inline]
    pub fn stack_size(self, size: usize) -> Self {
        Self {
            stack_size: Some(size),
            ..self
        }
    }

    fn thread(&self, name: String) -> thread::Builder {
        let builder = thread::Builder::new().name(name);
        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }

    /// Starts the session and returns immediately.
    ///
    /// The session runs on a [`child`][CancelToken::child] of `token`: cancelling `token` (or
    /// reaching its deadline) cancels the session, while cancelling or dropping the returned
    /// [`OutcomeStream`] leaves `token` untouched.
    ///
    /// `tasks` may be empty, in which case the stream ends without yielding anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if a thread could not be spawned. Workers that were already
    /// running are cancelled and joined before the error is returned; tasks after the one that
    /// failed are never started.
    pub fn spawn<I, F>(self, tasks: I, token: &CancelToken, fetch: F) -> Result<OutcomeStream>
    where
        I: IntoIterator,
        I::Item: Into<Task>,
        F: Fetch,
    {
        let tasks: Vec<Task> = tasks.into_iter().map(Into::into).collect();
        let name = self.name.clone().unwrap_or_else(|| "fanin".to_string());
        let token = token.child();
        let (sink, outcomes) = sink(tasks.len());
        let sink = Arc::new(sink);
        let barrier = Arc::new(JoinBarrier::new(tasks.len()));
        let fetch = Arc::new(fetch);
        let total = tasks.len();
        log::debug!("session '{name}' dispatching {total} tasks");

        let mut threads = Vec::with_capacity(total + 1);
        for (index, task) in tasks.into_iter().enumerate() {
            let thread_name = format!("{name}-worker-{index}");
            let worker = Worker {
                index,
                task,
                token: token.clone(),
                fetch: fetch.clone(),
                sink: sink.clone(),
                arrival: Arrival::new(barrier.clone(), thread_name.clone()),
            };
            // On failure the closure, and with it the worker's arrival, is dropped.
            match self.thread(thread_name.clone()).spawn(move || worker.run()) {
                Ok(handle) => threads.push(handle),
                Err(source) => return Err(abort(&token, threads, thread_name, source)),
            }
        }

        let closer_name = format!("{name}-closer");
        let closer = {
            let barrier = barrier.clone();
            let sink = sink.clone();
            let name = name.clone();
            move || {
                barrier.wait();
                sink.close();
                log::debug!("session '{name}': all workers exited");
            }
        };
        match self.thread(closer_name.clone()).spawn(closer) {
            Ok(handle) => threads.push(handle),
            Err(source) => return Err(abort(&token, threads, closer_name, source)),
        }

        Ok(OutcomeStream::new(
            name, total, outcomes, token, barrier, sink, threads,
        ))
    }
}

/// Cancels a partially started session and joins its threads.
fn abort(
    token: &CancelToken,
    threads: Vec<thread::JoinHandle<()>>,
    name: String,
    source: std::io::Error,
) -> Error {
    log::warn!("failed to spawn thread '{name}': {source}; cancelling session");
    token.cancel();
    for handle in threads {
        // The spawn error is what gets reported; worker panics are secondary here.
        let _ = handle.join();
    }
    Error::Spawn { name, source }
}
