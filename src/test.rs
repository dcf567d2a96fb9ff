//! Internal unit test utilities.

use std::{
    collections::HashMap,
    panic::resume_unwind,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{CancelToken, Fetch, FetchError, Task, TransportError, TransportErrorKind};

/// What a [`ScriptedFetch`] does for a given target.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with `code` after `after`, unless the token fires first.
    Respond { code: u16, after: Duration },
    /// Fail with `kind` after `after`, unless the token fires first.
    Fail {
        kind: TransportErrorKind,
        after: Duration,
    },
    /// Succeed after `after`, ignoring the token while doing so.
    Stubborn { code: u16, after: Duration },
    /// Wait for the token and report cancellation.
    Stall,
    /// Panic immediately.
    Panic,
}

impl Script {
    pub fn respond(code: u16, after: Duration) -> Self {
        Script::Respond { code, after }
    }

    pub fn fail(kind: TransportErrorKind, after: Duration) -> Self {
        Script::Fail { kind, after }
    }
}

/// Counters shared between a [`ScriptedFetch`] and the test that moved it into a dispatcher.
#[derive(Default)]
pub struct Gauge {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
}

impl Gauge {
    /// Number of times `fetch` has been entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch` calls that have not returned yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// A [`Fetch`] implementation that follows a per-target [`Script`].
pub struct ScriptedFetch {
    default: Script,
    scripts: HashMap<String, Script>,
    gauge: Arc<Gauge>,
}

impl ScriptedFetch {
    pub fn new(default: Script) -> Self {
        Self {
            default,
            scripts: HashMap::new(),
            gauge: Arc::default(),
        }
    }

    pub fn with(mut self, target: &str, script: Script) -> Self {
        self.scripts.insert(target.to_string(), script);
        self
    }

    pub fn gauge(&self) -> Arc<Gauge> {
        self.gauge.clone()
    }
}

impl Fetch for ScriptedFetch {
    fn fetch(&self, task: &Task, token: &CancelToken) -> Result<u16, FetchError> {
        self.gauge.calls.fetch_add(1, Ordering::SeqCst);
        self.gauge.in_flight.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight(&self.gauge);

        let script = self.scripts.get(task.target()).unwrap_or(&self.default);
        match *script {
            Script::Respond { code, after } => {
                if token.wait_timeout(after) {
                    return Err(FetchError::Cancelled);
                }
                Ok(code)
            }
            Script::Fail { kind, after } => {
                if token.wait_timeout(after) {
                    return Err(FetchError::Cancelled);
                }
                Err(TransportError::new(kind, format!("scripted failure for {task}")).into())
            }
            Script::Stubborn { code, after } => {
                thread::sleep(after);
                Ok(code)
            }
            Script::Stall => {
                token.wait();
                Err(FetchError::Cancelled)
            }
            Script::Panic => resume_unwind(Box::new("scripted fetch panic")),
        }
    }
}

struct InFlight<'a>(&'a Gauge);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds or `grace` has elapsed, returning its last value.
pub fn wait_until(grace: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if condition() {
            return true;
        }
        if start.elapsed() >= grace {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
