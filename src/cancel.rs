//! Cooperative, level-triggered cancellation.
//!
//! A [`CancelToken`] starts out *live* and can be *fired* exactly once, either explicitly via
//! [`CancelToken::cancel`] or implicitly when its deadline elapses. Once fired, it stays fired:
//! every clone, and every [`child`][CancelToken::child] token derived from it, reports
//! [`is_cancelled`][CancelToken::is_cancelled] as `true` from then on.
//!
//! Firing is observed without polling. Each token owns a channel whose only sender is dropped when
//! the token is cancelled, so any thread blocked in a [`crossbeam_channel::Select`] over the
//! token's receiver wakes up as soon as it disconnects. Deadlines are folded into the same wait
//! via [`Select::select_deadline`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use fanin::CancelToken;
//!
//! let session = CancelToken::with_timeout(Duration::from_secs(30));
//! let request = session.child();
//!
//! assert!(!request.is_cancelled());
//! session.cancel();
//! assert!(request.is_cancelled());
//!
//! // Waits on a fired token return immediately.
//! assert!(request.wait_timeout(Duration::from_secs(10)));
//! ```

use std::{
    fmt, iter,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Select, Sender};

/// Message type of the fire channels. Nothing is ever sent; only disconnection is observed.
pub(crate) enum Never {}

/// A broadcast, monotonic stop condition shared between a session and the threads it runs.
///
/// Cloning a [`CancelToken`] yields another handle to the *same* condition. Use
/// [`CancelToken::child`] to derive a token that can be fired independently of its parent.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    fired: AtomicBool,
    /// Dropped (set to `None`) when the token is cancelled, disconnecting `on_fire`.
    trigger: Mutex<Option<Sender<Never>>>,
    on_fire: Receiver<Never>,
    deadline: Option<Instant>,
    parent: Option<CancelToken>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a live token without a deadline.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates a token that fires on its own once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline), None)
    }

    /// Creates a token that fires on its own once `timeout` has elapsed.
    ///
    /// A `timeout` too large to be represented as an [`Instant`] means "no deadline".
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout), None)
    }

    /// Derives a token that fires when `self` fires, but can also be cancelled on its own without
    /// affecting `self`.
    pub fn child(&self) -> Self {
        Self::build(None, Some(self.clone()))
    }

    /// Like [`CancelToken::child`], but the child additionally fires once `timeout` has elapsed.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout), Some(self.clone()))
    }

    /// Like [`CancelToken::child`], but the child additionally fires at `deadline`.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        Self::build(Some(deadline), Some(self.clone()))
    }

    fn build(deadline: Option<Instant>, parent: Option<CancelToken>) -> Self {
        let (trigger, on_fire) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                on_fire,
                deadline,
                parent,
            }),
        }
    }

    /// Fires the token.
    ///
    /// Cancelling an already-fired token does nothing. Ancestors of `self` are not affected.
    pub fn cancel(&self) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let trigger = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(trigger);
        log::debug!("cancellation token fired");
    }

    /// Returns whether the token, one of its ancestors, or any deadline along the chain has fired.
    ///
    /// This is level-triggered: once it has returned `true`, it returns `true` forever.
    pub fn is_cancelled(&self) -> bool {
        let now = Instant::now();
        self.ancestry().any(|token| {
            token.inner.fired.load(Ordering::SeqCst)
                || token.inner.deadline.is_some_and(|deadline| deadline <= now)
        })
    }

    /// Returns the earliest deadline of `self` and its ancestors, if any of them has one.
    pub fn deadline(&self) -> Option<Instant> {
        self.ancestry()
            .filter_map(|token| token.inner.deadline)
            .min()
    }

    /// Returns the time left until [`CancelToken::deadline`].
    ///
    /// Returns [`None`] when there is no deadline, and [`Duration::ZERO`] once it has passed.
    /// Fetch implementations can use this to derive I/O timeouts.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Blocks the calling thread until the token fires.
    pub fn wait(&self) {
        self.wait_until(None);
    }

    /// Blocks the calling thread until the token fires or `timeout` elapses, whichever comes
    /// first.
    ///
    /// Returns `true` if the token has fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now().checked_add(timeout))
    }

    fn wait_until(&self, until: Option<Instant>) -> bool {
        loop {
            if self.is_cancelled() {
                return true;
            }
            if until.is_some_and(|until| until <= Instant::now()) {
                return false;
            }

            let receivers = self.fire_receivers();
            let wake_at = match (self.deadline(), until) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let mut select = Select::new();
            for &receiver in &receivers {
                select.recv(receiver);
            }
            let selected = match wake_at {
                Some(wake_at) => select.select_deadline(wake_at).ok(),
                None => Some(select.select()),
            };
            if let Some(op) = selected {
                // A fire channel only ever becomes ready by disconnecting.
                let index = op.index();
                let _ = op.recv(receivers[index]);
            }
        }
    }

    /// The fire channels of `self` and all of its ancestors, nearest first.
    pub(crate) fn fire_receivers(&self) -> Vec<&Receiver<Never>> {
        self.ancestry().map(|token| &token.inner.on_fire).collect()
    }

    fn ancestry(&self) -> impl Iterator<Item = &CancelToken> {
        iter::successors(Some(self), |token| token.inner.parent.as_ref())
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline())
            .finish_non_exhaustive()
    }
}
