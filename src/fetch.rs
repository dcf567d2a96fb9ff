use crate::{CancelToken, FetchError, Task};

/// The operation run by every worker thread.
///
/// Implementations receive the session's [`CancelToken`] and must return in bounded time once it
/// fires, typically by returning [`FetchError::Cancelled`]. Blocking waits should go through
/// [`CancelToken::wait_timeout`], and I/O timeouts can be derived from
/// [`CancelToken::remaining`]. An implementation must not keep resources alive past its own
/// return.
///
/// `fetch` is called concurrently from many threads, hence the [`Sync`] bound.
///
/// Any function or closure with the right signature implements this trait:
///
/// ```
/// use fanin::{CancelToken, Fetch, FetchError, Task, TransportError};
///
/// fn lookup(task: &Task, token: &CancelToken) -> Result<u16, FetchError> {
///     if token.is_cancelled() {
///         return Err(FetchError::Cancelled);
///     }
///     match task.target() {
///         "localhost" => Ok(200),
///         other => Err(TransportError::connect(format!("unknown host {other}")).into()),
///     }
/// }
///
/// let token = CancelToken::new();
/// assert_eq!(lookup.fetch(&Task::new("localhost"), &token), Ok(200));
/// ```
pub trait Fetch: Send + Sync + 'static {
    /// Runs the fetch for `task`, returning a status code on success.
    fn fetch(&self, task: &Task, token: &CancelToken) -> Result<u16, FetchError>;
}

impl<F> Fetch for F
where
    F: Fn(&Task, &CancelToken) -> Result<u16, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, task: &Task, token: &CancelToken) -> Result<u16, FetchError> {
        self(task, token)
    }
}
