use std::{fmt, io};

use thiserror::Error;

/// Errors returned by the dispatcher itself.
///
/// Failures of individual fetches are never reported through this type; they are recorded in
/// each task's [`Outcome`][crate::Outcome] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The target could not be reached.
    Connect,
    /// The fetch gave up waiting on its own timer.
    Timeout,
    /// The target answered with something unusable.
    Protocol,
    /// The fetch implementation panicked.
    Panicked,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Protocol => "protocol",
            TransportErrorKind::Panicked => "panicked",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetch-level failure, carried inside [`Status::Failure`][crate::Status::Failure].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new<D: Into<String>>(kind: TransportErrorKind, detail: D) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn connect<D: Into<String>>(detail: D) -> Self {
        Self::new(TransportErrorKind::Connect, detail)
    }

    pub fn timeout<D: Into<String>>(detail: D) -> Self {
        Self::new(TransportErrorKind::Timeout, detail)
    }

    pub fn protocol<D: Into<String>>(detail: D) -> Self {
        Self::new(TransportErrorKind::Protocol, detail)
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                TransportErrorKind::Protocol
            }
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Error returned by a [`Fetch`][crate::Fetch] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The fetch noticed the cancellation token had fired and aborted.
    #[error("fetch cancelled")]
    Cancelled,
}

impl From<io::Error> for FetchError {
    fn from(err: io::Error) -> Self {
        FetchError::Transport(err.into())
    }
}
