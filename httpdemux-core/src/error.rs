//! Response error taxonomy.
//!
//! This module provides [`ResponseError`], the cause carried by every
//! abnormal termination of a response exchange. One value may be handed to
//! the sink, the completion future, the response log and the request abort
//! at the same time, so it is cheap to clone.

use std::io;
use std::sync::Arc;

/// Why a response exchange ended abnormally.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ResponseError {
    /// The response did not complete within the configured response timeout.
    #[error("response timed out")]
    Timeout,

    /// The consumer stopped reading the response.
    #[error("subscription cancelled")]
    Cancelled,

    /// The response stream was closed without an explicit cause.
    #[error("response stream closed")]
    Closed,

    /// The connection carrying the response was closed.
    #[error("session closed")]
    ClosedSession,

    /// Transport-level failure (connection reset, broken pipe, etc.).
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),

    /// Malformed traffic reported by the wire codec.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ResponseError {
    /// Create a protocol error with the given message.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        ResponseError::Protocol(message.into())
    }

    /// Returns `true` for the synthesized response-timeout failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResponseError::Timeout)
    }

    /// Returns `true` for the "subscription was cancelled" marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResponseError::Cancelled)
    }

    /// Returns whether this cause is part of routine connection teardown.
    ///
    /// Session closure, consumer cancellation and transport errors whose
    /// kind signals that the peer went away are considered expected.
    /// Registries do not use this classifier unless it is installed
    /// explicitly.
    ///
    /// # Example
    ///
    /// ```
    /// use httpdemux_core::ResponseError;
    /// use std::io;
    ///
    /// let reset = ResponseError::from(io::Error::from(io::ErrorKind::ConnectionReset));
    /// assert!(reset.is_expected());
    ///
    /// let refused = ResponseError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
    /// assert!(!refused.is_expected());
    /// assert!(!ResponseError::Timeout.is_expected());
    /// ```
    pub fn is_expected(&self) -> bool {
        match self {
            ResponseError::ClosedSession | ResponseError::Cancelled => true,
            ResponseError::Transport(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            ResponseError::Timeout | ResponseError::Closed | ResponseError::Protocol(_) => false,
        }
    }
}

impl From<io::Error> for ResponseError {
    fn from(err: io::Error) -> Self {
        ResponseError::Transport(Arc::new(err))
    }
}
