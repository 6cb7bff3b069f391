//! Inbound flow control for one connection.
//!
//! [`InboundTrafficController`] counts body bytes that were handed to
//! response sinks but not yet taken by their consumers. Past the high
//! watermark it asks the connection to stop reading; once consumers catch
//! up to the low watermark it resumes.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Default high watermark in bytes.
pub const DEFAULT_HIGH_WATERMARK: usize = 128 * 1024;

/// Default low watermark in bytes.
pub const DEFAULT_LOW_WATERMARK: usize = 64 * 1024;

/// Connection-side switch for reading from the transport.
pub trait ReadInterest {
    /// Enable or disable reading inbound bytes.
    fn set_reading(&self, enabled: bool);
}

struct Inner {
    unconsumed: Cell<usize>,
    high_watermark: usize,
    low_watermark: usize,
    suspended: Cell<bool>,
    read_interest: Option<Rc<dyn ReadInterest>>,
}

/// Shared counter of unconsumed inbound bytes.
///
/// Cloning yields another handle to the same counter.
#[derive(Clone)]
pub struct InboundTrafficController {
    inner: Rc<Inner>,
}

impl InboundTrafficController {
    /// Create a controller with the given watermarks.
    ///
    /// `low_watermark` is clamped to `high_watermark`.
    pub fn new(
        high_watermark: usize,
        low_watermark: usize,
        read_interest: Option<Rc<dyn ReadInterest>>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                unconsumed: Cell::new(0),
                high_watermark,
                low_watermark: low_watermark.min(high_watermark),
                suspended: Cell::new(false),
                read_interest,
            }),
        }
    }

    /// Create a controller that only keeps count.
    pub fn disabled() -> Self {
        Self::new(DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK, None)
    }

    /// Record `n` bytes handed to a sink.
    pub fn inc(&self, n: usize) {
        let inner = &self.inner;
        let unconsumed = inner.unconsumed.get().saturating_add(n);
        inner.unconsumed.set(unconsumed);
        if !inner.suspended.get() && unconsumed >= inner.high_watermark {
            inner.suspended.set(true);
            tracing::trace!(unconsumed, "suspending inbound reads");
            if let Some(read) = &inner.read_interest {
                read.set_reading(false);
            }
        }
    }

    /// Record `n` bytes taken by a consumer or discarded.
    pub fn dec(&self, n: usize) {
        let inner = &self.inner;
        let unconsumed = inner.unconsumed.get().saturating_sub(n);
        inner.unconsumed.set(unconsumed);
        if inner.suspended.get() && unconsumed <= inner.low_watermark {
            inner.suspended.set(false);
            tracing::trace!(unconsumed, "resuming inbound reads");
            if let Some(read) = &inner.read_interest {
                read.set_reading(true);
            }
        }
    }

    /// Bytes handed to sinks and not yet consumed.
    pub fn unconsumed_bytes(&self) -> usize {
        self.inner.unconsumed.get()
    }

    /// Returns `true` while inbound reads are suspended.
    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.get()
    }
}

impl Default for InboundTrafficController {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for InboundTrafficController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundTrafficController")
            .field("unconsumed", &self.inner.unconsumed.get())
            .field("high_watermark", &self.inner.high_watermark)
            .field("low_watermark", &self.inner.low_watermark)
            .field("suspended", &self.inner.suspended.get())
            .finish()
    }
}
