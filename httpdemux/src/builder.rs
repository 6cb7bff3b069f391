//! Registry builder.
//!
//! Provides a fluent API for configuring and building a [`ResponseRegistry`].

use std::fmt;
use std::rc::Rc;

use httpdemux_core::ResponseError;

use crate::options::ResponseOptions;
use crate::registry::ResponseRegistry;
use crate::response::CausePredicate;
use crate::traffic::{
    DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK, InboundTrafficController, ReadInterest,
};

/// Builder for creating a [`ResponseRegistry`].
///
/// # Example
///
/// ```
/// use httpdemux::{RegistryBuilder, ResponseError, ResponseOptions};
/// use std::time::Duration;
///
/// let registry = RegistryBuilder::new()
///     .default_options(ResponseOptions::new().response_timeout(Duration::from_secs(10)))
///     .expected_causes(ResponseError::is_expected)
///     .traffic_watermarks(256 * 1024, 128 * 1024)
///     .build();
///
/// assert_eq!(registry.default_options().response_timeout_millis(), 10_000);
/// ```
pub struct RegistryBuilder {
    /// Options for exchanges registered without their own.
    default_options: ResponseOptions,
    /// Causes that need no diagnostic when they arrive after a timeout.
    expected_cause: Option<CausePredicate>,
    /// Unconsumed bytes at which inbound reads are suspended.
    high_watermark: usize,
    /// Unconsumed bytes at which inbound reads resume.
    low_watermark: usize,
    /// Switch for reading from the transport.
    read_interest: Option<Rc<dyn ReadInterest>>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("default_options", &self.default_options)
            .field("expected_cause", &self.expected_cause.is_some())
            .field("high_watermark", &self.high_watermark)
            .field("low_watermark", &self.low_watermark)
            .field("read_interest", &self.read_interest.is_some())
            .finish()
    }
}

impl RegistryBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            default_options: ResponseOptions::default(),
            expected_cause: None,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
            read_interest: None,
        }
    }

    /// Set the options used for exchanges that bring none of their own.
    pub fn default_options(mut self, options: ResponseOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Classify causes that may arrive after a response timed out without
    /// being reported.
    ///
    /// By default every cause other than the timeout itself is reported
    /// with a warning. [`ResponseError::is_expected`] is a ready-made
    /// classifier for routine connection teardown.
    pub fn expected_causes<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResponseError) -> bool + 'static,
    {
        self.expected_cause = Some(Rc::new(predicate));
        self
    }

    /// Set the inbound flow-control watermarks in bytes.
    ///
    /// `low` is clamped to `high`.
    pub fn traffic_watermarks(mut self, high: usize, low: usize) -> Self {
        self.high_watermark = high;
        self.low_watermark = low;
        self
    }

    /// Attach the connection's read switch to the traffic controller.
    pub fn read_interest(mut self, read_interest: Rc<dyn ReadInterest>) -> Self {
        self.read_interest = Some(read_interest);
        self
    }

    /// Build the registry.
    pub fn build(self) -> ResponseRegistry {
        let traffic = InboundTrafficController::new(
            self.high_watermark,
            self.low_watermark,
            self.read_interest,
        );
        let expected_cause = self
            .expected_cause
            .unwrap_or_else(|| Rc::new(|_: &ResponseError| false));

        ResponseRegistry::from_parts(traffic, self.default_options, expected_cause)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
