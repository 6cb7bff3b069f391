//! Per-exchange response options.
//!
//! This module provides [`ResponseOptions`], the immutable configuration a
//! response state machine captures when it is registered.

use std::time::Duration;

/// Options for a single response exchange.
///
/// # Example
///
/// ```
/// use httpdemux::ResponseOptions;
/// use std::time::Duration;
///
/// let options = ResponseOptions::new()
///     .response_timeout(Duration::from_secs(10))
///     .max_content_length(10 * 1024 * 1024);
///
/// assert_eq!(options.response_timeout_millis(), 10_000);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    /// Time allowed for the whole response. Zero disables the timeout.
    pub(crate) response_timeout: Duration,
    /// Maximum body size in bytes. Zero means unlimited.
    pub(crate) max_content_length: u64,
}

impl ResponseOptions {
    /// Create options with no timeout and no content length limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response timeout.
    ///
    /// A duration below one millisecond disables the timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the maximum content length.
    ///
    /// Zero means unlimited. The limit is exposed to the codec; it is not
    /// enforced by the response layer.
    pub fn max_content_length(mut self, max: u64) -> Self {
        self.max_content_length = max;
        self
    }

    /// Get the response timeout, or `None` if disabled.
    ///
    /// Timeouts shorter than one millisecond count as disabled.
    pub fn get_response_timeout(&self) -> Option<Duration> {
        if self.response_timeout_millis() == 0 {
            None
        } else {
            Some(self.response_timeout)
        }
    }

    /// Get the response timeout in milliseconds; zero when disabled.
    pub fn response_timeout_millis(&self) -> u64 {
        u64::try_from(self.response_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Get the maximum content length; zero when unlimited.
    pub fn get_max_content_length(&self) -> u64 {
        self.max_content_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_options_default() {
        let options = ResponseOptions::new();
        assert_eq!(options.get_response_timeout(), None);
        assert_eq!(options.response_timeout_millis(), 0);
        assert_eq!(options.get_max_content_length(), 0);
    }

    #[test]
    fn test_response_options_timeout() {
        let options = ResponseOptions::new().response_timeout(Duration::from_millis(1500));
        assert_eq!(
            options.get_response_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(options.response_timeout_millis(), 1500);
    }

    #[test]
    fn test_response_options_zero_timeout_disables() {
        let options = ResponseOptions::new()
            .response_timeout(Duration::from_secs(5))
            .response_timeout(Duration::ZERO);
        assert_eq!(options.get_response_timeout(), None);
    }

    #[test]
    fn test_response_options_sub_millisecond_timeout_disables() {
        let options = ResponseOptions::new().response_timeout(Duration::from_micros(500));
        assert_eq!(options.response_timeout_millis(), 0);
        assert_eq!(options.get_response_timeout(), None);

        let options = ResponseOptions::new().response_timeout(Duration::from_micros(1500));
        assert_eq!(
            options.get_response_timeout(),
            Some(Duration::from_micros(1500))
        );
    }

    #[test]
    fn test_response_options_huge_timeout_saturates() {
        let options = ResponseOptions::new().response_timeout(Duration::MAX);
        assert_eq!(options.response_timeout_millis(), u64::MAX);
    }

    #[test]
    fn test_response_options_max_content_length() {
        let options = ResponseOptions::new().max_content_length(4096);
        assert_eq!(options.get_max_content_length(), 4096);
    }
}
