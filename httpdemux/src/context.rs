//! Exchange context seams.
//!
//! A response exchange may be paired with an [`ExchangeContext`] that owns
//! the request/response log and can abort the outbound request. The
//! response layer only consumes these traits; the client implements them.
//!
//! All methods take `&self`: the context is shared with the request side of
//! the exchange and lives on the connection's execution context, so
//! implementations use interior mutability.

use std::rc::Rc;

use http::HeaderMap;
use httpdemux_core::{HttpData, ResponseError, ResponseHeaders};

/// Handler that replaces the default response-timeout action.
pub type TimeoutHandler = Rc<dyn Fn()>;

/// Response side of the exchange log.
pub trait ResponseLog {
    /// Record that the response started. Safe to call repeatedly.
    fn start_response(&self);

    /// Record that the first response byte was transferred.
    fn response_first_bytes_transferred(&self);

    /// Record the final response headers.
    fn response_headers(&self, headers: &ResponseHeaders);

    /// Record the response trailers.
    fn response_trailers(&self, trailers: &HeaderMap);

    /// Record a received body chunk.
    fn increase_response_length(&self, data: &HttpData);

    /// Record the end of the response, with a cause if it ended abnormally.
    fn end_response(&self, cause: Option<&ResponseError>);
}

/// The outbound request paired with a response.
pub trait OutboundRequest {
    /// Abort the request, with a cause if there is one.
    fn abort(&self, cause: Option<&ResponseError>);

    /// Destination authority (`host[:port]`), if known.
    fn authority(&self) -> Option<String>;
}

/// Everything a response exchange needs from its request context.
pub trait ExchangeContext {
    /// The response log.
    fn log(&self) -> &dyn ResponseLog;

    /// The paired outbound request.
    fn request(&self) -> &dyn OutboundRequest;

    /// A custom response-timeout handler, if one is installed.
    ///
    /// When present it runs instead of the default timeout action.
    fn response_timeout_handler(&self) -> Option<TimeoutHandler> {
        None
    }
}
