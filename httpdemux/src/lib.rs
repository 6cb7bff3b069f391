//! Response-side protocol layer for HTTP client connections.
//!
//! This crate sits between an HTTP/1 or HTTP/2 wire codec and the code that
//! consumes responses. It keeps track of every response outstanding on a
//! connection, enforces the order of decoded events per response, owns
//! response timeouts and guarantees that every exchange terminates exactly
//! once.
//!
//! ## Components
//!
//! - [`ResponseRegistry`]: stream id to [`InflightResponse`] map for one
//!   connection, with bulk failure and disconnect coordination
//! - [`InflightResponse`]: per-response state machine
//!   (`AwaitingFinalHeaders` → `AwaitingBodyOrTrailers` → `Done`)
//! - [`DecodedResponse`] / [`ResponseStream`]: the default demand-driven
//!   sink and the [`Stream`](futures::Stream) the application reads
//! - [`InboundTrafficController`]: suspends reading from the transport while
//!   consumers fall behind
//!
//! ## Example
//!
//! ```
//! use futures::{FutureExt, StreamExt};
//! use http::{HeaderMap, StatusCode};
//! use httpdemux::{HttpData, HttpObject, ResponseHeaders, ResponseOptions, ResponseRegistry};
//!
//! let registry = ResponseRegistry::new();
//!
//! // Request sent on stream 1; its response goes to `stream`.
//! let (sink, mut stream) = registry.decoded_response();
//! registry.register(1, sink, None, Some(ResponseOptions::new()));
//!
//! // The codec feeds decoded events.
//! let res = registry.lookup(1).unwrap();
//! res.try_write(ResponseHeaders::of(StatusCode::OK).into());
//! res.try_write(HttpData::from_static(b"hello").into());
//! res.try_write(HttpObject::Trailers(HeaderMap::new()));
//! res.close();
//! assert!(!registry.has_outstanding());
//!
//! // The application reads at its own pace.
//! let first = stream.next().now_or_never().unwrap().unwrap().unwrap();
//! assert!(matches!(first, HttpObject::Headers(h) if h.status() == StatusCode::OK));
//! ```
//!
//! ## Execution model
//!
//! Everything belonging to one connection runs on one thread, typically
//! inside a `tokio::task::LocalSet`. Types are `!Send`, use `Rc` and
//! `RefCell`, and take no locks. [`TokioScheduler`] arms timeouts on the
//! current `LocalSet`.
//!
//! ## Termination
//!
//! A response ends through exactly one of:
//!
//! - the codec closing it ([`InflightResponse::close`] /
//!   [`InflightResponse::close_with`]), or failing the whole connection
//!   ([`ResponseRegistry::fail_all`])
//! - the consumer dropping or cancelling its [`ResponseStream`]
//! - the response timeout firing
//!
//! Whichever comes first closes the sink, ends the exchange log and aborts
//! the paired request. A close arriving after the timeout only emits a
//! `warn!` diagnostic when its cause is unexpected; see
//! [`RegistryBuilder::expected_causes`].
//!
//! ## Tracing
//!
//! Lifecycle events are emitted at `trace` and `debug` level through the
//! [`tracing`] crate. A sink that panics during [`ResponseRegistry::fail_all`]
//! is reported at `error` level.

mod builder;
pub mod context;
mod options;
mod registry;
pub mod response;
pub mod scheduler;
pub mod traffic;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::RegistryBuilder;
pub use options::ResponseOptions;
pub use registry::ResponseRegistry;

// Re-export from context module
pub use context::{ExchangeContext, OutboundRequest, ResponseLog, TimeoutHandler};

// Re-export from response module
pub use response::{
    CancelHook, CausePredicate, Completion, DecodedResponse, Demand, InflightResponse,
    ResponseSink, ResponseState, ResponseStream, decoded_response,
};

// Re-export scheduler and flow-control types at the top level for convenience
pub use scheduler::{ScheduledTask, Scheduler, TokioScheduler};
pub use traffic::{InboundTrafficController, ReadInterest};

// Re-export core types that users need
pub use httpdemux_core::{HttpData, HttpObject, ResponseError, ResponseHeaders};
