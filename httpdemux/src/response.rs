//! Response streams.
//!
//! This module provides the per-response pieces of the response layer:
//! - [`ResponseSink`]: the demand-driven destination a response is written to
//! - [`DecodedResponse`] / [`ResponseStream`]: the default sink and its consumer half
//! - [`InflightResponse`]: the state machine that guards a sink for one exchange

mod decoded;
mod inflight;

pub use decoded::{Completion, Demand, DecodedResponse, ResponseStream, decoded_response};
pub use inflight::{CausePredicate, InflightResponse, ResponseState};

pub(crate) use inflight::ResponseMap;

use httpdemux_core::{HttpObject, ResponseError};

/// Callback fired when the consumer cancels its subscription.
pub type CancelHook = Box<dyn FnOnce(ResponseError)>;

/// Demand-driven destination of one response.
///
/// The producer side (the wire codec, through [`InflightResponse`]) pushes
/// objects with [`try_write`](Self::try_write) and waits for
/// [`on_demand`](Self::on_demand) before pushing more; the consumer side
/// pulls at its own pace.
pub trait ResponseSink {
    /// Returns `true` while objects may still be written.
    fn is_open(&self) -> bool;

    /// Write an object.
    ///
    /// Returns `false` if the sink is closed; the object is released and the
    /// caller must not retry.
    fn try_write(&self, obj: HttpObject) -> bool;

    /// Write an object built by `supplier`, which only runs if the sink is
    /// still open.
    fn try_write_with(&self, supplier: Box<dyn FnOnce() -> HttpObject + '_>) -> bool;

    /// Run `task` and resolve the returned future once the consumer asks
    /// for more data.
    fn on_demand(&self, task: Box<dyn FnOnce()>) -> Demand;

    /// Close the sink normally.
    fn close(&self);

    /// Close the sink with a cause.
    fn close_with(&self, cause: ResponseError);

    /// Total body bytes accepted so far.
    fn written_bytes(&self) -> u64;

    /// Future resolved when the exchange is over for the consumer.
    fn completion(&self) -> Completion;

    /// Install the callback fired when the consumer cancels.
    fn set_cancel_hook(&self, hook: CancelHook);
}
