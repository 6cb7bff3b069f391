//! Connection-scoped response registry.
//!
//! One [`ResponseRegistry`] exists per client connection. The wire codec
//! registers an [`InflightResponse`] for every request it sends, finds it
//! again by stream id for every decoded event, and fails everything at once
//! when the connection goes away.
//!
//! The registry is confined to the connection's execution context and uses
//! no locks.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use httpdemux_core::ResponseError;

use crate::builder::RegistryBuilder;
use crate::context::ExchangeContext;
use crate::options::ResponseOptions;
use crate::response::{
    CausePredicate, DecodedResponse, InflightResponse, ResponseMap, ResponseSink, ResponseStream,
    decoded_response,
};
use crate::traffic::InboundTrafficController;

/// Outstanding responses of one connection, keyed by stream id.
pub struct ResponseRegistry {
    responses: Rc<ResponseMap>,
    disconnect_when_finished: Cell<bool>,
    traffic: InboundTrafficController,
    default_options: ResponseOptions,
    expected_cause: CausePredicate,
}

impl ResponseRegistry {
    /// Create a registry with default settings.
    pub fn new() -> Self {
        RegistryBuilder::new().build()
    }

    /// Start configuring a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(
        traffic: InboundTrafficController,
        default_options: ResponseOptions,
        expected_cause: CausePredicate,
    ) -> Self {
        Self {
            responses: Rc::new(RefCell::new(HashMap::new())),
            disconnect_when_finished: Cell::new(false),
            traffic,
            default_options,
            expected_cause,
        }
    }

    /// Register the response for stream `id`.
    ///
    /// `options` of `None` selects the registry's
    /// [`default_options`](Self::default_options). The returned machine
    /// removes itself from the registry when it closes.
    ///
    /// # Panics
    ///
    /// Panics if a response is already outstanding for `id`. Stream ids are
    /// only reused after the previous entry is removed; anything else is a
    /// codec bug.
    pub fn register<S: ResponseSink + 'static>(
        &self,
        id: u32,
        sink: S,
        ctx: Option<Rc<dyn ExchangeContext>>,
        options: Option<ResponseOptions>,
    ) -> InflightResponse {
        assert!(
            !self.responses.borrow().contains_key(&id),
            "response {id} registered while a previous response with the same id is outstanding"
        );

        let res = InflightResponse::with_owner(
            id,
            Rc::new(sink),
            ctx,
            options.unwrap_or(self.default_options),
            self.expected_cause.clone(),
            Rc::downgrade(&self.responses),
        );
        let outstanding = {
            let mut responses = self.responses.borrow_mut();
            responses.insert(id, res.clone());
            responses.len()
        };

        tracing::trace!(id, outstanding, "response registered");
        res
    }

    /// Find the outstanding response for `id`.
    pub fn lookup(&self, id: u32) -> Option<InflightResponse> {
        self.responses.borrow().get(&id).cloned()
    }

    /// Find and remove the outstanding response for `id` in one step.
    pub fn lookup_and_remove(&self, id: u32) -> Option<InflightResponse> {
        let removed = self.responses.borrow_mut().remove(&id);
        if removed.is_some() {
            tracing::trace!(id, "response removed from registry");
        }
        removed
    }

    /// [`lookup_and_remove`](Self::lookup_and_remove) if `remove` is set,
    /// otherwise [`lookup`](Self::lookup).
    pub fn lookup_or_remove(&self, id: u32, remove: bool) -> Option<InflightResponse> {
        if remove {
            self.lookup_and_remove(id)
        } else {
            self.lookup(id)
        }
    }

    /// Forget the response for `id`. Returns `true` if there was one.
    ///
    /// The response itself is not closed.
    pub fn remove(&self, id: u32) -> bool {
        self.lookup_and_remove(id).is_some()
    }

    /// Number of outstanding responses.
    pub fn count(&self) -> usize {
        self.responses.borrow().len()
    }

    /// Returns `true` if any response is outstanding.
    pub fn has_outstanding(&self) -> bool {
        !self.responses.borrow().is_empty()
    }

    /// Close every outstanding response with `cause` and empty the
    /// registry.
    ///
    /// A sink that panics while closing is logged and skipped; the
    /// remaining responses are still closed.
    pub fn fail_all(&self, cause: ResponseError) {
        let responses = mem::take(&mut *self.responses.borrow_mut());
        if responses.is_empty() {
            return;
        }

        tracing::debug!(
            count = responses.len(),
            error = %cause,
            "failing outstanding responses"
        );

        for (id, res) in responses {
            let cause = cause.clone();
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| res.close_with(cause))) {
                tracing::error!(
                    id,
                    panic = panic_message(panic.as_ref()),
                    "response panicked while being failed"
                );
            }
        }
    }

    /// Ask for the connection to close once no response is outstanding.
    pub fn mark_disconnect_when_finished(&self) {
        if !self.disconnect_when_finished.replace(true) {
            tracing::debug!(
                outstanding = self.count(),
                "connection will close after outstanding responses"
            );
        }
    }

    /// Returns `true` if the connection should close now.
    pub fn should_disconnect_now(&self) -> bool {
        self.disconnect_when_finished.get() && !self.has_outstanding()
    }

    /// Returns `true` if a disconnect was requested.
    pub fn disconnect_pending(&self) -> bool {
        self.disconnect_when_finished.get()
    }

    /// The connection's inbound traffic controller.
    pub fn traffic_controller(&self) -> &InboundTrafficController {
        &self.traffic
    }

    /// Options used for exchanges that bring none of their own.
    pub fn default_options(&self) -> ResponseOptions {
        self.default_options
    }

    /// Create a response stream accounted in this connection's traffic
    /// controller.
    pub fn decoded_response(&self) -> (DecodedResponse, ResponseStream) {
        decoded_response(self.traffic.clone())
    }
}

impl Default for ResponseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRegistry")
            .field("outstanding", &self.count())
            .field("disconnect_when_finished", &self.disconnect_when_finished.get())
            .field("traffic", &self.traffic)
            .field("default_options", &self.default_options)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
