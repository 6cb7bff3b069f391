//! Per-response state machine.
//!
//! An [`InflightResponse`] sits between the wire codec and a
//! [`ResponseSink`]. It tracks where the response is (waiting for final
//! headers, reading the body, done), records the exchange log, owns the
//! response timeout and makes sure the exchange terminates exactly once no
//! matter whether the codec, the consumer or the timer gets there first.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use httpdemux_core::{HttpObject, ResponseError};

use super::{Completion, Demand, ResponseSink};
use crate::context::ExchangeContext;
use crate::options::ResponseOptions;
use crate::scheduler::{ScheduledTask, Scheduler};

/// Classifier for causes that are routine and need no diagnostic.
pub type CausePredicate = Rc<dyn Fn(&ResponseError) -> bool>;

/// Map from stream id to outstanding response.
pub(crate) type ResponseMap = RefCell<HashMap<u32, InflightResponse>>;

/// Where a response is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseState {
    /// No final (non-1xx) header block seen yet.
    AwaitingFinalHeaders,
    /// Final headers seen; body chunks or trailers may follow.
    AwaitingBodyOrTrailers,
    /// Trailers seen or the response was closed.
    Done,
}

/// Terminal action of the close routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseKind {
    /// Close the sink and end the log with the cause.
    Close,
    /// The consumer went away; end the log, cleanly unless the cause is a
    /// real error.
    Cancel,
}

struct Inner {
    id: u32,
    sink: Rc<dyn ResponseSink>,
    ctx: Option<Rc<dyn ExchangeContext>>,
    options: ResponseOptions,
    timeout: RefCell<Option<Box<dyn ScheduledTask>>>,
    state: Cell<ResponseState>,
    closed: Cell<bool>,
    first_bytes_logged: Cell<bool>,
    expected_cause: CausePredicate,
    owner: Weak<ResponseMap>,
}

/// State machine for one outstanding response.
///
/// Cloning yields another handle to the same machine. All methods must be
/// called on the connection's execution context.
#[derive(Clone)]
pub struct InflightResponse {
    inner: Rc<Inner>,
}

impl InflightResponse {
    /// Create a machine that is not tracked by any registry.
    pub fn new<S: ResponseSink + 'static>(
        id: u32,
        sink: S,
        ctx: Option<Rc<dyn ExchangeContext>>,
        options: ResponseOptions,
    ) -> Self {
        Self::with_owner(
            id,
            Rc::new(sink),
            ctx,
            options,
            Rc::new(|_: &ResponseError| false),
            Weak::new(),
        )
    }

    pub(crate) fn with_owner(
        id: u32,
        sink: Rc<dyn ResponseSink>,
        ctx: Option<Rc<dyn ExchangeContext>>,
        options: ResponseOptions,
        expected_cause: CausePredicate,
        owner: Weak<ResponseMap>,
    ) -> Self {
        let inner = Rc::new(Inner {
            id,
            sink,
            ctx,
            options,
            timeout: RefCell::new(None),
            state: Cell::new(ResponseState::AwaitingFinalHeaders),
            closed: Cell::new(false),
            first_bytes_logged: Cell::new(false),
            expected_cause,
            owner,
        });

        let weak = Rc::downgrade(&inner);
        inner.sink.set_cancel_hook(Box::new(move |cause| {
            if let Some(inner) = weak.upgrade() {
                InflightResponse { inner }.on_subscription_cancelled(Some(cause));
            }
        }));

        Self { inner }
    }

    /// Stream id this response was registered under.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResponseState {
        self.inner.state.get()
    }

    /// Options captured at registration.
    pub fn options(&self) -> ResponseOptions {
        self.inner.options
    }

    /// Maximum body size in bytes; zero means unlimited.
    pub fn max_content_length(&self) -> u64 {
        self.inner.options.get_max_content_length()
    }

    /// Body bytes accepted by the sink so far.
    pub fn written_bytes(&self) -> u64 {
        self.inner.sink.written_bytes()
    }

    /// Future resolved when the exchange is over for the consumer.
    pub fn completion(&self) -> Completion {
        self.inner.sink.completion()
    }

    /// Returns `true` while the sink accepts objects.
    pub fn is_open(&self) -> bool {
        self.inner.sink.is_open()
    }

    /// Forward a decoded object to the sink.
    ///
    /// Returns `false` once the response is [`Done`](ResponseState::Done) or
    /// the sink refused the object. The object is released in that case and
    /// the caller must not retry: the consumer has already been notified.
    pub fn try_write(&self, obj: HttpObject) -> bool {
        let inner = &self.inner;
        let log = inner.ctx.as_ref().map(|ctx| ctx.log());

        match inner.state.get() {
            ResponseState::AwaitingFinalHeaders => {
                if let Some(log) = log {
                    log.start_response();
                }
                debug_assert!(
                    obj.is_header_block(),
                    "response {} received a body chunk before its final headers",
                    inner.id
                );
                if let HttpObject::Headers(headers) = &obj {
                    if !headers.is_informational() {
                        inner.state.set(ResponseState::AwaitingBodyOrTrailers);
                        if let Some(log) = log {
                            log.response_headers(headers);
                        }
                    }
                }
            }
            ResponseState::AwaitingBodyOrTrailers => match &obj {
                HttpObject::Data(data) => {
                    if let Some(log) = log {
                        log.increase_response_length(data);
                    }
                }
                HttpObject::Headers(headers) => {
                    inner.state.set(ResponseState::Done);
                    if let Some(log) = log {
                        log.response_trailers(headers.headers());
                    }
                }
                HttpObject::Trailers(trailers) => {
                    inner.state.set(ResponseState::Done);
                    if let Some(log) = log {
                        log.response_trailers(trailers);
                    }
                }
            },
            ResponseState::Done => {
                obj.release();
                return false;
            }
        }

        inner.sink.try_write(obj)
    }

    /// Forward an object built by `supplier` if the sink still accepts it.
    ///
    /// The object bypasses state tracking; it is meant for objects the
    /// codec synthesizes rather than decodes.
    pub fn try_write_with<F>(&self, supplier: F) -> bool
    where
        F: FnOnce() -> HttpObject,
    {
        self.inner.sink.try_write_with(Box::new(supplier))
    }

    /// Run `task` and resolve the returned future when the consumer wants
    /// more data.
    pub fn on_demand<F>(&self, task: F) -> Demand
    where
        F: FnOnce() + 'static,
    {
        self.inner.sink.on_demand(Box::new(task))
    }

    /// Record the first byte of the response. Only the first call is
    /// logged.
    pub fn log_first_bytes_transferred(&self) {
        if self.inner.first_bytes_logged.replace(true) {
            return;
        }
        if let Some(ctx) = &self.inner.ctx {
            ctx.log().response_first_bytes_transferred();
        }
    }

    /// Arm the response timeout.
    ///
    /// Does nothing if a timer was already scheduled, the timeout is
    /// disabled, or the response is closed.
    pub fn schedule_timeout(&self, scheduler: &dyn Scheduler) {
        let inner = &self.inner;
        if inner.timeout.borrow().is_some() {
            return;
        }
        let Some(delay) = inner.options.get_response_timeout() else {
            return;
        };
        if inner.closed.get() || !inner.sink.is_open() {
            return;
        }

        let weak = Rc::downgrade(inner);
        let task = scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    InflightResponse { inner }.on_timeout();
                }
            }),
        );
        *inner.timeout.borrow_mut() = Some(task);

        tracing::trace!(
            id = inner.id,
            timeout_ms = inner.options.response_timeout_millis(),
            "response timeout scheduled"
        );
    }

    /// Close the response normally.
    pub fn close(&self) {
        self.close_inner(None, CloseKind::Close);
    }

    /// Close the response with `cause`.
    pub fn close_with(&self, cause: ResponseError) {
        self.close_inner(Some(cause), CloseKind::Close);
    }

    /// Handle the consumer cancelling its subscription.
    ///
    /// The exchange is cleaned up like any other close, but the log ends
    /// cleanly unless `cause` is a real error.
    pub fn on_subscription_cancelled(&self, cause: Option<ResponseError>) {
        self.close_inner(cause, CloseKind::Cancel);
    }

    fn on_timeout(&self) {
        let inner = &self.inner;
        tracing::debug!(id = inner.id, "response timed out");

        let ctx = inner.ctx.as_ref();
        if let Some(handler) = ctx.and_then(|ctx| ctx.response_timeout_handler()) {
            handler();
            return;
        }

        // The fired timer stays in place so a later close knows it lost.
        let cause = ResponseError::Timeout;
        inner.state.set(ResponseState::Done);
        inner.sink.close_with(cause.clone());
        if let Some(ctx) = ctx {
            ctx.log().end_response(Some(&cause));
            ctx.request().abort(Some(&cause));
        }
        self.detach();
    }

    fn close_inner(&self, cause: Option<ResponseError>, kind: CloseKind) {
        let inner = &self.inner;
        if inner.closed.replace(true) {
            return;
        }
        inner.state.set(ResponseState::Done);

        let timer = inner.timeout.borrow_mut().take();
        let preempted = match timer {
            Some(timer) => timer.cancel(),
            None => true,
        };
        if !preempted {
            self.report_late_cause(cause.as_ref());
        }

        let ctx = inner.ctx.as_ref();
        if let Some(ctx) = ctx {
            ctx.request().abort(cause.as_ref());
        }

        if preempted {
            match kind {
                CloseKind::Close => {
                    match &cause {
                        Some(cause) => inner.sink.close_with(cause.clone()),
                        None => inner.sink.close(),
                    }
                    if let Some(ctx) = ctx {
                        ctx.log().end_response(cause.as_ref());
                    }
                }
                CloseKind::Cancel => {
                    if let Some(ctx) = ctx {
                        let cause = cause.as_ref().filter(|cause| !cause.is_cancelled());
                        ctx.log().end_response(cause);
                    }
                }
            }
        }

        tracing::trace!(id = inner.id, ?kind, "response closed");
        self.detach();
    }

    /// The timeout already closed the exchange; surface any other cause
    /// that arrives afterwards without notifying the consumer again.
    fn report_late_cause(&self, cause: Option<&ResponseError>) {
        let inner = &self.inner;
        let Some(cause) = cause else {
            return;
        };
        if cause.is_timeout() || (inner.expected_cause)(cause) {
            return;
        }

        let authority = inner.ctx.as_ref().and_then(|ctx| ctx.request().authority());
        match authority {
            Some(authority) => tracing::warn!(
                id = inner.id,
                %authority,
                error = %cause,
                "unexpected error while closing a timed-out request to {authority}"
            ),
            None => tracing::warn!(
                id = inner.id,
                error = %cause,
                "unexpected error while closing a timed-out request"
            ),
        }
    }

    /// Remove this machine from its registry, unless the id was reused.
    fn detach(&self) {
        let Some(responses) = self.inner.owner.upgrade() else {
            return;
        };
        let id = self.inner.id;
        let removed = {
            let mut responses = responses.borrow_mut();
            let same = responses
                .get(&id)
                .is_some_and(|entry| Rc::ptr_eq(&entry.inner, &self.inner));
            if same { responses.remove(&id) } else { None }
        };
        if removed.is_some() {
            tracing::trace!(id, "response removed from registry");
        }
    }
}

impl fmt::Debug for InflightResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightResponse")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("closed", &self.inner.closed.get())
            .field("has_context", &self.inner.ctx.is_some())
            .field("options", &self.inner.options)
            .finish()
    }
}
