//! Shared test fixtures: a recording exchange context, a manually driven
//! scheduler and a tracing capture layer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use httpdemux_core::{HttpData, ResponseError, ResponseHeaders};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::context::{ExchangeContext, OutboundRequest, ResponseLog, TimeoutHandler};
use crate::scheduler::{ScheduledTask, Scheduler, TimerSlot};

/// One call made on [`RecordingContext`]'s response log.
#[derive(Clone, Debug)]
pub(crate) enum LogEvent {
    StartResponse,
    FirstBytesTransferred,
    Headers(StatusCode),
    Trailers(usize),
    Length(usize),
    End(Option<ResponseError>),
}

#[derive(Default)]
pub(crate) struct RecordingContext {
    events: RefCell<Vec<LogEvent>>,
    aborts: RefCell<Vec<Option<ResponseError>>>,
    authority: Option<String>,
    timeout_handler: RefCell<Option<TimeoutHandler>>,
}

impl RecordingContext {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn with_authority(authority: &str) -> Rc<Self> {
        Rc::new(Self {
            authority: Some(authority.to_string()),
            ..Self::default()
        })
    }

    pub(crate) fn set_timeout_handler(&self, handler: TimeoutHandler) {
        *self.timeout_handler.borrow_mut() = Some(handler);
    }

    pub(crate) fn events(&self) -> Vec<LogEvent> {
        self.events.borrow().clone()
    }

    /// Causes passed to `end_response`, in call order.
    pub(crate) fn ends(&self) -> Vec<Option<ResponseError>> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                LogEvent::End(cause) => Some(cause.clone()),
                _ => None,
            })
            .collect()
    }

    /// Causes passed to `abort`, in call order.
    pub(crate) fn aborts(&self) -> Vec<Option<ResponseError>> {
        self.aborts.borrow().clone()
    }

    fn record(&self, event: LogEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl ResponseLog for RecordingContext {
    fn start_response(&self) {
        self.record(LogEvent::StartResponse);
    }

    fn response_first_bytes_transferred(&self) {
        self.record(LogEvent::FirstBytesTransferred);
    }

    fn response_headers(&self, headers: &ResponseHeaders) {
        self.record(LogEvent::Headers(headers.status()));
    }

    fn response_trailers(&self, trailers: &HeaderMap) {
        self.record(LogEvent::Trailers(trailers.len()));
    }

    fn increase_response_length(&self, data: &HttpData) {
        self.record(LogEvent::Length(data.len()));
    }

    fn end_response(&self, cause: Option<&ResponseError>) {
        self.record(LogEvent::End(cause.cloned()));
    }
}

impl OutboundRequest for RecordingContext {
    fn abort(&self, cause: Option<&ResponseError>) {
        self.aborts.borrow_mut().push(cause.cloned());
    }

    fn authority(&self) -> Option<String> {
        self.authority.clone()
    }
}

impl ExchangeContext for RecordingContext {
    fn log(&self) -> &dyn ResponseLog {
        self
    }

    fn request(&self) -> &dyn OutboundRequest {
        self
    }

    fn response_timeout_handler(&self) -> Option<TimeoutHandler> {
        self.timeout_handler.borrow().clone()
    }
}

struct ManualTimer {
    deadline: Duration,
    slot: TimerSlot,
    task: Option<Box<dyn FnOnce()>>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    timers: Vec<ManualTimer>,
}

/// Scheduler whose clock only moves when told to.
#[derive(Clone, Default)]
pub(crate) struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of tasks ever scheduled.
    pub(crate) fn scheduled(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Number of tasks that have neither fired nor been cancelled.
    pub(crate) fn pending(&self) -> usize {
        self.state
            .borrow()
            .timers
            .iter()
            .filter(|timer| timer.slot.is_pending())
            .count()
    }

    /// Move the clock forward and run every task that became due.
    pub(crate) fn advance(&self, by: Duration) {
        let due: Vec<_> = {
            let mut state = self.state.borrow_mut();
            state.now += by;
            let now = state.now;
            state
                .timers
                .iter_mut()
                .filter(|timer| timer.deadline <= now)
                .filter_map(|timer| timer.task.take().map(|task| (timer.slot.clone(), task)))
                .collect()
        };

        for (slot, task) in due {
            if slot.fire() {
                task();
            }
        }
    }
}

struct ManualTask(TimerSlot);

impl ScheduledTask for ManualTask {
    fn cancel(&self) -> bool {
        self.0.cancel()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Box<dyn ScheduledTask> {
        let slot = TimerSlot::new();
        let mut state = self.state.borrow_mut();
        let deadline = state.now + delay;
        state.timers.push(ManualTimer {
            deadline,
            slot: slot.clone(),
            task: Some(task),
        });
        Box::new(ManualTask(slot))
    }
}

/// A tracing event seen by [`capture`].
#[derive(Clone, Debug)]
pub(crate) struct CapturedEvent {
    pub(crate) level: Level,
    pub(crate) message: String,
    pub(crate) fields: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let captured = CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

/// Run `f` with a subscriber that records every event emitted on this
/// thread.
pub(crate) fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    let events = layer
        .events
        .lock()
        .map(|events| events.clone())
        .unwrap_or_default();
    (result, events)
}
