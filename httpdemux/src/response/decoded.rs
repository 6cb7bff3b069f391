//! The default demand-driven response sink.
//!
//! [`decoded_response`] returns the two halves of one response stream: the
//! [`DecodedResponse`] the connection writes into and the [`ResponseStream`]
//! the application reads from.
//!
//! # Ordering
//!
//! Objects are delivered in write order. A normal close ends the stream
//! after the queued objects; a close with a cause delivers the queued
//! objects and then the cause, once.
//!
//! # Backpressure
//!
//! Writes are never refused while the stream is open; instead the producer
//! waits on [`ResponseSink::on_demand`] before writing more. Demand is
//! signalled when the consumer polls with nothing queued.
//!
//! # Cancellation
//!
//! Dropping the [`ResponseStream`] (or calling
//! [`cancel`](ResponseStream::cancel)) discards everything queued, fails the
//! completion future and fires the sink's cancel hook.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Stream;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use httpdemux_core::{HttpObject, ResponseError};

use super::{CancelHook, ResponseSink};
use crate::traffic::InboundTrafficController;

/// Future resolved when the consumer asks for more data.
///
/// Resolves with `Err(ResponseError::Closed)` if the stream closes first.
#[derive(Debug)]
pub struct Demand {
    rx: oneshot::Receiver<()>,
}

impl Demand {
    /// Create a demand future and the sender that resolves it.
    ///
    /// Dropping the sender resolves the future with an error.
    pub fn channel() -> (oneshot::Sender<()>, Demand) {
        let (tx, rx) = oneshot::channel();
        (tx, Demand { rx })
    }

    /// A demand that is already satisfied.
    pub fn ready() -> Self {
        let (tx, demand) = Self::channel();
        let _ = tx.send(());
        demand
    }

    /// A demand that will never be satisfied.
    pub fn closed() -> Self {
        let (tx, demand) = Self::channel();
        drop(tx);
        demand
    }
}

impl Future for Demand {
    type Output = Result<(), ResponseError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|res| res.map_err(|_| ResponseError::Closed))
    }
}

/// Cloneable future resolved when the exchange is over for the consumer.
///
/// - `Ok(())` once a normally closed stream has been read to the end.
/// - `Err(cause)` once the consumer has observed a close cause.
/// - `Err(cause)` when the consumer cancels, `ResponseError::Cancelled`
///   unless it gave another cause.
#[derive(Clone)]
pub struct Completion {
    inner: Shared<oneshot::Receiver<Result<(), ResponseError>>>,
}

impl Completion {
    /// Create a completion future and the sender that resolves it.
    ///
    /// Dropping the sender resolves the future with
    /// `Err(ResponseError::Closed)`.
    pub fn channel() -> (oneshot::Sender<Result<(), ResponseError>>, Completion) {
        let (tx, rx) = oneshot::channel();
        (tx, Completion { inner: rx.shared() })
    }

    /// A completion that already has its result.
    pub fn ready(result: Result<(), ResponseError>) -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(result);
        completion
    }

    /// The result, if the exchange is already over.
    pub fn result(&self) -> Option<Result<(), ResponseError>> {
        self.clone().now_or_never()
    }

    /// Returns `true` once the result is available.
    pub fn is_done(&self) -> bool {
        self.result().is_some()
    }
}

impl Future for Completion {
    type Output = Result<(), ResponseError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner
            .poll_unpin(cx)
            .map(|res| res.unwrap_or(Err(ResponseError::Closed)))
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

#[derive(Debug)]
enum Writer {
    Open,
    Closed(Option<ResponseError>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Consumer {
    Active,
    Finished,
    Cancelled,
}

type DemandWaiter = (Box<dyn FnOnce()>, oneshot::Sender<()>);

struct State {
    queue: VecDeque<HttpObject>,
    writer: Writer,
    consumer: Consumer,
    waker: Option<Waker>,
    /// The consumer polled and found nothing queued.
    wants_more: bool,
    demand: Vec<DemandWaiter>,
    written_bytes: u64,
    completion_tx: Option<oneshot::Sender<Result<(), ResponseError>>>,
    completion: Completion,
    cancel_hook: Option<CancelHook>,
}

impl State {
    fn is_open(&self) -> bool {
        matches!(self.writer, Writer::Open) && self.consumer == Consumer::Active
    }
}

/// Create the writer and reader halves of one response stream.
///
/// Body bytes sitting in the queue are accounted in `traffic`.
pub fn decoded_response(traffic: InboundTrafficController) -> (DecodedResponse, ResponseStream) {
    let (completion_tx, completion) = Completion::channel();
    let state = Rc::new(RefCell::new(State {
        queue: VecDeque::new(),
        writer: Writer::Open,
        consumer: Consumer::Active,
        waker: None,
        wants_more: false,
        demand: Vec::new(),
        written_bytes: 0,
        completion_tx: Some(completion_tx),
        completion,
        cancel_hook: None,
    }));

    (
        DecodedResponse {
            state: state.clone(),
            traffic: traffic.clone(),
        },
        ResponseStream { state, traffic },
    )
}

/// Writer half of a response stream.
///
/// Dropping an open writer closes the stream with `ResponseError::Closed`.
pub struct DecodedResponse {
    state: Rc<RefCell<State>>,
    traffic: InboundTrafficController,
}

impl DecodedResponse {
    fn close_writer(&self, cause: Option<ResponseError>) {
        let (waker, demand) = {
            let mut state = self.state.borrow_mut();
            if !matches!(state.writer, Writer::Open) {
                return;
            }
            state.writer = Writer::Closed(cause);
            (state.waker.take(), mem::take(&mut state.demand))
        };

        // Dropping the senders fails the pending demand futures.
        drop(demand);
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl ResponseSink for DecodedResponse {
    fn is_open(&self) -> bool {
        self.state.borrow().is_open()
    }

    fn try_write(&self, obj: HttpObject) -> bool {
        let len = obj.content_len();
        let waker = {
            let mut state = self.state.borrow_mut();
            if !state.is_open() {
                drop(state);
                obj.release();
                return false;
            }
            state.written_bytes += len as u64;
            state.queue.push_back(obj);
            state.wants_more = false;
            state.waker.take()
        };

        if len > 0 {
            self.traffic.inc(len);
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn try_write_with(&self, supplier: Box<dyn FnOnce() -> HttpObject + '_>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.try_write(supplier())
    }

    fn on_demand(&self, task: Box<dyn FnOnce()>) -> Demand {
        {
            let mut state = self.state.borrow_mut();
            if !state.is_open() {
                return Demand::closed();
            }
            if !state.wants_more {
                let (tx, demand) = Demand::channel();
                state.demand.push((task, tx));
                return demand;
            }
        }

        task();
        Demand::ready()
    }

    fn close(&self) {
        self.close_writer(None);
    }

    fn close_with(&self, cause: ResponseError) {
        self.close_writer(Some(cause));
    }

    fn written_bytes(&self) -> u64 {
        self.state.borrow().written_bytes
    }

    fn completion(&self) -> Completion {
        self.state.borrow().completion.clone()
    }

    fn set_cancel_hook(&self, hook: CancelHook) {
        self.state.borrow_mut().cancel_hook = Some(hook);
    }
}

impl Drop for DecodedResponse {
    fn drop(&mut self) {
        self.close_writer(Some(ResponseError::Closed));
    }
}

impl fmt::Debug for DecodedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("DecodedResponse")
            .field("open", &state.is_open())
            .field("queued", &state.queue.len())
            .field("written_bytes", &state.written_bytes)
            .finish()
    }
}

/// Reader half of a response stream.
///
/// Yields `Ok(object)` for every written object, then either ends (normal
/// close) or yields the close cause once.
pub struct ResponseStream {
    state: Rc<RefCell<State>>,
    traffic: InboundTrafficController,
}

impl ResponseStream {
    /// Stop reading; the exchange is cancelled with
    /// `ResponseError::Cancelled`.
    pub fn cancel(&self) {
        self.cancel_with(ResponseError::Cancelled);
    }

    /// Stop reading because of `cause`.
    pub fn cancel_with(&self, cause: ResponseError) {
        let (discarded, completion_tx, hook, demand) = {
            let mut state = self.state.borrow_mut();
            if state.consumer != Consumer::Active {
                return;
            }
            state.consumer = Consumer::Cancelled;
            state.wants_more = false;
            // Only an exchange still being written needs to hear about it.
            let hook = match state.writer {
                Writer::Open => state.cancel_hook.take(),
                Writer::Closed(_) => None,
            };
            (
                mem::take(&mut state.queue),
                state.completion_tx.take(),
                hook,
                mem::take(&mut state.demand),
            )
        };

        self.release(discarded);
        drop(demand);
        if let Some(tx) = completion_tx {
            let _ = tx.send(Err(cause.clone()));
        }
        if let Some(hook) = hook {
            hook(cause);
        }
    }

    /// Future resolved when the exchange is over.
    pub fn completion(&self) -> Completion {
        self.state.borrow().completion.clone()
    }

    /// Returns `true` once the stream ended or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.state.borrow().consumer != Consumer::Active
    }

    fn release(&self, discarded: VecDeque<HttpObject>) {
        let bytes: usize = discarded.iter().map(HttpObject::content_len).sum();
        if bytes > 0 {
            self.traffic.dec(bytes);
        }
        discarded.into_iter().for_each(HttpObject::release);
    }
}

impl Stream for ResponseStream {
    type Item = Result<HttpObject, ResponseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let demand = {
                let mut state = this.state.borrow_mut();
                if state.consumer != Consumer::Active {
                    return Poll::Ready(None);
                }

                if let Some(obj) = state.queue.pop_front() {
                    drop(state);
                    let len = obj.content_len();
                    if len > 0 {
                        this.traffic.dec(len);
                    }
                    return Poll::Ready(Some(Ok(obj)));
                }

                let closed = match &state.writer {
                    Writer::Open => None,
                    Writer::Closed(cause) => Some(cause.clone()),
                };

                if let Some(cause) = closed {
                    state.consumer = Consumer::Finished;
                    state.cancel_hook = None;
                    let completion_tx = state.completion_tx.take();
                    drop(state);

                    if let Some(tx) = completion_tx {
                        let result = match &cause {
                            Some(cause) => Err(cause.clone()),
                            None => Ok(()),
                        };
                        let _ = tx.send(result);
                    }
                    return Poll::Ready(cause.map(Err));
                }

                state.waker = Some(cx.waker().clone());
                state.wants_more = true;
                mem::take(&mut state.demand)
            };

            if demand.is_empty() {
                return Poll::Pending;
            }
            // Demand tasks may write synchronously; look at the queue again.
            for (task, tx) in demand {
                task();
                let _ = tx.send(());
            }
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ResponseStream")
            .field("consumer", &state.consumer)
            .field("queued", &state.queue.len())
            .finish()
    }
}
