//! One-shot timers on the connection's execution context.
//!
//! Response timeouts are scheduled through the [`Scheduler`] trait. The
//! returned [`ScheduledTask`] reports on cancellation whether it preempted
//! firing, which is how a close racing a timeout decides which side wins.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Schedules one-shot tasks on a serialized execution context.
pub trait Scheduler {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Box<dyn ScheduledTask>;
}

/// A task returned by [`Scheduler::schedule`].
pub trait ScheduledTask {
    /// Cancel the task.
    ///
    /// Returns `true` if the task will never run, `false` if it already
    /// fired. Cancelling twice returns the same answer.
    fn cancel(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerState {
    Pending,
    Fired,
    Cancelled,
}

/// Shared fire/cancel flag of one scheduled task.
///
/// Whichever of [`fire`](Self::fire) and [`cancel`](Self::cancel) runs first
/// wins; both run on the same thread so there is no window between the
/// check and the transition.
#[derive(Clone, Debug)]
pub(crate) struct TimerSlot(Rc<Cell<TimerState>>);

impl TimerSlot {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(TimerState::Pending)))
    }

    /// Returns `true` if the task should run now.
    pub(crate) fn fire(&self) -> bool {
        if self.0.get() == TimerState::Pending {
            self.0.set(TimerState::Fired);
            true
        } else {
            false
        }
    }

    /// Returns `true` if the task has not fired and never will.
    pub(crate) fn cancel(&self) -> bool {
        match self.0.get() {
            TimerState::Pending => {
                self.0.set(TimerState::Cancelled);
                true
            }
            TimerState::Cancelled => true,
            TimerState::Fired => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.0.get() == TimerState::Pending
    }
}

/// [`Scheduler`] backed by the tokio timer wheel.
///
/// Tasks are spawned with [`tokio::task::spawn_local`], so they run on the
/// `LocalSet` that drives the connection.
///
/// # Panics
///
/// [`schedule`](Scheduler::schedule) panics when called outside a
/// `tokio::task::LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    /// Create a scheduler for the current `LocalSet`.
    pub fn new() -> Self {
        Self
    }
}

struct TokioTask {
    slot: TimerSlot,
    handle: JoinHandle<()>,
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Box<dyn ScheduledTask> {
        let slot = TimerSlot::new();
        let timer = slot.clone();
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if timer.fire() {
                task();
            }
        });
        Box::new(TokioTask { slot, handle })
    }
}

impl ScheduledTask for TokioTask {
    fn cancel(&self) -> bool {
        let cancelled = self.slot.cancel();
        if cancelled {
            self.handle.abort();
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tokio::task::LocalSet;

    #[test]
    fn test_timer_slot_fire_then_cancel() {
        let slot = TimerSlot::new();
        assert!(slot.is_pending());
        assert!(slot.fire());
        assert!(!slot.fire());
        assert!(!slot.cancel());
        assert!(!slot.cancel());
    }

    #[test]
    fn test_timer_slot_cancel_then_fire() {
        let slot = TimerSlot::new();
        assert!(slot.cancel());
        assert!(!slot.fire());
        assert!(slot.cancel());
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(RefCell::new(0));
                let counter = fired.clone();
                let task = TokioScheduler::new().schedule(
                    Duration::from_millis(50),
                    Box::new(move || *counter.borrow_mut() += 1),
                );

                tokio::time::sleep(Duration::from_millis(49)).await;
                assert_eq!(*fired.borrow(), 0);

                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(*fired.borrow(), 1);
                assert!(!task.cancel());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancel_preempts() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let fired = Rc::new(RefCell::new(false));
                let flag = fired.clone();
                let task = TokioScheduler::new().schedule(
                    Duration::from_millis(50),
                    Box::new(move || *flag.borrow_mut() = true),
                );

                assert!(task.cancel());
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(!*fired.borrow());
                assert!(task.cancel());
            })
            .await;
    }
}
