//! Single-threaded event queue
//!
//! Recurring timers and one-shot messages are dispatched one at a time, in order, by
//! whoever owns the queue. Time is supplied by the caller as a monotonic offset, so the
//! queue itself never reads a clock.

use log::trace;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Handle of a recurring timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

/// Scheduling surface the controller sees
pub trait Scheduler {
    /// Schedule a recurring event; the first one fires one `period` from now
    fn call_every(&mut self, period: Duration) -> TaskId;

    /// Cancel a recurring event. Returns `false` if it was not scheduled.
    fn cancel(&mut self, task: TaskId) -> bool;

    fn is_scheduled(&self, task: TaskId) -> bool;
}

/// Something ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch<E> {
    Timer(TaskId),
    Message(E),
}

#[derive(Debug, Clone)]
struct Timer {
    period: Duration,
    due: Duration,
}

#[derive(Debug)]
pub struct EventQueue<E> {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TaskId, Timer>,
    messages: VecDeque<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            timers: BTreeMap::new(),
            messages: VecDeque::new(),
        }
    }

    /// Queue a one-shot message. Messages run before any timer due at the same time.
    pub fn post(&mut self, message: E) {
        self.messages.push_back(message);
    }

    /// Time of the last `next_due` call
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Earliest pending deadline; `Some(now)` when a message is waiting
    pub fn next_deadline(&self) -> Option<Duration> {
        if !self.messages.is_empty() {
            return Some(self.now);
        }
        self.timers.values().map(|t| t.due).min()
    }

    /// Pop the next event ready at `now`.
    ///
    /// A timer that fell behind fires once and is rescheduled one period after `now`;
    /// missed periods are not replayed.
    pub fn next_due(&mut self, now: Duration) -> Option<Dispatch<E>> {
        self.now = self.now.max(now);
        let now = self.now;

        if let Some(message) = self.messages.pop_front() {
            return Some(Dispatch::Message(message));
        }

        let (&id, timer) = self
            .timers
            .iter_mut()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| t.due)?;

        let next = timer.due + timer.period;
        timer.due = if next > now { next } else { now + timer.period };
        trace!("Timer {:?} fired at {:?}", id, now);
        Some(Dispatch::Timer(id))
    }

    pub fn scheduled_timers(&self) -> usize {
        self.timers.len()
    }
}

impl<E> Scheduler for EventQueue<E> {
    fn call_every(&mut self, period: Duration) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.timers.insert(
            id,
            Timer {
                period,
                due: self.now + period,
            },
        );
        id
    }

    fn cancel(&mut self, task: TaskId) -> bool {
        self.timers.remove(&task).is_some()
    }

    fn is_scheduled(&self, task: TaskId) -> bool {
        self.timers.contains_key(&task)
    }
}
