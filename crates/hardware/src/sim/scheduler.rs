//! Cooperative task scheduler.
//!
//! Background work (meter and idletime sweeps) is queued as timed tasks and run
//! by `Simulation::time_increment` when model time passes their due time. Tasks
//! due at the same time run in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Background work the simulation knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Task {
    /// Credit every meter of every stage without debiting.
    MeterSweep,
    /// Age every idletime entry of every stage.
    IdleSweep,
}

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    time: u64,
    seq: u64,
    task: Task,
    period: Option<u64>,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (time, seq).
        other.time.cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of timed tasks.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Entry>,
    seq: u64,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` to run once at `time`.
    pub fn schedule(&mut self, time: u64, task: Task) {
        self.push(time, task, None);
    }

    /// Queues `task` to run at `start` and every `period` cycles after.
    ///
    /// A zero period is ignored.
    pub fn schedule_periodic(&mut self, start: u64, period: u64, task: Task) {
        if period == 0 {
            tracing::warn!(?task, "ignoring periodic task with zero period");
            return;
        }
        self.push(start, task, Some(period));
    }

    fn push(&mut self, time: u64, task: Task, period: Option<u64>) {
        self.seq += 1;
        self.queue.push(Entry {
            time,
            seq: self.seq,
            task,
            period,
        });
    }

    /// Due time of the next task.
    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|e| e.time)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes the next task due at or before `now`.
    ///
    /// Periodic tasks are requeued one period after their due time, unless that
    /// lies past the end of model time.
    pub fn pop_due(&mut self, now: u64) -> Option<(u64, Task)> {
        if self.queue.peek()?.time > now {
            return None;
        }
        let entry = self.queue.pop()?;
        if let Some(next) = entry.period.and_then(|p| entry.time.checked_add(p)) {
            self.push(next, entry.task, entry.period);
        }
        Some((entry.time, entry.task))
    }

    /// Drops every queued task.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.seq = 0;
    }
}
