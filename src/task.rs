//! Per-session scheduled-task runner: a min-heap keyed by absolute
//! deadline (spec.md §4.3). Single-threaded by design — only the
//! owning session ever touches it, which is what lets device code run
//! lock-free from inside a task callback.
//!
//! Grounded on `xivo-libsccp/sccp_task.h`'s contract: `add` reschedules
//! in place rather than duplicating, `remove` of an absent task is not
//! an error, `next_ms` returns `0`/`-1` sentinels for "due now" and
//! "empty" respectively.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Identifies a schedulable unit of session/device work. A C function
/// pointer would serve this role in the original implementation;
/// Rust closures aren't comparable, so callback identity is an enum
/// discriminant instead (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    AuthTimeout,
    KeepaliveTimeout,
    DialplanPoll { line_instance: u32 },
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    deadline: Instant,
    kind: TaskKind,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for ScheduledTask {}
impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

/// Min-heap of `(deadline, TaskKind)`, single-threaded.
#[derive(Default)]
pub struct TaskRunner {
    heap: BinaryHeap<Reverse<ScheduledTask>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new() }
    }

    /// Schedule `kind` to fire `seconds` from now. If `kind` is already
    /// scheduled, it is rescheduled (the old entry is dropped) rather
    /// than duplicated — this is what lets `KeepaliveTimeout` be
    /// re-armed idempotently on every frame read.
    pub fn add(&mut self, kind: TaskKind, seconds: u64) {
        self.add_ms(kind, seconds * 1000);
    }

    /// Same as [`add`](Self::add) with millisecond resolution, used by
    /// the 500ms dialplan-lookup poll (spec.md §4.5).
    pub fn add_ms(&mut self, kind: TaskKind, millis: u64) {
        self.remove(&kind);
        self.heap.push(Reverse(ScheduledTask { deadline: Instant::now() + Duration::from_millis(millis), kind }));
    }

    /// Unschedule `kind`. Not an error if it wasn't scheduled.
    pub fn remove(&mut self, kind: &TaskKind) {
        if self.heap.iter().any(|Reverse(t)| &t.kind == kind) {
            let remaining: BinaryHeap<_> = self.heap.drain().filter(|Reverse(t)| &t.kind != kind).collect();
            self.heap = remaining;
        }
    }

    /// Milliseconds until the next task: `0` if one is due now, a
    /// positive bound if one is pending, `-1` if the heap is empty.
    pub fn next_ms(&self) -> i64 {
        match self.heap.peek() {
            None => -1,
            Some(Reverse(t)) => {
                let now = Instant::now();
                if t.deadline <= now {
                    0
                } else {
                    (t.deadline - now).as_millis() as i64
                }
            }
        }
    }

    /// Pop and return every task whose deadline has passed, in
    /// non-decreasing deadline order.
    pub fn due(&mut self) -> Vec<TaskKind> {
        let now = Instant::now();
        let mut fired = Vec::new();
        while let Some(Reverse(t)) = self.heap.peek() {
            if t.deadline > now {
                break;
            }
            let Reverse(t) = self.heap.pop().unwrap();
            fired.push(t.kind);
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
