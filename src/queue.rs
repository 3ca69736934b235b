//! The cross-context work queue.
//!
//! A bounded, lock-free MPMC queue of [`WorkItem`]s is the only mechanism by
//! which code outside the agent task (timer expiries, application threads,
//! transport callbacks) may cause shared state to change. Submission is
//! non-blocking from any context; the agent task drains the queue once per
//! loop iteration and runs every item to completion.
//!
//! A full queue drops the request and reports [`Error::QueueFull`] to the
//! submitter; retrying or accepting the loss is the submitter's call.

use core::fmt;

use heapless::mpmc::MpMcQueue;

use crate::agent::CloudAgent;
use crate::diagnostics::DiagPayload;
use crate::error::Error;
use crate::ota::OtaNotice;

/// Depth of the work queue. Must be a power of two.
pub const WORK_QUEUE_DEPTH: usize = 8;

/// Deferred work executed in the agent task's context.
///
/// Implementations take `&self` so the same registration can be submitted
/// repeatedly (periodic diagnostics re-submit on every timer expiry); capture
/// state with interior mutability where needed.
pub trait Work {
    /// Execute against the agent. Runs in the loop context; must not block.
    fn run(&self, agent: &mut dyn CloudAgent);
}

/// One queued unit of work.
pub enum WorkItem<'cb> {
    /// Application work run against the [`CloudAgent`] facade.
    User(&'cb dyn Work),
    /// Publish a one-shot diagnostics payload.
    Diagnostics(DiagPayload<'cb>),
    /// Perform the OTA enable check: subscribe, consume the boot flag,
    /// announce the current firmware version.
    OtaCheck,
    /// Drive a forced (administrator-initiated) update through the normal
    /// upgrade path.
    ForceUpdate(OtaNotice),
    /// Cooperatively stop the agent at the next loop iteration.
    Stop,
}

impl fmt::Debug for WorkItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::User(_) => f.write_str("User"),
            WorkItem::Diagnostics(p) => f.debug_tuple("Diagnostics").field(p).finish(),
            WorkItem::OtaCheck => f.write_str("OtaCheck"),
            WorkItem::ForceUpdate(n) => f.debug_tuple("ForceUpdate").field(n).finish(),
            WorkItem::Stop => f.write_str("Stop"),
        }
    }
}

/// The bounded work queue shared between the agent task and every submitting
/// context.
///
/// Create it before the agent and pass a reference to [`Agent::new`]; any
/// context holding the same reference may submit concurrently.
///
/// [`Agent::new`]: crate::agent::Agent::new
pub struct WorkQueue<'cb> {
    items: MpMcQueue<WorkItem<'cb>, WORK_QUEUE_DEPTH>,
}

impl<'cb> WorkQueue<'cb> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        WorkQueue {
            items: MpMcQueue::new(),
        }
    }

    /// Submit an item without blocking. Safe from any context.
    pub fn submit(&self, item: WorkItem<'cb>) -> Result<(), Error> {
        self.items.enqueue(item).map_err(|_| Error::QueueFull)
    }

    /// Submit application work for execution in the agent task's context.
    pub fn submit_work(&self, work: &'cb dyn Work) -> Result<(), Error> {
        self.submit(WorkItem::User(work))
    }

    /// Request a cooperative stop. The agent disconnects and returns from its
    /// run loop at the next iteration.
    pub fn submit_stop(&self) -> Result<(), Error> {
        self.submit(WorkItem::Stop)
    }

    /// Pop the oldest item, if any. The agent loop is the intended consumer;
    /// items taken elsewhere never execute.
    pub fn take(&self) -> Option<WorkItem<'cb>> {
        self.items.dequeue()
    }
}

impl Default for WorkQueue<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkQueue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkQueue")
    }
}
