//! Diagnostics payloads and the periodic scheduler.
//!
//! One-shot diagnostics are JSON payloads queued for publication on the
//! device's diagnostics topic. Periodic diagnostics are registered once and
//! then driven entirely by the agent loop: expiry submits the registered work
//! to the queue, and the work itself runs in the loop context like any other
//! item. Timer bookkeeping never calls application code directly.

use core::fmt;

use heapless::{String, Vec};

use crate::error::Error;
use crate::queue::{Work, WorkQueue};

/// Maximum size of an owned diagnostics payload.
pub const DIAG_PAYLOAD_MAX: usize = 256;
/// Number of periodic diagnostics registrations the scheduler holds.
pub const DIAG_ENTRIES_CAP: usize = 8;

/// A one-shot diagnostics payload.
///
/// `Owned` copies the bytes into the queue item; `Borrowed` carries a
/// reference to caller-owned data that must outlive the agent, for payloads
/// built once and reported many times.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DiagPayload<'cb> {
    /// Payload owned by the queue item.
    Owned(String<DIAG_PAYLOAD_MAX>),
    /// Payload borrowed from the caller.
    Borrowed(&'cb str),
}

impl DiagPayload<'_> {
    /// The payload text.
    pub fn as_str(&self) -> &str {
        match self {
            DiagPayload::Owned(s) => s,
            DiagPayload::Borrowed(s) => s,
        }
    }

    /// Build an owned payload, failing if it exceeds [`DIAG_PAYLOAD_MAX`].
    pub fn owned(s: &str) -> Option<Self> {
        String::try_from(s).ok().map(DiagPayload::Owned)
    }
}

struct Entry<'cb> {
    work: &'cb dyn Work,
    period_ms: u32,
    remaining_ms: u32,
    /// The registration-time firing; retried on tick if the queue was full.
    fired_once: bool,
}

/// Countdown scheduler for periodic diagnostics.
///
/// Owned by the agent and advanced once per loop iteration with the elapsed
/// poll time. Expiry submits to the work queue and re-arms; if the queue is
/// full the firing is retried on the next tick rather than dropped.
pub struct DiagScheduler<'cb> {
    entries: Vec<Entry<'cb>, DIAG_ENTRIES_CAP>,
}

impl<'cb> DiagScheduler<'cb> {
    /// An empty scheduler.
    pub const fn new() -> Self {
        DiagScheduler {
            entries: Vec::new(),
        }
    }

    /// Number of registrations held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register periodic work. The first firing is submitted immediately;
    /// subsequent firings follow every `period_ms` of ticked time.
    pub fn register_periodic(
        &mut self,
        work: &'cb dyn Work,
        period_ms: u32,
        queue: &WorkQueue<'cb>,
    ) -> Result<(), Error> {
        if self.entries.len() == DIAG_ENTRIES_CAP {
            return Err(Error::SchedulerFull);
        }
        let fired_once = queue.submit_work(work).is_ok();
        self.entries
            .push(Entry {
                work,
                period_ms,
                remaining_ms: period_ms,
                fired_once,
            })
            .map_err(|_| Error::SchedulerFull)
    }

    /// Advance every countdown by `elapsed_ms`, submitting expired work to
    /// the queue.
    pub fn tick(&mut self, elapsed_ms: u32, queue: &WorkQueue<'cb>) {
        for entry in &mut self.entries {
            if !entry.fired_once {
                entry.fired_once = queue.submit_work(entry.work).is_ok();
                continue;
            }
            entry.remaining_ms = entry.remaining_ms.saturating_sub(elapsed_ms);
            if entry.remaining_ms == 0 && queue.submit_work(entry.work).is_ok() {
                entry.remaining_ms = entry.period_ms;
            }
        }
    }
}

impl Default for DiagScheduler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagScheduler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagScheduler")
            .field("entries", &self.entries.len())
            .finish()
    }
}
