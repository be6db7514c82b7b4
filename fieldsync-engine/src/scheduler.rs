//! Debounced, coalescing patch accumulator.
//!
//! Holds the pending field deltas and the single debounce deadline of a
//! session. Time is passed in explicitly; the session owns the actual timer.

use fieldsync_core::value::same_value;
use fieldsync_core::Record;
use std::time::Duration;
use tokio::time::Instant;

/// What [`PatchScheduler::offer`] did with a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Deltas queued and the window (re)started.
    Armed,
    /// Every delta matched the baseline; nothing queued.
    Unchanged,
    /// The edit reverted a pending field and nothing else is left to send.
    Withdrawn,
}

#[derive(Debug, Clone)]
pub struct PatchScheduler {
    debounce: Duration,
    pending: Record,
    deadline: Option<Instant>,
}

impl PatchScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: Record::new(),
            deadline: None,
        }
    }

    /// Merge `delta` into the accumulator.
    ///
    /// Values equal to the `baseline` value are dropped (and withdrawn if they
    /// were pending). The baseline is what the server will hold once every
    /// write already sent has landed. `forced` holds fields that still carry an
    /// error; they are queued with the lowest priority so newer deltas win.
    pub fn offer(
        &mut self,
        delta: Record,
        baseline: Option<&Record>,
        forced: Record,
        now: Instant,
    ) -> Offer {
        let mut changed = Record::new();
        let mut withdrew = false;
        for (name, value) in delta {
            let unchanged = baseline
                .and_then(|baseline| baseline.get(&name))
                .is_some_and(|known| same_value(&value, known));
            if unchanged {
                withdrew |= self.pending.remove(&name).is_some();
            } else {
                changed.insert(name, value);
            }
        }

        if changed.is_empty() && forced.is_empty() {
            if withdrew && self.pending.is_empty() {
                self.deadline = None;
                return Offer::Withdrawn;
            }
            return Offer::Unchanged;
        }

        for (name, value) in forced {
            self.pending.entry(name).or_insert(value);
        }
        self.pending.extend(changed);
        self.deadline = Some(now + self.debounce);
        Offer::Armed
    }

    /// Take the accumulated patch once the window has elapsed.
    ///
    /// Returns `None` before the deadline or when nothing is pending.
    pub fn take_due(&mut self, now: Instant) -> Option<Record> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.take(),
            _ => None,
        }
    }

    /// Take the accumulated patch regardless of the deadline.
    pub fn take(&mut self) -> Option<Record> {
        self.deadline = None;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Close the window immediately.
    pub fn fire_now(&mut self, now: Instant) {
        if !self.pending.is_empty() {
            self.deadline = Some(now);
        }
    }

    /// Stop the window but keep the accumulator.
    pub fn defer(&mut self) {
        self.deadline = None;
    }

    /// Restart the window for whatever is pending.
    pub fn rearm(&mut self, now: Instant) {
        if !self.pending.is_empty() {
            self.deadline = Some(now + self.debounce);
        }
    }

    /// Put an undelivered payload back without overriding newer deltas.
    pub fn requeue(&mut self, payload: Record) {
        for (name, value) in payload {
            self.pending.entry(name).or_insert(value);
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    pub fn pending(&self) -> &Record {
        &self.pending
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
