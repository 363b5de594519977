//! Lock-free invocation counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::evaluator::Evaluation;

/// Counters shared by every clone of a client.
#[derive(Debug, Default)]
pub struct InvocationStats {
    invocations: AtomicU64,
    disabled: AtomicU64,
    rejected: AtomicU64,
    active: AtomicU64,
    applied: AtomicU64,
    aborted: AtomicU64,
    fail_open: AtomicU64,
}

impl InvocationStats {
    /// Fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_disabled(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.disabled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, evaluation: &Evaluation) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        if evaluation.is_active() {
            self.active.fetch_add(1, Ordering::Relaxed);
        }
        if evaluation.outcome.is_applied() {
            self.applied.fetch_add(1, Ordering::Relaxed);
        }
        if evaluation.outcome.is_aborted() {
            self.aborted.fetch_add(1, Ordering::Relaxed);
        }
        if evaluation.fail_open.is_some() {
            self.fail_open.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            disabled: self.disabled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            fail_open: self.fail_open.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`InvocationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls to `invoke` of any kind.
    pub invocations: u64,
    /// Calls short-circuited by the kill switch.
    pub disabled: u64,
    /// Calls rejected for an invalid descriptor.
    pub rejected: u64,
    /// Calls where an experiment was selected.
    pub active: u64,
    /// Calls that ended `Applied`.
    pub applied: u64,
    /// Calls that ended `Aborted`.
    pub aborted: u64,
    /// Calls that fell back to `NotApplied` because of an internal failure.
    pub fail_open: u64,
}

impl StatsSnapshot {
    /// Calls that changed host-visible behavior.
    pub fn impacted(&self) -> u64 {
        self.applied + self.aborted
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invocations={} active={} applied={} aborted={} fail_open={} disabled={} rejected={}",
            self.invocations,
            self.active,
            self.applied,
            self.aborted,
            self.fail_open,
            self.disabled,
            self.rejected
        )
    }
}
