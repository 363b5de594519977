//! Result of evaluating a checkpoint.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Metadata carried by an [`ExecutionOutcome::Aborted`] outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReason {
    /// Error class requested by the experiment (e.g. `"Timeout"`).
    pub kind: String,
    /// Human readable message requested by the experiment.
    pub message: String,
}

impl AbortReason {
    /// Create a new abort reason.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Tri-state outcome of one `invoke`.
///
/// Only `Applied` and `Aborted` change what the host observes; every internal
/// failure collapses into `NotApplied`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// No experiment matched, the rate check skipped it, or evaluation failed.
    NotApplied,
    /// The effect ran to completion; the request may proceed.
    Applied {
        /// Delay actually injected (zero for effects that do not sleep).
        delay: Duration,
    },
    /// The effect asks the host to fail the current request.
    Aborted(AbortReason),
}

impl ExecutionOutcome {
    /// `Applied` with no delay.
    pub fn applied() -> Self {
        ExecutionOutcome::Applied {
            delay: Duration::ZERO,
        }
    }

    /// Whether an effect ran and let the request continue.
    pub fn is_applied(&self) -> bool {
        matches!(self, ExecutionOutcome::Applied { .. })
    }

    /// Whether the effect asks the host to fail the request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ExecutionOutcome::Aborted(_))
    }

    /// Whether the host request was affected at all.
    pub fn is_impacted(&self) -> bool {
        !matches!(self, ExecutionOutcome::NotApplied)
    }

    /// Injected delay, if the outcome is `Applied`.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            ExecutionOutcome::Applied { delay } => Some(*delay),
            _ => None,
        }
    }

    /// Convert into a `Result` so hosts can propagate aborts with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`AbortedOutcome`] for `Aborted`.
    pub fn into_result(self) -> Result<(), AbortedOutcome> {
        match self {
            ExecutionOutcome::Aborted(reason) => Err(AbortedOutcome(reason)),
            _ => Ok(()),
        }
    }
}

/// Host-facing error for an injected abort.
///
/// Not a failure of the client itself: it is the deliberate signal of a
/// selected experiment that the host should surface as its own failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("injected failure ({})", .0)]
pub struct AbortedOutcome(pub AbortReason);

impl AbortedOutcome {
    /// Abort metadata.
    pub fn reason(&self) -> &AbortReason {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let not_applied = ExecutionOutcome::NotApplied;
        let applied = ExecutionOutcome::Applied {
            delay: Duration::from_millis(20),
        };
        let aborted = ExecutionOutcome::Aborted(AbortReason::new("Timeout", "injected"));

        assert!(!not_applied.is_impacted());
        assert!(applied.is_applied() && applied.is_impacted());
        assert!(aborted.is_aborted() && aborted.is_impacted());
        assert_eq!(applied.delay(), Some(Duration::from_millis(20)));
        assert_eq!(aborted.delay(), None);
    }

    #[test]
    fn test_into_result() {
        assert!(ExecutionOutcome::NotApplied.into_result().is_ok());
        assert!(ExecutionOutcome::applied().into_result().is_ok());

        let err = ExecutionOutcome::Aborted(AbortReason::new("Timeout", "injected"))
            .into_result()
            .expect_err("aborted outcome must be an error");
        assert_eq!(err.reason().kind, "Timeout");
        assert_eq!(err.to_string(), "injected failure (Timeout: injected)");
    }
}
