//! Evaluation pipeline: lookup, selection, execution, fail-open.
//!
//! ```text
//! lookup (bounded by gateway timeout and the global deadline)
//!    │  failure ──────────────────────────────► NotApplied
//!    ▼
//! filter by selector, keep gateway order
//!    ▼
//! one draw per matched experiment, first draw < rate wins
//!    │  none selected ────────────────────────► NotApplied
//!    ▼
//! registry.execute(kind, params, deadline)
//!    │  configuration error ──────────────────► NotApplied
//!    ▼
//! outcome returned verbatim
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use faultline_core::{ExecutionOutcome, Experiment, FlagDescriptor, RandomProvider};

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::impact::{ImpactContext, ImpactRegistry};

/// Default outer budget for one evaluation.
pub const DEFAULT_GLOBAL_DEADLINE: Duration = Duration::from_millis(1000);

/// Log at `info` for descriptors created with `with_debug(true)`, `debug` otherwise.
macro_rules! flag_log {
    ($flag:expr, $($arg:tt)+) => {
        if $flag.is_debug() {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Why an evaluation fell back to `NotApplied` on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOpen {
    /// The control plane could not be consulted.
    Gateway(GatewayError),
    /// The global deadline passed during the lookup.
    Deadline,
    /// The selected experiment could not be executed.
    Configuration(crate::error::ConfigurationError),
}

/// Detailed result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Outcome handed to the host.
    pub outcome: ExecutionOutcome,
    /// Id of the experiment that was selected, if any.
    pub experiment_id: Option<String>,
    /// Internal failure that forced `NotApplied`, if any.
    pub fail_open: Option<FailOpen>,
}

impl Evaluation {
    fn inactive() -> Self {
        Self {
            outcome: ExecutionOutcome::NotApplied,
            experiment_id: None,
            fail_open: None,
        }
    }

    fn failed(reason: FailOpen, experiment_id: Option<String>) -> Self {
        Self {
            outcome: ExecutionOutcome::NotApplied,
            experiment_id,
            fail_open: Some(reason),
        }
    }

    /// Whether an experiment matched and passed its rate check.
    pub fn is_active(&self) -> bool {
        self.experiment_id.is_some()
    }

    /// Whether the host request was affected.
    pub fn is_impacted(&self) -> bool {
        self.outcome.is_impacted()
    }
}

/// Pick the experiment to run for `flag`.
///
/// Selector filtering happens first; only matching experiments consume a draw.
/// Gateway order is preserved and the first experiment whose draw falls below
/// its rate wins.
pub fn select_experiment<'a, R: RandomProvider>(
    flag: &FlagDescriptor,
    experiments: &'a [Experiment],
    random: &R,
) -> Option<&'a Experiment> {
    experiments
        .iter()
        .filter(|experiment| experiment.matches(flag))
        .find(|experiment| experiment.selects(flag, random.random_ratio()))
}

/// Orchestrates one checkpoint evaluation.
///
/// Stateless apart from its immutable collaborators, so one instance serves
/// any number of concurrent invocations.
pub struct Evaluator<R> {
    gateway: Arc<dyn Gateway>,
    registry: Arc<ImpactRegistry>,
    random: R,
    global_deadline: Duration,
}

impl<R: Clone> Clone for Evaluator<R> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            registry: self.registry.clone(),
            random: self.random.clone(),
            global_deadline: self.global_deadline,
        }
    }
}

impl<R: RandomProvider> Evaluator<R> {
    /// Create an evaluator.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        registry: Arc<ImpactRegistry>,
        random: R,
        global_deadline: Duration,
    ) -> Self {
        Self {
            gateway,
            registry,
            random,
            global_deadline,
        }
    }

    /// Outer budget applied to every evaluation.
    pub fn global_deadline(&self) -> Duration {
        self.global_deadline
    }

    /// Impact registry in use.
    pub fn registry(&self) -> &ImpactRegistry {
        &self.registry
    }

    /// Evaluate `flag` and return the outcome only.
    pub async fn evaluate(
        &self,
        flag: &FlagDescriptor,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        self.evaluate_detailed(flag, cancel).await.outcome
    }

    /// Evaluate `flag`.
    ///
    /// Never fails: every internal problem yields `NotApplied` with the cause
    /// recorded in [`Evaluation::fail_open`]. Returns no later than the global
    /// deadline plus the cost of one non-cancellable read.
    pub async fn evaluate_detailed(
        &self,
        flag: &FlagDescriptor,
        cancel: &CancellationToken,
    ) -> Evaluation {
        let deadline = Instant::now() + self.global_deadline;

        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailOpen::Gateway(GatewayError::Cancelled)),
            result = tokio::time::timeout_at(deadline, self.gateway.lookup(flag)) => match result {
                Ok(Ok(experiments)) => Ok(experiments),
                Ok(Err(error)) => Err(FailOpen::Gateway(error)),
                Err(_) => Err(FailOpen::Deadline),
            },
        };

        let experiments = match lookup {
            Ok(experiments) => experiments,
            Err(FailOpen::Gateway(GatewayError::Cancelled)) => {
                flag_log!(flag, flag = %flag.name(), "invocation cancelled during lookup");
                return Evaluation::failed(FailOpen::Gateway(GatewayError::Cancelled), None);
            }
            Err(reason) => {
                tracing::warn!(
                    flag = %flag.name(), ?reason,
                    "control plane lookup failed, not injecting"
                );
                return Evaluation::failed(reason, None);
            }
        };

        let Some(experiment) = select_experiment(flag, &experiments, &self.random) else {
            flag_log!(
                flag,
                flag = %flag, candidates = experiments.len(),
                "no experiment selected"
            );
            return Evaluation::inactive();
        };

        let experiment_id = experiment.id().to_string();
        flag_log!(
            flag,
            flag = %flag, experiment = %experiment_id, impact = %experiment.impact_kind(),
            "experiment selected"
        );

        let ctx = ImpactContext::new(deadline, cancel.clone());
        let started = Instant::now();
        let execute = tokio::time::timeout_at(
            deadline,
            self.registry
                .execute(experiment.impact_kind(), experiment.impact_params(), &ctx),
        );

        // Behaviors that finish together with the cancellation keep their own outcome.
        let outcome = tokio::select! {
            biased;
            executed = execute => match executed {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(error)) => {
                    tracing::warn!(
                        flag = %flag.name(), experiment = %experiment_id, %error,
                        "impact could not be executed, not injecting"
                    );
                    return Evaluation::failed(FailOpen::Configuration(error), Some(experiment_id));
                }
                Err(_) => {
                    // The behavior ignored the deadline; whatever it did so far stands.
                    let delay = started.elapsed();
                    tracing::warn!(
                        flag = %flag.name(), experiment = %experiment_id, ?delay,
                        "impact overran the global deadline and was abandoned"
                    );
                    ExecutionOutcome::Applied { delay }
                }
            },
            _ = cancel.cancelled() => {
                let delay = started.elapsed();
                flag_log!(
                    flag,
                    flag = %flag.name(), experiment = %experiment_id, ?delay,
                    "invocation cancelled during impact, abandoning it"
                );
                ExecutionOutcome::Applied { delay }
            }
        };

        if outcome.is_impacted() {
            tracing::info!(
                flag = %flag.name(), experiment = %experiment_id, ?outcome,
                "failure flag impact applied"
            );
        }

        Evaluation {
            outcome,
            experiment_id: Some(experiment_id),
            fail_open: None,
        }
    }
}
