//! Client facade: the single entry point host code calls at each checkpoint.
//!
//! ```text
//! host ──invoke(name, labels)──► FailureFlags
//!                                   │ disabled? ──────────► NotApplied
//!                                   ▼
//!                               Evaluator ──► Gateway (HTTP, optionally cached)
//!                                   │    └──► ImpactRegistry
//!                                   ▼
//!                            ExecutionOutcome
//! ```
//!
//! A client is cheap to clone; clones share configuration, gateway, registry
//! and counters, and may be used from any number of tasks at once.

mod builder;
pub mod config;

pub use builder::FailureFlagsBuilder;
pub use config::{ClientConfig, ClientSettings, Identity};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use faultline_core::{ExecutionOutcome, FlagDescriptor, RandomProvider, ThreadRandomProvider};

use crate::error::ConfigError;
use crate::evaluator::{Evaluation, Evaluator};
use crate::stats::{InvocationStats, StatsSnapshot};

/// Failure-flag client.
///
/// Never fails an invocation on its own account: when anything internal goes
/// wrong the outcome is [`ExecutionOutcome::NotApplied`] and the host carries
/// on as if the checkpoint was not there.
pub struct FailureFlags<R = ThreadRandomProvider> {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) evaluator: Evaluator<R>,
    pub(crate) stats: Arc<InvocationStats>,
}

impl<R: RandomProvider> Clone for FailureFlags<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            evaluator: self.evaluator.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl FailureFlags<ThreadRandomProvider> {
    /// Start building a client.
    pub fn builder() -> FailureFlagsBuilder<ThreadRandomProvider> {
        FailureFlagsBuilder::new()
    }

    /// Build a client from `FAILURE_FLAGS_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for unparsable variables or an invalid result.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }
}

impl<R: RandomProvider> FailureFlags<R> {
    /// Evaluate the checkpoint `name` with the given request labels.
    ///
    /// An empty name is a caller error; it is logged and yields `NotApplied`.
    pub async fn invoke<N, I, K, V>(&self, name: N, labels: I) -> ExecutionOutcome
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if !self.config.enabled {
            self.stats.record_disabled();
            return ExecutionOutcome::NotApplied;
        }

        match FlagDescriptor::new(name, labels) {
            Ok(flag) => self.invoke_flag(&flag).await,
            Err(error) => {
                self.stats.record_rejected();
                tracing::warn!(%error, "rejected failure flag invocation");
                ExecutionOutcome::NotApplied
            }
        }
    }

    /// Evaluate a prepared descriptor.
    pub async fn invoke_flag(&self, flag: &FlagDescriptor) -> ExecutionOutcome {
        self.invoke_detailed(flag, &CancellationToken::new())
            .await
            .outcome
    }

    /// Evaluate `flag`, stopping early if the host cancels `cancel`.
    ///
    /// A cancelled lookup yields `NotApplied`; a cancelled latency impact
    /// yields `Applied` with the delay served so far.
    pub async fn invoke_with_cancel(
        &self,
        flag: &FlagDescriptor,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        self.invoke_detailed(flag, cancel).await.outcome
    }

    /// Evaluate `flag` and report which experiment ran and why the client
    /// fell back, if it did.
    pub async fn invoke_detailed(
        &self,
        flag: &FlagDescriptor,
        cancel: &CancellationToken,
    ) -> Evaluation {
        if !self.config.enabled {
            self.stats.record_disabled();
            return Evaluation {
                outcome: ExecutionOutcome::NotApplied,
                experiment_id: None,
                fail_open: None,
            };
        }

        let evaluation = self.evaluator.evaluate_detailed(flag, cancel).await;
        self.stats.record(&evaluation);
        evaluation
    }

    /// Whether the kill switch is on.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Counters shared by this client and its clones.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::StaticGateway;
    use faultline_core::{Experiment, ImpactParams, ScriptedRandomProvider, Selector};
    use std::time::Duration;

    fn exception_everywhere() -> Experiment {
        Experiment::new(
            "always-fail",
            "exception",
            ImpactParams::new().with("type", "Unavailable"),
            1.0,
            Selector::any(),
        )
        .expect("valid")
    }

    #[tokio::test]
    async fn test_disabled_never_consults_gateway() {
        let gateway = Arc::new(StaticGateway::new([exception_everywhere()]));
        let flags = FailureFlags::builder()
            .enabled(false)
            .gateway(gateway.clone())
            .build()
            .expect("valid");

        for _ in 0..10 {
            assert_eq!(
                flags.invoke("checkout", [("tier", "gold")]).await,
                ExecutionOutcome::NotApplied
            );
        }

        assert_eq!(gateway.calls(), 0);
        assert_eq!(flags.stats().disabled, 10);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let gateway = Arc::new(StaticGateway::new([exception_everywhere()]));
        let flags = FailureFlags::builder()
            .gateway(gateway.clone())
            .build()
            .expect("valid");

        let outcome = flags.invoke("  ", std::iter::empty::<(&str, &str)>()).await;

        assert_eq!(outcome, ExecutionOutcome::NotApplied);
        assert_eq!(gateway.calls(), 0);
        assert_eq!(flags.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_clones_share_stats() {
        let flags = FailureFlags::builder()
            .gateway(StaticGateway::new([exception_everywhere()]))
            .random(ScriptedRandomProvider::constant(0.0))
            .build()
            .expect("valid");
        let clone = flags.clone();

        assert!(flags.invoke("a", [("k", "v")]).await.is_aborted());
        assert!(clone.invoke("b", [("k", "v")]).await.is_aborted());

        let stats = flags.stats();
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.aborted, 2);
        assert_eq!(stats.impacted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detailed_reports_experiment() {
        let experiment = Experiment::new(
            "slow-gold",
            "latency",
            ImpactParams::new().with("latencyMs", 30),
            1.0,
            Selector::any().with("tier", "gold"),
        )
        .expect("valid");
        let flags = FailureFlags::builder()
            .gateway(StaticGateway::new([experiment]))
            .random(ScriptedRandomProvider::constant(0.0))
            .build()
            .expect("valid");

        let gold = FlagDescriptor::named("checkout")
            .expect("valid")
            .with_label("tier", "gold");
        let evaluation = flags
            .invoke_detailed(&gold, &CancellationToken::new())
            .await;
        assert_eq!(evaluation.experiment_id.as_deref(), Some("slow-gold"));
        assert_eq!(evaluation.outcome.delay(), Some(Duration::from_millis(30)));

        let silver = FlagDescriptor::named("checkout")
            .expect("valid")
            .with_label("tier", "silver");
        assert_eq!(flags.invoke_flag(&silver).await, ExecutionOutcome::NotApplied);
    }
}
