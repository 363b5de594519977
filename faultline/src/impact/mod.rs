//! Impact registry: maps an impact kind to the behavior that executes it.
//!
//! Behaviors receive the experiment's parameters and an [`ImpactContext`]
//! holding the absolute deadline and the host's cancellation token. They must
//! hand control back by the deadline; [`ImpactContext::sleep`] does the
//! clamping for them.
//!
//! # Usage
//!
//! ```ignore
//! use faultline::{ExecutionOutcome, ImpactRegistry};
//!
//! let mut registry = ImpactRegistry::with_builtins();
//! registry.register_fn("drop-cache", |_params| {
//!     CACHE.clear();
//!     ExecutionOutcome::applied()
//! });
//! ```

mod builtin;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use faultline_core::{ExecutionOutcome, ImpactParams};

use crate::error::ConfigurationError;

pub use builtin::{EXCEPTION, ExceptionImpact, LATENCY, LatencyImpact, NOOP, NoopImpact};

/// Execution context handed to a behavior.
#[derive(Debug, Clone)]
pub struct ImpactContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl ImpactContext {
    /// Create a context that must yield by `deadline`.
    pub fn new(deadline: Instant, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    /// Absolute point in time by which the behavior must return.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline (zero once passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the host has abandoned the request.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Host cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sleep for `min(requested, remaining)`, waking early on cancellation.
    ///
    /// Returns how long was actually slept.
    pub async fn sleep(&self, requested: Duration) -> Duration {
        let bounded = requested.min(self.remaining());
        if bounded.is_zero() || self.cancel.is_cancelled() {
            return Duration::ZERO;
        }

        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(bounded) => bounded,
            _ = self.cancel.cancelled() => started.elapsed(),
        }
    }
}

/// An executable disruptive behavior.
///
/// Implementations may only have process-local side effects (sleeping,
/// returning an abort). Parameter problems are reported as
/// [`ConfigurationError`] and never reach the host.
#[async_trait]
pub trait ImpactBehavior: Send + Sync + 'static {
    /// Run the effect.
    async fn execute(
        &self,
        params: &ImpactParams,
        ctx: &ImpactContext,
    ) -> Result<ExecutionOutcome, ConfigurationError>;
}

/// Adapter turning a synchronous callback into an [`ImpactBehavior`].
pub struct CallbackImpact<F> {
    callback: F,
}

impl<F> CallbackImpact<F>
where
    F: Fn(&ImpactParams) -> ExecutionOutcome + Send + Sync + 'static,
{
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> ImpactBehavior for CallbackImpact<F>
where
    F: Fn(&ImpactParams) -> ExecutionOutcome + Send + Sync + 'static,
{
    async fn execute(
        &self,
        params: &ImpactParams,
        _ctx: &ImpactContext,
    ) -> Result<ExecutionOutcome, ConfigurationError> {
        Ok((self.callback)(params))
    }
}

/// Registry of impact behaviors keyed by kind.
///
/// Built once before the client is constructed, then shared read-only.
#[derive(Clone, Default)]
pub struct ImpactRegistry {
    behaviors: HashMap<String, Arc<dyn ImpactBehavior>>,
}

impl fmt::Debug for ImpactRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpactRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ImpactRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `latency`, `exception` and `noop` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LATENCY, LatencyImpact);
        registry.register(EXCEPTION, ExceptionImpact);
        registry.register(NOOP, NoopImpact);
        registry
    }

    /// Register `behavior` under `kind`, returning any behavior it replaces.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        behavior: impl ImpactBehavior,
    ) -> Option<Arc<dyn ImpactBehavior>> {
        self.behaviors.insert(kind.into(), Arc::new(behavior))
    }

    /// Register a synchronous callback under `kind`.
    pub fn register_fn<F>(
        &mut self,
        kind: impl Into<String>,
        callback: F,
    ) -> Option<Arc<dyn ImpactBehavior>>
    where
        F: Fn(&ImpactParams) -> ExecutionOutcome + Send + Sync + 'static,
    {
        self.register(kind, CallbackImpact::new(callback))
    }

    /// Whether a behavior is registered for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.behaviors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Execute the behavior registered for `kind`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnknownImpact`] for unregistered kinds,
    /// [`ConfigurationError::BehaviorPanicked`] if the behavior panics, and
    /// whatever the behavior itself reports.
    pub async fn execute(
        &self,
        kind: &str,
        params: &ImpactParams,
        ctx: &ImpactContext,
    ) -> Result<ExecutionOutcome, ConfigurationError> {
        let behavior = self
            .behaviors
            .get(kind)
            .ok_or_else(|| ConfigurationError::UnknownImpact(kind.to_string()))?;

        AssertUnwindSafe(behavior.execute(params, ctx))
            .catch_unwind()
            .await
            .map_err(|payload| ConfigurationError::BehaviorPanicked {
                kind: kind.to_string(),
                message: panic_message(payload.as_ref()),
            })?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::AbortReason;

    fn ctx(budget: Duration) -> ImpactContext {
        ImpactContext::new(Instant::now() + budget, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_clamped_to_deadline() {
        let ctx = ctx(Duration::from_millis(300));
        let started = Instant::now();

        let slept = ctx.sleep(Duration::from_secs(10)).await;

        assert_eq!(slept, Duration::from_millis(300));
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert_eq!(ctx.remaining(), Duration::ZERO);
        assert_eq!(ctx.sleep(Duration::from_secs(1)).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let ctx = ImpactContext::new(Instant::now() + Duration::from_secs(5), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            cancel.cancel();
        });

        let slept = ctx.sleep(Duration::from_secs(5)).await;
        canceller.await.expect("canceller");

        assert_eq!(slept, Duration::from_millis(40));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let registry = ImpactRegistry::with_builtins();
        let result = registry
            .execute("blackhole", &ImpactParams::new(), &ctx(Duration::from_secs(1)))
            .await;
        assert_eq!(
            result,
            Err(ConfigurationError::UnknownImpact("blackhole".to_string()))
        );
    }

    #[tokio::test]
    async fn test_custom_callback() {
        let mut registry = ImpactRegistry::with_builtins();
        registry.register_fn("corrupt", |params| {
            let field = params.get_str("field").unwrap_or("unknown");
            ExecutionOutcome::Aborted(AbortReason::new("Corruption", field))
        });

        assert_eq!(registry.kinds(), ["corrupt", "exception", "latency", "noop"]);

        let params = ImpactParams::new().with("field", "balance");
        let outcome = registry
            .execute("corrupt", &params, &ctx(Duration::from_secs(1)))
            .await
            .expect("registered");
        assert_eq!(
            outcome,
            ExecutionOutcome::Aborted(AbortReason::new("Corruption", "balance"))
        );
    }

    #[tokio::test]
    async fn test_replacing_a_builtin() {
        let mut registry = ImpactRegistry::with_builtins();
        let previous = registry.register_fn(LATENCY, |_| ExecutionOutcome::NotApplied);
        assert!(previous.is_some());

        let outcome = registry
            .execute(LATENCY, &ImpactParams::new(), &ctx(Duration::from_secs(1)))
            .await
            .expect("registered");
        assert_eq!(outcome, ExecutionOutcome::NotApplied);
    }

    #[tokio::test]
    async fn test_panicking_behavior_is_contained() {
        let mut registry = ImpactRegistry::new();
        registry.register_fn("explode", |_| panic!("boom"));

        let result = registry
            .execute("explode", &ImpactParams::new(), &ctx(Duration::from_secs(1)))
            .await;
        assert_eq!(
            result,
            Err(ConfigurationError::BehaviorPanicked {
                kind: "explode".to_string(),
                message: "boom".to_string(),
            })
        );
    }
}
