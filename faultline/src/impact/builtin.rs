//! Built-in impact behaviors.

use std::time::Duration;

use async_trait::async_trait;

use faultline_core::{AbortReason, ExecutionOutcome, ImpactParams};

use super::{ImpactBehavior, ImpactContext};
use crate::error::ConfigurationError;

/// Kind name of [`LatencyImpact`].
pub const LATENCY: &str = "latency";
/// Kind name of [`ExceptionImpact`].
pub const EXCEPTION: &str = "exception";
/// Kind name of [`NoopImpact`].
pub const NOOP: &str = "noop";

const LATENCY_MS: &str = "latencyMs";
const EXCEPTION_TYPE: &str = "type";
const EXCEPTION_MESSAGE: &str = "message";

const DEFAULT_EXCEPTION_TYPE: &str = "FailureFlagException";
const DEFAULT_EXCEPTION_MESSAGE: &str = "failure injected by failure flag";

/// Sleeps for `latencyMs`, truncated at the deadline.
///
/// The reported delay is what was actually slept, not what was requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyImpact;

#[async_trait]
impl ImpactBehavior for LatencyImpact {
    async fn execute(
        &self,
        params: &ImpactParams,
        ctx: &ImpactContext,
    ) -> Result<ExecutionOutcome, ConfigurationError> {
        let requested = params.get_u64(LATENCY_MS).ok_or_else(|| {
            let reason = match params.get(LATENCY_MS) {
                None => "missing".to_string(),
                Some(value) => format!("expected a non-negative integer, got {}", value),
            };
            ConfigurationError::InvalidParam {
                kind: LATENCY.to_string(),
                param: LATENCY_MS.to_string(),
                reason,
            }
        })?;

        let requested = Duration::from_millis(requested);
        let delay = ctx.sleep(requested).await;
        if delay < requested {
            tracing::debug!(?requested, ?delay, "latency truncated");
        }

        Ok(ExecutionOutcome::Applied { delay })
    }
}

/// Aborts the request with the experiment's `type` and `message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionImpact;

#[async_trait]
impl ImpactBehavior for ExceptionImpact {
    async fn execute(
        &self,
        params: &ImpactParams,
        _ctx: &ImpactContext,
    ) -> Result<ExecutionOutcome, ConfigurationError> {
        let kind = params
            .get_str(EXCEPTION_TYPE)
            .unwrap_or(DEFAULT_EXCEPTION_TYPE);
        let message = params
            .get_str(EXCEPTION_MESSAGE)
            .unwrap_or(DEFAULT_EXCEPTION_MESSAGE);

        Ok(ExecutionOutcome::Aborted(AbortReason::new(kind, message)))
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopImpact;

#[async_trait]
impl ImpactBehavior for NoopImpact {
    async fn execute(
        &self,
        _params: &ImpactParams,
        _ctx: &ImpactContext,
    ) -> Result<ExecutionOutcome, ConfigurationError> {
        Ok(ExecutionOutcome::NotApplied)
    }
}
