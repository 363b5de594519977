//! Control-plane gateway: descriptor in, experiments out.
//!
//! [`Gateway`] is the seam between the evaluator and whatever protocol the
//! control plane speaks. Implementations must bound their own latency and
//! report every failure as a [`GatewayError`] instead of panicking.
//!
//! - [`HttpGateway`]: JSON over HTTP/1.1 with a single, time-boxed attempt
//! - [`CachedGateway`]: TTL cache in front of any other gateway
//! - [`StaticGateway`]: fixed answer, for tests and local development

mod cache;
mod http;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use faultline_core::{Experiment, FlagDescriptor};

use crate::error::GatewayResult;

pub use cache::{CachedGateway, DEFAULT_MAX_ENTRIES};
pub use http::{HttpGateway, POOL_IDLE_TIMEOUT, POOL_MAX_IDLE_PER_HOST, parse_experiments};

/// Immutable, shareable list of experiments in control-plane order.
pub type Experiments = Arc<[Experiment]>;

/// Provider trait for control-plane lookups.
///
/// Shared by every in-flight invocation, hence `Send + Sync`.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Fetch the experiments currently active for `flag`.
    ///
    /// An empty list is a valid answer, not an error.
    async fn lookup(&self, flag: &FlagDescriptor) -> GatewayResult<Experiments>;
}

#[async_trait]
impl<G: Gateway + ?Sized> Gateway for Arc<G> {
    async fn lookup(&self, flag: &FlagDescriptor) -> GatewayResult<Experiments> {
        (**self).lookup(flag).await
    }
}

/// Gateway that always answers with the same experiments.
///
/// Counts lookups so tests can assert how often the control plane was hit.
#[derive(Debug)]
pub struct StaticGateway {
    experiments: Experiments,
    calls: AtomicUsize,
}

impl StaticGateway {
    /// Answer every lookup with `experiments`.
    pub fn new(experiments: impl IntoIterator<Item = Experiment>) -> Self {
        Self {
            experiments: experiments.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every lookup with an empty list.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Number of lookups served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for StaticGateway {
    async fn lookup(&self, _flag: &FlagDescriptor) -> GatewayResult<Experiments> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.experiments.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{ImpactParams, Selector};

    #[tokio::test]
    async fn test_static_gateway_counts_calls() {
        let experiment =
            Experiment::new("exp", "noop", ImpactParams::new(), 1.0, Selector::any())
                .expect("valid");
        let gateway = Arc::new(StaticGateway::new([experiment]));
        let flag = FlagDescriptor::named("checkout").expect("valid name");

        // Through the Arc blanket impl
        let shared: Arc<dyn Gateway> = gateway.clone();
        let first = shared.lookup(&flag).await.expect("lookup");
        let second = shared.lookup(&flag).await.expect("lookup");

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id(), second[0].id());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_gateway() {
        let gateway = StaticGateway::empty();
        let flag = FlagDescriptor::named("checkout").expect("valid name");
        assert!(gateway.lookup(&flag).await.expect("lookup").is_empty());
    }
}
