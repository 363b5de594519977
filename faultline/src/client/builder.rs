//! Client builder.

use std::sync::Arc;
use std::time::Duration;

use faultline_core::{ExecutionOutcome, ImpactParams, RandomProvider, ThreadRandomProvider};

use super::config::{ClientConfig, Identity};
use super::FailureFlags;
use crate::error::ConfigError;
use crate::evaluator::Evaluator;
use crate::gateway::{CachedGateway, Gateway, HttpGateway};
use crate::impact::{ImpactBehavior, ImpactRegistry};
use crate::stats::InvocationStats;

/// Builder for [`FailureFlags`] with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use faultline::{FailureFlags, Identity};
///
/// let flags = FailureFlags::builder()
///     .endpoint("http://localhost:5032/experiment")
///     .identity(Identity::bearer(token))
///     .global_deadline(Duration::from_millis(500))
///     .impact_fn("drop-cache", |_params| {
///         CACHE.clear();
///         ExecutionOutcome::applied()
///     })
///     .build()?;
/// ```
pub struct FailureFlagsBuilder<R = ThreadRandomProvider> {
    config: ClientConfig,
    registry: ImpactRegistry,
    gateway: Option<Arc<dyn Gateway>>,
    random: R,
}

impl FailureFlagsBuilder<ThreadRandomProvider> {
    /// Builder with default configuration and the built-in impacts.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            registry: ImpactRegistry::with_builtins(),
            gateway: None,
            random: ThreadRandomProvider,
        }
    }
}

impl Default for FailureFlagsBuilder<ThreadRandomProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RandomProvider> FailureFlagsBuilder<R> {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the control-plane endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Turn the client on or off.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Bound on one control-plane round trip.
    pub fn gateway_timeout(mut self, timeout: Duration) -> Self {
        self.config.gateway_timeout = timeout;
        self
    }

    /// Outer bound on one evaluation.
    pub fn global_deadline(mut self, deadline: Duration) -> Self {
        self.config.global_deadline = deadline;
        self
    }

    /// Credentials sent to the control plane.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.config.identity = identity;
        self
    }

    /// Cache lookups per flag name for `ttl`.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = Some(ttl);
        self
    }

    /// Register a custom impact behavior, replacing any existing one of the same kind.
    pub fn impact(mut self, kind: impl Into<String>, behavior: impl ImpactBehavior) -> Self {
        self.registry.register(kind, behavior);
        self
    }

    /// Register a synchronous callback as an impact behavior.
    pub fn impact_fn<F>(mut self, kind: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&ImpactParams) -> ExecutionOutcome + Send + Sync + 'static,
    {
        self.registry.register_fn(kind, callback);
        self
    }

    /// Use `gateway` instead of the HTTP control plane.
    ///
    /// The endpoint, identity and gateway timeout are ignored; the cache TTL
    /// still applies.
    pub fn gateway(mut self, gateway: impl Gateway) -> Self {
        self.gateway = Some(Arc::new(gateway));
        self
    }

    /// Use `random` for rate draws.
    pub fn random<R2: RandomProvider>(self, random: R2) -> FailureFlagsBuilder<R2> {
        FailureFlagsBuilder {
            config: self.config,
            registry: self.registry,
            gateway: self.gateway,
            random,
        }
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for an invalid endpoint, identity header or duration.
    pub fn build(self) -> Result<FailureFlags<R>, ConfigError> {
        let config = self.config;

        let gateway: Arc<dyn Gateway> = match self.gateway {
            Some(gateway) => {
                if config.global_deadline.is_zero() {
                    return Err(ConfigError::ZeroDuration("global deadline"));
                }
                gateway
            }
            None => {
                let endpoint = config.validate()?;
                let headers = config.identity.to_header_map()?;
                Arc::new(HttpGateway::new(endpoint, headers, config.gateway_timeout))
            }
        };

        let gateway: Arc<dyn Gateway> = match config.cache_ttl {
            Some(ttl) if ttl.is_zero() => return Err(ConfigError::ZeroDuration("cache ttl")),
            Some(ttl) => Arc::new(CachedGateway::new(gateway, ttl)),
            None => gateway,
        };

        tracing::debug!(
            endpoint = %config.endpoint,
            enabled = config.enabled,
            gateway_timeout = ?config.gateway_timeout,
            global_deadline = ?config.global_deadline,
            cache_ttl = ?config.cache_ttl,
            impacts = ?self.registry.kinds(),
            "failure flags client created"
        );

        let evaluator = Evaluator::new(
            gateway,
            Arc::new(self.registry),
            self.random,
            config.global_deadline,
        );

        Ok(FailureFlags {
            config: Arc::new(config),
            evaluator,
            stats: Arc::new(InvocationStats::new()),
        })
    }
}
