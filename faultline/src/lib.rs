//! # faultline
//!
//! Fail-open failure-flag client.
//!
//! Host code marks injection checkpoints with [`FailureFlags::invoke`]. At each
//! checkpoint the client asks a remote control plane which experiments are
//! active for the flag, picks at most one by selector and rate, and executes
//! its impact: extra latency, an injected abort, or a host-registered behavior.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  client      FailureFlags facade, builder, configuration    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  evaluator   lookup → select → execute, fail-open, deadline │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  gateway                     │  impact                      │
//! │  • HttpGateway (hyper)       │  • ImpactRegistry            │
//! │  • CachedGateway (TTL)       │  • latency / exception / noop│
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                     faultline-core                          │
//! │  FlagDescriptor, Experiment, ExecutionOutcome, Random       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use faultline::{ExecutionOutcome, FailureFlags};
//!
//! let flags = FailureFlags::from_env()?;
//!
//! match flags.invoke("http-ingress", [("method", "GET"), ("path", "/users")]).await {
//!     ExecutionOutcome::Aborted(reason) => return Err(reason.into()),
//!     _ => {}
//! }
//! ```
//!
//! ## Fail-open
//!
//! Nothing internal ever surfaces as an error from `invoke`. An unreachable
//! or slow control plane, a malformed response, an unknown impact kind or a
//! panicking custom behavior all yield [`ExecutionOutcome::NotApplied`] and a
//! `tracing` event. The only errors a host sees are [`ConfigError`]s while
//! building the client.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use faultline_core::*;

pub mod client;
pub mod error;
pub mod evaluator;
pub mod gateway;
pub mod impact;
pub mod stats;

pub use client::{ClientConfig, ClientSettings, FailureFlags, FailureFlagsBuilder, Identity};
pub use error::{ConfigError, ConfigurationError, GatewayError, GatewayResult};
pub use evaluator::{DEFAULT_GLOBAL_DEADLINE, Evaluation, Evaluator, FailOpen, select_experiment};
pub use gateway::{
    CachedGateway, Experiments, Gateway, HttpGateway, POOL_IDLE_TIMEOUT, POOL_MAX_IDLE_PER_HOST,
    StaticGateway, parse_experiments,
};
pub use impact::{CallbackImpact, ImpactBehavior, ImpactContext, ImpactRegistry};
pub use stats::{InvocationStats, StatsSnapshot};
