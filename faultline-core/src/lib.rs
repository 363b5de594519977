//! # faultline-core
//!
//! Core abstractions for the faultline failure-flag client.
//!
//! This crate holds the pieces that never touch the network:
//!
//! - **Data model**: [`FlagDescriptor`], [`Experiment`], [`Selector`],
//!   [`ImpactParams`] and the tri-state [`ExecutionOutcome`]
//! - **Provider traits**: [`RandomProvider`] with production, seeded and
//!   scripted implementations so rate selection can be replayed in tests
//!
//! ## Selection
//!
//! Whether an experiment fires for an invocation is a pure function of the
//! descriptor, the experiment and one uniform draw in `[0, 1)`:
//!
//! ```rust
//! use faultline_core::{Experiment, FlagDescriptor};
//!
//! let flag = FlagDescriptor::new("http-ingress", [("method", "GET")]).unwrap();
//! let experiment: Experiment = serde_json::from_str(
//!     r#"{"id":"exp-1","impact_kind":"latency","impact_params":{"latencyMs":50},
//!        "rate":0.5,"selector":{"method":"GET"}}"#,
//! ).unwrap();
//!
//! assert!(experiment.selects(&flag, 0.25));
//! assert!(!experiment.selects(&flag, 0.75));
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod experiment;
mod flag;
mod outcome;
mod random;

// Data model exports
pub use experiment::{Experiment, ExperimentError, ImpactParams, Matcher, Selector, WILDCARD};
pub use flag::{FlagDescriptor, FlagError, Labels};
pub use outcome::{AbortReason, AbortedOutcome, ExecutionOutcome};

// Provider trait exports
pub use random::{
    RandomProvider, ScriptedRandomProvider, SeededRandomProvider, ThreadRandomProvider,
};
