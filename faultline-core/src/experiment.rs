//! Experiment snapshots issued by the control plane.
//!
//! An [`Experiment`] is parsed once from the control-plane response and never
//! mutated afterwards. Validation happens during deserialization: the rate is
//! clamped into `[0, 1]`, while a missing kind or a non-finite rate rejects the
//! experiment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::flag::{FlagDescriptor, Labels};

/// Selector value matching any label value (the key must still be present).
pub const WILDCARD: &str = "*";

/// Reasons an experiment from the control plane is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExperimentError {
    /// The experiment did not name an impact kind.
    #[error("experiment '{id}' has an empty impact_kind")]
    MissingImpactKind {
        /// Experiment identifier.
        id: String,
    },

    /// The rate was NaN or infinite.
    #[error("experiment '{id}' has a non-finite rate")]
    InvalidRate {
        /// Experiment identifier.
        id: String,
    },
}

/// One selector clause: an exact value, a wildcard, or a set of alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matcher {
    /// A single value; [`WILDCARD`] matches anything.
    One(String),
    /// Any of the listed values; [`WILDCARD`] entries match anything.
    AnyOf(Vec<String>),
}

impl Matcher {
    /// Whether `value` satisfies this clause.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::One(expected) => expected == WILDCARD || expected == value,
            Matcher::AnyOf(options) => options.iter().any(|o| o == WILDCARD || o == value),
        }
    }
}

/// Predicate over request labels.
///
/// Every key must be present on the descriptor and its value must satisfy
/// the clause. An empty selector matches every descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(BTreeMap<String, Matcher>);

impl Selector {
    /// Selector that matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Add an exact-match (or wildcard) clause.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Matcher::One(value.into()));
        self
    }

    /// Add an any-of clause.
    pub fn with_any_of<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.0.insert(key.into(), Matcher::AnyOf(values));
        self
    }

    /// Whether the labels satisfy every clause.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.iter().all(|(key, matcher)| {
            labels
                .get(key)
                .is_some_and(|value| matcher.matches(value))
        })
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the selector has no clauses.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Free-form parameters handed to an impact behavior (`{"latencyMs": 500}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImpactParams(Map<String, Value>);

impl ImpactParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Non-negative integer value for `key`.
    ///
    /// Integral floats (`500.0`) are accepted; fractional and negative numbers
    /// are not.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let value = self.0.get(key)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
    }

    /// Whether no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ImpactParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Deserialize)]
struct RawExperiment {
    id: String,
    impact_kind: String,
    #[serde(default)]
    impact_params: ImpactParams,
    rate: f64,
    #[serde(default)]
    selector: Selector,
}

/// A single active disruption as described by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExperiment")]
pub struct Experiment {
    id: String,
    impact_kind: String,
    impact_params: ImpactParams,
    rate: f64,
    selector: Selector,
}

impl TryFrom<RawExperiment> for Experiment {
    type Error = ExperimentError;

    fn try_from(raw: RawExperiment) -> Result<Self, Self::Error> {
        Experiment::new(
            raw.id,
            raw.impact_kind,
            raw.impact_params,
            raw.rate,
            raw.selector,
        )
    }
}

impl Experiment {
    /// Build a validated experiment. The rate is clamped into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Fails if `impact_kind` is empty or `rate` is not finite.
    pub fn new(
        id: impl Into<String>,
        impact_kind: impl Into<String>,
        impact_params: ImpactParams,
        rate: f64,
        selector: Selector,
    ) -> Result<Self, ExperimentError> {
        let id = id.into();
        let impact_kind = impact_kind.into();
        if impact_kind.trim().is_empty() {
            return Err(ExperimentError::MissingImpactKind { id });
        }
        if !rate.is_finite() {
            return Err(ExperimentError::InvalidRate { id });
        }

        Ok(Self {
            id,
            impact_kind,
            impact_params,
            rate: rate.clamp(0.0, 1.0),
            selector,
        })
    }

    /// Opaque identifier of this run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registered behavior to execute.
    pub fn impact_kind(&self) -> &str {
        &self.impact_kind
    }

    /// Parameters for the behavior.
    pub fn impact_params(&self) -> &ImpactParams {
        &self.impact_params
    }

    /// Firing probability, always within `[0, 1]`.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Label predicate.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Whether the selector accepts the descriptor's labels.
    pub fn matches(&self, flag: &FlagDescriptor) -> bool {
        self.selector.matches(flag.labels())
    }

    /// Whether the experiment fires for `flag` given a uniform `draw` in `[0, 1)`.
    ///
    /// Pure: identical arguments always give the same answer. A rate of `0.0`
    /// never fires and a rate of `1.0` fires for every draw below one.
    pub fn selects(&self, flag: &FlagDescriptor, draw: f64) -> bool {
        self.matches(flag) && draw < self.rate
    }
}
