//! Flag descriptors: the name and request context of an injection checkpoint.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Request context labels attached to a checkpoint (method, route, tier, ...).
///
/// Ordered so the wire body is byte-for-byte stable for identical inputs.
pub type Labels = BTreeMap<String, String>;

/// Errors raised when a descriptor violates the caller contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    /// The checkpoint name was empty or only whitespace.
    #[error("failure flag name must not be empty")]
    EmptyName,
}

/// Immutable description of one checkpoint invocation.
///
/// Created fresh by the host for every call. Serializes to the control-plane
/// request body `{"name": ..., "labels": {...}}`; the `debug` switch is local
/// only and never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagDescriptor {
    name: String,
    labels: Labels,
    #[serde(skip)]
    debug: bool,
}

impl FlagDescriptor {
    /// Create a descriptor for the checkpoint `name` with the given labels.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::EmptyName`] if `name` is empty or whitespace.
    pub fn new<N, I, K, V>(name: N, labels: I) -> Result<Self, FlagError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FlagError::EmptyName);
        }

        Ok(Self {
            name,
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            debug: false,
        })
    }

    /// Create a descriptor with no labels.
    pub fn named(name: impl Into<String>) -> Result<Self, FlagError> {
        Self::new(name, std::iter::empty::<(String, String)>())
    }

    /// Return a copy with one more label set (replacing any previous value).
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Enable verbose logging for every evaluation of this descriptor.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Checkpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request context labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Look up a single label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Whether per-flag verbose logging was requested.
    pub fn is_debug(&self) -> bool {
        self.debug
    }
}

impl fmt::Display for FlagDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.labels.is_empty() {
            let rendered: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{{{}}}", rendered.join(","))?;
        }
        Ok(())
    }
}
