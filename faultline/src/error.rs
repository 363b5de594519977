//! Error types for the failure-flag client.
//!
//! None of these ever reach the host through `invoke`: the evaluator turns
//! every one of them into [`ExecutionOutcome::NotApplied`](crate::ExecutionOutcome).
//! [`ConfigError`] is the exception, raised once while building the client.

use std::time::Duration;

use thiserror::Error;

/// Failures reaching or understanding the control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The round trip did not complete in time.
    #[error("control plane did not answer within {0:?}")]
    Timeout(Duration),

    /// Connection refused, reset, DNS failure or any other transport fault.
    #[error("transport error: {0}")]
    Transport(String),

    /// The control plane answered with a non-2xx status.
    #[error("control plane returned status {0}")]
    Status(u16),

    /// The response body was not a JSON array of experiments.
    #[error("malformed control plane response: {0}")]
    Malformed(String),

    /// The request body could not be encoded.
    #[error("failed to encode lookup request: {0}")]
    Encode(String),

    /// The refresh this lookup waited on finished without producing a value.
    #[error("shared refresh produced no cached value")]
    RefreshInFlight,

    /// The host cancelled the invocation.
    #[error("lookup cancelled by host")]
    Cancelled,
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Problems with experiments or impact behaviors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No behavior is registered for the experiment's impact kind.
    #[error("unknown impact kind '{0}'")]
    UnknownImpact(String),

    /// A behavior rejected its parameters.
    #[error("invalid parameter '{param}' for impact '{kind}': {reason}")]
    InvalidParam {
        /// Impact kind.
        kind: String,
        /// Offending parameter name.
        param: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An element of the control-plane response could not be parsed.
    #[error("malformed experiment at index {index}: {reason}")]
    MalformedExperiment {
        /// Position in the response array.
        index: usize,
        /// Parse failure.
        reason: String,
    },

    /// A host-registered behavior panicked.
    #[error("impact '{kind}' panicked: {message}")]
    BehaviorPanicked {
        /// Impact kind.
        kind: String,
        /// Panic payload, when it was a string.
        message: String,
    },
}

/// Invalid client configuration, reported by the builder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint is not an absolute http(s) URI.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Endpoint as supplied.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A timeout or deadline was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// An identity header name or value is not valid HTTP.
    #[error("invalid identity header '{name}': {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An environment variable held an unparsable value.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}
