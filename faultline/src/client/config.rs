//! Client configuration.
//!
//! Supplied once when the client is built and immutable afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use hyper::Uri;
use hyper::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::evaluator::DEFAULT_GLOBAL_DEADLINE;

/// Default control-plane endpoint (local sidecar agent).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5032/experiment";

/// Default bound on one control-plane round trip.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_millis(100);

/// Environment variable toggling the client (`true`/`false`, `1`/`0`, ...).
pub const ENV_ENABLED: &str = "FAILURE_FLAGS_ENABLED";
/// Environment variable overriding the endpoint.
pub const ENV_ENDPOINT: &str = "FAILURE_FLAGS_ENDPOINT";
/// Environment variable overriding the gateway timeout, in milliseconds.
pub const ENV_GATEWAY_TIMEOUT_MS: &str = "FAILURE_FLAGS_GATEWAY_TIMEOUT_MS";
/// Environment variable overriding the global deadline, in milliseconds.
pub const ENV_DEADLINE_MS: &str = "FAILURE_FLAGS_DEADLINE_MS";
/// Environment variable enabling the response cache, TTL in milliseconds.
pub const ENV_CACHE_TTL_MS: &str = "FAILURE_FLAGS_CACHE_TTL_MS";

/// Opaque credentials sent with every control-plane request.
///
/// Values are never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Identity {
    headers: BTreeMap<String, String>,
}

impl Identity {
    /// No credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::anonymous().with_header(AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
    }

    /// Add an arbitrary header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Whether no credentials are configured.
    pub fn is_anonymous(&self) -> bool {
        self.headers.is_empty()
    }

    /// Validate and convert into HTTP headers.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidHeader`] if a name or value is not valid HTTP.
    pub fn to_header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let mut header_value =
                HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            header_value.set_sensitive(true);
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Identity
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::anonymous(), |identity, (k, v)| identity.with_header(k, v))
    }
}

/// Configuration for a failure-flag client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Control-plane endpoint (absolute `http`/`https` URI)
    pub endpoint: String,

    /// Kill switch; when false `invoke` never touches the network
    pub enabled: bool,

    /// Bound on one control-plane round trip
    pub gateway_timeout: Duration,

    /// Outer bound on a whole evaluation, lookup plus impact
    pub global_deadline: Duration,

    /// Credentials sent to the control plane
    pub identity: Identity,

    /// Cache control-plane answers per flag name for this long.
    /// None disables the cache.
    pub cache_ttl: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            enabled: true,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            global_deadline: DEFAULT_GLOBAL_DEADLINE,
            identity: Identity::anonymous(),
            cache_ttl: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Configuration with the kill switch off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Defaults overridden by `FAILURE_FLAGS_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_ENABLED) {
            config.enabled = parse_bool(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_ENDPOINT) {
            config.endpoint = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_GATEWAY_TIMEOUT_MS) {
            config.gateway_timeout = parse_millis(ENV_GATEWAY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_DEADLINE_MS) {
            config.global_deadline = parse_millis(ENV_DEADLINE_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_CACHE_TTL_MS) {
            let ttl = parse_millis(ENV_CACHE_TTL_MS, &value)?;
            config.cache_ttl = (!ttl.is_zero()).then_some(ttl);
        }

        Ok(config)
    }

    /// Check the configuration and parse the endpoint.
    ///
    /// # Errors
    ///
    /// Rejects a relative or non-http(s) endpoint and zero timeouts.
    pub fn validate(&self) -> Result<Uri, ConfigError> {
        if self.gateway_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("gateway timeout"));
        }
        if self.global_deadline.is_zero() {
            return Err(ConfigError::ZeroDuration("global deadline"));
        }
        if matches!(self.cache_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(ConfigError::ZeroDuration("cache ttl"));
        }

        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        };
        let uri: Uri = self
            .endpoint
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| invalid(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(_) => return Err(invalid("scheme must be http or https")),
            None => return Err(invalid("endpoint must be an absolute URI")),
        }
        if uri.authority().is_none() {
            return Err(invalid("endpoint has no host"));
        }

        Ok(uri)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}

/// Serializable form of [`ClientConfig`], using the camelCase field names of
/// the embedding surface (`gatewayTimeoutMs`, `globalDeadlineMs`, ...).
///
/// Missing fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Control-plane endpoint.
    pub endpoint: Option<String>,
    /// Kill switch.
    pub enabled: Option<bool>,
    /// Gateway timeout in milliseconds.
    pub gateway_timeout_ms: Option<u64>,
    /// Global deadline in milliseconds.
    pub global_deadline_ms: Option<u64>,
    /// Cache TTL in milliseconds; absent or zero disables the cache.
    pub cache_ttl_ms: Option<u64>,
    /// Identity headers.
    pub identity: BTreeMap<String, String>,
}

impl From<ClientSettings> for ClientConfig {
    fn from(settings: ClientSettings) -> Self {
        let defaults = ClientConfig::default();
        ClientConfig {
            endpoint: settings.endpoint.unwrap_or(defaults.endpoint),
            enabled: settings.enabled.unwrap_or(defaults.enabled),
            gateway_timeout: settings
                .gateway_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_timeout),
            global_deadline: settings
                .global_deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_deadline),
            identity: settings.identity.into_iter().collect(),
            cache_ttl: settings
                .cache_ttl_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.enabled);
        assert_eq!(config.gateway_timeout, Duration::from_millis(100));
        assert_eq!(config.global_deadline, Duration::from_millis(1000));
        assert_eq!(config.cache_ttl, None);
        assert!(config.identity.is_anonymous());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(ClientConfig::new("https://flags.internal:8443/v1/lookup")
            .validate()
            .is_ok());

        for endpoint in ["/relative", "ftp://host/x", "not a uri", ""] {
            assert!(
                matches!(
                    ClientConfig::new(endpoint).validate(),
                    Err(ConfigError::InvalidEndpoint { .. })
                ),
                "endpoint {:?} should be rejected",
                endpoint
            );
        }
    }

    #[test]
    fn test_validate_durations() {
        let config = ClientConfig {
            gateway_timeout: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("gateway timeout"))
        );

        let config = ClientConfig {
            cache_ttl: Some(Duration::ZERO),
            ..ClientConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("cache ttl")));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_ENABLED, "off"),
            (ENV_ENDPOINT, " http://127.0.0.1:9000/experiment "),
            (ENV_GATEWAY_TIMEOUT_MS, "50"),
            (ENV_DEADLINE_MS, "250"),
            (ENV_CACHE_TTL_MS, "2000"),
        ]
        .into_iter()
        .collect();

        let config =
            ClientConfig::from_lookup(|var| vars.get(var).map(|v| v.to_string())).expect("valid");

        assert!(!config.enabled);
        assert_eq!(config.endpoint, "http://127.0.0.1:9000/experiment");
        assert_eq!(config.gateway_timeout, Duration::from_millis(50));
        assert_eq!(config.global_deadline, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = ClientConfig::from_lookup(|var| {
            (var == ENV_GATEWAY_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert_eq!(
            result,
            Err(ConfigError::InvalidEnv {
                var: ENV_GATEWAY_TIMEOUT_MS,
                value: "soon".to_string(),
            })
        );

        let result =
            ClientConfig::from_lookup(|var| (var == ENV_ENABLED).then(|| "maybe".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { var: ENV_ENABLED, .. })));
    }

    #[test]
    fn test_settings_surface() {
        let settings: ClientSettings = serde_json::from_str(
            r#"{
                "endpoint": "http://control-plane:5032/experiment",
                "enabled": true,
                "gatewayTimeoutMs": 80,
                "globalDeadlineMs": 600,
                "identity": {"Authorization": "Bearer abc", "X-Team-Id": "payments"}
            }"#,
        )
        .expect("valid settings");

        let config = ClientConfig::from(settings);
        assert_eq!(config.endpoint, "http://control-plane:5032/experiment");
        assert_eq!(config.gateway_timeout, Duration::from_millis(80));
        assert_eq!(config.global_deadline, Duration::from_millis(600));
        assert_eq!(config.cache_ttl, None);

        let headers = config.identity.to_header_map().expect("valid headers");
        assert_eq!(headers.get("authorization").map(|v| v.as_bytes()), Some(&b"Bearer abc"[..]));
        assert_eq!(headers.get("x-team-id").map(|v| v.as_bytes()), Some(&b"payments"[..]));
    }

    #[test]
    fn test_settings_defaults() {
        let config = ClientConfig::from(ClientSettings::default());
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_identity_debug_redacts_values() {
        let identity = Identity::bearer("s3cr3t");
        let rendered = format!("{:?}", identity);
        assert!(rendered.contains("authorization"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_identity_rejects_invalid_header() {
        let identity = Identity::anonymous().with_header("bad header", "x");
        assert!(matches!(
            identity.to_header_map(),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }
}
