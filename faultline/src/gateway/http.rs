//! HTTP control-plane gateway.
//!
//! One POST per lookup, body `{"name": ..., "labels": {...}}`, answer a JSON
//! array of experiments. The whole round trip (connect, send, read body) is
//! bounded by a single timeout and never retried: the call sits on the host's
//! request path.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use serde_json::Value;

use faultline_core::{Experiment, FlagDescriptor};

use super::{Experiments, Gateway};
use crate::error::{ConfigurationError, GatewayError, GatewayResult};

const APPLICATION_JSON: &str = "application/json";

/// Idle keep-alive connections to the control plane are closed after this.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Idle keep-alive connections kept per control-plane host.
pub const POOL_MAX_IDLE_PER_HOST: usize = 2;

/// Gateway speaking JSON over HTTP/1.1.
///
/// Plain `http://` endpoints work with the default [`HttpConnector`]. For
/// TLS, build the gateway with [`HttpGateway::with_connector`] and an HTTPS
/// connector.
///
/// Connections are reused while traffic is steady. At most
/// [`POOL_MAX_IDLE_PER_HOST`] stay open between lookups, and each is closed
/// (its connection task ending) once idle for [`POOL_IDLE_TIMEOUT`].
#[derive(Debug, Clone)]
pub struct HttpGateway<C = HttpConnector> {
    client: Client<C, Full<Bytes>>,
    endpoint: Uri,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpGateway<HttpConnector> {
    /// Create a gateway for `endpoint` with the given identity headers.
    ///
    /// The connect timeout is set to `timeout` as well so a black-holed
    /// control plane cannot hold the caller past the request budget.
    pub fn new(endpoint: Uri, headers: HeaderMap, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);
        Self::with_connector(connector, endpoint, headers, timeout)
    }
}

impl<C> HttpGateway<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Create a gateway using a custom connector (TLS, proxies, ...).
    pub fn with_connector(
        connector: C,
        endpoint: Uri,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build(connector);
        Self {
            client,
            endpoint,
            headers,
            timeout,
        }
    }

    /// Configured endpoint.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Per-lookup timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn round_trip(&self, flag: &FlagDescriptor) -> GatewayResult<Bytes> {
        let body = serde_json::to_vec(flag).map_err(|e| GatewayError::Encode(e.to_string()))?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
            .header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON))
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| GatewayError::Encode(e.to_string()))?;
        request.headers_mut().extend(self.headers.clone());

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Bytes::new());
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .to_bytes();
        Ok(body)
    }
}

#[async_trait]
impl<C> Gateway for HttpGateway<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn lookup(&self, flag: &FlagDescriptor) -> GatewayResult<Experiments> {
        tracing::debug!(flag = %flag.name(), endpoint = %self.endpoint, "HttpGateway::lookup");

        let body = tokio::time::timeout(self.timeout, self.round_trip(flag))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))??;

        parse_experiments(&body)
    }
}

/// Parse a control-plane response body.
///
/// An empty body means "nothing active". Anything other than a JSON array is
/// [`GatewayError::Malformed`]. Array elements that are not valid experiments
/// are dropped and logged; the remaining ones keep their order.
pub fn parse_experiments(body: &[u8]) -> GatewayResult<Experiments> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new().into());
    }

    let values: Vec<Value> =
        serde_json::from_slice(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let experiments: Vec<Experiment> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<Experiment>(value) {
            Ok(experiment) => Some(experiment),
            Err(e) => {
                let error = ConfigurationError::MalformedExperiment {
                    index,
                    reason: e.to_string(),
                };
                tracing::warn!(%error, "dropping experiment from control plane response");
                None
            }
        })
        .collect();

    Ok(experiments.into())
}
