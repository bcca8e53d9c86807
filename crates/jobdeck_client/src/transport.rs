use std::time::Duration;

use jobdeck_core::{ApiError, ListParams, TransportFailure};
use jobdeck_logging::jobdeck_debug;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Service root every endpoint is resolved against, e.g.
    /// `https://media.example.com/api/admin`.
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/admin".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(6),
        }
    }
}

/// Request function shared by jobs and lists. Implementations unwrap the
/// `{code, msg, data}` envelope and hand back `data`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, endpoint: &str, query: &ListParams) -> Result<Value, ApiError>;

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: TransportSettings,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::transport(TransportFailure::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn url(&self, endpoint: &str, query: &ListParams) -> Result<Url, ApiError> {
        let base = self.settings.base_url.trim_end_matches('/');
        let raw = format!("{base}/{}", endpoint.trim_start_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|err| ApiError::transport(TransportFailure::InvalidUrl, err.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let request = match &self.settings.token {
            Some(token) => request.header(AUTHORIZATION, token.as_str()),
            None => request,
        };
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::transport(
                TransportFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        decode_envelope(&bytes)
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, endpoint: &str, query: &ListParams) -> Result<Value, ApiError> {
        let url = self.url(endpoint, query)?;
        jobdeck_debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.url(endpoint, &ListParams::new())?;
        jobdeck_debug!("POST {}", url);
        let payload = serde_json::to_vec(body)
            .map_err(|err| ApiError::Validation(format!("request body: {err}")))?;
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        self.send(request).await
    }
}

#[derive(Deserialize)]
struct Envelope {
    code: Value,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Unwraps `{code, msg, data}`. Only a numeric `0` counts as success.
pub fn decode_envelope(bytes: &[u8]) -> Result<Value, ApiError> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|err| ApiError::malformed(format!("response envelope: {err}")))?;
    let ok = envelope.code.as_i64() == Some(0) || envelope.code.as_f64() == Some(0.0);
    if !ok {
        let code = match &envelope.code {
            Value::String(code) => code.clone(),
            other => other.to_string(),
        };
        return Err(ApiError::protocol(code, envelope.msg));
    }
    Ok(envelope.data)
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::transport(TransportFailure::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ApiError::transport(TransportFailure::InvalidUrl, err.to_string());
    }
    ApiError::transport(TransportFailure::Network, err.to_string())
}
