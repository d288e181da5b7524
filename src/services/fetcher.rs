// src/services/fetcher.rs

//! Single-request HTTP fetch with bounded retry.
//!
//! The transport is a trait seam so the retry and decoding logic can be
//! exercised against a scripted fake; production uses the reqwest-backed
//! [`HttpTransport`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{CollectorConfig, HttpMethod};

/// Retries after the initial attempt on a transient failure.
const RETRY_LIMIT: u32 = 3;

/// Fixed delay between attempts.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One HTTP request, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct ApiRequest<'a> {
    pub url: &'a str,
    pub method: HttpMethod,
    pub query: &'a [(String, String)],
    pub headers: &'a BTreeMap<String, String>,
    pub body: Option<&'a Value>,
}

/// Raw response produced by a transport, before decoding.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Decoded successful response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// View the payload as a JSON value; text payloads become JSON strings.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(v) => v,
            Payload::Text(s) => Value::String(s),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Text(_) => None,
        }
    }
}

/// Executes one HTTP exchange. Transport errors are treated as transient.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest<'_>) -> Result<RawResponse>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a configured transport with user agent and per-request timeout.
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(&self, request: ApiRequest<'_>) -> Result<RawResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url),
            HttpMethod::Post => self.client.post(request.url),
            HttpMethod::Put => self.client.put(request.url),
            HttpMethod::Delete => self.client.delete(request.url),
        };

        if request.method.sends_body() {
            let empty = Value::Object(serde_json::Map::new());
            builder = builder.json(request.body.unwrap_or(&empty));
        } else if !request.query.is_empty() {
            builder = builder.query(request.query);
        }

        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// HTTP fetch primitive with bounded retry on transient failure.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn ApiTransport>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// Build a fetcher over a real HTTP client.
    pub fn over_http(config: &CollectorConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Perform one HTTP call.
    ///
    /// - 200 with a JSON content type decodes to [`Payload::Json`]; any other
    ///   200 returns the raw body as [`Payload::Text`].
    /// - 429 and transport errors are transient: retried up to [`RETRY_LIMIT`]
    ///   times with a fixed delay, then surfaced as [`AppError::Transient`].
    /// - Any other status logs the failure and returns `Ok(None)`; callers
    ///   treat "no data" as a valid, non-fatal outcome.
    pub async fn fetch(
        &self,
        url: &str,
        method: HttpMethod,
        query: &[(String, String)],
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    ) -> Result<Option<Payload>> {
        let request = ApiRequest {
            url,
            method,
            query,
            headers,
            body,
        };

        for attempt in 0..=RETRY_LIMIT {
            log::info!(
                "Fetching {url} with method {method}, params {query:?} (attempt {}/{})",
                attempt + 1,
                RETRY_LIMIT + 1
            );

            match self.transport.execute(request).await {
                Ok(response) if response.status == 200 => {
                    return Ok(Some(decode(url, response)?));
                }
                Ok(response) if response.status == 429 => {
                    log::warn!("Rate limit exceeded for {url}, retrying...");
                }
                Ok(response) => {
                    log::error!(
                        "Failed request to {url}: {} - {}",
                        response.status,
                        response.body
                    );
                    return Ok(None);
                }
                Err(error) => {
                    log::warn!("Request to {url} failed: {error}, retrying...");
                }
            }

            if attempt < RETRY_LIMIT {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(AppError::Transient {
            url: url.to_string(),
            attempts: RETRY_LIMIT + 1,
        })
    }
}

fn decode(url: &str, response: RawResponse) -> Result<Payload> {
    let is_json = response
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("application/json"));

    if is_json && !response.body.is_empty() {
        log::debug!("Successful JSON response from {url}");
        Ok(Payload::Json(serde_json::from_str(&response.body)?))
    } else {
        log::debug!("Successful non-JSON response from {url}");
        Ok(Payload::Text(response.body))
    }
}
