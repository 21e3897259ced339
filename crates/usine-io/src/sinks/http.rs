use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use usine_core::Reading;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Total request timeout in seconds.
    pub timeout: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            enabled: false,
            url: "http://localhost:8080/api/data".to_string(),
            headers,
            timeout: 10.0,
        }
    }
}

struct Endpoint {
    client: Client,
    url: Url,
}

/// POSTs every reading as a JSON record to a REST endpoint.
pub struct HttpSink {
    config: HttpConfig,
    endpoint: Option<Endpoint>,
}

impl HttpSink {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            endpoint: None,
        }
    }

    fn build_endpoint(&self) -> Result<Endpoint, SinkError> {
        let url = Url::parse(&self.config.url)
            .map_err(|e| SinkError::Initialize(format!("invalid url {:?}: {e}", self.config.url)))?;

        let timeout = Duration::try_from_secs_f64(self.config.timeout)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                SinkError::Initialize(format!(
                    "timeout must be a positive number of seconds, got {}",
                    self.config.timeout
                ))
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SinkError::Initialize(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SinkError::Initialize(format!("invalid header value for {name}: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SinkError::Initialize(e.to_string()))?;

        Ok(Endpoint { client, url })
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn initialize(&mut self) -> Result<(), SinkError> {
        let endpoint = self.build_endpoint()?;
        info!(url = %endpoint.url, timeout_s = self.config.timeout, "HTTP sink ready");
        self.endpoint = Some(endpoint);
        Ok(())
    }

    async fn send(&mut self, reading: &Reading) -> Result<(), SinkError> {
        let endpoint = self.endpoint.as_ref().ok_or(SinkError::NotInitialized)?;
        let response = endpoint
            .client
            .post(endpoint.url.clone())
            .json(reading)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::HttpStatus {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), "Reading posted");
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        // Dropping the client closes pooled connections.
        self.endpoint = None;
        Ok(())
    }
}
