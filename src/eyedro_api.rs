use crate::config::EyedroConfig;
use crate::device_response::{normalize, DeviceSnapshot, Envelope};
use crate::error::{TransportError, UpdateError};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, error};

const API_PATH_GETDATA: &str = "/getdata";

/// HTTP client for the Eyedro getdata endpoint. Single GET per call, no retries.
#[derive(Debug, Clone)]
pub struct EyedroAPI {
    base_url: String,
    client: reqwest::Client,
}

impl EyedroAPI {
    pub fn new(host: Ipv4Addr, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        Self::with_base_url(format!("http://{host}:{port}"), timeout)
    }

    pub fn from_config(config: &EyedroConfig) -> Result<Self, TransportError> {
        Self::new(config.host(), config.port(), config.timeout())
    }

    /// Points the client at an arbitrary base URL, e.g. a local mock server.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, API_PATH_GETDATA)
    }

    /// Fetches the raw JSON document without looking at its shape.
    pub async fn fetch_raw(&self) -> Result<serde_json::Value, TransportError> {
        let url = self.url();
        debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::from_request(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { url }
            } else {
                TransportError::Body(e)
            }
        })
    }

    pub async fn get_data(&self, envelope: Envelope) -> Result<DeviceSnapshot, UpdateError> {
        let raw = self.fetch_raw().await.map_err(|e| {
            error!("Error fetching data from Eyedro device: {e}");
            e
        })?;
        let snapshot = normalize(&raw, envelope).map_err(|e| {
            error!("Error parsing Eyedro API response: {e}");
            e
        })?;
        Ok(snapshot)
    }
}
