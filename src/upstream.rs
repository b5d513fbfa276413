use crate::config::EndpointsConfig;
use crate::model::{AggregateResult, OutboundRecord};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("cannot decode response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
    #[error("cannot encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Status and body of a POST, whatever the status was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub body: String,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP collaborators of a polling cycle.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    endpoints: EndpointsConfig,
}

impl Upstream {
    pub fn new(client: Client, endpoints: EndpointsConfig) -> Self {
        Self { client, endpoints }
    }

    pub async fn fetch_inventory(&self) -> Result<Value, UpstreamError> {
        self.get_json(&self.endpoints.inventory_url).await
    }

    pub async fn fetch_hardware(&self) -> Result<Value, UpstreamError> {
        self.get_json(&self.endpoints.hardware_url).await
    }

    /// Posts the raw aggregate as pretty-printed JSON.
    pub async fn post_aggregate(&self, aggregate: &AggregateResult) -> Result<Delivery, UpstreamError> {
        let body = serde_json::to_vec_pretty(aggregate)?;
        let url = self.endpoints.aggregate_url.as_str();
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| UpstreamError::Request {
                url: url.to_string(),
                source,
            })?;
        Ok(delivery(resp).await)
    }

    /// `Some(url)` only when the discovery source reports `is_enabled == "1"`.
    pub async fn discover_endpoint(&self) -> Result<Option<String>, UpstreamError> {
        let body = self.get_json(&self.endpoints.endpoint_discovery_url).await?;
        Ok(endpoint_from_discovery(&body))
    }

    pub async fn post_record(&self, url: &str, record: &OutboundRecord) -> Result<Delivery, UpstreamError> {
        let resp = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|source| UpstreamError::Request {
                url: url.to_string(),
                source,
            })?;
        Ok(delivery(resp).await)
    }

    async fn get_json(&self, url: &str) -> Result<Value, UpstreamError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| UpstreamError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status,
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|source| UpstreamError::Decode {
                url: url.to_string(),
                source,
            })
    }
}

async fn delivery(resp: reqwest::Response) -> Delivery {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Delivery { status, body }
}

pub fn endpoint_from_discovery(body: &Value) -> Option<String> {
    let enabled = body.get("is_enabled").and_then(Value::as_str) == Some("1");
    if !enabled {
        return None;
    }
    body.get("api_endpoint")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
