use crate::metrics::Metrics;
use crate::model::oid_arcs;
use async_trait::async_trait;
use snmp2::{AsyncSession, Oid, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::warn;

/// Batched metric retrieval from one device.
#[async_trait]
pub trait MetricFetcher: Send + Sync {
    /// Returns one entry per identifier, same order. Never partially fills
    /// a batch: on any failure every entry is `None`.
    async fn fetch_metrics(
        &self,
        address: &str,
        port: u16,
        community: &str,
        identifiers: &[String],
    ) -> Vec<Option<String>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),
    #[error("error-status {status} at index {index}")]
    Status { status: u32, index: u32 },
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn class(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Other(_) => "other",
        }
    }
}

/// SNMP v2c GET over UDP.
#[derive(Clone)]
pub struct SnmpFetcher {
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl SnmpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            metrics: None,
        }
    }

    /// Counts failed batches per class in `relay_fetch_errors_total`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn try_fetch(
        &self,
        address: &str,
        port: u16,
        community: &str,
        identifiers: &[String],
    ) -> Result<Vec<Option<String>>, FetchError> {
        let oids = identifiers
            .iter()
            .map(|id| parse_oid(id))
            .collect::<Result<Vec<_>, _>>()?;
        let target = format!("{address}:{port}");

        let mut session = time::timeout(
            self.timeout,
            AsyncSession::new_v2c(target.as_str(), community.as_bytes(), 0),
        )
        .await
        .map_err(|_| FetchError::Transport("session setup timed out".to_string()))?
        .map_err(|err| FetchError::Transport(format!("session setup failed: {err}")))?;

        let refs: Vec<&Oid<'_>> = oids.iter().collect();
        let pdu = time::timeout(self.timeout, session.get_many(&refs))
            .await
            .map_err(|_| FetchError::Transport("request timed out".to_string()))?
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        if pdu.error_status != 0 {
            return Err(FetchError::Status {
                status: pdu.error_status,
                index: pdu.error_index,
            });
        }

        let values: Vec<Option<String>> = pdu
            .varbinds
            .into_iter()
            .map(|(_, value)| render_value(&value))
            .collect();
        if values.len() != identifiers.len() {
            return Err(FetchError::Other(format!(
                "expected {} varbinds, got {}",
                identifiers.len(),
                values.len()
            )));
        }
        Ok(values)
    }
}

#[async_trait]
impl MetricFetcher for SnmpFetcher {
    async fn fetch_metrics(
        &self,
        address: &str,
        port: u16,
        community: &str,
        identifiers: &[String],
    ) -> Vec<Option<String>> {
        match self.try_fetch(address, port, community, identifiers).await {
            Ok(values) => values,
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_fetch_error(err.class());
                }
                log_fetch_error(address, port, identifiers, &err);
                vec![None; identifiers.len()]
            }
        }
    }
}

fn log_fetch_error(address: &str, port: u16, identifiers: &[String], err: &FetchError) {
    match err {
        FetchError::Transport(reason) => {
            warn!(address = %address, port, class = err.class(), error = %reason, "snmp error indication");
        }
        FetchError::Status { status, index } => {
            let oid = (*index as usize)
                .checked_sub(1)
                .and_then(|i| identifiers.get(i))
                .map(String::as_str)
                .unwrap_or("?");
            warn!(
                address = %address,
                port,
                class = err.class(),
                status = *status,
                index = *index,
                oid = %oid,
                "snmp error status"
            );
        }
        FetchError::Other(reason) => {
            warn!(address = %address, port, class = err.class(), error = %reason, "snmp get failed");
        }
    }
}

pub fn parse_oid(s: &str) -> Result<Oid<'static>, FetchError> {
    let arcs = oid_arcs(s).ok_or_else(|| FetchError::Other(format!("invalid OID: {s}")))?;
    Oid::from(&arcs).map_err(|err| FetchError::Other(format!("invalid OID {s}: {err:?}")))
}

/// Text form of a varbind value; `None` for the "no value" exceptions.
pub fn render_value(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Integer(v) => Some(v.to_string()),
        Value::Counter32(v) | Value::Unsigned32(v) | Value::Timeticks(v) => Some(v.to_string()),
        Value::Counter64(v) => Some(v.to_string()),
        Value::Boolean(v) => Some(v.to_string()),
        Value::OctetString(bytes) | Value::Opaque(bytes) => Some(render_octets(bytes)),
        Value::ObjectIdentifier(oid) => Some(oid.to_string()),
        Value::IpAddress(ip) => Some(Ipv4Addr::from(*ip).to_string()),
        Value::Null | Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView => None,
        other => Some(format!("{other:?}")),
    }
}

/// Printable text as-is, anything else as `0x` hex.
pub fn render_octets(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c.is_whitespace()) => {
            text.to_string()
        }
        _ => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("0x");
            for b in bytes {
                out.push_str(&format!("{b:02x}"));
            }
            out
        }
    }
}
