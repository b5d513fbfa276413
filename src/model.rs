use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_SNMP_PORT: u16 = 161;

/// Connection details of one inventory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub address: String,
    pub port: u16,
    pub community: String,
    /// Serialized JSON object of metric name to OID, decoded per poll.
    pub identifier_map_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("device record is not an object")]
    NotAnObject,
    #[error("field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("identifier map is not valid JSON: {0}")]
    IdentifierJson(String),
    #[error("identifier map must be a JSON object")]
    IdentifierNotAnObject,
    #[error("metric '{name}' has an invalid OID '{oid}'")]
    InvalidOid { name: String, oid: String },
}

impl DeviceConfig {
    /// Decodes an inventory entry (`ip`, `port`, `community_string`, `oids`).
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let record = value.as_object().ok_or(DecodeError::NotAnObject)?;

        let address = match record.get("ip") {
            Some(Value::String(ip)) if !ip.trim().is_empty() => ip.trim().to_string(),
            Some(Value::String(_)) => {
                return Err(DecodeError::InvalidField {
                    field: "ip",
                    reason: "must not be empty".to_string(),
                })
            }
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: "ip",
                    reason: "must be a string".to_string(),
                })
            }
            None => return Err(DecodeError::MissingField("ip")),
        };

        let port = match record.get("port") {
            None | Some(Value::Null) => DEFAULT_SNMP_PORT,
            Some(raw) => decode_port(raw)?,
        };

        let community = match record.get("community_string") {
            Some(Value::String(community)) => community.clone(),
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: "community_string",
                    reason: "must be a string".to_string(),
                })
            }
            None => return Err(DecodeError::MissingField("community_string")),
        };

        let identifier_map_source = match record.get("oids") {
            Some(Value::String(oids)) => oids.clone(),
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: "oids",
                    reason: "must be a serialized JSON string".to_string(),
                })
            }
            None => return Err(DecodeError::MissingField("oids")),
        };

        Ok(Self {
            address,
            port,
            community,
            identifier_map_source,
        })
    }
}

fn decode_port(raw: &Value) -> Result<u16, DecodeError> {
    let parsed = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(port) if (1..=u64::from(u16::MAX)).contains(&port) => Ok(port as u16),
        _ => Err(DecodeError::InvalidField {
            field: "port",
            reason: format!("expected an integer in 1..65535, got {raw}"),
        }),
    }
}

/// Short name of a JSON value's type, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ordered metric name to OID pairs of a single device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    entries: Vec<(String, String)>,
}

impl IdentifierMap {
    pub fn decode(source: &str) -> Result<Self, DecodeError> {
        let parsed: Value = serde_json::from_str(source)
            .map_err(|err| DecodeError::IdentifierJson(err.to_string()))?;
        let Value::Object(map) = parsed else {
            return Err(DecodeError::IdentifierNotAnObject);
        };

        let mut entries = Vec::with_capacity(map.len());
        for (name, oid) in map {
            let oid = match oid {
                Value::String(oid) if oid_arcs(&oid).is_some() => oid.trim().to_string(),
                other => {
                    let oid = match other {
                        Value::String(s) => s,
                        v => v.to_string(),
                    };
                    return Err(DecodeError::InvalidOid { name, oid });
                }
            };
            entries.push((name, oid));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.entries.iter().map(|(_, oid)| oid.clone()).collect()
    }
}

/// Splits a dotted OID into its arcs. A leading dot is accepted.
pub fn oid_arcs(oid: &str) -> Option<Vec<u64>> {
    let trimmed = oid.trim();
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    let arcs = trimmed
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if arcs.len() < 2 {
        return None;
    }
    Some(arcs)
}

/// Metric name to value for one device; `None` marks an absent value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricResult {
    entries: Vec<(String, Option<String>)>,
}

impl MetricResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a result from parallel name/value sequences.
    pub fn zip(names: Vec<String>, values: Vec<Option<String>>) -> Self {
        let mut out = Self::new();
        for (name, value) in names.into_iter().zip(values) {
            out.insert(name, value);
        }
        out
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// `None` if the metric was not requested, `Some(None)` if it is absent.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn absent_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_none()).count()
    }
}

impl Serialize for MetricResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Device name to metric result for one cycle, in inventory order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    devices: Vec<(String, MetricResult)>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: impl Into<String>, result: MetricResult) {
        let device = device.into();
        match self.devices.iter_mut().find(|(d, _)| *d == device) {
            Some(slot) => slot.1 = result,
            None => self.devices.push((device, result)),
        }
    }

    pub fn get(&self, device: &str) -> Option<&MetricResult> {
        self.devices
            .iter()
            .find(|(d, _)| d == device)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device_names(&self) -> Vec<&str> {
        self.devices.iter().map(|(d, _)| d.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricResult)> {
        self.devices.iter().map(|(d, r)| (d.as_str(), r))
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.devices.len()))?;
        for (device, result) in &self.devices {
            map.serialize_entry(device, result)?;
        }
        map.end()
    }
}

/// Hardware values fetched independently of the SNMP poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardwareSnapshot {
    pub identifier: Option<Value>,
    pub detail: String,
    pub raw_values: Vec<Value>,
}

/// Record posted to the discovered endpoint, one per cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRecord {
    #[serde(rename = "mac")]
    pub identifier: Option<Value>,
    pub detail: String,
}
