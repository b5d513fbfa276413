//! Legacy detail-string encoding.
//!
//! ```text
//! record  := segment ( "||" segment )*
//! segment := name ":" value
//! value   := item ( "_" item )* | raw | ""
//! ```
//!
//! Metric names are dropped, only values survive, in insertion order.

use crate::model::{json_kind, AggregateResult, HardwareSnapshot, MetricResult, OutboundRecord};
use serde_json::Value;
use thiserror::Error;

pub const SEGMENT_SEPARATOR: &str = "||";
pub const VALUE_SEPARATOR: &str = "_";

/// Value side of a `name:value` segment.
pub trait DetailValue {
    fn detail_value(&self) -> String;
}

impl DetailValue for MetricResult {
    fn detail_value(&self) -> String {
        self.iter()
            .map(|(_, value)| value.unwrap_or_default())
            .collect::<Vec<_>>()
            .join(VALUE_SEPARATOR)
    }
}

impl DetailValue for str {
    fn detail_value(&self) -> String {
        self.to_string()
    }
}

impl DetailValue for String {
    fn detail_value(&self) -> String {
        self.clone()
    }
}

pub fn flatten<'a, V, I>(segments: I) -> String
where
    V: DetailValue + ?Sized + 'a,
    I: IntoIterator<Item = (&'a str, &'a V)>,
{
    segments
        .into_iter()
        .map(|(name, value)| format!("{name}:{}", value.detail_value()))
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}

impl AggregateResult {
    pub fn flatten(&self) -> String {
        flatten(self.iter())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("hardware snapshot has unexpected shape: {0}")]
    Shape(String),
}

impl HardwareSnapshot {
    /// Decodes the `full_data` object of a hardware response body.
    ///
    /// Missing keys decode to empty parts, keys of the wrong type are an error.
    pub fn from_body(body: &Value) -> Result<Self, MergeError> {
        let root = match body {
            Value::Object(root) => root,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(MergeError::Shape(format!(
                    "body must be an object, got {}",
                    json_kind(other)
                )))
            }
        };

        let full = match root.get("full_data") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(full)) => full,
            Some(other) => {
                return Err(MergeError::Shape(format!(
                    "full_data must be an object, got {}",
                    json_kind(other)
                )))
            }
        };

        let identifier = full.get("mac").filter(|v| !v.is_null()).cloned();

        let detail = match full.get("detail") {
            None => String::new(),
            Some(value) => render_scalar(value)
                .ok_or_else(|| MergeError::Shape("detail must be a scalar".to_string()))?,
        };

        let raw_values = match full.get("values") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => {
                if let Some(pos) = values.iter().position(|v| render_scalar(v).is_none()) {
                    return Err(MergeError::Shape(format!(
                        "values[{pos}] must be a scalar"
                    )));
                }
                values.clone()
            }
            Some(other) => {
                return Err(MergeError::Shape(format!(
                    "values must be an array, got {}",
                    json_kind(other)
                )))
            }
        };

        Ok(Self {
            identifier,
            detail,
            raw_values,
        })
    }
}

/// `flattened || snapshot detail || VALUE1_x||VALUE2_y...`
///
/// The identifier always comes from the snapshot.
pub fn merge(snapshot: Option<&HardwareSnapshot>, flattened: &str) -> OutboundRecord {
    let (identifier, detail, values) = match snapshot {
        Some(s) => (
            s.identifier.clone(),
            s.detail.as_str(),
            format_raw_values(&s.raw_values),
        ),
        None => (None, "", String::new()),
    };

    OutboundRecord {
        identifier,
        detail: [flattened, detail, values.as_str()].join(SEGMENT_SEPARATOR),
    }
}

/// Decodes a raw hardware body (if any) and merges it.
pub fn merge_body(body: Option<&Value>, flattened: &str) -> Result<OutboundRecord, MergeError> {
    let snapshot = body.map(HardwareSnapshot::from_body).transpose()?;
    Ok(merge(snapshot.as_ref(), flattened))
}

fn format_raw_values(values: &[Value]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("VALUE{}_{}", i + 1, render_scalar(v).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metrics(pairs: &[(&str, Option<&str>)]) -> MetricResult {
        let mut m = MetricResult::new();
        for (name, value) in pairs {
            m.insert(*name, value.map(str::to_string));
        }
        m
    }

    #[test]
    fn flatten_single_device() {
        let mut agg = AggregateResult::new();
        agg.insert("sw1", metrics(&[("sysUptime", Some("12345"))]));
        assert_eq!(agg.flatten(), "sw1:12345");
    }

    #[test]
    fn flatten_keeps_empty_devices() {
        let mut agg = AggregateResult::new();
        agg.insert("sw1", MetricResult::new());
        assert_eq!(agg.flatten(), "sw1:");
    }

    #[test]
    fn flatten_joins_values_in_order() {
        let mut agg = AggregateResult::new();
        agg.insert("b", metrics(&[("x", Some("1")), ("y", None), ("z", Some("3"))]));
        agg.insert("a", metrics(&[("only", Some("v"))]));
        assert_eq!(agg.flatten(), "b:1__3||a:v");
    }

    #[test]
    fn flatten_empty_aggregate() {
        assert_eq!(AggregateResult::new().flatten(), "");
    }

    #[test]
    fn flatten_raw_values_are_used_directly() {
        let raw = [("s1".to_string(), "up".to_string()), ("s2".to_string(), "down".to_string())];
        let out = flatten(raw.iter().map(|(n, v)| (n.as_str(), v)));
        assert_eq!(out, "s1:up||s2:down");
    }

    #[test]
    fn flatten_splits_back_into_value_sequences() {
        let devices = [
            ("core", vec!["10", "20", "30"]),
            ("edge", vec!["a"]),
            ("lab", vec!["x", "y"]),
        ];
        let mut agg = AggregateResult::new();
        for (name, values) in &devices {
            let mut m = MetricResult::new();
            for (i, v) in values.iter().enumerate() {
                m.insert(format!("m{i}"), Some(v.to_string()));
            }
            agg.insert(*name, m);
        }

        let decoded: Vec<(String, Vec<String>)> = agg
            .flatten()
            .split(SEGMENT_SEPARATOR)
            .map(|segment| {
                let (name, rest) = segment.split_once(':').unwrap();
                (
                    name.to_string(),
                    rest.split(VALUE_SEPARATOR).map(str::to_string).collect(),
                )
            })
            .collect();

        for ((name, values), (got_name, got_values)) in devices.iter().zip(&decoded) {
            assert_eq!(name, got_name);
            assert_eq!(values, got_values);
        }
    }

    #[test]
    fn merge_orders_segments() {
        let snapshot = HardwareSnapshot {
            identifier: Some(json!(42)),
            detail: "X".to_string(),
            raw_values: vec![json!(10), json!(20)],
        };
        let record = merge(Some(&snapshot), "Y");
        assert_eq!(record.detail, "Y||X||VALUE1_10||VALUE2_20");
        assert_eq!(record.identifier, Some(json!(42)));
    }

    #[test]
    fn merge_without_snapshot_degrades_to_empty_segments() {
        let record = merge(None, "sw1:1");
        assert_eq!(record.detail, "sw1:1||||");
        assert_eq!(record.identifier, None);
    }

    #[test]
    fn merge_body_reads_full_data() {
        let body = json!({"full_data": {"mac": 1763377233, "detail": "X", "values": [1.5, "on"]}});
        let record = merge_body(Some(&body), "Y").unwrap();
        assert_eq!(record.detail, "Y||X||VALUE1_1.5||VALUE2_on");
        assert_eq!(record.identifier, Some(json!(1763377233)));
    }

    #[test]
    fn merge_body_missing_fields_are_empty() {
        let body = json!({"full_data": {}});
        let record = merge_body(Some(&body), "Y").unwrap();
        assert_eq!(record.detail, "Y||||");
        assert_eq!(record.identifier, None);

        let record = merge_body(Some(&json!({})), "Y").unwrap();
        assert_eq!(record.detail, "Y||||");
    }

    #[test]
    fn merge_body_rejects_wrong_shapes() {
        let bad = [
            json!([1, 2]),
            json!({"full_data": "oops"}),
            json!({"full_data": {"values": 5}}),
            json!({"full_data": {"values": [[1]]}}),
            json!({"full_data": {"detail": {"a": 1}}}),
        ];
        for body in bad {
            assert!(
                matches!(merge_body(Some(&body), "Y"), Err(MergeError::Shape(_))),
                "expected shape error for {body}"
            );
        }
    }
}
