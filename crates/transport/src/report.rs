use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A keyed state report from the gateway.
///
/// Reports are JSON objects whose key set varies per message; a consumer asks
/// for the one or two keys it cares about and ignores the rest. Field order
/// is preserved as published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(Map<String, Value>);

impl Report {
    /// An empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a report out of a JSON value, failing on anything but an object
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Fetch a field, `None` if absent
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Fetch a string field, `None` if absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Insert a field, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// true if the report carries the given key
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields in the report
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true if the report has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Report {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Report> for Value {
    fn from(report: Report) -> Self {
        Value::Object(report.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Panics are forgivable while testing")]

    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_requested_field_and_tolerates_extras() {
        let report = Report::from_value(json!({
            "state_btn3": "ON",
            "linkquality": 134,
            "action": null,
        }))
        .unwrap();
        assert_eq!(report.get_str("state_btn3"), Some("ON"));
        assert_eq!(report.get("linkquality"), Some(&json!(134)));
        assert_eq!(report.get_str("linkquality"), None);
        assert_eq!(report.get("missing"), None);
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(Report::from_value(json!("online")).is_err());
        assert!(Report::from_value(json!([1, 2])).is_err());
    }
}
