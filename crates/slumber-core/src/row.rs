//! Raw event rows as handed over by the storage layer.

use serde::{Deserialize, Serialize};

/// A raw event row suitable for reconciliation.
///
/// This trait allows the engine to work with different row representations
/// (e.g., rows fetched from the spreadsheet store, or test fixtures).
pub trait EventRow {
    /// Returns the display timestamp as written by the ingestion layer.
    fn display_timestamp(&self) -> &str;

    /// Returns the display date (the row's storage key).
    fn display_date(&self) -> &str;

    /// Returns the metric kind (e.g., "`sleep_session`", "`heart_rate`").
    fn metric_kind(&self) -> &str;

    /// Returns the row's numeric value, if the cell holds one.
    fn numeric_value(&self) -> Option<f64>;

    /// Returns the embedded vendor payload.
    fn raw_payload(&self) -> &serde_json::Value;
}

/// A row of the event store, in its exported column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventRow {
    pub display_timestamp: String,
    pub display_date: String,
    pub metric_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    /// Either a JSON object or a JSON document stored as text.
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl EventRow for RawEventRow {
    fn display_timestamp(&self) -> &str {
        &self.display_timestamp
    }

    fn display_date(&self) -> &str {
        &self.display_date
    }

    fn metric_kind(&self) -> &str {
        &self.metric_kind
    }

    fn numeric_value(&self) -> Option<f64> {
        self.numeric_value
    }

    fn raw_payload(&self) -> &serde_json::Value {
        &self.raw_payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_deserializes_from_export_columns() {
        let json = r#"{
            "displayTimestamp": "2024-01-15 07:00:00",
            "displayDate": "2024-01-15",
            "metricKind": "sleep_session",
            "rawPayload": {"sleepStart": "2024-01-14 23:00:00"}
        }"#;
        let row: RawEventRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.metric_kind(), "sleep_session");
        assert_eq!(row.numeric_value(), None);
        assert!(row.raw_payload().get("sleepStart").is_some());
    }

    #[test]
    fn row_payload_defaults_to_null() {
        let json = r#"{
            "displayTimestamp": "2024-01-15 07:00:00",
            "displayDate": "2024-01-15",
            "metricKind": "heart_rate",
            "numericValue": 58
        }"#;
        let row: RawEventRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.numeric_value(), Some(58.0));
        assert!(row.raw_payload().is_null());
    }
}
