//! Offline evaluation metrics recorded next to each model artifact

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Contents of a `<model>_metrics.json` sidecar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(default)]
    pub validation: Option<PartitionMetrics>,
    #[serde(default)]
    pub test: Option<PartitionMetrics>,
}

/// Metrics for one evaluation split.
///
/// Keys the service does not use (confusion matrix, report text, ...) are
/// kept in `extra` so they can be echoed back by `model_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetrics {
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub precision: Option<f64>,
    #[serde(default)]
    pub recall: Option<f64>,
    #[serde(default)]
    pub f1: Option<f64>,
    #[serde(default)]
    pub roc_auc: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl MetricsRecord {
    /// Parse sidecar JSON.
    ///
    /// The training pipeline writes bare `NaN` / `Infinity` tokens for
    /// undefined scores (e.g. ROC-AUC on a single-class split); those are
    /// read as absent.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(&replace_non_finite_literals(raw))
    }

    pub fn test_partition(&self) -> Option<&PartitionMetrics> {
        self.test.as_ref()
    }
}

impl PartitionMetrics {
    /// Look up a metric by its sidecar key.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "accuracy" => self.accuracy,
            "precision" => self.precision,
            "recall" => self.recall,
            "f1" => self.f1,
            "roc_auc" => self.roc_auc,
            other => self.extra.get(other).and_then(|v| v.as_f64()),
        };
        value.filter(|v| v.is_finite())
    }
}

/// Rewrite `NaN`, `Infinity` and `-Infinity` outside string literals as `null`.
fn replace_non_finite_literals(raw: &str) -> String {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = raw;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = TOKENS.iter().find(|t| rest.starts_with(**t)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_training_report() {
        let raw = r#"{
            "validation": {"accuracy": 0.91, "f1": 0.9, "roc_auc": 0.95},
            "test": {
                "threshold": 0.5,
                "accuracy": 0.88,
                "precision": 0.86,
                "recall": 0.97,
                "f1": 0.91,
                "roc_auc": 0.94,
                "confusion_matrix": [[180, 54], [12, 378]],
                "classification_report": "NORMAL ..."
            }
        }"#;

        let record = MetricsRecord::from_json(raw).unwrap();
        let test = record.test_partition().unwrap();
        assert_eq!(test.get("f1"), Some(0.91));
        assert_eq!(test.get("roc_auc"), Some(0.94));
        assert_eq!(test.get("threshold"), Some(0.5));
        assert!(test.extra.contains_key("confusion_matrix"));
        assert_eq!(record.validation.unwrap().accuracy, Some(0.91));
    }

    #[test]
    fn test_nan_metrics_read_as_absent() {
        let raw = r#"{"validation": {"f1": 0.7, "roc_auc": NaN, "log_loss": -Infinity},
                      "test": null}"#;

        let record = MetricsRecord::from_json(raw).unwrap();
        assert!(record.test_partition().is_none());
        let validation = record.validation.unwrap();
        assert_eq!(validation.get("roc_auc"), None);
        assert_eq!(validation.get("log_loss"), None);
        assert_eq!(validation.get("f1"), Some(0.7));
    }

    #[test]
    fn test_tokens_inside_strings_are_preserved() {
        let raw = r#"{"test": {"classification_report": "NaN \"Infinity\" stays"}}"#;
        let record = MetricsRecord::from_json(raw).unwrap();
        let report = &record.test.unwrap().extra["classification_report"];
        assert_eq!(report.as_str(), Some("NaN \"Infinity\" stays"));
    }

    #[test]
    fn test_missing_partitions_default_to_none() {
        let record = MetricsRecord::from_json("{}").unwrap();
        assert_eq!(record, MetricsRecord::default());
    }
}
