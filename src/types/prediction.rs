//! Prediction data structures

use crate::error::InferenceError;
use serde::{Deserialize, Serialize};

/// Binary classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Diagnosis {
    /// Positive class
    Pneumonia,
    Normal,
}

impl Diagnosis {
    /// Label a probability against an inclusive threshold
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Diagnosis::Pneumonia
        } else {
            Diagnosis::Normal
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Diagnosis::Pneumonia)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnosis::Pneumonia => "PNEUMONIA",
            Diagnosis::Normal => "NORMAL",
        }
    }
}

/// One model's contribution to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model: String,
    /// Raw probability of the positive class (0.0 - 1.0)
    pub probability: f64,
    pub prediction: Diagnosis,
}

/// Outcome of running one registry entry for one request
#[derive(Debug, Clone)]
pub struct ModelEvaluation {
    pub model: String,
    /// Load-time weight of the entry
    pub weight: f64,
    pub outcome: Result<f64, InferenceError>,
}

/// Full-precision ensemble decision for one request
#[derive(Debug, Clone)]
pub struct EnsembleOutcome {
    pub prediction: Diagnosis,
    pub confidence: f64,
    /// Weighted sum of successful model probabilities
    pub ensemble_probability: f64,
    pub calibrated_probability: f64,
    pub threshold: f64,
    /// Successful models, in registry order
    pub predictions: Vec<ModelPrediction>,
    /// Load-time weights of every registry entry, in registry order
    pub weights: Vec<(String, f64)>,
    /// Models excluded from this request's aggregate
    pub failures: Vec<InferenceError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnosis_threshold_is_inclusive() {
        assert_eq!(Diagnosis::from_probability(0.3, 0.3), Diagnosis::Pneumonia);
        assert_eq!(Diagnosis::from_probability(0.2999, 0.3), Diagnosis::Normal);
        assert_eq!(Diagnosis::from_probability(0.5, 0.5), Diagnosis::Pneumonia);
    }

    #[test]
    fn test_diagnosis_serialization() {
        let json = serde_json::to_string(&Diagnosis::Pneumonia).unwrap();
        assert_eq!(json, "\"PNEUMONIA\"");
        let parsed: Diagnosis = serde_json::from_str("\"NORMAL\"").unwrap();
        assert_eq!(parsed, Diagnosis::Normal);
        assert_eq!(parsed.as_str(), "NORMAL");
    }
}
