//! Response bodies exposed to the HTTP layer

use crate::models::weights::WeightingMode;
use crate::types::metrics_record::MetricsRecord;
use crate::types::prediction::Diagnosis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Assembled result of a `/predict` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Diagnosis,
    pub confidence: f64,
    pub ensemble_probability: f64,
    pub calibrated_probability: f64,
    pub individual_predictions: HashMap<String, IndividualPrediction>,
    pub model_weights: HashMap<String, f64>,
    pub threshold_used: f64,
    pub failed_models: Vec<String>,
    pub model_version: String,
    /// `[width, height]`
    pub image_size: [u32; 2],
    pub filename: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualPrediction {
    pub probability: f64,
    pub prediction: Diagnosis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// No model loaded; predictions are refused
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub models_loaded: usize,
    pub available_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub models: Vec<String>,
    pub model_weights: HashMap<String, f64>,
    pub model_metrics: HashMap<String, MetricsRecord>,
    pub weighting: WeightingMode,
    pub load_failures: Vec<LoadFailure>,
}

/// Candidate artifact that was skipped at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadFailure {
    pub model: String,
    pub error: String,
}
