//! Packaging of ensemble outcomes into response bodies

use crate::types::prediction::EnsembleOutcome;
use crate::types::report::{IndividualPrediction, PredictionResponse};
use chrono::Utc;

/// Filename reported when the upload carried none
pub const UNKNOWN_FILENAME: &str = "unknown";

/// Round to 4 decimal digits for display
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Combines an ensemble outcome with request metadata.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    model_version: String,
    image_size: [u32; 2],
}

impl ResultAssembler {
    pub fn new(model_version: &str, image_size: [u32; 2]) -> Self {
        Self {
            model_version: model_version.to_string(),
            image_size,
        }
    }

    pub fn assemble(
        &self,
        outcome: &EnsembleOutcome,
        filename: Option<&str>,
    ) -> PredictionResponse {
        PredictionResponse {
            prediction: outcome.prediction,
            confidence: round4(outcome.confidence),
            ensemble_probability: round4(outcome.ensemble_probability),
            calibrated_probability: round4(outcome.calibrated_probability),
            individual_predictions: outcome
                .predictions
                .iter()
                .map(|p| {
                    (
                        p.model.clone(),
                        IndividualPrediction {
                            probability: round4(p.probability),
                            prediction: p.prediction,
                        },
                    )
                })
                .collect(),
            model_weights: outcome
                .weights
                .iter()
                .map(|(name, weight)| (name.clone(), round4(*weight)))
                .collect(),
            threshold_used: round4(outcome.threshold),
            failed_models: outcome
                .failures
                .iter()
                .map(|f| f.model().to_string())
                .collect(),
            model_version: self.model_version.clone(),
            image_size: self.image_size,
            filename: filename
                .filter(|name| !name.is_empty())
                .unwrap_or(UNKNOWN_FILENAME)
                .to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }
}
