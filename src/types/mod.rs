//! Type definitions for the ensemble service

pub mod metrics_record;
pub mod prediction;
pub mod report;

pub use metrics_record::{MetricsRecord, PartitionMetrics};
pub use prediction::{Diagnosis, EnsembleOutcome, ModelEvaluation, ModelPrediction};
pub use report::{HealthReport, HealthStatus, ModelInfo, PredictionResponse};

/// Normalized model input: shape `(1, height, width, 3)`, values in [0, 1]
pub type ImageTensor = ndarray::Array4<f32>;
