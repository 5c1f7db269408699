//! Multi-model ensemble inference

use crate::config::EnsembleConfig;
use crate::error::{InferenceError, ServiceError};
use crate::metrics::ServiceMetrics;
use crate::models::calibration::{calibrate, decide};
use crate::models::registry::ModelRegistry;
use crate::types::prediction::{Diagnosis, EnsembleOutcome, ModelEvaluation, ModelPrediction};
use crate::types::ImageTensor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Decision parameters for the ensemble
#[derive(Debug, Clone)]
pub struct EnsembleSettings {
    /// Inclusive cut-off on the calibrated probability
    pub decision_threshold: f64,
    /// Inclusive cut-off for each model's own label
    pub model_vote_threshold: f64,
    /// Upper bound on one model's forward pass
    pub model_timeout: Duration,
}

impl From<&EnsembleConfig> for EnsembleSettings {
    fn from(config: &EnsembleConfig) -> Self {
        Self {
            decision_threshold: config.decision_threshold,
            model_vote_threshold: config.model_vote_threshold,
            model_timeout: Duration::from_millis(config.model_timeout_ms),
        }
    }
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            decision_threshold: 0.3,
            model_vote_threshold: 0.5,
            model_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs every registered model and combines their probabilities.
///
/// Holds no per-request state; one instance serves all requests.
pub struct EnsemblePredictor {
    registry: Arc<ModelRegistry>,
    settings: EnsembleSettings,
    metrics: Arc<ServiceMetrics>,
}

impl EnsemblePredictor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        settings: EnsembleSettings,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            registry,
            settings,
            metrics,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Predict with every loaded model and combine the results.
    ///
    /// Fails with `NoModelsLoaded` on an empty registry and with
    /// `AllModelsFailed` when no model produced a probability.
    pub async fn predict(&self, tensor: ImageTensor) -> Result<EnsembleOutcome, ServiceError> {
        if self.registry.is_empty() {
            return Err(ServiceError::NoModelsLoaded);
        }

        let evaluations = self.evaluate_all(Arc::new(tensor)).await;
        self.combine(evaluations)
    }

    /// Run each model on the blocking pool, concurrently, each under the
    /// configured timeout. Results come back in registry order.
    ///
    /// A model runs at most one forward pass at a time. While a previous call
    /// is still running (e.g. after a timeout), new requests wait for the
    /// model's permit without holding a blocking thread.
    pub async fn evaluate_all(&self, tensor: Arc<ImageTensor>) -> Vec<ModelEvaluation> {
        let timeout = self.settings.model_timeout;

        let tasks = self.registry.entries().iter().map(|entry| {
            let model = entry.model();
            let gate = entry.gate();
            let name = entry.name.clone();
            let weight = entry.weight;
            let tensor = Arc::clone(&tensor);
            let metrics = Arc::clone(&self.metrics);

            async move {
                let started = Instant::now();
                let run = async move {
                    let permit = match gate.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return Ok(Err(anyhow::Error::from(e))),
                    };
                    tokio::task::spawn_blocking(move || {
                        // Released only when the forward pass returns
                        let _permit = permit;
                        model.predict_probability(&tensor)
                    })
                    .await
                };

                let outcome = match tokio::time::timeout(timeout, run).await {
                    Ok(Ok(Ok(probability))) => Ok(probability),
                    Ok(Ok(Err(e))) => Err(InferenceError::Failed {
                        model: name.clone(),
                        message: format!("{:#}", e),
                    }),
                    Ok(Err(_join_error)) => Err(InferenceError::Panicked {
                        model: name.clone(),
                    }),
                    // The blocking call keeps running; its result is discarded
                    Err(_elapsed) => Err(InferenceError::TimedOut {
                        model: name.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };

                metrics.record_model_time(&name, started.elapsed());
                if let Err(e) = &outcome {
                    metrics.record_model_failure(&name, e.kind());
                }

                ModelEvaluation {
                    model: name,
                    weight,
                    outcome,
                }
            }
        });

        futures::future::join_all(tasks).await
    }

    /// Aggregate per-model outcomes into the final decision.
    ///
    /// The raw probability is `sum(p_i * w_i)` over successful models using
    /// the load-time weights; weights are not renormalized when some models
    /// fail.
    pub fn combine(
        &self,
        evaluations: Vec<ModelEvaluation>,
    ) -> Result<EnsembleOutcome, ServiceError> {
        let mut predictions = Vec::with_capacity(evaluations.len());
        let mut failures = Vec::new();
        let mut ensemble_probability = 0.0;

        for evaluation in evaluations {
            match evaluation.outcome {
                Ok(probability) => {
                    ensemble_probability += probability * evaluation.weight;
                    predictions.push(ModelPrediction {
                        model: evaluation.model,
                        probability,
                        prediction: Diagnosis::from_probability(
                            probability,
                            self.settings.model_vote_threshold,
                        ),
                    });
                }
                Err(e) => {
                    error!(
                        model = %evaluation.model,
                        error = %e,
                        "Model inference failed, excluding from ensemble"
                    );
                    failures.push(e);
                }
            }
        }

        if predictions.is_empty() {
            return Err(ServiceError::AllModelsFailed { failures });
        }

        let calibrated_probability = calibrate(ensemble_probability);
        let (prediction, confidence) =
            decide(calibrated_probability, self.settings.decision_threshold);

        debug!(
            ensemble_probability = ensemble_probability,
            calibrated_probability = calibrated_probability,
            prediction = prediction.as_str(),
            contributing = predictions.len(),
            failed = failures.len(),
            "Ensemble inference complete"
        );

        Ok(EnsembleOutcome {
            prediction,
            confidence,
            ensemble_probability,
            calibrated_probability,
            threshold: self.settings.decision_threshold,
            predictions,
            weights: self
                .registry
                .entries()
                .iter()
                .map(|e| (e.name.clone(), e.weight))
                .collect(),
            failures,
        })
    }
}
