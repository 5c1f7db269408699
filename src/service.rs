//! Prediction service: the interface the HTTP layer consumes

use crate::assembler::ResultAssembler;
use crate::config::AppConfig;
use crate::decode::{decode_upload, PageRenderer};
use crate::error::ServiceError;
use crate::metrics::ServiceMetrics;
use crate::models::inference::{EnsemblePredictor, EnsembleSettings};
use crate::models::registry::ModelRegistry;
use crate::preprocess::Preprocessor;
use crate::types::prediction::EnsembleOutcome;
use crate::types::report::{HealthReport, ModelInfo, PredictionResponse};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Preprocess, predict and assemble, over a registry built once at startup.
pub struct EnsembleService {
    preprocessor: Preprocessor,
    predictor: EnsemblePredictor,
    assembler: ResultAssembler,
    metrics: Arc<ServiceMetrics>,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl EnsembleService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        preprocessor: Preprocessor,
        settings: EnsembleSettings,
        model_version: &str,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let assembler = ResultAssembler::new(model_version, preprocessor.input_size());
        let predictor = EnsemblePredictor::new(registry, settings, Arc::clone(&metrics));
        Self {
            preprocessor,
            predictor,
            assembler,
            metrics,
            renderer: None,
        }
    }

    /// Accept PDF uploads, rendering their first page with `renderer`.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn from_config(
        config: &AppConfig,
        registry: Arc<ModelRegistry>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self::new(
            registry,
            Preprocessor::from_config(&config.preprocessing),
            EnsembleSettings::from(&config.ensemble),
            &config.ensemble.model_version,
            metrics,
        )
    }

    /// Decode raw upload bytes and classify the result.
    pub async fn predict_upload(
        &self,
        bytes: Vec<u8>,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<PredictionResponse, ServiceError> {
        let renderer = self.renderer.clone();
        let name = filename.map(str::to_string);
        let content_type = content_type.map(str::to_string);
        let decoded = tokio::task::spawn_blocking(move || {
            decode_upload(
                &bytes,
                name.as_deref(),
                content_type.as_deref(),
                renderer.as_deref(),
            )
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))
        .and_then(|result| result.map_err(ServiceError::from));

        match decoded {
            Ok(image) => self.predict(image, filename).await,
            Err(e) => {
                self.metrics.record_failure(e.kind());
                warn!(filename = filename.unwrap_or("unknown"), error = %e, "Upload rejected");
                Err(e)
            }
        }
    }

    /// Classify a decoded image.
    pub async fn predict(
        &self,
        image: DynamicImage,
        filename: Option<&str>,
    ) -> Result<PredictionResponse, ServiceError> {
        let started = Instant::now();

        let result = self.run(image).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_prediction(started.elapsed(), outcome);
                info!(
                    filename = filename.unwrap_or("unknown"),
                    prediction = outcome.prediction.as_str(),
                    calibrated_probability = outcome.calibrated_probability,
                    failed_models = outcome.failures.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Prediction served"
                );
            }
            Err(e) => {
                self.metrics.record_failure(e.kind());
                warn!(filename = filename.unwrap_or("unknown"), error = %e, "Prediction refused");
            }
        }

        result.map(|outcome| self.assembler.assemble(&outcome, filename))
    }

    async fn run(&self, image: DynamicImage) -> Result<EnsembleOutcome, ServiceError> {
        if self.predictor.registry().is_empty() {
            return Err(ServiceError::NoModelsLoaded);
        }

        let preprocessor = self.preprocessor;
        let tensor = tokio::task::spawn_blocking(move || preprocessor.preprocess(&image))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.predictor.predict(tensor).await
    }

    pub fn health(&self) -> HealthReport {
        self.predictor.registry().health()
    }

    pub fn model_info(&self) -> ModelInfo {
        self.predictor.registry().model_info()
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }
}
