//! Error taxonomy for the ensemble service

use std::path::PathBuf;
use thiserror::Error;

/// Upload bytes could not be turned into an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Empty file")]
    Empty,
    #[error("Invalid or unsupported image file: {0}")]
    Unsupported(String),
    #[error("PDF support is not available")]
    PdfUnsupported,
    #[error("Failed to process PDF: {0}")]
    Pdf(String),
}

/// A single model artifact failed to load. Never fatal to startup.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("model artifact not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to load model from {}: {message}", .path.display())]
    Runtime { path: PathBuf, message: String },
    #[error("another model is already loaded as {name}; skipping {}", .path.display())]
    Duplicate { name: String, path: PathBuf },
}

/// One model's forward pass failed for one request.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("model {model} failed: {message}")]
    Failed { model: String, message: String },
    #[error("model {model} panicked during inference")]
    Panicked { model: String },
    #[error("model {model} timed out after {timeout_ms} ms")]
    TimedOut { model: String, timeout_ms: u64 },
}

impl InferenceError {
    /// Model the failure belongs to.
    pub fn model(&self) -> &str {
        match self {
            InferenceError::Failed { model, .. }
            | InferenceError::Panicked { model }
            | InferenceError::TimedOut { model, .. } => model,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Failed { .. } => "failed",
            InferenceError::Panicked { .. } => "panicked",
            InferenceError::TimedOut { .. } => "timed_out",
        }
    }
}

/// Errors surfaced to callers of the prediction service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("No models loaded")]
    NoModelsLoaded,
    #[error("All models failed to predict")]
    AllModelsFailed { failures: Vec<InferenceError> },
    #[error("Prediction error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Decode(_) => "decode",
            ServiceError::NoModelsLoaded => "no_models_loaded",
            ServiceError::AllModelsFailed { .. } => "all_models_failed",
            ServiceError::Internal(_) => "internal",
        }
    }
}
