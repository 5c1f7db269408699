//! Pneumonia Ensemble Library
//!
//! Chest X-ray pneumonia classification with a weighted ensemble of ONNX
//! models, served over HTTP.

pub mod assembler;
pub mod config;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod server;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use error::{DecodeError, InferenceError, LoadError, ServiceError};
pub use models::inference::EnsemblePredictor;
pub use models::registry::ModelRegistry;
pub use preprocess::Preprocessor;
pub use service::EnsembleService;
pub use types::{Diagnosis, PredictionResponse};
