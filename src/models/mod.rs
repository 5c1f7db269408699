//! Model loading, weighting and ensemble inference

pub mod calibration;
pub mod inference;
pub mod loader;
pub mod registry;
pub mod weights;

pub use inference::{EnsemblePredictor, EnsembleSettings};
pub use loader::{BinaryClassifier, ModelBackend, ModelLoader};
pub use registry::ModelRegistry;
pub use weights::{WeightCalculator, WeightingMode};
