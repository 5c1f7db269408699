//! ONNX model loader

use crate::types::ImageTensor;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A loaded binary classifier.
///
/// Implementations must tolerate concurrent calls from the blocking pool.
pub trait BinaryClassifier: Send + Sync {
    /// Probability of the positive class for a `(1, H, W, 3)` tensor.
    fn predict_probability(&self, input: &ImageTensor) -> Result<f64>;
}

/// Source of loaded classifiers.
pub trait ModelBackend {
    fn load(&self, path: &Path, name: &str) -> Result<Arc<dyn BinaryClassifier>>;
}

/// ONNX Runtime session with resolved input/output names
pub struct OnnxModel {
    /// Model name
    pub name: String,
    /// Sessions need exclusive access to run
    session: Mutex<Session>,
    /// Input name for the model
    pub input_name: String,
    /// Output name for probabilities
    pub output_name: String,
}

impl BinaryClassifier for OnnxModel {
    fn predict_probability(&self, input: &ImageTensor) -> Result<f64> {
        use ort::value::Tensor;

        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let output = outputs
            .get(self.output_name.as_str())
            .with_context(|| {
                format!(
                    "Output {} missing from model {}",
                    self.output_name, self.name
                )
            })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .context("Model output is not an f32 tensor")?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let prob = positive_probability(&dims, data)?;
        debug!(model = %self.name, prob = prob, "Extracted probability");
        Ok(prob)
    }
}

/// Pick the positive-class probability out of a classifier output.
///
/// Sigmoid heads produce `[1, 1]` (or `[1]`); softmax heads produce
/// `[1, 2]` (or `[2]`) with the positive class at index 1.
pub fn positive_probability(dims: &[i64], data: &[f32]) -> Result<f64> {
    let classes = dims.last().copied().unwrap_or(data.len() as i64);
    let raw = match (dims.len(), classes) {
        (1 | 2, 1) => data.first(),
        (1 | 2, 2) => data.get(1),
        _ => anyhow::bail!("Unexpected output shape {:?}", dims),
    }
    .copied()
    .context("Model output is empty")?;

    if !raw.is_finite() {
        anyhow::bail!("Model produced a non-finite probability: {}", raw);
    }
    Ok((raw as f64).clamp(0.0, 1.0))
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<OnnxModel> {
        let path = path.as_ref();

        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("Model declares no inputs")?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .context("Model declares no outputs")?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(OnnxModel {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl ModelBackend for ModelLoader {
    fn load(&self, path: &Path, name: &str) -> Result<Arc<dyn BinaryClassifier>> {
        Ok(Arc::new(self.load_model(path, name)?))
    }
}
