//! Process-wide set of loaded models, their metrics and weights

use crate::config::ModelsConfig;
use crate::error::LoadError;
use crate::models::loader::{BinaryClassifier, ModelBackend};
use crate::models::weights::{WeightCalculator, WeightingMode};
use crate::types::metrics_record::MetricsRecord;
use crate::types::report::{HealthReport, HealthStatus, LoadFailure, ModelInfo};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const MODEL_EXTENSION: &str = "onnx";

/// A loaded model with its offline metrics and ensemble weight
pub struct ModelEntry {
    /// Artifact file name, used as the model identity
    pub name: String,
    pub path: PathBuf,
    model: Arc<dyn BinaryClassifier>,
    pub metrics: Option<MetricsRecord>,
    pub weight: f64,
    /// One permit: at most one forward pass in flight per model
    gate: Arc<Semaphore>,
}

impl ModelEntry {
    pub fn model(&self) -> Arc<dyn BinaryClassifier> {
        Arc::clone(&self.model)
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.gate)
    }
}

impl fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEntry")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("has_metrics", &self.metrics.is_some())
            .field("weight", &self.weight)
            .finish()
    }
}

/// A model that loaded, before weights are assigned
pub struct LoadedModel {
    pub name: String,
    pub path: PathBuf,
    pub model: Arc<dyn BinaryClassifier>,
    pub metrics: Option<MetricsRecord>,
}

/// Immutable after construction; shared by reference across requests.
#[derive(Debug)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    weighting: WeightingMode,
    load_failures: Vec<(String, LoadError)>,
}

impl ModelRegistry {
    /// Discover, load and weight every candidate artifact.
    ///
    /// Individual load failures are logged and skipped. A registry with no
    /// entries is valid; predictions against it are refused.
    pub fn load(config: &ModelsConfig, backend: &dyn ModelBackend) -> Self {
        let mut loaded = Vec::new();
        let mut failures = Vec::new();
        let mut seen = HashSet::new();

        for path in candidate_paths(config) {
            let name = model_name(&path);

            if seen.contains(&name) {
                warn!(model = %name, path = %path.display(), "Duplicate model name, skipping");
                failures.push((name.clone(), LoadError::Duplicate { name, path }));
                continue;
            }

            if !path.exists() {
                warn!(model = %name, path = %path.display(), "Model file not found");
                failures.push((name, LoadError::NotFound(path)));
                continue;
            }

            match backend.load(&path, &name) {
                Ok(model) => {
                    seen.insert(name.clone());
                    let sidecar = metrics_sidecar_path(&path, &config.metrics_suffix);
                    let metrics = read_metrics_sidecar(&sidecar);
                    loaded.push(LoadedModel {
                        name,
                        path,
                        model,
                        metrics,
                    });
                }
                Err(e) => {
                    warn!(model = %name, error = %e, "Failed to load model, skipping");
                    failures.push((
                        name,
                        LoadError::Runtime {
                            path,
                            message: format!("{:#}", e),
                        },
                    ));
                }
            }
        }

        let calculator = WeightCalculator::new(&config.primary_pattern);
        let mut registry = Self::from_loaded(loaded, &calculator);
        registry.load_failures = failures;

        if registry.is_empty() {
            warn!(
                models_dir = %config.models_dir,
                "No models loaded; predictions will be refused"
            );
        } else {
            info!(
                count = registry.len(),
                weighting = ?registry.weighting,
                "Loaded {} models from {}",
                registry.len(),
                config.models_dir
            );
        }

        registry
    }

    /// Build a registry from already-loaded models, computing weights once.
    pub fn from_loaded(models: Vec<LoadedModel>, calculator: &WeightCalculator) -> Self {
        let weights = calculator.compute_weights(
            models
                .iter()
                .map(|m| (m.name.as_str(), m.metrics.as_ref())),
        );

        // Weights come back in input order
        let entries = models
            .into_iter()
            .zip(weights.weights.iter().map(|(_, w)| *w))
            .map(|(m, weight)| {
                info!(
                    model = %m.name,
                    weight = weight,
                    has_metrics = m.metrics.is_some(),
                    "Model weight assigned"
                );
                ModelEntry {
                    name: m.name,
                    path: m.path,
                    model: m.model,
                    metrics: m.metrics,
                    weight,
                    gate: Arc::new(Semaphore::new(1)),
                }
            })
            .collect();

        debug!(total = weights.total(), mode = ?weights.mode, "Ensemble weights computed");

        Self {
            entries,
            weighting: weights.mode,
            load_failures: Vec::new(),
        }
    }

    /// Registry with no models
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            weighting: WeightingMode::Heuristic,
            load_failures: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn model_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn weights(&self) -> HashMap<String, f64> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.weight))
            .collect()
    }

    pub fn metrics(&self) -> HashMap<String, MetricsRecord> {
        self.entries
            .iter()
            .filter_map(|e| e.metrics.clone().map(|m| (e.name.clone(), m)))
            .collect()
    }

    pub fn weighting(&self) -> WeightingMode {
        self.weighting
    }

    pub fn load_failures(&self) -> &[(String, LoadError)] {
        &self.load_failures
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: if self.is_empty() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Ok
            },
            models_loaded: self.len(),
            available_models: self.model_names(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            models: self.model_names(),
            model_weights: self.weights(),
            model_metrics: self.metrics(),
            weighting: self.weighting,
            load_failures: self
                .load_failures
                .iter()
                .map(|(model, error)| LoadFailure {
                    model: model.clone(),
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

/// Candidate artifact paths, in load order.
pub fn candidate_paths(config: &ModelsConfig) -> Vec<PathBuf> {
    let dir = Path::new(&config.models_dir);

    if !config.discover_all {
        return config.artifacts.iter().map(|a| dir.join(a)).collect();
    }

    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            warn!(models_dir = %dir.display(), error = %e, "Cannot scan models directory");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}

/// `<dir>/<stem><suffix>.json` next to a model artifact.
pub fn metrics_sidecar_path(model_path: &Path, suffix: &str) -> PathBuf {
    let stem = model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    model_path.with_file_name(format!("{}{}.json", stem, suffix))
}

/// Read a metrics sidecar. Missing, unreadable or malformed files yield `None`.
pub fn read_metrics_sidecar(path: &Path) -> Option<MetricsRecord> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No metrics sidecar");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read metrics sidecar");
            return None;
        }
    };

    match MetricsRecord::from_json(&raw) {
        Ok(record) => {
            info!(path = %path.display(), "Loaded metrics sidecar");
            Some(record)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed metrics sidecar, ignoring");
            None
        }
    }
}

fn model_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageTensor;
    use std::fs;

    struct Constant(f64);

    impl BinaryClassifier for Constant {
        fn predict_probability(&self, _input: &ImageTensor) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    /// Loads any file whose contents are not `corrupt`
    struct FileBackend;

    impl ModelBackend for FileBackend {
        fn load(&self, path: &Path, _name: &str) -> anyhow::Result<Arc<dyn BinaryClassifier>> {
            let contents = fs::read_to_string(path)?;
            if contents.trim() == "corrupt" {
                anyhow::bail!("invalid protobuf");
            }
            Ok(Arc::new(Constant(0.5)))
        }
    }

    fn config_for(dir: &Path, artifacts: &[&str]) -> ModelsConfig {
        ModelsConfig {
            models_dir: dir.display().to_string(),
            artifacts: artifacts.iter().map(|a| a.to_string()).collect(),
            discover_all: false,
            primary_pattern: "detection".to_string(),
            metrics_suffix: "_metrics".to_string(),
            onnx_threads: 1,
        }
    }

    #[test]
    fn test_sidecar_path_convention() {
        let path = metrics_sidecar_path(Path::new("/models/pneumonia_smoke.onnx"), "_metrics");
        assert_eq!(path, PathBuf::from("/models/pneumonia_smoke_metrics.json"));
    }

    #[test]
    fn test_failed_load_does_not_abort_others() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pneumonia_detection_model.onnx"), "ok").unwrap();
        fs::write(dir.path().join("broken.onnx"), "corrupt").unwrap();
        fs::write(dir.path().join("pneumonia_smoke.onnx"), "ok").unwrap();

        let config = config_for(
            dir.path(),
            &[
                "pneumonia_detection_model.onnx",
                "broken.onnx",
                "missing.onnx",
                "pneumonia_smoke.onnx",
            ],
        );
        let registry = ModelRegistry::load(&config, &FileBackend);

        assert_eq!(
            registry.model_names(),
            vec!["pneumonia_detection_model.onnx", "pneumonia_smoke.onnx"]
        );
        assert_eq!(registry.load_failures().len(), 2);
        assert!(matches!(registry.load_failures()[0].1, LoadError::Runtime { .. }));
        assert!(matches!(registry.load_failures()[1].1, LoadError::NotFound(_)));

        // No sidecars: heuristic weights
        assert_eq!(registry.weighting(), WeightingMode::Heuristic);
        let weights = registry.weights();
        assert_eq!(weights["pneumonia_detection_model.onnx"], 0.8);
        assert_eq!(weights["pneumonia_smoke.onnx"], 0.2);
    }

    #[test]
    fn test_sidecars_drive_weights() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.onnx"), "ok").unwrap();
        fs::write(dir.path().join("b.onnx"), "ok").unwrap();
        fs::write(
            dir.path().join("a_metrics.json"),
            r#"{"validation": null, "test": {"f1": 0.9, "roc_auc": 0.9}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b_metrics.json"),
            r#"{"test": {"f1": 0.5, "roc_auc": NaN}}"#,
        )
        .unwrap();

        let config = config_for(dir.path(), &["a.onnx", "b.onnx"]);
        let registry = ModelRegistry::load(&config, &FileBackend);

        assert_eq!(registry.weighting(), WeightingMode::Metrics);
        let weights = registry.weights();
        assert!(weights["a.onnx"] > weights["b.onnx"]);
        assert!((weights["a.onnx"] + weights["b.onnx"] - 1.0).abs() < 1e-9);
        assert_eq!(registry.metrics().len(), 2);
    }

    #[test]
    fn test_malformed_sidecar_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.onnx"), "ok").unwrap();
        fs::write(dir.path().join("a_metrics.json"), "{ not json").unwrap();

        let config = config_for(dir.path(), &["a.onnx"]);
        let registry = ModelRegistry::load(&config, &FileBackend);

        assert_eq!(registry.len(), 1);
        assert!(registry.entries()[0].metrics.is_none());
        assert_eq!(registry.weighting(), WeightingMode::Heuristic);
    }

    #[test]
    fn test_discover_all_scans_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("z_model.onnx"), "ok").unwrap();
        fs::write(dir.path().join("a_model.ONNX"), "ok").unwrap();
        fs::write(dir.path().join("a_model_metrics.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut config = config_for(dir.path(), &[]);
        config.discover_all = true;

        let registry = ModelRegistry::load(&config, &FileBackend);
        assert_eq!(registry.model_names(), vec!["a_model.ONNX", "z_model.onnx"]);
    }

    #[test]
    fn test_empty_registry_reports_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), &["missing.onnx"]);
        let registry = ModelRegistry::load(&config, &FileBackend);

        let health = registry.health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.models_loaded, 0);
        assert!(health.available_models.is_empty());

        let info = registry.model_info();
        assert_eq!(info.load_failures.len(), 1);
        assert_eq!(info.load_failures[0].model, "missing.onnx");
    }

    #[test]
    fn test_duplicate_model_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("model.onnx"), "ok").unwrap();
        }
        fs::write(
            dir.path().join("a").join("model_metrics.json"),
            r#"{"test": {"f1": 0.9, "roc_auc": 0.9}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b").join("model_metrics.json"),
            r#"{"test": {"f1": 0.5, "roc_auc": 0.5}}"#,
        )
        .unwrap();

        let config = config_for(dir.path(), &["a/model.onnx", "b/model.onnx"]);
        let registry = ModelRegistry::load(&config, &FileBackend);

        assert_eq!(registry.model_names(), vec!["model.onnx"]);
        assert_eq!(registry.entries()[0].path, dir.path().join("a/model.onnx"));
        assert_eq!(registry.load_failures().len(), 1);
        assert!(matches!(registry.load_failures()[0].1, LoadError::Duplicate { .. }));
        assert!((registry.entries()[0].weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_follow_entry_order() {
        let loaded = [("model.onnx", 0.9), ("model.onnx", 0.5)]
            .into_iter()
            .map(|(name, score)| LoadedModel {
                name: name.to_string(),
                path: PathBuf::from(name),
                model: Arc::new(Constant(0.5)),
                metrics: Some(MetricsRecord {
                    validation: None,
                    test: Some(crate::types::metrics_record::PartitionMetrics {
                        f1: Some(score),
                        roc_auc: Some(score),
                        ..Default::default()
                    }),
                }),
            })
            .collect();

        let registry = ModelRegistry::from_loaded(loaded, &WeightCalculator::default());

        let total: f64 = registry.entries().iter().map(|e| e.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((registry.entries()[0].weight - 0.9 / 1.4).abs() < 1e-9);
        assert!((registry.entries()[1].weight - 0.5 / 1.4).abs() < 1e-9);
    }
}
