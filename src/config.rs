//! Configuration management for the ensemble service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file location, overridable with `ENSEMBLE_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub ensemble: EnsembleConfig,
    pub preprocessing: PreprocessingConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on an uploaded request body
    pub max_upload_bytes: usize,
    /// Allow any origin, method and header
    pub cors_allow_any: bool,
}

/// Model discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files and their metrics sidecars
    pub models_dir: String,
    /// Candidate artifact file names, loaded in this order
    pub artifacts: Vec<String>,
    /// Treat every `*.onnx` file in `models_dir` as a candidate instead
    #[serde(default)]
    pub discover_all: bool,
    /// Names containing this fragment get the primary heuristic weight
    #[serde(default = "default_primary_pattern")]
    pub primary_pattern: String,
    /// Suffix appended to an artifact stem to find its metrics sidecar
    #[serde(default = "default_metrics_suffix")]
    pub metrics_suffix: String,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_primary_pattern() -> String {
    "detection".to_string()
}

fn default_metrics_suffix() -> String {
    "_metrics".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

/// Ensemble decision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Cut-off applied to the calibrated probability (inclusive)
    pub decision_threshold: f64,
    /// Cut-off for each model's own label (inclusive)
    pub model_vote_threshold: f64,
    /// Upper bound on one model's forward pass
    pub model_timeout_ms: u64,
    pub model_version: String,
}

/// Image normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub filter: ResizeFilter,
}

/// Interpolation used when resizing to the model input size
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    /// Bicubic
    #[default]
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Periodic metrics summary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("ENSEMBLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// Layers built-in defaults, then the file (if present), then
    /// `ENSEMBLE__SECTION__KEY` environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("ENSEMBLE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("models.artifacts"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8002,
                max_upload_bytes: 20 * 1024 * 1024,
                cors_allow_any: true,
            },
            models: ModelsConfig {
                models_dir: ".".to_string(),
                artifacts: vec![
                    "pneumonia_detection_model.onnx".to_string(),
                    "pneumonia_smoke.onnx".to_string(),
                ],
                discover_all: false,
                primary_pattern: default_primary_pattern(),
                metrics_suffix: default_metrics_suffix(),
                onnx_threads: default_onnx_threads(),
            },
            ensemble: EnsembleConfig {
                decision_threshold: 0.3, // biased low to reduce false negatives
                model_vote_threshold: 0.5,
                model_timeout_ms: 30_000,
                model_version: "Enhanced Ensemble v2.0".to_string(),
            },
            preprocessing: PreprocessingConfig {
                width: 150,
                height: 150,
                filter: ResizeFilter::CatmullRom,
            },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
