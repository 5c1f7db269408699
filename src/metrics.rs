//! Performance metrics and statistics tracking for the prediction service.

use crate::types::prediction::{Diagnosis, EnsembleOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for service performance
pub struct ServiceMetrics {
    /// Total successful predictions
    pub predictions_served: AtomicU64,
    /// Total refused or failed requests
    pub requests_failed: AtomicU64,
    /// Failed requests by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Predictions by final label
    predictions_by_label: RwLock<HashMap<Diagnosis, u64>>,
    /// End-to-end request times (in microseconds)
    request_times: RwLock<Vec<u64>>,
    /// Model inference times (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Model failures by model name, then failure kind
    model_failures: RwLock<HashMap<String, HashMap<String, u64>>>,
    /// Calibrated probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
    /// How closely per-model probabilities agree
    model_agreements: RwLock<Vec<f64>>,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            predictions_by_label: RwLock::new(HashMap::new()),
            request_times: RwLock::new(Vec::with_capacity(1000)),
            model_times: RwLock::new(HashMap::new()),
            model_failures: RwLock::new(HashMap::new()),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
            model_agreements: RwLock::new(Vec::with_capacity(1000)),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, processing_time: Duration, outcome: &EnsembleOutcome) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.request_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut by_label) = self.predictions_by_label.write() {
            *by_label.entry(outcome.prediction).or_insert(0) += 1;
        }

        let bucket = (outcome.calibrated_probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }

        let probabilities: Vec<f64> = outcome.predictions.iter().map(|p| p.probability).collect();
        self.record_model_agreement(&probabilities);
    }

    /// Record a refused or failed request
    pub fn record_failure(&self, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Record model inference time
    pub fn record_model_time(&self, model_name: &str, duration: Duration) {
        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_default();
            model_times.push(duration.as_micros() as u64);
            // Keep only last 1000 per model
            if model_times.len() > 1000 {
                model_times.drain(0..500);
            }
        }
    }

    /// Record one model failing for one request
    pub fn record_model_failure(&self, model_name: &str, kind: &str) {
        if let Ok(mut failures) = self.model_failures.write() {
            *failures
                .entry(model_name.to_string())
                .or_default()
                .entry(kind.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Record model agreement (1 - std dev of probabilities)
    pub fn record_model_agreement(&self, probabilities: &[f64]) {
        if probabilities.len() < 2 {
            return;
        }

        let mean = probabilities.iter().sum::<f64>() / probabilities.len() as f64;
        let variance = probabilities
            .iter()
            .map(|p| (p - mean).powi(2))
            .sum::<f64>()
            / probabilities.len() as f64;
        let agreement = 1.0 - variance.sqrt().min(1.0);

        if let Ok(mut agreements) = self.model_agreements.write() {
            agreements.push(agreement);
            if agreements.len() > 1000 {
                agreements.drain(0..500);
            }
        }
    }

    /// Get request time statistics
    pub fn get_request_stats(&self) -> LatencyStats {
        match self.request_times.read() {
            Ok(times) => LatencyStats::from_samples(&times),
            Err(_) => LatencyStats::default(),
        }
    }

    /// Get per-model latency statistics
    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let Ok(times) = self.model_times.read() else {
            return HashMap::new();
        };
        let failures = self
            .model_failures
            .read()
            .map(|f| f.clone())
            .unwrap_or_default();

        times
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(model, samples)| {
                let failed = failures
                    .get(model)
                    .map(|kinds| kinds.values().sum())
                    .unwrap_or(0);
                (
                    model.clone(),
                    ModelStats {
                        latency: LatencyStats::from_samples(samples),
                        failures: failed,
                    },
                )
            })
            .collect()
    }

    /// Get average model agreement
    pub fn get_avg_agreement(&self) -> f64 {
        match self.model_agreements.read() {
            Ok(agreements) if !agreements.is_empty() => {
                agreements.iter().sum::<f64>() / agreements.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Get current throughput (predictions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; 10])
    }

    pub fn get_predictions_by_label(&self) -> HashMap<Diagnosis, u64> {
        self.predictions_by_label
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let served = self.predictions_served.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let latency = self.get_request_stats();
        let by_label = self.get_predictions_by_label();
        let distribution = self.get_probability_distribution();

        info!(
            served = served,
            failed = failed,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            agreement = format!("{:.1}%", self.get_avg_agreement() * 100.0),
            "Prediction service summary"
        );

        for (label, count) in &by_label {
            let pct = if served > 0 {
                (*count as f64 / served as f64) * 100.0
            } else {
                0.0
            };
            info!(label = label.as_str(), count = count, "  {:.1}% of predictions", pct);
        }

        for (kind, count) in &self.get_failures_by_kind() {
            info!(kind = %kind, count = count, "  Request failures");
        }

        let total: u64 = distribution.iter().sum();
        if total > 0 {
            for (i, &count) in distribution.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!(
                    "  calibrated {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }

        for (model, stats) in &self.get_model_stats() {
            info!(
                model = %model,
                calls = stats.latency.count,
                failures = stats.failures,
                mean_us = stats.latency.mean_us,
                p50_us = stats.latency.p50_us,
                p99_us = stats.latency.p99_us,
                "  Model inference"
            );
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics over a window of samples
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        Self {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: sorted[count / 2],
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }
}

/// Model-specific statistics
#[derive(Debug, Clone)]
pub struct ModelStats {
    pub latency: LatencyStats,
    pub failures: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prediction::ModelPrediction;

    fn outcome(calibrated: f64, probabilities: &[f64]) -> EnsembleOutcome {
        EnsembleOutcome {
            prediction: Diagnosis::from_probability(calibrated, 0.3),
            confidence: calibrated,
            ensemble_probability: 0.5,
            calibrated_probability: calibrated,
            threshold: 0.3,
            predictions: probabilities
                .iter()
                .enumerate()
                .map(|(i, &p)| ModelPrediction {
                    model: format!("model{}", i),
                    probability: p,
                    prediction: Diagnosis::from_probability(p, 0.5),
                })
                .collect(),
            weights: Vec::new(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), &outcome(0.7, &[0.8, 0.82]));
        metrics.record_prediction(Duration::from_micros(300), &outcome(0.1, &[0.1]));
        metrics.record_failure("no_models_loaded");

        assert_eq!(metrics.predictions_served.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 1);
        let by_label = metrics.get_predictions_by_label();
        assert_eq!(by_label[&Diagnosis::Pneumonia], 1);
        assert_eq!(by_label[&Diagnosis::Normal], 1);
        assert_eq!(metrics.get_failures_by_kind()["no_models_loaded"], 1);

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[7], 1);
        assert_eq!(distribution[1], 1);

        let stats = metrics.get_request_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_us, 200);
        assert_eq!(stats.max_us, 300);
    }

    #[test]
    fn test_certain_probability_lands_in_top_bucket() {
        let metrics = ServiceMetrics::new();
        metrics.record_prediction(Duration::from_micros(1), &outcome(1.0, &[]));
        assert_eq!(metrics.get_probability_distribution()[9], 1);
    }

    #[test]
    fn test_model_agreement() {
        let metrics = ServiceMetrics::new();
        metrics.record_model_agreement(&[0.8, 0.82, 0.79]);
        assert!(metrics.get_avg_agreement() > 0.9);
    }

    #[test]
    fn test_model_stats_include_failures() {
        let metrics = ServiceMetrics::new();
        metrics.record_model_time("a.onnx", Duration::from_micros(50));
        metrics.record_model_time("a.onnx", Duration::from_micros(150));
        metrics.record_model_failure("a.onnx", "timed_out");

        let stats = metrics.get_model_stats();
        assert_eq!(stats["a.onnx"].latency.count, 2);
        assert_eq!(stats["a.onnx"].latency.mean_us, 100);
        assert_eq!(stats["a.onnx"].failures, 1);
    }
}
