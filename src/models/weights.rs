//! Ensemble weight assignment from offline metrics

use crate::types::metrics_record::{MetricsRecord, PartitionMetrics};
use serde::{Deserialize, Serialize};

/// Heuristic weight for models matching the primary naming convention
pub const PRIMARY_WEIGHT: f64 = 0.8;
/// Heuristic weight for every other model
pub const SECONDARY_WEIGHT: f64 = 0.2;
/// Score used when a metric or the whole test partition is missing
pub const NEUTRAL_SCORE: f64 = 0.5;

/// How the current weights were derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingMode {
    /// Normalized F1/ROC-AUC scores
    Metrics,
    /// Fixed primary/secondary weights
    Heuristic,
}

/// Weights for every model, in the order they were given
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWeights {
    pub mode: WeightingMode,
    pub weights: Vec<(String, f64)>,
}

impl ModelWeights {
    pub fn get(&self, model_name: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(name, _)| name == model_name)
            .map(|(_, w)| *w)
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }
}

/// Derives per-model ensemble weights.
pub struct WeightCalculator {
    /// Name fragment identifying the primary model
    primary_pattern: String,
}

impl WeightCalculator {
    pub fn new(primary_pattern: &str) -> Self {
        Self {
            primary_pattern: primary_pattern.to_lowercase(),
        }
    }

    /// Compute weights for `(model name, metrics)` pairs.
    ///
    /// With at least one metrics record, every model is scored by the mean of
    /// its test F1 and ROC-AUC and the scores are normalized to sum to 1.
    /// Otherwise, or if all scores are zero, the heuristic applies: the
    /// primary model gets 0.8 and every other model a flat 0.2. The flat
    /// secondary weight is not split between several secondary models, so
    /// heuristic weights can sum to more than 1.
    pub fn compute_weights<'a, I>(&self, entries: I) -> ModelWeights
    where
        I: IntoIterator<Item = (&'a str, Option<&'a MetricsRecord>)>,
    {
        let entries: Vec<(&str, Option<&MetricsRecord>)> = entries.into_iter().collect();

        if entries.iter().any(|(_, metrics)| metrics.is_some()) {
            let scores: Vec<(&str, f64)> = entries
                .iter()
                .map(|(name, metrics)| (*name, performance_score(*metrics)))
                .collect();
            let total: f64 = scores.iter().map(|(_, s)| s).sum();

            if total > 0.0 && total.is_finite() {
                return ModelWeights {
                    mode: WeightingMode::Metrics,
                    weights: scores
                        .into_iter()
                        .map(|(name, score)| (name.to_string(), score / total))
                        .collect(),
                };
            }
        }

        self.heuristic_weights(entries.iter().map(|(name, _)| *name))
    }

    /// Fixed weights based on the naming convention alone.
    pub fn heuristic_weights<'a, I>(&self, names: I) -> ModelWeights
    where
        I: IntoIterator<Item = &'a str>,
    {
        ModelWeights {
            mode: WeightingMode::Heuristic,
            weights: names
                .into_iter()
                .map(|name| {
                    let weight = if self.is_primary(name) {
                        PRIMARY_WEIGHT
                    } else {
                        SECONDARY_WEIGHT
                    };
                    (name.to_string(), weight)
                })
                .collect(),
        }
    }

    /// Whether a model name matches the primary naming convention.
    pub fn is_primary(&self, model_name: &str) -> bool {
        model_name.to_lowercase().contains(&self.primary_pattern)
    }
}

impl Default for WeightCalculator {
    fn default() -> Self {
        Self::new("detection")
    }
}

/// Mean of test-split F1 and ROC-AUC, each defaulting to 0.5.
pub fn performance_score(metrics: Option<&MetricsRecord>) -> f64 {
    match metrics.and_then(MetricsRecord::test_partition) {
        Some(test) => (metric_or_neutral(test, "f1") + metric_or_neutral(test, "roc_auc")) / 2.0,
        None => NEUTRAL_SCORE,
    }
}

fn metric_or_neutral(partition: &PartitionMetrics, name: &str) -> f64 {
    partition
        .get(name)
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(NEUTRAL_SCORE)
}
