//! Confidence calibration and the final decision rule

use crate::types::prediction::Diagnosis;

/// Steepness of the logistic sharpening
pub const CALIBRATION_SCALE: f64 = 5.0;
/// Probability left unchanged by calibration
pub const CALIBRATION_MIDPOINT: f64 = 0.5;

/// Fixed logistic sharpening: `1 / (1 + exp(-5 * (raw - 0.5)))`.
pub fn calibrate(raw_probability: f64) -> f64 {
    1.0 / (1.0 + (-CALIBRATION_SCALE * (raw_probability - CALIBRATION_MIDPOINT)).exp())
}

/// Label and confidence for a calibrated probability.
///
/// The threshold is inclusive. Confidence is the calibrated probability for
/// a positive label and its complement otherwise.
pub fn decide(calibrated_probability: f64, threshold: f64) -> (Diagnosis, f64) {
    let label = Diagnosis::from_probability(calibrated_probability, threshold);
    let confidence = if label.is_positive() {
        calibrated_probability
    } else {
        1.0 - calibrated_probability
    };
    (label, confidence)
}
