//! Classifier output normalization
//!
//! This module turns raw collaborator outputs into the values the engine
//! aggregates:
//! - Face probability mapped to a label and a confidence in that label
//! - Raw object detections reduced to a phone-present flag
//! - Reported values rounded for output

use crate::types::{Detection, EngagementLabel, FaceClassification};

/// Normalizer for classifier outputs
pub struct Normalizer;

impl Normalizer {
    /// Map an "engaged" probability to a classification.
    ///
    /// `None` (no face found) and non-finite probabilities become `NoFace`.
    /// Confidence always refers to the predicted class, so a `NotEngaged`
    /// frame reports `1 - p`.
    pub fn classify(probability: Option<f64>, engaged_cutoff: f64) -> FaceClassification {
        let p = match probability {
            Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
            _ => return FaceClassification::no_face(),
        };

        if p >= engaged_cutoff {
            FaceClassification {
                label: EngagementLabel::Engaged,
                confidence: p,
            }
        } else {
            FaceClassification {
                label: EngagementLabel::NotEngaged,
                confidence: 1.0 - p,
            }
        }
    }

    /// True if any detection is of `class_id` with confidence above `min_confidence`
    pub fn phone_present(detections: &[Detection], class_id: u32, min_confidence: f64) -> bool {
        detections
            .iter()
            .any(|d| d.class_id == class_id && d.confidence > min_confidence)
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
