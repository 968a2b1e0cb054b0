//! Engine configuration
//!
//! Thresholds and window sizes used by the smoother, event detector and frame
//! aggregator. Defaults match the values the engagement models were tuned for.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Smoothed EAR below this counts as eyes closed
pub const EAR_THRESHOLD: f64 = 0.20;

/// Smoothed MAR above this counts as a yawn detection
pub const YAWN_THRESHOLD: f64 = 0.6;

/// Rolling window capacity for EAR/MAR smoothing
pub const SMOOTH_WINDOW: usize = 5;

/// Trailing window for the rolling yawn count
pub const YAWN_WINDOW_SECS: i64 = 60;

/// Face classifier probability at or above which a face is "Engaged"
pub const ENGAGED_CUTOFF: f64 = 0.5;

/// COCO class id for "cell phone"
pub const PHONE_CLASS_ID: u32 = 67;

/// Minimum detection confidence for a phone to count
pub const PHONE_MIN_CONFIDENCE: f64 = 0.45;

/// Tunables for an `EngagementEngine`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ear_threshold: f64,
    pub yawn_threshold: f64,
    pub smooth_window: usize,
    pub yawn_window_secs: i64,
    pub engaged_cutoff: f64,
    pub phone_class_id: u32,
    pub phone_min_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ear_threshold: EAR_THRESHOLD,
            yawn_threshold: YAWN_THRESHOLD,
            smooth_window: SMOOTH_WINDOW,
            yawn_window_secs: YAWN_WINDOW_SECS,
            engaged_cutoff: ENGAGED_CUTOFF,
            phone_class_id: PHONE_CLASS_ID,
            phone_min_confidence: PHONE_MIN_CONFIDENCE,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.smooth_window == 0 {
            return Err(EngineError::InvalidConfig(
                "smooth_window must be at least 1".to_string(),
            ));
        }
        if self.yawn_window_secs <= 0 {
            return Err(EngineError::InvalidConfig(format!(
                "yawn_window_secs must be positive, got {}",
                self.yawn_window_secs
            )));
        }
        for (name, value) in [
            ("ear_threshold", self.ear_threshold),
            ("yawn_threshold", self.yawn_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("engaged_cutoff", self.engaged_cutoff),
            ("phone_min_confidence", self.phone_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}
