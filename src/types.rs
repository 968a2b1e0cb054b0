//! Core types for the Engage Flux engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: frames and landmarks going in, classifier observations, per-frame
//! results and the session report coming out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A landmark position, normalized to the frame (0-1 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Scale normalized coordinates into pixel units
    pub fn scaled(&self, width: f64, height: f64) -> Point {
        Point::new(self.x * width, self.y * height)
    }
}

/// Facial landmarks for a single face, indexed like a face mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    pub points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Pixel bounding box of a detected face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One raw object detection box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f64,
}

/// A single video frame.
///
/// The pixel payload is opaque to the engine; only the classifiers look at it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// Input to `EngagementEngine::analyze_frame`
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub frame: Frame,
    /// Precomputed landmarks; when absent the landmark extractor is invoked
    pub landmarks: Option<FaceLandmarks>,
    /// Precomputed face box; when absent the face detector (if any) is invoked
    pub face_region: Option<FaceRegion>,
    /// Capture time; defaults to the time of analysis
    pub captured_at: Option<DateTime<Utc>>,
}

impl FrameInput {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            landmarks: None,
            face_region: None,
            captured_at: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: FaceLandmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn with_face_region(mut self, region: FaceRegion) -> Self {
        self.face_region = Some(region);
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }
}

/// Engagement classification of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementLabel {
    #[serde(rename = "Engaged")]
    Engaged,
    #[serde(rename = "Not Engaged")]
    NotEngaged,
    #[serde(rename = "No Face")]
    NoFace,
}

impl EngagementLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLabel::Engaged => "Engaged",
            EngagementLabel::NotEngaged => "Not Engaged",
            EngagementLabel::NoFace => "No Face",
        }
    }
}

/// Label plus confidence in the predicted class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceClassification {
    pub label: EngagementLabel,
    pub confidence: f64,
}

impl FaceClassification {
    pub fn no_face() -> Self {
        Self {
            label: EngagementLabel::NoFace,
            confidence: 0.0,
        }
    }
}

/// Classifier outputs for one frame, ready to be applied to a session.
///
/// `face_probability` is the raw "engaged" probability of the face classifier;
/// `None` means no face was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservation {
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub face_probability: Option<f64>,
    #[serde(default)]
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default)]
    pub phone_detected: bool,
}

impl FrameObservation {
    /// Check that the observation is something a classifier could have produced
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::InvalidObservation(format!(
                "frame dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if let Some(p) = self.face_probability {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(EngineError::InvalidObservation(format!(
                    "face_probability must be within [0, 1], got {p}"
                )));
            }
        }
        if let Some(landmarks) = &self.landmarks {
            if let Some(i) = landmarks
                .points
                .iter()
                .position(|p| !p.x.is_finite() || !p.y.is_finite())
            {
                return Err(EngineError::InvalidObservation(format!(
                    "landmark {i} has non-finite coordinates"
                )));
            }
        }
        Ok(())
    }
}

/// Per-frame result returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub engagement_label: EngagementLabel,
    /// Confidence in `engagement_label`, rounded to 3 decimals
    pub engagement_prob: f64,
    pub phone_detected: bool,
    /// Smoothed eye aspect ratio, rounded to 3 decimals
    #[serde(rename = "EAR")]
    pub ear: f64,
    /// Smoothed mouth aspect ratio, rounded to 3 decimals
    #[serde(rename = "MAR")]
    pub mar: f64,
    pub blink_count: u64,
    /// Yawn detections in the trailing 60 seconds
    pub yawns: usize,
    pub frames_total: u64,
}

/// Session statistics produced when a session ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    /// Local wall-clock start, `%Y-%m-%d %H:%M:%S`
    pub start_time: String,
    pub start_time_utc: DateTime<Utc>,
    pub ended_at_utc: DateTime<Utc>,
    pub duration_seconds: f64,
    pub timer_minutes: u32,
    pub frames: u64,
    pub engaged_pct: f64,
    pub not_engaged_pct: f64,
    pub phone_pct: f64,
    pub blinks: u64,
    pub yawns: usize,
}
