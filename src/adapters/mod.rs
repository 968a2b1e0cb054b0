//! External classifier adapters
//!
//! The engine never runs vision models itself. It consumes them through the
//! capability traits below, which callers implement over their model runtime.
//! Implementations must be callable from many request threads at once; a model
//! that is not reentrant goes behind `SerializedExtractor` (or an equivalent
//! lock owned by its adapter), never behind session state.
//!
//! Every method may fail. The engine absorbs failures as "no detection".

mod phone;
mod serialized;

pub use phone::PhoneFilter;
pub use serialized::{SerializedExtractor, StatefulLandmarkModel};

use crate::error::ClassifierError;
use crate::types::{Detection, FaceLandmarks, FaceRegion, Frame};

/// Finds face bounding boxes in a frame
pub trait FaceDetector: Send + Sync {
    fn locate(&self, frame: &Frame) -> Result<Vec<FaceRegion>, ClassifierError>;
}

/// Scores a face region; returns the probability that the face is engaged
pub trait FaceClassifier: Send + Sync {
    fn classify(&self, frame: &Frame, region: &FaceRegion) -> Result<f64, ClassifierError>;
}

/// Extracts a face mesh from a frame; `None` when no face is found
pub trait LandmarkExtractor: Send + Sync {
    fn extract(&self, frame: &Frame) -> Result<Option<FaceLandmarks>, ClassifierError>;
}

/// Reports whether a phone is visible in a frame
pub trait ObjectDetector: Send + Sync {
    fn detect_phone(&self, frame: &Frame) -> Result<bool, ClassifierError>;
}

/// General-purpose object detector producing raw boxes
pub trait BoxDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, ClassifierError>;
}

/// Pick the largest face, which is the one closest to the camera
pub fn largest_face(regions: &[FaceRegion]) -> Option<FaceRegion> {
    regions.iter().copied().max_by_key(FaceRegion::area)
}
