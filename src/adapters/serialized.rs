//! Globally serialized landmark extraction
//!
//! Face mesh runtimes typically keep mutable scratch buffers and cannot be
//! entered from two threads at once. `SerializedExtractor` owns one such model
//! behind a single mutex, so every extraction across every session runs one at
//! a time. Callers with a reentrant model should implement
//! `LandmarkExtractor` directly instead.

use std::sync::{Mutex, PoisonError};

use tracing::trace;

use super::LandmarkExtractor;
use crate::error::ClassifierError;
use crate::types::{FaceLandmarks, Frame};

/// A landmark model that needs exclusive access while processing a frame
pub trait StatefulLandmarkModel: Send {
    fn process(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, ClassifierError>;
}

/// Adapter making a non-reentrant landmark model shareable
pub struct SerializedExtractor<M> {
    model: Mutex<M>,
}

impl<M: StatefulLandmarkModel> SerializedExtractor<M> {
    pub fn new(model: M) -> Self {
        Self {
            model: Mutex::new(model),
        }
    }

    /// Unwrap the model, e.g. to release its runtime
    pub fn into_inner(self) -> M {
        self.model.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: StatefulLandmarkModel> LandmarkExtractor for SerializedExtractor<M> {
    fn extract(&self, frame: &Frame) -> Result<Option<FaceLandmarks>, ClassifierError> {
        // A panic inside the model leaves its buffers in an unknown state, but
        // the next call overwrites them, so the poisoned lock is reused.
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(width = frame.width, height = frame.height, "extracting landmarks");
        model.process(frame)
    }
}
