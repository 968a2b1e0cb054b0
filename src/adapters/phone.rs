//! Phone presence from a general object detector

use super::{BoxDetector, ObjectDetector};
use crate::config::{EngineConfig, PHONE_CLASS_ID, PHONE_MIN_CONFIDENCE};
use crate::error::ClassifierError;
use crate::normalizer::Normalizer;
use crate::types::Frame;

/// Turns raw detections into a phone flag by class id and confidence
pub struct PhoneFilter<D> {
    detector: D,
    class_id: u32,
    min_confidence: f64,
}

impl<D: BoxDetector> PhoneFilter<D> {
    /// Filter on the COCO "cell phone" class with the default confidence floor
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            class_id: PHONE_CLASS_ID,
            min_confidence: PHONE_MIN_CONFIDENCE,
        }
    }

    pub fn with_config(detector: D, config: &EngineConfig) -> Self {
        Self {
            detector,
            class_id: config.phone_class_id,
            min_confidence: config.phone_min_confidence,
        }
    }
}

impl<D: BoxDetector> ObjectDetector for PhoneFilter<D> {
    fn detect_phone(&self, frame: &Frame) -> Result<bool, ClassifierError> {
        let detections = self.detector.detect(frame)?;
        Ok(Normalizer::phone_present(
            &detections,
            self.class_id,
            self.min_confidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Detection;

    struct Fixed(Vec<Detection>);

    impl BoxDetector for Fixed {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl BoxDetector for Broken {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, ClassifierError> {
            Err(ClassifierError::Inference("model not loaded".to_string()))
        }
    }

    #[test]
    fn test_phone_filter() {
        let frame = Frame::default();
        let phone = PhoneFilter::new(Fixed(vec![Detection {
            class_id: 67,
            confidence: 0.9,
        }]));
        assert!(phone.detect_phone(&frame).unwrap());

        let person = PhoneFilter::new(Fixed(vec![Detection {
            class_id: 0,
            confidence: 0.9,
        }]));
        assert!(!person.detect_phone(&frame).unwrap());
    }

    #[test]
    fn test_custom_class() {
        let config = EngineConfig {
            phone_class_id: 5,
            phone_min_confidence: 0.2,
            ..EngineConfig::default()
        };
        let filter = PhoneFilter::with_config(
            Fixed(vec![Detection {
                class_id: 5,
                confidence: 0.3,
            }]),
            &config,
        );
        assert!(filter.detect_phone(&Frame::default()).unwrap());
    }

    #[test]
    fn test_errors_propagate_to_engine() {
        assert!(PhoneFilter::new(Broken)
            .detect_phone(&Frame::default())
            .is_err());
    }
}
