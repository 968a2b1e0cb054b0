//! Engine orchestration
//!
//! This module provides the public API for engagement processing. It wires the
//! external classifiers, the geometry/smoothing/event stages and the session
//! store into three operations: start a session, analyze a frame, end a
//! session.
//!
//! Classifiers run before any session lock is taken; only the final
//! aggregation step holds the session's mutex.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{
    largest_face, FaceClassifier, FaceDetector, LandmarkExtractor, ObjectDetector,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::geometry::face_ratios;
use crate::normalizer::Normalizer;
use crate::report::ReportGenerator;
use crate::session::ClassifiedFrame;
use crate::store::{lock_session, SessionHandle, SessionStore};
use crate::types::{FaceRegion, FrameInput, FrameObservation, FrameResult, SessionReport};

/// The external classifiers an engine consults for each frame.
///
/// Any collaborator left unset behaves as if it never detects anything.
#[derive(Clone, Default)]
pub struct Collaborators {
    face_detector: Option<Arc<dyn FaceDetector>>,
    face_classifier: Option<Arc<dyn FaceClassifier>>,
    landmark_extractor: Option<Arc<dyn LandmarkExtractor>>,
    object_detector: Option<Arc<dyn ObjectDetector>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_face_detector(mut self, detector: impl FaceDetector + 'static) -> Self {
        self.face_detector = Some(Arc::new(detector));
        self
    }

    pub fn with_face_classifier(mut self, classifier: impl FaceClassifier + 'static) -> Self {
        self.face_classifier = Some(Arc::new(classifier));
        self
    }

    pub fn with_landmark_extractor(
        mut self,
        extractor: impl LandmarkExtractor + 'static,
    ) -> Self {
        self.landmark_extractor = Some(Arc::new(extractor));
        self
    }

    pub fn with_object_detector(mut self, detector: impl ObjectDetector + 'static) -> Self {
        self.object_detector = Some(Arc::new(detector));
        self
    }
}

/// Stateful engine tracking many concurrent sessions.
///
/// The engine is `Send + Sync`; share it between request threads behind an
/// `Arc`.
pub struct EngagementEngine {
    store: SessionStore,
    collaborators: Collaborators,
    config: EngineConfig,
}

impl Default for EngagementEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngagementEngine {
    /// Create an engine with default thresholds and no classifiers.
    ///
    /// Without classifiers only `observe` produces meaningful results.
    pub fn new() -> Self {
        Self {
            store: SessionStore::new(EngineConfig::default()),
            collaborators: Collaborators::default(),
            config: EngineConfig::default(),
        }
    }

    /// Create an engine with a validated configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            store: SessionStore::new(config.clone()),
            collaborators: Collaborators::default(),
            config,
        })
    }

    /// Attach the external classifiers
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a session. Always succeeds.
    pub fn start_session(&self, timer_minutes: u32) -> Uuid {
        self.start_session_at(timer_minutes, Utc::now())
    }

    /// Start a session with an explicit start time
    pub fn start_session_at(&self, timer_minutes: u32, start_time: DateTime<Utc>) -> Uuid {
        let id = self.store.create_at(timer_minutes, start_time);
        info!(session_id = %id, timer_minutes, "session started");
        id
    }

    /// Run the classifiers on a frame and aggregate the outcome into the session.
    ///
    /// Fails only with `InvalidSession`; classifier failures degrade to "no
    /// detection" for that frame.
    pub fn analyze_frame(
        &self,
        session_id: &Uuid,
        input: FrameInput,
    ) -> Result<FrameResult, EngineError> {
        let handle = self.session(session_id)?;
        let observation = self.observe_input(session_id, input);
        self.apply(session_id, &handle, &observation)
    }

    /// Aggregate an already-classified frame into the session
    pub fn observe(
        &self,
        session_id: &Uuid,
        observation: &FrameObservation,
    ) -> Result<FrameResult, EngineError> {
        let handle = self.session(session_id)?;
        self.apply(session_id, &handle, observation)
    }

    /// End a session and produce its report. Succeeds once per session.
    pub fn end_session(&self, session_id: &Uuid) -> Result<SessionReport, EngineError> {
        self.end_session_at(session_id, Utc::now())
    }

    /// End a session, measuring its duration up to `ended_at`
    pub fn end_session_at(
        &self,
        session_id: &Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<SessionReport, EngineError> {
        let session = self.store.remove(session_id)?;
        let report = ReportGenerator::generate(&session, ended_at);
        info!(
            session_id = %session_id,
            frames = report.frames,
            duration_seconds = report.duration_seconds,
            "session ended"
        );
        Ok(report)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Ids of live sessions
    pub fn active_sessions(&self) -> Vec<Uuid> {
        self.store.ids()
    }

    pub fn is_active(&self, session_id: &Uuid) -> bool {
        self.store.contains(session_id)
    }

    fn session(&self, session_id: &Uuid) -> Result<SessionHandle, EngineError> {
        self.store
            .get(session_id)
            .map_err(|_| EngineError::InvalidSession(session_id.to_string()))
    }

    /// Classify, measure, then lock the session only for the update itself.
    ///
    /// The session may have ended while the classifiers ran; its handle is
    /// then empty and the frame is rejected.
    fn apply(
        &self,
        session_id: &Uuid,
        handle: &SessionHandle,
        observation: &FrameObservation,
    ) -> Result<FrameResult, EngineError> {
        let classified = self.classify(observation);
        let result = lock_session(handle)
            .as_mut()
            .map(|session| session.apply(&classified))
            .ok_or_else(|| EngineError::InvalidSession(session_id.to_string()))?;
        debug!(
            session_id = %session_id,
            label = result.engagement_label.as_str(),
            ear = result.ear,
            mar = result.mar,
            blinks = result.blink_count,
            yawns = result.yawns,
            frames = result.frames_total,
            "frame aggregated"
        );
        Ok(result)
    }

    fn classify(&self, observation: &FrameObservation) -> ClassifiedFrame {
        ClassifiedFrame {
            captured_at: observation.captured_at,
            face: Normalizer::classify(observation.face_probability, self.config.engaged_cutoff),
            ratios: observation
                .landmarks
                .as_ref()
                .map(|lm| face_ratios(lm, observation.width, observation.height)),
            phone_detected: observation.phone_detected,
        }
    }

    /// Invoke each collaborator once, mapping failures to no detection
    fn observe_input(&self, session_id: &Uuid, input: FrameInput) -> FrameObservation {
        let FrameInput {
            frame,
            landmarks,
            face_region,
            captured_at,
        } = input;
        let c = &self.collaborators;

        let region: Option<FaceRegion> = face_region.or_else(|| {
            let detector = c.face_detector.as_ref()?;
            match detector.locate(&frame) {
                Ok(regions) => largest_face(&regions),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "face detection failed");
                    None
                }
            }
        });

        let face_probability = match (region, c.face_classifier.as_ref()) {
            (Some(region), Some(classifier)) => match classifier.classify(&frame, &region) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "face classification failed");
                    None
                }
            },
            _ => None,
        };

        let landmarks = landmarks.or_else(|| {
            let extractor = c.landmark_extractor.as_ref()?;
            extractor.extract(&frame).unwrap_or_else(|e| {
                warn!(session_id = %session_id, error = %e, "landmark extraction failed");
                None
            })
        });

        let phone_detected = match c.object_detector.as_ref() {
            Some(detector) => detector.detect_phone(&frame).unwrap_or_else(|e| {
                warn!(session_id = %session_id, error = %e, "phone detection failed");
                false
            }),
            None => false,
        };

        FrameObservation {
            captured_at: captured_at.unwrap_or_else(Utc::now),
            width: frame.width,
            height: frame.height,
            face_probability,
            landmarks,
            phone_detected,
        }
    }
}

/// Parse a session id received as text; `None` if it is not a UUID.
///
/// Such an id cannot name a live session, so callers report it the same way
/// as an unknown one.
pub fn parse_session_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::geometry::tests::mesh;
    use crate::types::{EngagementLabel, FaceLandmarks, Frame};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::Barrier;

    struct FixedFace(f64);

    impl FaceClassifier for FixedFace {
        fn classify(&self, _frame: &Frame, _region: &FaceRegion) -> Result<f64, ClassifierError> {
            Ok(self.0)
        }
    }

    struct OneFace;

    impl FaceDetector for OneFace {
        fn locate(&self, frame: &Frame) -> Result<Vec<FaceRegion>, ClassifierError> {
            Ok(vec![FaceRegion {
                x: 0,
                y: 0,
                width: frame.width / 2,
                height: frame.height / 2,
            }])
        }
    }

    struct FixedMesh(FaceLandmarks);

    impl LandmarkExtractor for FixedMesh {
        fn extract(&self, _frame: &Frame) -> Result<Option<FaceLandmarks>, ClassifierError> {
            Ok(Some(self.0.clone()))
        }
    }

    struct AlwaysPhone;

    impl ObjectDetector for AlwaysPhone {
        fn detect_phone(&self, _frame: &Frame) -> Result<bool, ClassifierError> {
            Ok(true)
        }
    }

    struct Failing;

    impl FaceDetector for Failing {
        fn locate(&self, _frame: &Frame) -> Result<Vec<FaceRegion>, ClassifierError> {
            Err(ClassifierError::InvalidImage("truncated".to_string()))
        }
    }

    impl FaceClassifier for Failing {
        fn classify(&self, _frame: &Frame, _region: &FaceRegion) -> Result<f64, ClassifierError> {
            Err(ClassifierError::Inference("tensor shape mismatch".to_string()))
        }
    }

    impl LandmarkExtractor for Failing {
        fn extract(&self, _frame: &Frame) -> Result<Option<FaceLandmarks>, ClassifierError> {
            Err(ClassifierError::Unavailable("mesh runtime".to_string()))
        }
    }

    impl ObjectDetector for Failing {
        fn detect_phone(&self, _frame: &Frame) -> Result<bool, ClassifierError> {
            Err(ClassifierError::Inference("nms failed".to_string()))
        }
    }

    fn frame() -> Frame {
        Frame::new(100, 100, vec![0; 30_000])
    }

    fn engine_with(collaborators: Collaborators) -> EngagementEngine {
        EngagementEngine::new().with_collaborators(collaborators)
    }

    #[test]
    fn test_analyze_frame_runs_collaborators() {
        let engine = engine_with(
            Collaborators::new()
                .with_face_detector(OneFace)
                .with_face_classifier(FixedFace(0.2))
                .with_landmark_extractor(FixedMesh(mesh(1.0, 0.0)))
                .with_object_detector(AlwaysPhone),
        );
        let id = engine.start_session(15);

        let result = engine.analyze_frame(&id, FrameInput::new(frame())).unwrap();
        assert_eq!(result.engagement_label, EngagementLabel::NotEngaged);
        assert_eq!(result.engagement_prob, 0.8);
        assert!(result.phone_detected);
        assert_eq!(result.ear, 1.0);
        assert_eq!(result.frames_total, 1);
    }

    #[test]
    fn test_supplied_region_and_landmarks_skip_collaborators() {
        // The failing collaborators would turn this into a "No Face" frame
        let engine = engine_with(
            Collaborators::new()
                .with_face_detector(Failing)
                .with_face_classifier(FixedFace(0.9))
                .with_landmark_extractor(Failing),
        );
        let id = engine.start_session(0);
        let input = FrameInput::new(frame())
            .with_face_region(FaceRegion {
                x: 10,
                y: 10,
                width: 50,
                height: 50,
            })
            .with_landmarks(mesh(0.3, 0.0));

        let result = engine.analyze_frame(&id, input).unwrap();
        assert_eq!(result.engagement_label, EngagementLabel::Engaged);
        assert_eq!(result.engagement_prob, 0.9);
        assert_eq!(result.ear, 0.3);
    }

    #[test]
    fn test_collaborator_failures_degrade_to_no_detection() {
        let failing = engine_with(
            Collaborators::new()
                .with_face_detector(Failing)
                .with_face_classifier(Failing)
                .with_landmark_extractor(Failing)
                .with_object_detector(Failing),
        );
        let id = failing.start_session(0);

        let result = failing.analyze_frame(&id, FrameInput::new(frame())).unwrap();
        assert_eq!(
            result,
            FrameResult {
                engagement_label: EngagementLabel::NoFace,
                engagement_prob: 0.0,
                phone_detected: false,
                ear: 0.0,
                mar: 0.0,
                blink_count: 0,
                yawns: 0,
                frames_total: 1,
            }
        );
    }

    #[test]
    fn test_classifier_failure_with_region_is_no_face() {
        let engine = engine_with(
            Collaborators::new()
                .with_face_detector(OneFace)
                .with_face_classifier(Failing),
        );
        let id = engine.start_session(0);
        let result = engine.analyze_frame(&id, FrameInput::new(frame())).unwrap();
        assert_eq!(result.engagement_label, EngagementLabel::NoFace);

        let report = engine.end_session(&id).unwrap();
        assert_eq!(report.engaged_pct, 0.0);
        assert_eq!(report.not_engaged_pct, 0.0);
    }

    #[test]
    fn test_unknown_session_is_invalid() {
        let engine = EngagementEngine::new();
        let ghost = Uuid::new_v4();

        let err = engine
            .analyze_frame(&ghost, FrameInput::new(frame()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSession(_)));
        assert_eq!(engine.session_count(), 0);
        assert!(!engine.is_active(&ghost));
    }

    #[test]
    fn test_end_session_once() {
        let engine = EngagementEngine::new();
        let id = engine.start_session(5);

        assert!(engine.end_session(&id).is_ok());
        assert!(matches!(
            engine.end_session(&id),
            Err(EngineError::SessionNotFound(_))
        ));
        assert!(matches!(
            engine.analyze_frame(&id, FrameInput::new(frame())),
            Err(EngineError::InvalidSession(_))
        ));
    }

    #[test]
    fn test_observe_yawn_window_end_to_end() {
        let engine = EngagementEngine::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let id = engine.start_session_at(0, t0);

        // Mouth wide open for the whole smoothing window at each timestamp
        let mut last = None;
        for secs in [0, 10, 30, 70] {
            let observation = FrameObservation {
                captured_at: t0 + Duration::seconds(secs),
                width: 100,
                height: 100,
                face_probability: Some(0.9),
                landmarks: Some(mesh(1.0, 1.0)),
                phone_detected: false,
            };
            last = Some(engine.observe(&id, &observation).unwrap());
        }
        assert_eq!(last.unwrap().yawns, 2);

        let report = engine
            .end_session_at(&id, t0 + Duration::seconds(75))
            .unwrap();
        assert_eq!(report.yawns, 2);
        assert_eq!(report.duration_seconds, 75.0);
    }

    /// Holds the analyzing thread inside face detection until released
    struct GatedFace {
        entered: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl FaceDetector for GatedFace {
        fn locate(&self, frame: &Frame) -> Result<Vec<FaceRegion>, ClassifierError> {
            self.entered.wait();
            self.release.wait();
            OneFace.locate(frame)
        }
    }

    #[test]
    fn test_frame_in_flight_when_session_ends_is_rejected() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let engine = engine_with(
            Collaborators::new()
                .with_face_detector(GatedFace {
                    entered: Arc::clone(&entered),
                    release: Arc::clone(&release),
                })
                .with_face_classifier(FixedFace(0.9)),
        );
        let id = engine.start_session(0);

        std::thread::scope(|s| {
            let analysis = s.spawn(|| engine.analyze_frame(&id, FrameInput::new(frame())));

            entered.wait();
            let report = engine.end_session(&id).unwrap();
            release.wait();

            let outcome = analysis.join().unwrap();
            assert!(matches!(outcome, Err(EngineError::InvalidSession(_))));
            assert_eq!(report.frames, 0);
        });
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn test_hundred_engaged_frames() {
        let engine = engine_with(
            Collaborators::new()
                .with_face_detector(OneFace)
                .with_face_classifier(FixedFace(0.9))
                .with_landmark_extractor(FixedMesh(mesh(0.5, 0.0))),
        );
        let id = engine.start_session(1);

        for _ in 0..100 {
            engine.analyze_frame(&id, FrameInput::new(frame())).unwrap();
        }
        let report = engine.end_session(&id).unwrap();

        assert_eq!(report.frames, 100);
        assert_eq!(report.engaged_pct, 100.0);
        assert_eq!(report.not_engaged_pct, 0.0);
        assert_eq!(report.phone_pct, 0.0);
        assert_eq!(report.blinks, 0);
        assert_eq!(report.yawns, 0);
    }

    #[test]
    fn test_concurrent_end_session_single_report() {
        let engine = EngagementEngine::new();
        let id = engine.start_session(0);

        let successes = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| engine.end_session(&id).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(successes, 1);
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn test_sessions_are_isolated_across_threads() {
        let engine = EngagementEngine::new();
        let ids: Vec<Uuid> = (0..4).map(|_| engine.start_session(0)).collect();

        std::thread::scope(|s| {
            for (n, id) in ids.iter().enumerate() {
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..(n + 1) * 10 {
                        let observation = FrameObservation {
                            captured_at: Utc::now(),
                            width: 100,
                            height: 100,
                            face_probability: Some(0.9),
                            landmarks: Some(mesh(0.5, 0.0)),
                            phone_detected: n % 2 == 0,
                        };
                        engine.observe(id, &observation).unwrap();
                    }
                });
            }
        });

        for (n, id) in ids.iter().enumerate() {
            let report = engine.end_session(id).unwrap();
            assert_eq!(report.frames, ((n + 1) * 10) as u64);
            let expected_phone = if n % 2 == 0 { 100.0 } else { 0.0 };
            assert_eq!(report.phone_pct, expected_phone);
        }
    }

    #[test]
    fn test_serialized_extractor_in_engine() {
        use crate::adapters::{SerializedExtractor, StatefulLandmarkModel};

        struct Mesh(FaceLandmarks);

        impl StatefulLandmarkModel for Mesh {
            fn process(&mut self, _frame: &Frame) -> Result<Option<FaceLandmarks>, ClassifierError> {
                Ok(Some(self.0.clone()))
            }
        }

        let engine = engine_with(
            Collaborators::new()
                .with_face_detector(OneFace)
                .with_face_classifier(FixedFace(0.6))
                .with_landmark_extractor(SerializedExtractor::new(Mesh(mesh(0.3, 0.4)))),
        );
        let id = engine.start_session(0);
        let result = engine.analyze_frame(&id, FrameInput::new(frame())).unwrap();
        assert_eq!(result.ear, 0.3);
        assert_eq!(result.mar, 0.4);
    }

    #[test]
    fn test_config_thresholds_apply() {
        let config = EngineConfig {
            engaged_cutoff: 0.8,
            ..EngineConfig::default()
        };
        let engine = EngagementEngine::with_config(config).unwrap();
        let id = engine.start_session(0);
        let observation = FrameObservation {
            captured_at: Utc::now(),
            width: 640,
            height: 480,
            face_probability: Some(0.7),
            landmarks: None,
            phone_detected: false,
        };
        let result = engine.observe(&id, &observation).unwrap();
        assert_eq!(result.engagement_label, EngagementLabel::NotEngaged);
        assert_eq!(result.engagement_prob, 0.3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            smooth_window: 0,
            ..EngineConfig::default()
        };
        assert!(EngagementEngine::with_config(config).is_err());
    }

    #[test]
    fn test_parse_session_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_session_id(&id.to_string()), Some(id));
        assert_eq!(parse_session_id(&format!(" {id}\n")), Some(id));
        assert_eq!(parse_session_id("not-a-session"), None);
    }
}
