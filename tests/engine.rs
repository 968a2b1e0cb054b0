use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use engage_flux::{
    EngagementEngine, EngagementLabel, EngineError, FaceLandmarks, FrameObservation, Point,
};

const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// 478-point mesh whose EAR on a square frame equals `eye_open`
fn mesh(eye_open: f64) -> FaceLandmarks {
    let mut points = vec![Point::new(0.5, 0.5); 478];
    for (eye, cx) in [(LEFT_EYE, 0.35), (RIGHT_EYE, 0.65)] {
        points[eye[0]] = Point::new(cx - 0.05, 0.4);
        points[eye[3]] = Point::new(cx + 0.05, 0.4);
        points[eye[1]] = Point::new(cx - 0.02, 0.4 - eye_open * 0.05);
        points[eye[5]] = Point::new(cx - 0.02, 0.4 + eye_open * 0.05);
        points[eye[2]] = Point::new(cx + 0.02, 0.4 - eye_open * 0.05);
        points[eye[4]] = Point::new(cx + 0.02, 0.4 + eye_open * 0.05);
    }
    // Lips closed: corners apart, inner lips on the same point
    points[13] = Point::new(0.5, 0.7);
    points[14] = Point::new(0.5, 0.7);
    points[78] = Point::new(0.45, 0.7);
    points[308] = Point::new(0.55, 0.7);
    FaceLandmarks::new(points)
}

fn observation(
    at: chrono::DateTime<Utc>,
    probability: Option<f64>,
    eye_open: f64,
) -> FrameObservation {
    FrameObservation {
        captured_at: at,
        width: 100,
        height: 100,
        face_probability: probability,
        landmarks: Some(mesh(eye_open)),
        phone_detected: false,
    }
}

#[test]
fn steady_engaged_session() {
    let engine = EngagementEngine::new();
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let id = engine.start_session_at(30, t0);

    for i in 0..100 {
        let result = engine
            .observe(&id, &observation(t0 + Duration::milliseconds(i * 100), Some(0.95), 0.5))
            .unwrap();
        assert_eq!(result.engagement_label, EngagementLabel::Engaged);
        assert_eq!(result.ear, 0.5);
        assert_eq!(result.mar, 0.0);
    }

    let report = engine.end_session_at(&id, t0 + Duration::seconds(10)).unwrap();
    assert_eq!(report.frames, 100);
    assert_eq!(report.engaged_pct, 100.0);
    assert_eq!(report.not_engaged_pct, 0.0);
    assert_eq!(report.blinks, 0);
    assert_eq!(report.yawns, 0);
    assert_eq!(report.duration_seconds, 10.0);
    assert_eq!(report.timer_minutes, 30);
}

#[test]
fn blink_counted_once_per_closure() {
    let engine = EngagementEngine::new();
    let t0 = Utc::now();
    let id = engine.start_session_at(0, t0);

    // Open, then closed long enough for the smoothed EAR to cross 0.2, then open again
    let pattern = [0.4; 5]
        .into_iter()
        .chain([0.0; 8])
        .chain([0.4; 8])
        .chain([0.0; 8]);
    let mut last = None;
    for (i, eye_open) in pattern.enumerate() {
        let at = t0 + Duration::milliseconds(i as i64 * 100);
        last = Some(engine.observe(&id, &observation(at, Some(0.9), eye_open)).unwrap());
    }
    assert_eq!(last.unwrap().blink_count, 2);
}

#[test]
fn unknown_session_creates_nothing() {
    let engine = EngagementEngine::new();
    let ghost = uuid::Uuid::new_v4();

    let err = engine
        .observe(&ghost, &observation(Utc::now(), Some(0.9), 0.5))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSession(_)));
    assert_eq!(engine.session_count(), 0);
    assert!(matches!(
        engine.end_session(&ghost),
        Err(EngineError::SessionNotFound(_))
    ));
}

#[test]
fn racing_end_session_yields_one_report() {
    let engine = Arc::new(EngagementEngine::new());
    let id = engine.start_session(5);
    engine
        .observe(&id, &observation(Utc::now(), Some(0.9), 0.5))
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.end_session(&id))
        })
        .collect();
    let reports: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap().ok())
        .collect();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].frames, 1);
    assert!(!engine.is_active(&id));
}

#[test]
fn concurrent_sessions_do_not_interfere() {
    let engine = Arc::new(EngagementEngine::new());

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let id = engine.start_session(0);
                let probability = if n % 2 == 0 { 0.9 } else { 0.1 };
                for _ in 0..50 {
                    engine
                        .observe(&id, &observation(Utc::now(), Some(probability), 0.5))
                        .unwrap();
                }
                (n, engine.end_session(&id).unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (n, report) = handle.join().unwrap();
        assert_eq!(report.frames, 50);
        if n % 2 == 0 {
            assert_eq!(report.engaged_pct, 100.0);
        } else {
            assert_eq!(report.not_engaged_pct, 100.0);
        }
    }
    assert_eq!(engine.session_count(), 0);
}
