//! Drive one synthetic session through the engine and print its report

use chrono::{Duration, Utc};
use engage_flux::{EngagementEngine, FrameObservation};

fn main() {
    let engine = EngagementEngine::new();
    let start = Utc::now();
    let id = engine.start_session_at(1, start);

    // Ten seconds at 10 fps, looking away for the middle two seconds
    for i in 0..100 {
        let observation = FrameObservation {
            captured_at: start + Duration::milliseconds(i * 100),
            width: 640,
            height: 480,
            face_probability: Some(if (40..60).contains(&i) { 0.2 } else { 0.9 }),
            landmarks: None,
            phone_detected: i % 25 == 0,
        };
        if let Err(e) = engine.observe(&id, &observation) {
            eprintln!("Error: {e}");
            return;
        }
    }

    match engine
        .end_session_at(&id, start + Duration::seconds(10))
        .and_then(|report| Ok(serde_json::to_string_pretty(&report)?))
    {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: {e}"),
    }
}
