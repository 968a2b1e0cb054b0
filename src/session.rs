//! Per-session engagement state
//!
//! A `Session` owns the counters, smoothing windows and event detectors for
//! one monitored session. It is mutated only through `apply`, one frame at a
//! time, while the caller holds the session's lock.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::events::{BlinkLatch, YawnCounter};
use crate::geometry::FaceRatios;
use crate::normalizer::round_to;
use crate::smoother::RatioSmoother;
use crate::types::{EngagementLabel, FaceClassification, FrameResult};

/// A frame after classification and geometry, ready to be aggregated
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFrame {
    pub captured_at: DateTime<Utc>,
    pub face: FaceClassification,
    /// Raw ratios; `None` when no landmarks were available
    pub ratios: Option<FaceRatios>,
    pub phone_detected: bool,
}

/// State for one monitored session
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    start_time: DateTime<Utc>,
    timer_minutes: u32,
    frame_count: u64,
    engaged_count: u64,
    not_engaged_count: u64,
    phone_count: u64,
    smoother: RatioSmoother,
    blinks: BlinkLatch,
    yawns: YawnCounter,
}

impl Session {
    pub fn new(
        id: Uuid,
        start_time: DateTime<Utc>,
        timer_minutes: u32,
        config: &EngineConfig,
    ) -> Self {
        Self {
            id,
            start_time,
            timer_minutes,
            frame_count: 0,
            engaged_count: 0,
            not_engaged_count: 0,
            phone_count: 0,
            smoother: RatioSmoother::new(config.smooth_window),
            blinks: BlinkLatch::new(config.ear_threshold),
            yawns: YawnCounter::new(config.yawn_threshold, config.yawn_window_secs),
        }
    }

    /// Aggregate one frame into the session and build its result.
    ///
    /// Frames without landmarks leave the windows and the blink latch alone
    /// and report EAR/MAR as 0.
    pub fn apply(&mut self, frame: &ClassifiedFrame) -> FrameResult {
        let smoothed = match frame.ratios {
            Some(raw) => {
                let smoothed = self.smoother.push(raw);
                self.blinks.update(smoothed.ear);
                self.yawns.update(smoothed.mar, frame.captured_at);
                smoothed
            }
            None => {
                self.yawns.prune(frame.captured_at);
                FaceRatios { ear: 0.0, mar: 0.0 }
            }
        };

        self.frame_count += 1;
        match frame.face.label {
            EngagementLabel::Engaged => self.engaged_count += 1,
            EngagementLabel::NotEngaged => self.not_engaged_count += 1,
            EngagementLabel::NoFace => {}
        }
        if frame.phone_detected {
            self.phone_count += 1;
        }

        FrameResult {
            engagement_label: frame.face.label,
            engagement_prob: round_to(frame.face.confidence, 3),
            phone_detected: frame.phone_detected,
            ear: round_to(smoothed.ear, 3),
            mar: round_to(smoothed.mar, 3),
            blink_count: self.blinks.count(),
            yawns: self.yawns.count(),
            frames_total: self.frame_count,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn timer_minutes(&self) -> u32 {
        self.timer_minutes
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn engaged_count(&self) -> u64 {
        self.engaged_count
    }

    pub fn not_engaged_count(&self) -> u64 {
        self.not_engaged_count
    }

    pub fn phone_count(&self) -> u64 {
        self.phone_count
    }

    pub fn blink_count(&self) -> u64 {
        self.blinks.count()
    }

    /// True while the eyes are currently classified closed
    pub fn blink_latched(&self) -> bool {
        self.blinks.is_closed()
    }

    pub fn yawn_count(&self) -> usize {
        self.yawns.count()
    }

    pub fn smoother(&self) -> &RatioSmoother {
        &self.smoother
    }
}
