//! Session report generation
//!
//! Converts a finished session's counters into normalized statistics. Reports
//! are computed once, when the session is removed from the store, and are not
//! persisted here.

use chrono::{DateTime, Local, Utc};

use crate::error::EngineError;
use crate::normalizer::round_to;
use crate::session::Session;
use crate::types::SessionReport;

/// Wall-clock format of `SessionReport::start_time`
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Report generator for ended sessions
pub struct ReportGenerator;

impl ReportGenerator {
    /// Build the report for `session` as of `ended_at`.
    ///
    /// Percentages divide by `max(frames, 1)` so a session without frames
    /// reports 0% everywhere. The yawn count is the rolling window as of the
    /// last processed frame, not a lifetime total.
    pub fn generate(session: &Session, ended_at: DateTime<Utc>) -> SessionReport {
        let frames = session.frame_count();
        let denominator = frames.max(1) as f64;
        let pct = |count: u64| round_to(count as f64 / denominator * 100.0, 2);

        let engaged_pct = pct(session.engaged_count());
        let mut not_engaged_pct = pct(session.not_engaged_count());
        // Independent rounding of two halves can overshoot 100 by 0.01
        if engaged_pct + not_engaged_pct > 100.0 {
            not_engaged_pct = round_to(100.0 - engaged_pct, 2);
        }

        let elapsed_ms = (ended_at - session.start_time()).num_milliseconds().max(0);

        SessionReport {
            session_id: session.id().to_string(),
            start_time: session
                .start_time()
                .with_timezone(&Local)
                .format(START_TIME_FORMAT)
                .to_string(),
            start_time_utc: session.start_time(),
            ended_at_utc: ended_at,
            duration_seconds: round_to(elapsed_ms as f64 / 1000.0, 1),
            timer_minutes: session.timer_minutes(),
            frames,
            engaged_pct,
            not_engaged_pct,
            phone_pct: pct(session.phone_count()),
            blinks: session.blink_count(),
            yawns: session.yawn_count(),
        }
    }

    /// Encode a report to JSON
    pub fn encode_to_json(report: &SessionReport) -> Result<String, EngineError> {
        Ok(serde_json::to_string(report)?)
    }
}
