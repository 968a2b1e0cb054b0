//! Blink and yawn event detection
//!
//! Both detectors consume smoothed ratios from the `smoother` module.
//!
//! - Blinks are counted on the falling edge of EAR through the threshold, so a
//!   closed-eye interval spanning many frames is one blink.
//! - Yawns are counted per qualifying frame over a trailing time window. There
//!   is no debounce: a sustained open mouth adds one entry per frame.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::config::{EAR_THRESHOLD, YAWN_THRESHOLD, YAWN_WINDOW_SECS};

/// Eye state tracked by the blink latch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EyeState {
    #[default]
    Open,
    Closed,
}

/// Two-state latch counting Open -> Closed transitions
#[derive(Debug, Clone)]
pub struct BlinkLatch {
    state: EyeState,
    count: u64,
    threshold: f64,
}

impl Default for BlinkLatch {
    fn default() -> Self {
        Self::new(EAR_THRESHOLD)
    }
}

impl BlinkLatch {
    pub fn new(threshold: f64) -> Self {
        Self {
            state: EyeState::Open,
            count: 0,
            threshold,
        }
    }

    /// Feed a smoothed EAR. Returns true when this value completed a new blink.
    pub fn update(&mut self, ear: f64) -> bool {
        match self.state {
            EyeState::Open if ear < self.threshold => {
                self.state = EyeState::Closed;
                self.count += 1;
                true
            }
            EyeState::Closed if ear >= self.threshold => {
                self.state = EyeState::Open;
                false
            }
            _ => false,
        }
    }

    pub fn state(&self) -> EyeState {
        self.state
    }

    /// True while the eyes are classified closed
    pub fn is_closed(&self) -> bool {
        self.state == EyeState::Closed
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Rolling count of yawn detections over a trailing window
#[derive(Debug, Clone)]
pub struct YawnCounter {
    timestamps: VecDeque<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    threshold: f64,
    window_secs: i64,
}

impl Default for YawnCounter {
    fn default() -> Self {
        Self::new(YAWN_THRESHOLD, YAWN_WINDOW_SECS)
    }
}

impl YawnCounter {
    pub fn new(threshold: f64, window_secs: i64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            latest: None,
            threshold,
            window_secs,
        }
    }

    /// Feed a smoothed MAR observed at `at`. Returns the rolling count.
    pub fn update(&mut self, mar: f64, at: DateTime<Utc>) -> usize {
        if mar > self.threshold {
            self.record(at);
        }
        self.prune(at)
    }

    /// Drop detections that fell out of the window relative to the newest frame
    /// seen so far (including `now`). Returns the rolling count.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let latest = match self.latest {
            Some(latest) if latest > now => latest,
            _ => now,
        };
        self.latest = Some(latest);

        let window = Duration::seconds(self.window_secs);
        while let Some(oldest) = self.timestamps.front() {
            if latest - *oldest >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        self.timestamps.len()
    }

    /// Current rolling count
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.timestamps.iter()
    }

    // Frames for one session can be applied slightly out of capture order, so
    // insert in place to keep the queue sorted for front pruning.
    fn record(&mut self, at: DateTime<Utc>) {
        let position = self.timestamps.partition_point(|t| *t <= at);
        self.timestamps.insert(position, at);
    }
}
