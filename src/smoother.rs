//! Temporal smoothing of facial ratios
//!
//! Each session keeps a short rolling window of raw EAR and MAR values. The
//! moving average of the window is what the event detector sees, which damps
//! single-frame landmark jitter.

use std::collections::VecDeque;

use crate::config::SMOOTH_WINDOW;
use crate::geometry::FaceRatios;

/// Fixed-capacity FIFO window with a moving average
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(SMOOTH_WINDOW)
    }
}

impl RollingWindow {
    /// Create a window holding at most `capacity` values (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest once full, and return the new mean
    pub fn push(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
        self.mean().unwrap_or(value)
    }

    /// Arithmetic mean of the current contents
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Paired EAR/MAR windows for one session
#[derive(Debug, Clone, Default)]
pub struct RatioSmoother {
    ear: RollingWindow,
    mar: RollingWindow,
}

impl RatioSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            ear: RollingWindow::new(window),
            mar: RollingWindow::new(window),
        }
    }

    /// Feed one frame's raw ratios and return the smoothed ratios
    pub fn push(&mut self, raw: FaceRatios) -> FaceRatios {
        FaceRatios {
            ear: self.ear.push(raw.ear),
            mar: self.mar.push(raw.mar),
        }
    }

    pub fn ear_window(&self) -> &RollingWindow {
        &self.ear
    }

    pub fn mar_window(&self) -> &RollingWindow {
        &self.mar
    }
}
