//! Facial geometry ratios
//!
//! Computes the eye aspect ratio (EAR) and mouth aspect ratio (MAR) from face
//! mesh landmarks. Landmarks are scaled to pixel units first so the ratios are
//! independent of the frame's aspect ratio.
//!
//! Any degenerate input (missing index, non-finite coordinate, zero horizontal
//! span) yields a ratio of 0. Callers must read 0 as "uninformative", not as
//! "eyes wide open".

use crate::error::DegenerateInput;
use crate::types::{FaceLandmarks, Point};

/// Left eye contour: outer corner, two upper lid points, inner corner, two lower lid points
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

/// Right eye contour, same ordering as `LEFT_EYE`
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// Inner lip top, inner lip bottom, left mouth corner, right mouth corner
pub const MOUTH: [usize; 4] = [13, 14, 78, 308];

/// Raw (unsmoothed) ratios for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRatios {
    pub ear: f64,
    pub mar: f64,
}

/// Compute both ratios for a face.
///
/// EAR is the mean of the left and right eye ratios.
pub fn face_ratios(landmarks: &FaceLandmarks, width: u32, height: u32) -> FaceRatios {
    let left = eye_aspect_ratio(landmarks, &LEFT_EYE, width, height);
    let right = eye_aspect_ratio(landmarks, &RIGHT_EYE, width, height);
    FaceRatios {
        ear: (left + right) / 2.0,
        mar: mouth_aspect_ratio(landmarks, width, height),
    }
}

/// Eye aspect ratio for a 6-point eye contour
///
/// Formula: `(|p1-p5| + |p2-p4|) / (2 * |p0-p3|)`
pub fn eye_aspect_ratio(
    landmarks: &FaceLandmarks,
    indices: &[usize; 6],
    width: u32,
    height: u32,
) -> f64 {
    try_eye_aspect_ratio(landmarks, indices, width, height).unwrap_or(0.0)
}

/// Mouth aspect ratio from the inner lip gap and mouth corners
///
/// Formula: `|top-bottom| / |left-right|`
pub fn mouth_aspect_ratio(landmarks: &FaceLandmarks, width: u32, height: u32) -> f64 {
    try_mouth_aspect_ratio(landmarks, width, height).unwrap_or(0.0)
}

fn try_eye_aspect_ratio(
    landmarks: &FaceLandmarks,
    indices: &[usize; 6],
    width: u32,
    height: u32,
) -> Result<f64, DegenerateInput> {
    let mut p = [Point::new(0.0, 0.0); 6];
    for (slot, &index) in p.iter_mut().zip(indices.iter()) {
        *slot = scaled_point(landmarks, index, width, height)?;
    }

    let a = p[1].distance(&p[5]);
    let b = p[2].distance(&p[4]);
    let c = p[0].distance(&p[3]);
    ratio(a + b, 2.0 * c)
}

fn try_mouth_aspect_ratio(
    landmarks: &FaceLandmarks,
    width: u32,
    height: u32,
) -> Result<f64, DegenerateInput> {
    let [top, bottom, left, right] = MOUTH;
    let top = scaled_point(landmarks, top, width, height)?;
    let bottom = scaled_point(landmarks, bottom, width, height)?;
    let left = scaled_point(landmarks, left, width, height)?;
    let right = scaled_point(landmarks, right, width, height)?;

    ratio(top.distance(&bottom), left.distance(&right))
}

fn scaled_point(
    landmarks: &FaceLandmarks,
    index: usize,
    width: u32,
    height: u32,
) -> Result<Point, DegenerateInput> {
    let point = landmarks
        .get(index)
        .ok_or(DegenerateInput::MissingLandmark(index))?;
    if !point.x.is_finite() || !point.y.is_finite() {
        return Err(DegenerateInput::NonFinite(index));
    }
    Ok(point.scaled(width as f64, height as f64))
}

fn ratio(numerator: f64, denominator: f64) -> Result<f64, DegenerateInput> {
    if denominator == 0.0 {
        return Err(DegenerateInput::ZeroSpan);
    }
    Ok(numerator / denominator)
}
