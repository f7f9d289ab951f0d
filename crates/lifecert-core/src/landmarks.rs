//! 68-point facial landmark frames and the eye-contour views derived from them.
//!
//! Index convention follows the standard 68-point layout: the right eye
//! occupies indices 36–41 and the left eye 42–47. Each eye's six points run
//! corner, upper lid ×2, corner, lower lid ×2.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 2D image-space point `(x, y)`.
pub type Point = (f32, f32);

/// Number of points in a full facial landmark frame.
pub const LANDMARK_COUNT: usize = 68;

/// Landmark indices of the subject's right eye contour.
pub const RIGHT_EYE: Range<usize> = 36..42;

/// Landmark indices of the subject's left eye contour.
pub const LEFT_EYE: Range<usize> = 42..48;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("landmark frame has {0} points (expected 68)")]
    WrongPointCount(usize),
    #[error("landmark {index} is not finite")]
    NonFinitePoint { index: usize },
}

/// One frame's worth of facial landmarks. Immutable once constructed.
///
/// Serializes as a JSON array of `[x, y]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct LandmarkFrame {
    points: Vec<Point>,
}

impl LandmarkFrame {
    /// Build a frame from exactly 68 finite points.
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongPointCount(points.len()));
        }
        if let Some(index) = points
            .iter()
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(LandmarkError::NonFinitePoint { index });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn right_eye(&self) -> EyePoints {
        self.eye(RIGHT_EYE)
    }

    pub fn left_eye(&self) -> EyePoints {
        self.eye(LEFT_EYE)
    }

    fn eye(&self, range: Range<usize>) -> EyePoints {
        let mut pts = [(0.0, 0.0); 6];
        pts.copy_from_slice(&self.points[range]);
        EyePoints(pts)
    }
}

impl TryFrom<Vec<Point>> for LandmarkFrame {
    type Error = LandmarkError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<LandmarkFrame> for Vec<Point> {
    fn from(frame: LandmarkFrame) -> Self {
        frame.points
    }
}

/// Six ordered points describing one eye contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePoints(pub [Point; 6]);

impl EyePoints {
    pub fn points(&self) -> &[Point; 6] {
        &self.0
    }
}

/// Synthetic frame whose eyes both measure `ear`: corners 10 px apart,
/// lids symmetric about the corner line.
#[cfg(test)]
pub(crate) fn frame_with_ear(ear: f64) -> LandmarkFrame {
    let half_gap = (ear * 5.0) as f32;
    let mut points = vec![(0.0, 0.0); LANDMARK_COUNT];
    for (origin, range) in [(100.0f32, RIGHT_EYE), (140.0f32, LEFT_EYE)] {
        let eye = [
            (origin, 0.0),
            (origin + 3.0, -half_gap),
            (origin + 7.0, -half_gap),
            (origin + 10.0, 0.0),
            (origin + 7.0, half_gap),
            (origin + 3.0, half_gap),
        ];
        points[range].copy_from_slice(&eye);
    }
    LandmarkFrame { points }
}
