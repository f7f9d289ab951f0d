//! Eye aspect ratio (EAR): a scalar measure of eyelid openness.

use thiserror::Error;

use crate::landmarks::{EyePoints, LandmarkFrame, Point};

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("degenerate eye contour: corner span is zero or not representable")]
    Degenerate,
}

/// Compute the eye aspect ratio of one eye contour.
///
/// ```text
/// A = |p1 - p5|
/// B = |p2 - p4|
/// C = |p0 - p3|
/// EAR = (A + B) / (2 * C)
/// ```
///
/// Computed in `f64`. Returns [`GeometryError::Degenerate`] when the corner
/// points coincide or the ratio is not finite.
pub fn eye_aspect_ratio(eye: &EyePoints) -> Result<f64, GeometryError> {
    let p = eye.points();
    let a = distance(p[1], p[5]);
    let b = distance(p[2], p[4]);
    let c = distance(p[0], p[3]);
    if c == 0.0 {
        return Err(GeometryError::Degenerate);
    }
    let ear = (a + b) / (2.0 * c);
    if !ear.is_finite() {
        return Err(GeometryError::Degenerate);
    }
    Ok(ear)
}

/// Mean of the left- and right-eye EAR for one frame.
pub fn frame_ear(frame: &LandmarkFrame) -> Result<f64, GeometryError> {
    let left = eye_aspect_ratio(&frame.left_eye())?;
    let right = eye_aspect_ratio(&frame.right_eye())?;
    Ok((left + right) / 2.0)
}

fn distance(a: Point, b: Point) -> f64 {
    let dx = f64::from(a.0) - f64::from(b.0);
    let dy = f64::from(a.1) - f64::from(b.1);
    dx.hypot(dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::frame_with_ear;

    #[test]
    fn test_known_geometry() {
        // Corners 4 px apart, lids 1.5 px above and below: A = B = 3, C = 4
        let eye = EyePoints([
            (0.0, 0.0),
            (1.0, -1.5),
            (3.0, -1.5),
            (4.0, 0.0),
            (3.0, 1.5),
            (1.0, 1.5),
        ]);
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert_eq!(ear, 0.75);
    }

    #[test]
    fn test_closed_eye_is_zero() {
        let eye = EyePoints([
            (0.0, 0.0),
            (1.0, 0.0),
            (3.0, 0.0),
            (4.0, 0.0),
            (3.0, 0.0),
            (1.0, 0.0),
        ]);
        assert_eq!(eye_aspect_ratio(&eye).unwrap(), 0.0);
    }

    #[test]
    fn test_coincident_corners_rejected() {
        let eye = EyePoints([
            (2.0, 2.0),
            (1.0, 0.0),
            (3.0, 0.0),
            (2.0, 2.0),
            (3.0, 4.0),
            (1.0, 4.0),
        ]);
        assert_eq!(eye_aspect_ratio(&eye), Err(GeometryError::Degenerate));
    }

    #[test]
    fn test_all_points_coincident_rejected() {
        let eye = EyePoints([(5.0, 5.0); 6]);
        assert_eq!(eye_aspect_ratio(&eye), Err(GeometryError::Degenerate));
    }

    #[test]
    fn test_far_corners_are_not_a_closed_eye() {
        // squaring a 1e20 span overflows f32 and would read as EAR 0
        let eye = EyePoints([
            (0.0, 0.0),
            (3e19, -1.5e19),
            (7e19, -1.5e19),
            (1e20, 0.0),
            (7e19, 1.5e19),
            (3e19, 1.5e19),
        ]);
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert!((ear - 0.3).abs() < 1e-6, "got {ear}");
    }

    #[test]
    fn test_extreme_spans_stay_finite() {
        let max = f32::MAX;
        let eye = EyePoints([
            (-max, 0.0),
            (0.0, -max),
            (0.0, -max),
            (max, 0.0),
            (0.0, max),
            (0.0, max),
        ]);
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert!(ear.is_finite());
        assert!((ear - 1.0).abs() < 1e-9, "got {ear}");
    }

    #[test]
    fn test_frame_ear_averages_eyes() {
        let frame = frame_with_ear(0.3);
        let ear = frame_ear(&frame).unwrap();
        assert!((ear - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_frame_ear_propagates_degenerate_eye() {
        let mut points = frame_with_ear(0.3).points().to_vec();
        // collapse the left eye's outer corner onto its inner corner
        points[45] = points[42];
        let frame = LandmarkFrame::new(points).unwrap();
        assert_eq!(frame_ear(&frame), Err(GeometryError::Degenerate));
    }
}
