//! Capture-driven evaluation: materializes embeddings and landmarks through
//! injected [`Embedder`] / [`LandmarkLocator`] capabilities, then hands off
//! to [`DecisionEngine::evaluate`].

use image::{DynamicImage, GrayImage};
use thiserror::Error;

use crate::collaborator::{CollaboratorError, Embedder, LandmarkLocator};
use crate::decision::{DecisionEngine, EvaluateError, VerificationOutcome};
use crate::similarity::Embedding;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The still image submitted for matching contains no face. This is an
    /// upload problem, not liveness evidence.
    #[error("no face detected in {0} image")]
    NoFaceInImage(&'static str),
    #[error("collaborator failure: {0}")]
    Collaborator(#[source] CollaboratorError),
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
}

/// Decision engine bundled with the models that feed it.
pub struct CaptureEngine<E, L> {
    decision: DecisionEngine,
    embedder: E,
    locator: L,
}

impl<E: Embedder, L: LandmarkLocator> CaptureEngine<E, L> {
    pub fn new(decision: DecisionEngine, embedder: E, locator: L) -> Self {
        Self {
            decision,
            embedder,
            locator,
        }
    }

    pub fn decision(&self) -> &DecisionEngine {
        &self.decision
    }

    /// Extract the reference embedding stored at enrollment.
    pub fn enroll(&self, image: &DynamicImage) -> Result<Embedding, CaptureError> {
        embed(&self.embedder, image, "reference")
    }

    /// Run one attempt from raw captures against an enrolled reference.
    ///
    /// Frames where the locator finds no face are passed through as absent.
    /// A locator or embedder fault aborts the attempt.
    pub fn evaluate_capture(
        &self,
        reference: &Embedding,
        probe_image: &DynamicImage,
        frames: &[GrayImage],
    ) -> Result<VerificationOutcome, CaptureError> {
        let probe = embed(&self.embedder, probe_image, "probe")?;

        let landmarks = frames
            .iter()
            .map(|frame| self.locator.locate(frame))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CaptureError::Collaborator)?;

        tracing::debug!(
            frames = frames.len(),
            located = landmarks.iter().filter(|l| l.is_some()).count(),
            "capture: landmarks located"
        );

        Ok(self
            .decision
            .evaluate(&reference.values, &probe.values, &landmarks)?)
    }
}

fn embed<E: Embedder>(
    embedder: &E,
    image: &DynamicImage,
    role: &'static str,
) -> Result<Embedding, CaptureError> {
    embedder.embed(image).map_err(|e| match e {
        CollaboratorError::NoFaceDetected => CaptureError::NoFaceInImage(role),
        other => CaptureError::Collaborator(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{FailureReason, Verdict};
    use crate::landmarks::{frame_with_ear, LandmarkFrame};

    /// Embedder returning a fixed vector, or no face for 1×1 images.
    struct FixedEmbedder(Vec<f32>);

    impl Embedder for FixedEmbedder {
        fn embed(&self, image: &DynamicImage) -> Result<Embedding, CollaboratorError> {
            if image.width() == 1 {
                return Err(CollaboratorError::NoFaceDetected);
            }
            Ok(Embedding::new(self.0.clone()))
        }
    }

    struct DownEmbedder;

    impl Embedder for DownEmbedder {
        fn embed(&self, _: &DynamicImage) -> Result<Embedding, CollaboratorError> {
            Err(CollaboratorError::Unavailable {
                service: "embedder",
                reason: "connection refused".into(),
            })
        }
    }

    /// Reads the EAR to synthesize from the first pixel (value / 100).
    /// A zero pixel means no face.
    struct PixelLocator;

    impl LandmarkLocator for PixelLocator {
        fn locate(&self, frame: &GrayImage) -> Result<Option<LandmarkFrame>, CollaboratorError> {
            let v = frame.get_pixel(0, 0).0[0];
            if v == 0 {
                return Ok(None);
            }
            Ok(Some(frame_with_ear(f64::from(v) / 100.0)))
        }
    }

    struct DownLocator;

    impl LandmarkLocator for DownLocator {
        fn locate(&self, _: &GrayImage) -> Result<Option<LandmarkFrame>, CollaboratorError> {
            Err(CollaboratorError::Unavailable {
                service: "landmark locator",
                reason: "model not loaded".into(),
            })
        }
    }

    fn gray(v: u8) -> GrayImage {
        GrayImage::from_pixel(2, 2, image::Luma([v]))
    }

    fn face_image() -> DynamicImage {
        DynamicImage::new_rgb8(4, 4)
    }

    fn blink_frames() -> Vec<GrayImage> {
        [30, 10, 10, 30, 0, 10, 10, 30].into_iter().map(gray).collect()
    }

    #[test]
    fn test_capture_verified() {
        let engine = CaptureEngine::new(
            DecisionEngine::default(),
            FixedEmbedder(vec![0.6, 0.8]),
            PixelLocator,
        );
        let reference = engine.enroll(&face_image()).unwrap();
        let out = engine
            .evaluate_capture(&reference, &face_image(), &blink_frames())
            .unwrap();
        assert_eq!(out.verdict, Verdict::Verified);
        assert_eq!(out.blink_count, Some(2));
        assert_eq!(out.frames_with_face, 7);
    }

    #[test]
    fn test_capture_all_frames_empty() {
        let engine = CaptureEngine::new(
            DecisionEngine::default(),
            FixedEmbedder(vec![0.6, 0.8]),
            PixelLocator,
        );
        let reference = Embedding::new(vec![0.6, 0.8]);
        let frames: Vec<GrayImage> = (0..5).map(|_| gray(0)).collect();
        let out = engine
            .evaluate_capture(&reference, &face_image(), &frames)
            .unwrap();
        assert_eq!(out.reason, Some(FailureReason::NoFaceDetected));
    }

    #[test]
    fn test_probe_without_face_is_error() {
        let engine = CaptureEngine::new(
            DecisionEngine::default(),
            FixedEmbedder(vec![0.6, 0.8]),
            PixelLocator,
        );
        let reference = Embedding::new(vec![0.6, 0.8]);
        let err = engine
            .evaluate_capture(&reference, &DynamicImage::new_rgb8(1, 1), &blink_frames())
            .unwrap_err();
        assert!(matches!(err, CaptureError::NoFaceInImage("probe")));
    }

    #[test]
    fn test_locator_outage_is_not_no_face() {
        let engine = CaptureEngine::new(
            DecisionEngine::default(),
            FixedEmbedder(vec![0.6, 0.8]),
            DownLocator,
        );
        let reference = Embedding::new(vec![0.6, 0.8]);
        let err = engine
            .evaluate_capture(&reference, &face_image(), &blink_frames())
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Collaborator(CollaboratorError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_embedder_outage_on_enroll() {
        let engine = CaptureEngine::new(DecisionEngine::default(), DownEmbedder, PixelLocator);
        let err = engine.enroll(&face_image()).unwrap_err();
        assert!(matches!(err, CaptureError::Collaborator(_)));
    }
}
