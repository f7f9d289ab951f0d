//! Capability interfaces for the models this crate consumes but does not run.
//!
//! Implementations are injected into [`crate::CaptureEngine`]; they are
//! treated as synchronous calls that either return a value, report that no
//! face was present, or fail because the backing service is unavailable.

use image::{DynamicImage, GrayImage};
use thiserror::Error;

use crate::landmarks::LandmarkFrame;
use crate::similarity::Embedding;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// Valid evidence: the model ran and found no face.
    #[error("no face detected")]
    NoFaceDetected,
    /// System fault: the model or its host could not be reached.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
}

/// Face image → unit-length embedding.
pub trait Embedder {
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, CollaboratorError>;
}

/// Grayscale frame → 68-point landmarks, or `None` when no face is found.
pub trait LandmarkLocator {
    fn locate(&self, frame: &GrayImage) -> Result<Option<LandmarkFrame>, CollaboratorError>;
}

impl<T: Embedder + ?Sized> Embedder for &T {
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, CollaboratorError> {
        (**self).embed(image)
    }
}

impl<T: LandmarkLocator + ?Sized> LandmarkLocator for &T {
    fn locate(&self, frame: &GrayImage) -> Result<Option<LandmarkFrame>, CollaboratorError> {
        (**self).locate(frame)
    }
}
