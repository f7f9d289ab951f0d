//! Verification decision engine.
//!
//! Fuses the similarity verdict and the blink-liveness verdict of one
//! attempt into a single outcome. `evaluate` is a pure function of its
//! three inputs: it holds no state across calls and performs no I/O, so any
//! number of attempts may run concurrently.
//!
//! # Failure precedence
//!
//! 1. No frame in the liveness clip yielded landmarks → `no-face-detected`,
//!    regardless of the similarity score.
//! 2. Too few blinks → `liveness`.
//! 3. Similarity at or below threshold → `verification`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blink::{self, BlinkParams};
use crate::ear::{self, GeometryError};
use crate::landmarks::LandmarkFrame;
use crate::similarity::{self, SimilarityError, SIMILARITY_THRESHOLD};

/// Blinks required within one liveness clip.
pub const MIN_BLINKS_REQUIRED: u32 = 2;

/// Malformed input from an upstream collaborator. Never a biometric verdict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluateError {
    #[error("similarity: {0}")]
    Similarity(#[from] SimilarityError),
    #[error("frame {frame}: {source}")]
    Geometry {
        frame: usize,
        #[source]
        source: GeometryError,
    },
}

/// Thresholds applied by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub similarity_threshold: f64,
    pub blink: BlinkParams,
    pub min_blinks_required: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            similarity_threshold: SIMILARITY_THRESHOLD,
            blink: BlinkParams::default(),
            min_blinks_required: MIN_BLINKS_REQUIRED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Verified,
    NeedsReview,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Verified => "verified",
            Verdict::NeedsReview => "needs-review",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt was routed to manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    Verification,
    Liveness,
    NoFaceDetected,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Verification => "verification",
            FailureReason::Liveness => "liveness",
            FailureReason::NoFaceDetected => "no-face-detected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verification" => Ok(FailureReason::Verification),
            "liveness" => Ok(FailureReason::Liveness),
            "no-face-detected" => Ok(FailureReason::NoFaceDetected),
            other => Err(format!("unknown failure reason '{other}'")),
        }
    }
}

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub similarity: f64,
    pub similarity_passed: bool,
    /// `None` when no frame yielded landmarks.
    pub blink_count: Option<u32>,
    pub liveness_passed: bool,
    pub frames_total: usize,
    pub frames_with_face: usize,
    pub verdict: Verdict,
    pub reason: Option<FailureReason>,
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        self.verdict == Verdict::Verified
    }

    /// Human-readable evidence for the failing signal, or a summary on success.
    pub fn evidence(&self) -> String {
        match self.reason {
            Some(FailureReason::NoFaceDetected) => {
                format!("no face detected in {} frames", self.frames_total)
            }
            Some(FailureReason::Liveness) => {
                format!("blinks: {}", self.blink_count.unwrap_or(0))
            }
            Some(FailureReason::Verification) => format!("similarity: {}", self.similarity),
            None => format!(
                "similarity: {}, blinks: {}",
                self.similarity,
                self.blink_count.unwrap_or(0)
            ),
        }
    }
}

/// The three inputs of one attempt, as exchanged over IPC and on disk.
///
/// JSON shape: `{"reference": [..], "probe": [..], "frames": [null | [[x, y] × 68]]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Reference embedding captured at enrollment.
    pub reference: Vec<f32>,
    /// Embedding of the probe still image.
    pub probe: Vec<f32>,
    /// Liveness clip landmarks in capture order; `null` where no face was found.
    pub frames: Vec<Option<LandmarkFrame>>,
}

/// Blink fold over one clip, with face coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessScan {
    pub total_blinks: u32,
    pub frames_with_face: usize,
}

/// Derive per-frame mean EAR for every frame with landmarks and fold them
/// through the blink counter. Absent frames are skipped without touching
/// counter state.
pub fn scan_liveness(
    frames: &[Option<LandmarkFrame>],
    params: &BlinkParams,
) -> Result<LivenessScan, EvaluateError> {
    let ears = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            frame
                .as_ref()
                .map(|f| {
                    ear::frame_ear(f).map_err(|source| EvaluateError::Geometry { frame: i, source })
                })
                .transpose()
        })
        .collect::<Result<Vec<Option<f64>>, _>>()?;

    let frames_with_face = ears.iter().filter(|e| e.is_some()).count();
    let state = blink::count_blinks(ears, params);

    Ok(LivenessScan {
        total_blinks: state.total_blinks,
        frames_with_face,
    })
}

/// Stateless decision engine parameterized by a [`Policy`].
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    policy: Policy,
}

impl DecisionEngine {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Evaluate one attempt.
    ///
    /// Evidentiary failures (low similarity, too few blinks, no face) are
    /// returned as a `NeedsReview` outcome. Malformed inputs are returned as
    /// [`EvaluateError`] and must not be treated as a review case.
    pub fn evaluate(
        &self,
        reference: &[f32],
        probe: &[f32],
        frames: &[Option<LandmarkFrame>],
    ) -> Result<VerificationOutcome, EvaluateError> {
        let score = similarity::cosine_similarity(reference, probe)?;
        let similarity_passed = similarity::passes(score, self.policy.similarity_threshold);

        let scan = scan_liveness(frames, &self.policy.blink)?;
        let face_seen = scan.frames_with_face > 0;
        let liveness_passed = face_seen && scan.total_blinks >= self.policy.min_blinks_required;

        let reason = if !face_seen {
            Some(FailureReason::NoFaceDetected)
        } else if !liveness_passed {
            Some(FailureReason::Liveness)
        } else if !similarity_passed {
            Some(FailureReason::Verification)
        } else {
            None
        };

        let verdict = if reason.is_none() {
            Verdict::Verified
        } else {
            Verdict::NeedsReview
        };

        tracing::debug!(
            similarity = score,
            similarity_passed,
            blinks = scan.total_blinks,
            frames = frames.len(),
            frames_with_face = scan.frames_with_face,
            verdict = %verdict,
            reason = ?reason,
            "attempt evaluated"
        );

        Ok(VerificationOutcome {
            similarity: score,
            similarity_passed,
            blink_count: face_seen.then_some(scan.total_blinks),
            liveness_passed,
            frames_total: frames.len(),
            frames_with_face: scan.frames_with_face,
            verdict,
            reason,
        })
    }

    pub fn evaluate_attempt(&self, attempt: &Attempt) -> Result<VerificationOutcome, EvaluateError> {
        self.evaluate(&attempt.reference, &attempt.probe, &attempt.frames)
    }
}
