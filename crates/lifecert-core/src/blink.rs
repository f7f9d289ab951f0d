//! Blink counting over a per-frame EAR sequence.
//!
//! A printed photograph cannot blink. The counter watches for runs of
//! consecutive frames whose mean EAR falls below a threshold and registers a
//! blink when such a run of sufficient length ends with an open-eye frame.
//!
//! The counter is a pure fold: `(state, ear) -> state'`. Frames without a
//! detected face are absent from the sequence. They leave the state
//! untouched, so a detector dropout in the middle of a blink does not close
//! the run early.
//!
//! A run still in progress when the sequence ends is not counted.

use serde::{Deserialize, Serialize};

/// EAR below which an eye is considered closed.
pub const EAR_THRESHOLD: f64 = 0.21;

/// Minimum consecutive closed frames for a run to register as a blink.
/// Single-frame dips are detector jitter or motion blur.
pub const MIN_CONSEC_CLOSED_FRAMES: u32 = 2;

/// Tunables for the blink counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinkParams {
    pub ear_threshold: f64,
    pub min_consec_closed_frames: u32,
}

impl Default for BlinkParams {
    fn default() -> Self {
        Self {
            ear_threshold: EAR_THRESHOLD,
            min_consec_closed_frames: MIN_CONSEC_CLOSED_FRAMES,
        }
    }
}

/// Counter state for one liveness attempt. Never shared across attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlinkState {
    pub consecutive_closed_frames: u32,
    pub total_blinks: u32,
}

impl BlinkState {
    /// Advance by one frame. `None` marks a frame with no landmarks.
    #[must_use]
    pub fn step(self, ear: Option<f64>, params: &BlinkParams) -> Self {
        let Some(ear) = ear else {
            return self;
        };

        if ear < params.ear_threshold {
            return Self {
                consecutive_closed_frames: self.consecutive_closed_frames.saturating_add(1),
                ..self
            };
        }

        let blinked = self.consecutive_closed_frames >= params.min_consec_closed_frames;
        Self {
            consecutive_closed_frames: 0,
            total_blinks: self.total_blinks + u32::from(blinked),
        }
    }
}

/// Fold a full EAR sequence, returning the final counter state.
pub fn count_blinks<I>(ears: I, params: &BlinkParams) -> BlinkState
where
    I: IntoIterator<Item = Option<f64>>,
{
    ears.into_iter()
        .fold(BlinkState::default(), |state, ear| state.step(ear, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blinks(seq: &[Option<f64>]) -> u32 {
        count_blinks(seq.iter().copied(), &BlinkParams::default()).total_blinks
    }

    #[test]
    fn test_two_closed_frames_is_one_blink() {
        assert_eq!(blinks(&[Some(0.30), Some(0.10), Some(0.10), Some(0.30)]), 1);
    }

    #[test]
    fn test_single_closed_frame_is_noise() {
        assert_eq!(blinks(&[Some(0.30), Some(0.10), Some(0.30)]), 0);
    }

    #[test]
    fn test_gap_does_not_break_run() {
        assert_eq!(blinks(&[Some(0.10), None, Some(0.10), Some(0.30)]), 1);
    }

    #[test]
    fn test_gap_does_not_close_run() {
        // A dropout is not an open-eye frame: the run is still in progress
        let state = count_blinks(
            [Some(0.10), Some(0.10), None],
            &BlinkParams::default(),
        );
        assert_eq!(state.total_blinks, 0);
        assert_eq!(state.consecutive_closed_frames, 2);
    }

    #[test]
    fn test_unterminated_run_not_counted() {
        assert_eq!(blinks(&[Some(0.30), Some(0.10), Some(0.10), Some(0.10)]), 0);
    }

    #[test]
    fn test_long_closure_counts_once() {
        let mut seq = vec![Some(0.05); 20];
        seq.push(Some(0.35));
        assert_eq!(blinks(&seq), 1);
    }

    #[test]
    fn test_multiple_blinks() {
        let seq = [
            Some(0.30),
            Some(0.15),
            Some(0.12),
            Some(0.31),
            Some(0.29),
            Some(0.18),
            None,
            Some(0.19),
            Some(0.20),
            Some(0.33),
            Some(0.10),
            Some(0.30),
        ];
        // runs: 2 (blink), 3 across a gap (blink), 1 (noise)
        assert_eq!(blinks(&seq), 2);
    }

    #[test]
    fn test_threshold_is_strict() {
        // EAR exactly at threshold counts as open
        assert_eq!(
            blinks(&[Some(0.10), Some(0.10), Some(EAR_THRESHOLD), Some(0.10), Some(0.30)]),
            1
        );
    }

    #[test]
    fn test_threshold_is_exact_decimal() {
        // between f32(0.21) = 0.2099999934 and 0.21: closed
        let ear = 0.209_999_995;
        assert!(ear > f64::from(0.21f32));
        assert_eq!(blinks(&[Some(ear), Some(ear), Some(0.30)]), 1);
    }

    #[test]
    fn test_all_absent_leaves_initial_state() {
        let state = count_blinks([None, None, None], &BlinkParams::default());
        assert_eq!(state, BlinkState::default());
    }

    #[test]
    fn test_custom_params() {
        let params = BlinkParams {
            ear_threshold: 0.25,
            min_consec_closed_frames: 3,
        };
        let seq = [Some(0.22), Some(0.22), Some(0.30), Some(0.22), Some(0.22), Some(0.22), Some(0.30)];
        assert_eq!(count_blinks(seq, &params).total_blinks, 1);
    }
}
