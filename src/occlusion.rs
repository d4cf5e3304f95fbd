use crate::landmark::{Landmark, LandmarkSet};

/// Stand-in landmarks for a track that was not matched this frame.
#[derive(Debug, Clone, Copy)]
pub struct OcclusionPredictor {
    decay_rate: f32,
    max_hold_frames: u32,
}

impl OcclusionPredictor {
    pub fn new(decay_rate: f32, max_hold_frames: u32) -> Self {
        Self {
            decay_rate,
            max_hold_frames,
        }
    }

    /// Landmarks for the `hold`-th consecutive held frame (1-based), or `None`
    /// once the hold budget is spent.
    pub fn predict(&self, last: &LandmarkSet, hold: u32) -> Option<LandmarkSet> {
        if hold == 0 || hold > self.max_hold_frames {
            return None;
        }
        let exponent = i32::try_from(hold).unwrap_or(i32::MAX);
        Some(decay_confidence(last, self.decay_rate.powi(exponent)))
    }
}

/// Same coordinates, confidence scaled by `factor`. Absent confidence stays absent.
pub fn decay_confidence(landmarks: &LandmarkSet, factor: f32) -> LandmarkSet {
    let mut decayed = LandmarkSet::new();
    for (id, lm) in landmarks.iter() {
        decayed.set(
            id,
            Landmark {
                confidence: lm.confidence.map(|c| c * factor),
                ..*lm
            },
        );
    }
    decayed
}
