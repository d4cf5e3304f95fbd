use crate::landmark::{Landmark, LandmarkSet};

/// EMA of landmark sets between consecutive observed frames of a track.
///
/// Every landmark of `current` is blended with its counterpart in `previous`
/// as `alpha * current + (1 - alpha) * previous`. Landmarks with no
/// counterpart, and a missing `previous`, pass through unchanged.
pub fn smooth_landmarks(
    current: &LandmarkSet,
    previous: Option<&LandmarkSet>,
    alpha: f32,
) -> LandmarkSet {
    let Some(previous) = previous else {
        return current.clone();
    };

    let mut smoothed = LandmarkSet::new();
    for (id, lm) in current.iter() {
        let blended = match previous.get(id) {
            Some(prev) => Landmark {
                x: ema(lm.x, prev.x, alpha),
                y: ema(lm.y, prev.y, alpha),
                z: ema(lm.z, prev.z, alpha),
                confidence: ema(lm.confidence, prev.confidence, alpha),
            },
            None => *lm,
        };
        smoothed.set(id, blended);
    }
    smoothed
}

/// A missing side falls back to the other value.
pub fn ema(current: Option<f32>, previous: Option<f32>, alpha: f32) -> Option<f32> {
    match (current, previous) {
        (Some(c), Some(p)) => Some(alpha * c + (1.0 - alpha) * p),
        (Some(c), None) => Some(c),
        (None, p) => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::LandmarkId;
    use approx::assert_relative_eq;

    fn single(id: LandmarkId, lm: Landmark) -> LandmarkSet {
        let mut set = LandmarkSet::new();
        set.set(id, lm);
        set
    }

    #[test]
    fn test_first_frame_passthrough() {
        let current = single(LandmarkId::Nose, Landmark::new(0.3, 0.4, 0.1, Some(0.9)));
        assert_eq!(smooth_landmarks(&current, None, 0.4), current);
    }

    #[test]
    fn test_blend() {
        let prev = single(LandmarkId::Nose, Landmark::new(0.0, 0.0, 0.0, Some(0.5)));
        let current = single(LandmarkId::Nose, Landmark::new(1.0, 0.5, -1.0, Some(1.0)));
        let out = smooth_landmarks(&current, Some(&prev), 0.4);
        let nose = out.get(LandmarkId::Nose).unwrap();
        assert_relative_eq!(nose.x.unwrap(), 0.4, epsilon = 1e-6);
        assert_relative_eq!(nose.y.unwrap(), 0.2, epsilon = 1e-6);
        assert_relative_eq!(nose.z.unwrap(), -0.4, epsilon = 1e-6);
        assert_relative_eq!(nose.confidence.unwrap(), 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_unmatched_landmark_passes_through() {
        let prev = single(LandmarkId::Nose, Landmark::new(0.0, 0.0, 0.0, Some(0.5)));
        let mut current = single(LandmarkId::Nose, Landmark::new(1.0, 1.0, 0.0, Some(0.5)));
        let wrist = Landmark::new(0.7, 0.7, 0.0, Some(0.6));
        current.set(LandmarkId::LeftWrist, wrist);

        let out = smooth_landmarks(&current, Some(&prev), 0.5);
        assert_eq!(out.get(LandmarkId::LeftWrist), Some(&wrist));
        // landmarks only in the previous set are not carried over
        let prev_only = single(LandmarkId::RightKnee, Landmark::new(0.1, 0.1, 0.0, None));
        let out = smooth_landmarks(&current, Some(&prev_only), 0.5);
        assert!(out.get(LandmarkId::RightKnee).is_none());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_missing_scalars_fall_back() {
        assert_eq!(ema(None, Some(0.3), 0.4), Some(0.3));
        assert_eq!(ema(Some(0.8), None, 0.4), Some(0.8));
        assert_eq!(ema(None, None, 0.4), None);
    }

    #[test]
    fn test_constant_input_converges() {
        let start = single(LandmarkId::LeftHip, Landmark::new(0.0, 0.0, 0.0, Some(0.0)));
        let target = single(LandmarkId::LeftHip, Landmark::new(0.6, 0.3, 0.2, Some(0.9)));
        let mut state = start;
        for _ in 0..60 {
            state = smooth_landmarks(&target, Some(&state), 0.4);
        }
        let hip = state.get(LandmarkId::LeftHip).unwrap();
        assert_relative_eq!(hip.x.unwrap(), 0.6, epsilon = 1e-5);
        assert_relative_eq!(hip.y.unwrap(), 0.3, epsilon = 1e-5);
        assert_relative_eq!(hip.confidence.unwrap(), 0.9, epsilon = 1e-5);
    }
}
