//! Greedy detection-to-track association.
//!
//! Candidate pairs under the cost threshold are accepted in ascending cost
//! order, skipping pairs whose track or detection is already taken. This is
//! not a globally optimal matching. Equal costs keep enumeration order
//! (tracks by ascending id, then detections by index), and that tie-break is
//! part of the observable behavior.

use tracing::trace;

use crate::detection::Detection;
use crate::track::{Track, TrackId};

/// Outcome of one frame's association.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// (track id, detection index)
    pub matches: Vec<(TrackId, usize)>,
    pub unmatched_tracks: Vec<TrackId>,
    pub unmatched_detections: Vec<usize>,
}

/// Center distance plus height difference, both relative to the track's last
/// box height. `None` for tracks that were never matched.
pub fn assignment_cost(track: &Track, detection: &Detection) -> Option<f32> {
    let center = track.last_center()?;
    let track_height = track.last_bbox()?.height;
    let norm = if track_height > 0.0 { track_height } else { 1.0 };
    let dist_cost = nalgebra::distance(&center, &detection.center) / norm;
    let size_cost = (detection.bbox.height - track_height).abs() / norm;
    Some(dist_cost + size_cost)
}

/// Matches `tracks` (in the given order) against `detections`.
pub fn greedy_assign<'a, I>(tracks: I, detections: &[Detection], threshold: f32) -> Assignment
where
    I: IntoIterator<Item = &'a Track>,
{
    let mut track_ids = Vec::new();
    let mut candidates: Vec<(f32, TrackId, usize)> = Vec::new();
    for track in tracks {
        track_ids.push(track.track_id);
        for (det_idx, det) in detections.iter().enumerate() {
            let Some(cost) = assignment_cost(track, det) else {
                continue;
            };
            trace!(track_id = track.track_id, det_idx, cost, "assignment candidate");
            if cost <= threshold {
                candidates.push((cost, track.track_id, det_idx));
            }
        }
    }

    // stable sort keeps enumeration order among equal costs
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut used_tracks = Vec::new();
    let mut used_dets = vec![false; detections.len()];
    let mut matches = Vec::new();
    for (_, track_id, det_idx) in candidates {
        if used_dets[det_idx] || used_tracks.contains(&track_id) {
            continue;
        }
        used_tracks.push(track_id);
        used_dets[det_idx] = true;
        matches.push((track_id, det_idx));
    }

    let unmatched_tracks = track_ids
        .into_iter()
        .filter(|id| !used_tracks.contains(id))
        .collect();
    let unmatched_detections = used_dets
        .iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(idx, _)| idx)
        .collect();

    Assignment {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
