use std::collections::BTreeMap;
use tracing::debug;

use crate::track::{Track, TrackId};

/// Keeps the set of tracks reported as "the" subjects, with hysteresis.
#[derive(Debug, Clone)]
pub struct PrimarySelector {
    count: usize,
    drop_frames: u32,
    primary: Vec<TrackId>,
}

impl PrimarySelector {
    pub fn new(count: usize, drop_frames: u32) -> Self {
        Self {
            count,
            drop_frames,
            primary: Vec::new(),
        }
    }

    pub fn primary_ids(&self) -> &[TrackId] {
        &self.primary
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Retains current primaries that still exist and have not missed more
    /// than `drop_frames` in a row. Only a shortfall triggers a full re-rank.
    pub fn refresh(&mut self, tracks: &BTreeMap<TrackId, Track>) -> &[TrackId] {
        let retained: Vec<TrackId> = self
            .primary
            .iter()
            .copied()
            .filter(|id| {
                tracks
                    .get(id)
                    .is_some_and(|track| track.missed_frames() <= self.drop_frames)
            })
            .collect();

        let next = if retained.len() < self.count {
            rank_primary(tracks, self.count)
        } else {
            retained
        };

        if next != self.primary {
            debug!(previous = ?self.primary, primary = ?next, "primary set changed");
            self.primary = next;
        }
        &self.primary
    }
}

/// Up to `count` tracks with any above-threshold history, by descending
/// average above-threshold height, ties by ascending id.
pub fn rank_primary(tracks: &BTreeMap<TrackId, Track>, count: usize) -> Vec<TrackId> {
    let mut candidates: Vec<&Track> = tracks
        .values()
        .filter(|t| t.has_above_threshold())
        .collect();
    candidates.sort_by(|a, b| {
        b.average_height_above()
            .total_cmp(&a.average_height_above())
            .then(a.track_id.cmp(&b.track_id))
    });
    candidates.into_iter().take(count).map(|t| t.track_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::detection::Detection;
    use crate::landmark::{Landmark, LandmarkId, LandmarkSet};

    fn detection(height: f32) -> Detection {
        let mut set = LandmarkSet::new();
        let top = 0.5 - height / 2.0;
        let bottom = 0.5 + height / 2.0;
        set.set(LandmarkId::Nose, Landmark::new(0.5, top, 0.0, Some(0.9)));
        set.set(LandmarkId::LeftHeel, Landmark::new(0.5, bottom, 0.0, Some(0.9)));
        Detection::from_landmarks(set, 1080, &DetectionConfig::default())
    }

    fn table(heights: &[(TrackId, f32)]) -> BTreeMap<TrackId, Track> {
        heights
            .iter()
            .map(|&(id, h)| {
                let mut track = Track::new(id, 30);
                track.apply_detection(detection(h), 0);
                (id, track)
            })
            .collect()
    }

    #[test]
    fn test_rank_by_average_height() {
        let tracks = table(&[(1, 0.3), (2, 0.5), (3, 0.4)]);
        assert_eq!(rank_primary(&tracks, 2), vec![2, 3]);
    }

    #[test]
    fn test_rank_ties_by_ascending_id() {
        let tracks = table(&[(4, 0.4), (2, 0.4), (3, 0.4)]);
        assert_eq!(rank_primary(&tracks, 2), vec![2, 3]);
    }

    #[test]
    fn test_below_threshold_tracks_never_rank() {
        // 0.05 of 1080 px is 54 px, below both thresholds
        let tracks = table(&[(1, 0.05), (2, 0.3)]);
        assert_eq!(rank_primary(&tracks, 2), vec![2]);
    }

    #[test]
    fn test_hysteresis_keeps_primary_below_drop_limit() {
        let mut selector = PrimarySelector::new(2, 3);
        let mut tracks = table(&[(1, 0.3), (2, 0.25)]);
        assert_eq!(selector.refresh(&tracks), &[1, 2]);

        // a taller newcomer does not displace retained primaries
        tracks.insert(3, table(&[(3, 0.6)]).remove(&3).unwrap());
        tracks.get_mut(&2).unwrap().mark_missed();
        assert_eq!(selector.refresh(&tracks), &[1, 2]);
    }

    #[test]
    fn test_drop_after_miss_streak_triggers_rerank() {
        let mut selector = PrimarySelector::new(2, 2);
        let mut tracks = table(&[(1, 0.3), (2, 0.25), (3, 0.2)]);
        assert_eq!(selector.refresh(&tracks), &[1, 2]);

        for _ in 0..3 {
            tracks.get_mut(&1).unwrap().mark_missed();
        }
        // track 1 still has the tallest average, so a full re-rank picks it again
        assert_eq!(selector.refresh(&tracks), &[1, 2]);

        tracks.remove(&1);
        assert_eq!(selector.refresh(&tracks), &[2, 3]);
    }

    #[test]
    fn test_empty_until_candidates_exist() {
        let mut selector = PrimarySelector::new(2, 45);
        let tracks = table(&[(1, 0.05)]);
        assert!(selector.refresh(&tracks).is_empty());
    }
}
