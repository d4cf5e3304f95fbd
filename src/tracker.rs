use std::collections::BTreeMap;
use tracing::debug;

use crate::assignment::greedy_assign;
use crate::config::Config;
use crate::detection::{Detection, DetectionSource, RawDetection};
use crate::landmark::LandmarkSet;
use crate::occlusion::OcclusionPredictor;
use crate::output::{
    FrameRecord, PoseDocument, PoseMetrics, RawPoseDocument, TrackFrameOutput, TrackingMetrics,
    TrackingSummary, VideoInfo,
};
use crate::primary::PrimarySelector;
use crate::refine::{should_refine, CropDetector, CropRegion};
use crate::track::{Track, TrackFrame, TrackId};

/// Detector output for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    /// Frame size in pixels
    pub width: u32,
    pub height: u32,
    pub detections: &'a [RawDetection],
}

/// Track-continuity engine for one video.
///
/// Owns the track table; every component refers to tracks by id. Frames must
/// be fed in order, one at a time.
#[derive(Debug, Clone)]
pub struct PoseTracker {
    config: Config,
    tracks: BTreeMap<TrackId, Track>,
    selector: PrimarySelector,
    predictor: OcclusionPredictor,
    next_id: TrackId,
    frames_processed: u64,
}

impl PoseTracker {
    pub fn new(config: Config) -> Self {
        let t = &config.tracking;
        PoseTracker {
            selector: PrimarySelector::new(t.primary_track_count, t.primary_drop_frames),
            predictor: OcclusionPredictor::new(t.conf_decay, t.max_hold_frames),
            tracks: BTreeMap::new(),
            next_id: 1,
            frames_processed: 0,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracks(&self) -> &BTreeMap<TrackId, Track> {
        &self.tracks
    }

    pub fn track(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub fn primary_track_ids(&self) -> &[TrackId] {
        self.selector.primary_ids()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn normalize(&self, raw: &RawDetection, frame_height: u32) -> Detection {
        Detection::from_raw(raw, frame_height, &self.config.detection)
    }

    /// Assign, update, predict, refresh the primary set and emit one frame.
    pub fn process_frame(&mut self, input: FrameInput<'_>) -> FrameRecord {
        let detections = self.normalize_all(&input);
        self.update(detections, input.frame_index);
        self.finish_frame(input.frame_index, input.timestamp_ms)
    }

    /// Like `process_frame`, with small primary subjects re-detected on an
    /// upscaled crop between assignment and output.
    ///
    /// A detector error still completes the frame: overrides applied before
    /// the failure are kept, every track advances, and then the error is
    /// returned. The engine stays usable for the next frame.
    pub fn process_frame_with_refiner<D>(
        &mut self,
        input: FrameInput<'_>,
        detector: &mut D,
    ) -> anyhow::Result<FrameRecord>
    where
        D: CropDetector + ?Sized,
    {
        let detections = self.normalize_all(&input);
        self.update(detections, input.frame_index);
        let refined =
            self.refine_primary_tracks(detector, input.frame_index, input.width, input.height);
        let record = self.finish_frame(input.frame_index, input.timestamp_ms);
        refined.map(|_| record)
    }

    fn normalize_all(&self, input: &FrameInput<'_>) -> Vec<Detection> {
        input
            .detections
            .iter()
            .map(|raw| self.normalize(raw, input.height))
            .collect()
    }

    /// Associates this frame's detections with the track table. Unmatched
    /// detections open new tracks; unmatched tracks are marked missed.
    pub fn update(&mut self, detections: Vec<Detection>, frame_index: u64) {
        for track in self.tracks.values_mut() {
            track.begin_frame();
        }

        let assignment = greedy_assign(
            self.tracks.values(),
            &detections,
            self.config.tracking.assignment_threshold,
        );

        let mut pending: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
        for &(track_id, det_idx) in &assignment.matches {
            let det = pending[det_idx].take();
            if let (Some(track), Some(det)) = (self.tracks.get_mut(&track_id), det) {
                track.apply_detection(det, frame_index);
            }
        }
        for &det_idx in &assignment.unmatched_detections {
            if let Some(det) = pending[det_idx].take() {
                self.create_track(det, frame_index);
            }
        }
        for track_id in &assignment.unmatched_tracks {
            if let Some(track) = self.tracks.get_mut(track_id) {
                track.mark_missed();
            }
        }

        self.evict_stale();
        self.selector.refresh(&self.tracks);
    }

    fn create_track(&mut self, detection: Detection, frame_index: u64) -> TrackId {
        let track_id = self.next_id;
        self.next_id += 1;
        let mut track = Track::new(track_id, self.config.tracking.height_window);
        debug!(
            track_id,
            frame_index,
            height = detection.bbox.height,
            above_threshold = detection.above_threshold(),
            "new track"
        );
        track.apply_detection(detection, frame_index);
        self.tracks.insert(track_id, track);
        track_id
    }

    fn evict_stale(&mut self) {
        let Some(limit) = self.config.tracking.evict_after_missed_frames else {
            return;
        };
        self.tracks.retain(|&track_id, track| {
            let keep = track.missed_frames() <= limit;
            if !keep {
                debug!(track_id, missed = track.missed_frames(), "evicting stale track");
            }
            keep
        });
    }

    /// Replaces this frame's match of an existing track with `detection`,
    /// bypassing assignment. Unknown ids and landmark-less detections are
    /// ignored. Returns whether the override was applied.
    pub fn override_detection(
        &mut self,
        track_id: TrackId,
        detection: Detection,
        frame_index: u64,
    ) -> bool {
        if detection.landmarks.is_empty() {
            return false;
        }
        let Some(track) = self.tracks.get_mut(&track_id) else {
            return false;
        };
        debug!(
            track_id,
            frame_index,
            source = ?detection.source,
            height = detection.bbox.height,
            "overriding detection"
        );
        track.apply_detection(detection, frame_index);
        true
    }

    /// Re-runs the detector on crops around primary tracks whose box is small
    /// and overrides their match with the result. Returns the number of
    /// overrides applied.
    pub fn refine_primary_tracks<D>(
        &mut self,
        detector: &mut D,
        frame_index: u64,
        frame_width: u32,
        frame_height: u32,
    ) -> anyhow::Result<usize>
    where
        D: CropDetector + ?Sized,
    {
        let refinement = self.config.refinement;
        if !refinement.enabled {
            return Ok(0);
        }

        let mut applied = 0;
        for track_id in self.selector.primary_ids().to_vec() {
            let Some(track) = self.tracks.get(&track_id) else {
                continue;
            };
            let bbox = match (track.current_detection(), track.last_bbox()) {
                (Some(det), _) => det.bbox,
                (None, Some(last)) => *last,
                (None, None) => continue,
            };
            if !should_refine(&bbox, &refinement) {
                continue;
            }
            let Some(region) = CropRegion::around(
                &bbox,
                frame_width,
                frame_height,
                refinement.crop_margin,
                refinement.crop_target_height,
            ) else {
                continue;
            };
            let (scaled_width, scaled_height) = region.scaled_size();
            debug!(
                track_id,
                frame_index,
                x = region.x,
                y = region.y,
                width = region.width,
                height = region.height,
                scaled_width,
                scaled_height,
                "refining small subject"
            );
            let Some(raw) = detector.detect_crop(frame_index, &region)? else {
                continue;
            };

            let mapped = region.map_to_frame(&raw, frame_width, frame_height);
            let landmarks = LandmarkSet::from_raw(&mapped);
            let detection =
                Detection::from_landmarks(landmarks, frame_height, &self.config.detection)
                    .with_source(DetectionSource::Crop);
            if self.override_detection(track_id, detection, frame_index) {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Runs every track's lifecycle transition for the frame and returns the
    /// output of the primary tracks, in primary order.
    pub fn finish_frame(&mut self, frame_index: u64, timestamp_ms: u64) -> FrameRecord {
        let alpha = self.config.tracking.ema_alpha;
        let predictor = self.predictor;
        let primary = self.selector.primary_ids();

        let mut emitted: BTreeMap<TrackId, TrackFrame> = BTreeMap::new();
        for (&track_id, track) in self.tracks.iter_mut() {
            let frame = track.advance(alpha, &predictor);
            if primary.contains(&track_id) {
                emitted.insert(track_id, frame);
            }
        }

        let tracks = primary
            .iter()
            .filter_map(|id| {
                emitted
                    .remove(id)
                    .map(|frame| TrackFrameOutput::new(*id, frame_index, timestamp_ms, frame))
            })
            .collect();
        self.frames_processed += 1;

        FrameRecord {
            frame_index,
            timestamp_ms,
            tracks,
        }
    }

    pub fn summary(&self) -> TrackingSummary {
        TrackingSummary {
            num_tracks_total: self.tracks.len(),
            num_tracks_above_threshold: self
                .tracks
                .values()
                .filter(|t| t.has_above_threshold())
                .count(),
            primary_track_ids: self.selector.primary_ids().to_vec(),
            tracks: self.tracks.values().map(Track::counters).collect(),
        }
    }

    /// Builds the tracked document from the frames this engine emitted.
    pub fn to_document(&self, video: VideoInfo, frames: Vec<FrameRecord>) -> PoseDocument {
        let summary = self.summary();
        let slots = self.selector.count();
        PoseDocument {
            schema_version: PoseDocument::SCHEMA_VERSION,
            video,
            primary_track_ids: summary.primary_track_ids.clone(),
            primary_track_count: slots,
            pose_metrics: PoseMetrics::from_summary(&summary, frames.len() as u64, slots),
            frames,
            tracking_metrics: TrackingMetrics {
                summary,
                min_bbox_threshold_px: self.config.detection.min_bbox_height_px,
            },
        }
    }

    /// Runs every frame of a raw detection dump through a fresh engine.
    pub fn replay(raw: &RawPoseDocument, config: Config) -> PoseDocument {
        let mut tracker = PoseTracker::new(config);
        let frames: Vec<FrameRecord> = raw
            .frames
            .iter()
            .map(|f| {
                tracker.process_frame(FrameInput {
                    frame_index: f.frame_index,
                    timestamp_ms: f.timestamp_ms,
                    width: raw.video.width,
                    height: raw.video.height,
                    detections: &f.detections,
                })
            })
            .collect();
        tracker.to_document(raw.video, frames)
    }
}
