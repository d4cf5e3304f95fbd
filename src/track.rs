use nalgebra::Point2;
use serde::Serialize;
use std::collections::VecDeque;

use crate::detection::{BoundingBox, Detection};
use crate::landmark::LandmarkSet;
use crate::occlusion::OcclusionPredictor;
use crate::smoothing::smooth_landmarks;

pub type TrackId = u32;

/// Per-frame lifecycle state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// Matched to an above-threshold detection
    Active,
    /// Matched, but the subject is below the size threshold
    TooSmall,
    /// Unmatched, emitting decayed landmarks
    Held,
    /// Unmatched with nothing left to emit
    Lost,
}

/// Fixed-capacity FIFO of box heights.
#[derive(Debug, Clone)]
pub struct HeightWindow {
    values: VecDeque<f32>,
    capacity: usize,
}

impl HeightWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a height and returns the entry evicted to make room, if any.
    pub fn push(&mut self, height: f32) -> Option<f32> {
        if self.capacity == 0 {
            return None;
        }
        let evicted = if self.values.len() == self.capacity {
            self.values.pop_front()
        } else {
            None
        };
        self.values.push_back(height);
        evicted
    }

    /// Undoes the latest `push`.
    fn retract(&mut self, evicted: Option<f32>) {
        self.values.pop_back();
        if let Some(height) = evicted {
            self.values.push_front(height);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied()
    }
}

/// What the current frame's detection added to the height windows.
#[derive(Debug, Clone, Copy)]
struct FrameContribution {
    evicted: Option<f32>,
    /// `Some` when the above-threshold window was also pushed
    evicted_above: Option<Option<f32>>,
}

/// Lifecycle result for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFrame {
    pub status: TrackStatus,
    pub landmarks: LandmarkSet,
    pub bbox: Option<BoundingBox>,
}

impl TrackFrame {
    pub fn is_predicted(&self) -> bool {
        self.status == TrackStatus::Held
    }

    pub fn too_small(&self) -> bool {
        self.status == TrackStatus::TooSmall
    }
}

/// End-of-run counters of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackCounters {
    pub track_id: TrackId,
    pub frames_detected: u32,
    pub frames_predicted: u32,
    pub longest_dropout: u32,
}

/// Persistent identity hypothesis for one subject.
#[derive(Debug, Clone)]
pub struct Track {
    /// Track ID (assigned by the engine, never reused)
    pub track_id: TrackId,
    /// Center of the last matched box
    last_center: Option<Point2<f32>>,
    /// Last matched box
    last_bbox: Option<BoundingBox>,
    /// Last emitted smoothed landmarks from a real detection
    last_smoothed: Option<LandmarkSet>,
    /// Detection matched in the current frame
    current_detection: Option<Detection>,
    current_contribution: Option<FrameContribution>,
    last_seen_frame: Option<u64>,
    /// Heights of all matched detections
    heights: HeightWindow,
    /// Heights of above-threshold matched detections
    heights_above: HeightWindow,
    frames_detected: u32,
    frames_predicted: u32,
    /// Consecutive frames without a match
    missed_frames: u32,
    /// Consecutive frames without an active detection
    current_dropout: u32,
    longest_dropout: u32,
    /// Consecutive held frames since the last real detection
    hold_frames: u32,
}

impl Track {
    pub fn new(track_id: TrackId, height_window: usize) -> Self {
        Track {
            track_id,
            last_center: None,
            last_bbox: None,
            last_smoothed: None,
            current_detection: None,
            current_contribution: None,
            last_seen_frame: None,
            heights: HeightWindow::new(height_window),
            heights_above: HeightWindow::new(height_window),
            frames_detected: 0,
            frames_predicted: 0,
            missed_frames: 0,
            current_dropout: 0,
            longest_dropout: 0,
            hold_frames: 0,
        }
    }

    /// Forget the previous frame's match.
    pub fn begin_frame(&mut self) {
        self.current_detection = None;
        self.current_contribution = None;
    }

    /// Attach a detection to this track for the current frame. A second call
    /// in the same frame replaces the first one's height-window entries.
    pub fn apply_detection(&mut self, detection: Detection, frame_index: u64) {
        if let Some(previous) = self.current_contribution.take() {
            self.heights.retract(previous.evicted);
            if let Some(evicted) = previous.evicted_above {
                self.heights_above.retract(evicted);
            }
        }

        let height = detection.bbox.height;
        let evicted = self.heights.push(height);
        let evicted_above = detection
            .above_threshold()
            .then(|| self.heights_above.push(height));
        self.current_contribution = Some(FrameContribution {
            evicted,
            evicted_above,
        });

        self.last_seen_frame = Some(frame_index);
        self.missed_frames = 0;
        self.last_center = Some(detection.center);
        self.last_bbox = Some(detection.bbox);
        self.current_detection = Some(detection);
    }

    pub fn mark_missed(&mut self) {
        self.current_detection = None;
        self.current_contribution = None;
        self.missed_frames += 1;
    }

    /// Runs this frame's lifecycle transition from the current match.
    pub fn advance(&mut self, alpha: f32, predictor: &OcclusionPredictor) -> TrackFrame {
        if let Some(det) = &self.current_detection {
            let bbox = det.bbox;
            if det.above_threshold() {
                let smoothed = smooth_landmarks(&det.landmarks, self.last_smoothed.as_ref(), alpha);
                self.last_smoothed = Some(smoothed.clone());
                self.hold_frames = 0;
                self.current_dropout = 0;
                self.frames_detected += 1;
                TrackFrame {
                    status: TrackStatus::Active,
                    landmarks: smoothed,
                    bbox: Some(bbox),
                }
            } else {
                self.record_dropout();
                self.hold_frames = 0;
                TrackFrame {
                    status: TrackStatus::TooSmall,
                    landmarks: LandmarkSet::new(),
                    bbox: Some(bbox),
                }
            }
        } else {
            self.record_dropout();
            let hold = self.hold_frames + 1;
            let predicted = self
                .last_smoothed
                .as_ref()
                .filter(|last| !last.is_empty())
                .and_then(|last| predictor.predict(last, hold));
            match predicted {
                Some(landmarks) => {
                    self.hold_frames = hold;
                    self.frames_predicted += 1;
                    TrackFrame {
                        status: TrackStatus::Held,
                        landmarks,
                        bbox: None,
                    }
                }
                None => TrackFrame {
                    status: TrackStatus::Lost,
                    landmarks: LandmarkSet::new(),
                    bbox: None,
                },
            }
        }
    }

    fn record_dropout(&mut self) {
        self.current_dropout += 1;
        self.longest_dropout = self.longest_dropout.max(self.current_dropout);
    }

    pub fn last_center(&self) -> Option<Point2<f32>> {
        self.last_center
    }

    pub fn last_bbox(&self) -> Option<&BoundingBox> {
        self.last_bbox.as_ref()
    }

    pub fn current_detection(&self) -> Option<&Detection> {
        self.current_detection.as_ref()
    }

    pub fn last_seen_frame(&self) -> Option<u64> {
        self.last_seen_frame
    }

    pub fn heights(&self) -> &HeightWindow {
        &self.heights
    }

    pub fn heights_above(&self) -> &HeightWindow {
        &self.heights_above
    }

    pub fn average_height_above(&self) -> f32 {
        self.heights_above.average()
    }

    /// Only tracks seen above the size threshold may become primary.
    pub fn has_above_threshold(&self) -> bool {
        !self.heights_above.is_empty()
    }

    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold_frames
    }

    pub fn longest_dropout(&self) -> u32 {
        self.longest_dropout
    }

    pub fn counters(&self) -> TrackCounters {
        TrackCounters {
            track_id: self.track_id,
            frames_detected: self.frames_detected,
            frames_predicted: self.frames_predicted,
            longest_dropout: self.longest_dropout,
        }
    }
}
