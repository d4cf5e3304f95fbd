use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::detection::{BoundingBox, RawDetection};
use crate::error::{Error, Result};
use crate::landmark::LandmarkSet;
use crate::track::{TrackCounters, TrackFrame, TrackId};

/// One primary track in one frame, as handed to renderers and serializers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackFrameOutput {
    pub track_id: TrackId,
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub landmarks: LandmarkSet,
    pub is_predicted: bool,
    pub too_small: bool,
    pub bbox: Option<BoundingBox>,
}

impl TrackFrameOutput {
    pub fn new(track_id: TrackId, frame_index: u64, timestamp_ms: u64, frame: TrackFrame) -> Self {
        Self {
            track_id,
            frame_index,
            timestamp_ms,
            is_predicted: frame.is_predicted(),
            too_small: frame.too_small(),
            landmarks: frame.landmarks,
            bbox: frame.bbox,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub tracks: Vec<TrackFrameOutput>,
}

impl FrameRecord {
    pub fn has_landmarks(&self) -> bool {
        self.tracks.iter().any(|t| !t.landmarks.is_empty())
    }
}

/// End-of-run view of the track table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSummary {
    pub num_tracks_total: usize,
    pub num_tracks_above_threshold: usize,
    pub primary_track_ids: Vec<TrackId>,
    /// Every track, ascending id
    pub tracks: Vec<TrackCounters>,
}

impl TrackingSummary {
    pub fn counters(&self, track_id: TrackId) -> Option<&TrackCounters> {
        self.tracks.iter().find(|c| c.track_id == track_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimaryTrackMetrics {
    pub track_id: Option<TrackId>,
    pub frames_detected: u32,
    pub detect_pct: f64,
    pub frames_predicted: u32,
    pub longest_dropout: u32,
}

/// Detection coverage of the primary slots over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseMetrics {
    pub frames_total: u64,
    /// One entry per primary slot; slots without a track are zeroed
    pub primary: Vec<PrimaryTrackMetrics>,
}

impl PoseMetrics {
    pub fn from_summary(summary: &TrackingSummary, frames_total: u64, slots: usize) -> Self {
        let primary = (0..slots)
            .map(|slot| {
                let counters = summary
                    .primary_track_ids
                    .get(slot)
                    .and_then(|id| summary.counters(*id));
                match counters {
                    Some(c) => PrimaryTrackMetrics {
                        track_id: Some(c.track_id),
                        frames_detected: c.frames_detected,
                        detect_pct: ratio(c.frames_detected, frames_total),
                        frames_predicted: c.frames_predicted,
                        longest_dropout: c.longest_dropout,
                    },
                    None => PrimaryTrackMetrics {
                        track_id: None,
                        frames_detected: 0,
                        detect_pct: 0.0,
                        frames_predicted: 0,
                        longest_dropout: 0,
                    },
                }
            })
            .collect();
        Self { frames_total, primary }
    }
}

fn ratio(count: u32, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round4(f64::from(count) / total as f64)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingMetrics {
    #[serde(flatten)]
    pub summary: TrackingSummary,
    pub min_bbox_threshold_px: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub duration: f64,
}

/// Detector output for one frame, as dumped by the extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// `pose_raw.json`: untracked per-frame detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoseDocument {
    #[serde(default = "raw_schema_version")]
    pub schema_version: u32,
    pub video: VideoInfo,
    #[serde(default)]
    pub frames: Vec<RawFrame>,
}

fn raw_schema_version() -> u32 {
    RawPoseDocument::SCHEMA_VERSION
}

impl RawPoseDocument {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn raw_detections_per_frame_avg(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        let total: usize = self.frames.iter().map(|f| f.detections.len()).sum();
        round4(total as f64 / self.frames.len() as f64)
    }
}

/// `pose.json`: tracked primary subjects per frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseDocument {
    pub schema_version: u32,
    pub video: VideoInfo,
    pub primary_track_ids: Vec<TrackId>,
    pub primary_track_count: usize,
    pub frames: Vec<FrameRecord>,
    pub pose_metrics: PoseMetrics,
    pub tracking_metrics: TrackingMetrics,
}

impl PoseDocument {
    pub const SCHEMA_VERSION: u32 = 2;

    pub fn status(&self) -> RunStatus {
        if self.frames.iter().any(FrameRecord::has_landmarks) {
            RunStatus::Ok
        } else {
            RunStatus::OkNoDetections
        }
    }

    pub fn frames_with_detections(&self) -> usize {
        self.frames.iter().filter(|f| f.has_landmarks()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    OkNoDetections,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub hint: String,
}

/// `result.json`: outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_with_detections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl RunResult {
    pub fn error(code: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            pose_path: None,
            frames_with_detections: None,
            duration_ms: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.into(),
                hint: hint.into(),
            }),
        }
    }
}

pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| Error::json(path, e))
}

/// Pretty-prints `value` to a sibling temp file, then renames it over `path`.
pub fn write_json_atomic<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let data = serde_json::to_string_pretty(value).map_err(|e| Error::json(path, e))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    fs::write(&tmp, data).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackStatus;

    fn summary() -> TrackingSummary {
        TrackingSummary {
            num_tracks_total: 3,
            num_tracks_above_threshold: 2,
            primary_track_ids: vec![2],
            tracks: vec![
                TrackCounters {
                    track_id: 1,
                    frames_detected: 4,
                    frames_predicted: 0,
                    longest_dropout: 1,
                },
                TrackCounters {
                    track_id: 2,
                    frames_detected: 2,
                    frames_predicted: 1,
                    longest_dropout: 1,
                },
            ],
        }
    }

    #[test]
    fn test_pose_metrics_pads_slots() {
        let metrics = PoseMetrics::from_summary(&summary(), 3, 2);
        assert_eq!(metrics.primary.len(), 2);
        assert_eq!(metrics.primary[0].track_id, Some(2));
        assert_eq!(metrics.primary[0].detect_pct, 0.6667);
        assert_eq!(metrics.primary[1].track_id, None);
        assert_eq!(metrics.primary[1].frames_detected, 0);

        let empty = PoseMetrics::from_summary(&summary(), 0, 1);
        assert_eq!(empty.primary[0].detect_pct, 0.0);
    }

    #[test]
    fn test_frame_output_serialization() {
        let frame = TrackFrame {
            status: TrackStatus::Lost,
            landmarks: LandmarkSet::new(),
            bbox: None,
        };
        let out = TrackFrameOutput::new(5, 10, 333, frame);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["track_id"], 5);
        assert_eq!(json["timestamp_ms"], 333);
        assert_eq!(json["is_predicted"], false);
        assert!(json["bbox"].is_null());
        assert_eq!(json["landmarks"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_tracking_metrics_flatten() {
        let metrics = TrackingMetrics {
            summary: summary(),
            min_bbox_threshold_px: 120.0,
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["num_tracks_total"], 3);
        assert_eq!(json["min_bbox_threshold_px"], 120.0);
    }

    #[test]
    fn test_raw_document_parse_and_average() {
        let doc: RawPoseDocument = serde_json::from_str(
            r#"{
                "schema_version": 1,
                "video": {"fps": 30.0, "width": 640, "height": 480, "duration": 0.1},
                "frames": [
                    {"frame_index": 0, "timestamp_ms": 0, "detections": [
                        {"landmarks": [{"name": "NOSE", "x": 0.5, "y": 0.2, "z": 0.0, "conf": 0.9}],
                         "bbox": {"x_min": 0.5}, "too_small": true}
                    ]},
                    {"frame_index": 1, "timestamp_ms": 33, "detections": []},
                    {"frame_index": 2, "timestamp_ms": 66}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.frames.len(), 3);
        assert_eq!(doc.frames[0].detections[0].landmarks[0].conf, Some(0.9));
        assert_eq!(doc.raw_detections_per_frame_avg(), 0.3333);
    }

    #[test]
    fn test_write_json_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.json");
        let result = RunResult::error("E_INPUT", "bad input", "check the path");
        write_json_atomic(&path, &result).unwrap();

        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "E_INPUT");
        assert!(value.get("pose_path").is_none());
        assert!(!dir.path().join("nested").join("result.json.tmp").exists());
    }
}
