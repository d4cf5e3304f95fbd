use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::landmark::{LandmarkSet, RawLandmark};

/// Landmark extent of one subject, normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub height: f32,
    pub height_px: f32,
    pub height_ratio: f32,
    pub above_threshold: bool,
}

impl BoundingBox {
    /// Box spanning the given landmarks, clamped to the image. Landmarks
    /// without coordinates yield the zero box.
    pub fn from_landmarks(
        landmarks: &LandmarkSet,
        frame_height: u32,
        threshold: &DetectionConfig,
    ) -> Self {
        let mut x_range: Option<(f32, f32)> = None;
        let mut y_range: Option<(f32, f32)> = None;
        for (_, lm) in landmarks.iter() {
            if let Some(x) = lm.x {
                x_range = Some(x_range.map_or((x, x), |(lo, hi)| (lo.min(x), hi.max(x))));
            }
            if let Some(y) = lm.y {
                y_range = Some(y_range.map_or((y, y), |(lo, hi)| (lo.min(y), hi.max(y))));
            }
        }

        let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (x_range, y_range) else {
            return Self::default();
        };

        let x_min = x_lo.clamp(0.0, 1.0);
        let y_min = y_lo.clamp(0.0, 1.0);
        let x_max = x_hi.clamp(0.0, 1.0);
        let y_max = y_hi.clamp(0.0, 1.0);
        let height_ratio = (y_max - y_min).max(0.0);
        let height_px = height_ratio * frame_height as f32;
        let above_threshold = height_px >= threshold.min_bbox_height_px
            || height_ratio >= threshold.min_bbox_height_ratio;

        Self {
            x_min,
            y_min,
            x_max,
            y_max,
            height: height_ratio,
            height_px,
            height_ratio,
            above_threshold,
        }
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new((self.x_min + self.x_max) / 2.0, (self.y_min + self.y_max) / 2.0)
    }
}

/// Where a detection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    #[default]
    Frame,
    Crop,
}

/// One subject observed in one frame, before association.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub landmarks: LandmarkSet,
    pub bbox: BoundingBox,
    pub center: Point2<f32>,
    pub scale: f32,
    pub too_small: bool,
    pub source: DetectionSource,
}

impl Detection {
    pub fn from_landmarks(
        landmarks: LandmarkSet,
        frame_height: u32,
        threshold: &DetectionConfig,
    ) -> Self {
        let bbox = BoundingBox::from_landmarks(&landmarks, frame_height, threshold);
        Self {
            center: bbox.center(),
            scale: bbox.height,
            too_small: !bbox.above_threshold,
            landmarks,
            bbox,
            source: DetectionSource::Frame,
        }
    }

    pub fn from_raw(raw: &RawDetection, frame_height: u32, threshold: &DetectionConfig) -> Self {
        Self::from_landmarks(LandmarkSet::from_raw(&raw.landmarks), frame_height, threshold)
    }

    pub fn above_threshold(&self) -> bool {
        self.bbox.above_threshold
    }

    pub fn with_source(mut self, source: DetectionSource) -> Self {
        self.source = source;
        self
    }
}

/// One subject as reported by the detector collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub landmarks: Vec<RawLandmark>,
}

impl RawDetection {
    pub fn new(landmarks: Vec<RawLandmark>) -> Self {
        Self { landmarks }
    }
}
