use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub refinement: RefinementConfig,
}

/// Track continuity parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Number of subjects reported per frame
    #[serde(default = "default_primary_track_count")]
    pub primary_track_count: usize,
    /// Consecutive missed frames a track keeps emitting predicted landmarks
    #[serde(default = "default_max_hold_frames")]
    pub max_hold_frames: u32,
    /// Miss streak after which a primary track loses its slot
    #[serde(default = "default_primary_drop_frames")]
    pub primary_drop_frames: u32,
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f32,
    /// Per held frame confidence multiplier
    #[serde(default = "default_conf_decay")]
    pub conf_decay: f32,
    /// Capacity of the per-track height windows
    #[serde(default = "default_height_window")]
    pub height_window: usize,
    #[serde(default = "default_assignment_threshold")]
    pub assignment_threshold: f32,
    /// Remove tracks whose miss streak exceeds this. `None` keeps every track.
    #[serde(default)]
    pub evict_after_missed_frames: Option<u32>,
}

fn default_primary_track_count() -> usize {
    2
}

fn default_max_hold_frames() -> u32 {
    45
}

fn default_primary_drop_frames() -> u32 {
    45
}

fn default_ema_alpha() -> f32 {
    0.4
}

fn default_conf_decay() -> f32 {
    0.95
}

fn default_height_window() -> usize {
    30
}

fn default_assignment_threshold() -> f32 {
    2.5
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            primary_track_count: default_primary_track_count(),
            max_hold_frames: default_max_hold_frames(),
            primary_drop_frames: default_primary_drop_frames(),
            ema_alpha: default_ema_alpha(),
            conf_decay: default_conf_decay(),
            height_window: default_height_window(),
            assignment_threshold: default_assignment_threshold(),
            evict_after_missed_frames: None,
        }
    }
}

/// Minimum subject size; a box passes if either bound is met.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_min_bbox_height_px")]
    pub min_bbox_height_px: f32,
    #[serde(default = "default_min_bbox_height_ratio")]
    pub min_bbox_height_ratio: f32,
}

fn default_min_bbox_height_px() -> f32 {
    120.0
}

fn default_min_bbox_height_ratio() -> f32 {
    0.12
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_bbox_height_px: default_min_bbox_height_px(),
            min_bbox_height_ratio: default_min_bbox_height_ratio(),
        }
    }
}

/// Crop-and-upscale re-detection of small primary subjects.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RefinementConfig {
    #[serde(default = "default_refinement_enabled")]
    pub enabled: bool,
    #[serde(default = "default_crop_trigger_px")]
    pub crop_trigger_px: f32,
    #[serde(default = "default_crop_trigger_ratio")]
    pub crop_trigger_ratio: f32,
    /// Margin added on each side, as a fraction of the box size
    #[serde(default = "default_crop_margin")]
    pub crop_margin: f32,
    #[serde(default = "default_crop_target_height")]
    pub crop_target_height: u32,
}

fn default_refinement_enabled() -> bool {
    true
}

fn default_crop_trigger_px() -> f32 {
    180.0
}

fn default_crop_trigger_ratio() -> f32 {
    0.18
}

fn default_crop_margin() -> f32 {
    0.25
}

fn default_crop_target_height() -> u32 {
    640
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: default_refinement_enabled(),
            crop_trigger_px: default_crop_trigger_px(),
            crop_trigger_ratio: default_crop_trigger_ratio(),
            crop_margin: default_crop_margin(),
            crop_target_height: default_crop_target_height(),
        }
    }
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let cfg: Config = serde_json::from_str(&data).map_err(|e| Error::json(path, e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tracking;
        if t.primary_track_count == 0 {
            return Err(invalid("tracking.primary_track_count must be at least 1"));
        }
        if t.height_window == 0 {
            return Err(invalid("tracking.height_window must be at least 1"));
        }
        if !(t.ema_alpha > 0.0 && t.ema_alpha <= 1.0) {
            return Err(invalid(format!(
                "tracking.ema_alpha must be in (0, 1], got {}",
                t.ema_alpha
            )));
        }
        if !(t.conf_decay > 0.0 && t.conf_decay <= 1.0) {
            return Err(invalid(format!(
                "tracking.conf_decay must be in (0, 1], got {}",
                t.conf_decay
            )));
        }
        check_non_negative("tracking.assignment_threshold", t.assignment_threshold)?;
        check_non_negative("detection.min_bbox_height_px", self.detection.min_bbox_height_px)?;
        check_non_negative(
            "detection.min_bbox_height_ratio",
            self.detection.min_bbox_height_ratio,
        )?;

        let r = &self.refinement;
        check_non_negative("refinement.crop_trigger_px", r.crop_trigger_px)?;
        check_non_negative("refinement.crop_trigger_ratio", r.crop_trigger_ratio)?;
        check_non_negative("refinement.crop_margin", r.crop_margin)?;
        if r.crop_target_height == 0 {
            return Err(invalid("refinement.crop_target_height must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfig(msg.into())
}

fn check_non_negative(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be a finite non-negative number, got {value}")))
    }
}
