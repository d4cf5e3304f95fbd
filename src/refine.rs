//! Re-detection of small subjects on an upscaled crop around their box.

use num_traits::cast::ToPrimitive;

use crate::config::RefinementConfig;
use crate::detection::BoundingBox;
use crate::landmark::RawLandmark;

/// Pixel-space region handed to the detector for a second look.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Resize factor to apply before detection (1.0 = none)
    pub scale: f32,
}

impl CropRegion {
    /// Box expanded by `margin` of its size on every side and clamped to the
    /// frame. `None` when nothing of it lies inside the frame.
    pub fn around(
        bbox: &BoundingBox,
        frame_width: u32,
        frame_height: u32,
        margin: f32,
        target_height: u32,
    ) -> Option<Self> {
        let fw = i64::from(frame_width);
        let fh = i64::from(frame_height);
        let x_min = (bbox.x_min * frame_width as f32).to_i64()?;
        let x_max = (bbox.x_max * frame_width as f32).to_i64()?;
        let y_min = (bbox.y_min * frame_height as f32).to_i64()?;
        let y_max = (bbox.y_max * frame_height as f32).to_i64()?;

        let box_width = (x_max - x_min).max(1);
        let box_height = (y_max - y_min).max(1);
        let margin_x = (box_width as f32 * margin).to_i64()?;
        let margin_y = (box_height as f32 * margin).to_i64()?;

        let x1 = (x_min - margin_x).max(0);
        let y1 = (y_min - margin_y).max(0);
        let x2 = (x_max + margin_x).min(fw);
        let y2 = (y_max + margin_y).min(fh);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let width = (x2 - x1).to_u32()?;
        let height = (y2 - y1).to_u32()?;
        let scale = if height < target_height {
            target_height as f32 / height as f32
        } else {
            1.0
        };
        Some(Self {
            x: x1.to_u32()?,
            y: y1.to_u32()?,
            width,
            height,
            scale,
        })
    }

    /// Upscaled size (width, height) of the crop.
    pub fn scaled_size(&self) -> (u32, u32) {
        let w = (self.width as f32 * self.scale).round().to_u32().unwrap_or(self.width);
        let h = (self.height as f32 * self.scale).round().to_u32().unwrap_or(self.height);
        (w, h)
    }

    /// Converts crop-normalized landmarks to full-frame normalized ones.
    pub fn map_to_frame(
        &self,
        landmarks: &[RawLandmark],
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<RawLandmark> {
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;
        landmarks
            .iter()
            .map(|lm| RawLandmark {
                name: lm.name.clone(),
                x: lm.x.map(|x| (self.x as f32 + x * self.width as f32) / fw),
                y: lm.y.map(|y| (self.y as f32 + y * self.height as f32) / fh),
                z: lm.z,
                conf: lm.conf,
            })
            .collect()
    }
}

/// A box small enough in pixels or as a frame fraction to be worth refining.
pub fn should_refine(bbox: &BoundingBox, config: &RefinementConfig) -> bool {
    bbox.height_px < config.crop_trigger_px || bbox.height_ratio < config.crop_trigger_ratio
}

/// The detector, re-run on a crop of the current frame.
///
/// Returns at most one subject, with landmarks normalized to the crop.
/// `Ok(None)` means nothing was found; an `Err` is a detector failure.
pub trait CropDetector {
    fn detect_crop(
        &mut self,
        frame_index: u64,
        region: &CropRegion,
    ) -> anyhow::Result<Option<Vec<RawLandmark>>>;
}

impl<F> CropDetector for F
where
    F: FnMut(u64, &CropRegion) -> anyhow::Result<Option<Vec<RawLandmark>>>,
{
    fn detect_crop(
        &mut self,
        frame_index: u64,
        region: &CropRegion,
    ) -> anyhow::Result<Option<Vec<RawLandmark>>> {
        self(frame_index, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::landmark::{Landmark, LandmarkId, LandmarkSet};
    use approx::assert_relative_eq;

    fn bbox(x_min: f32, y_min: f32, x_max: f32, y_max: f32, frame_height: u32) -> BoundingBox {
        let mut set = LandmarkSet::new();
        set.set(LandmarkId::Nose, Landmark::new(x_min, y_min, 0.0, None));
        set.set(LandmarkId::RightHeel, Landmark::new(x_max, y_max, 0.0, None));
        BoundingBox::from_landmarks(&set, frame_height, &DetectionConfig::default())
    }

    #[test]
    fn test_should_refine() {
        let cfg = RefinementConfig::default();
        // 0.1 of 1080 = 108 px
        assert!(should_refine(&bbox(0.4, 0.4, 0.5, 0.5, 1080), &cfg));
        // 0.5 of 1080 = 540 px
        assert!(!should_refine(&bbox(0.2, 0.2, 0.5, 0.7, 1080), &cfg));
        // 200 px but only 0.1 of the frame
        assert!(should_refine(&bbox(0.4, 0.4, 0.5, 0.5, 2000), &cfg));
    }

    #[test]
    fn test_region_with_margin_and_upscale() {
        let b = bbox(0.25, 0.25, 0.5, 0.5, 400);
        let region = CropRegion::around(&b, 400, 400, 0.25, 640).unwrap();
        // box is 100 px, margin 25 px
        assert_eq!(region.x, 75);
        assert_eq!(region.y, 75);
        assert_eq!(region.width, 150);
        assert_eq!(region.height, 150);
        assert_relative_eq!(region.scale, 640.0 / 150.0, epsilon = 1e-5);
        assert_eq!(region.scaled_size().1, 640);
    }

    #[test]
    fn test_region_clamped_to_frame() {
        let b = bbox(0.0, 0.0, 0.5, 1.0, 1000);
        let region = CropRegion::around(&b, 1000, 1000, 0.25, 640).unwrap();
        assert_eq!(region.x, 0);
        assert_eq!(region.y, 0);
        assert_eq!(region.width, 625);
        assert_eq!(region.height, 1000);
        assert_eq!(region.scale, 1.0);
    }

    #[test]
    fn test_empty_region_is_skipped() {
        assert!(CropRegion::around(&BoundingBox::default(), 640, 480, 0.25, 640).is_none());
        let outside = BoundingBox {
            x_min: 1.0,
            x_max: 1.0,
            y_min: 0.2,
            y_max: 0.4,
            ..BoundingBox::default()
        };
        assert!(CropRegion::around(&outside, 640, 480, 0.0, 640).is_none());
    }

    #[test]
    fn test_map_to_frame() {
        let region = CropRegion {
            x: 100,
            y: 50,
            width: 200,
            height: 100,
            scale: 2.0,
        };
        let mapped = region.map_to_frame(
            &[RawLandmark::named(LandmarkId::Nose, 0.5, 0.5, Some(0.8))],
            400,
            200,
        );
        assert_relative_eq!(mapped[0].x.unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(mapped[0].y.unwrap(), 0.5, epsilon = 1e-6);
        assert_eq!(mapped[0].conf, Some(0.8));
        assert_eq!(mapped[0].name.as_deref(), Some("NOSE"));
    }
}
