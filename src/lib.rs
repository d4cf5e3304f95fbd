pub mod assignment;
pub mod config;
pub mod detection;
pub mod error;
pub mod landmark;
pub mod occlusion;
pub mod output;
pub mod primary;
pub mod refine;
pub mod smoothing;
pub mod track;
pub mod tracker;

// Re-export main types
pub use crate::config::Config;
pub use crate::detection::{BoundingBox, Detection, RawDetection};
pub use crate::error::{Error, Result};
pub use crate::landmark::{Landmark, LandmarkId, LandmarkSet, RawLandmark};
pub use crate::output::{FrameRecord, PoseDocument, RawPoseDocument, TrackFrameOutput};
pub use crate::refine::{CropDetector, CropRegion};
pub use crate::track::{Track, TrackId, TrackStatus};
pub use crate::tracker::{FrameInput, PoseTracker};
