use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use tracing::trace;

/// The 33-point body landmark schema produced by the pose detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum LandmarkId {
    Nose = 0,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl LandmarkId {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkId; Self::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    const NAMES: [&'static str; Self::COUNT] = [
        "NOSE",
        "LEFT_EYE_INNER",
        "LEFT_EYE",
        "LEFT_EYE_OUTER",
        "RIGHT_EYE_INNER",
        "RIGHT_EYE",
        "RIGHT_EYE_OUTER",
        "LEFT_EAR",
        "RIGHT_EAR",
        "MOUTH_LEFT",
        "MOUTH_RIGHT",
        "LEFT_SHOULDER",
        "RIGHT_SHOULDER",
        "LEFT_ELBOW",
        "RIGHT_ELBOW",
        "LEFT_WRIST",
        "RIGHT_WRIST",
        "LEFT_PINKY",
        "RIGHT_PINKY",
        "LEFT_INDEX",
        "RIGHT_INDEX",
        "LEFT_THUMB",
        "RIGHT_THUMB",
        "LEFT_HIP",
        "RIGHT_HIP",
        "LEFT_KNEE",
        "RIGHT_KNEE",
        "LEFT_ANKLE",
        "RIGHT_ANKLE",
        "LEFT_HEEL",
        "RIGHT_HEEL",
        "LEFT_FOOT_INDEX",
        "RIGHT_FOOT_INDEX",
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Self::ALL[i])
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

impl Serialize for LandmarkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// One landmark observation. Every scalar may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub confidence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, confidence: Option<f32>) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            confidence,
        }
    }
}

/// Landmarks of one subject, one optional slot per `LandmarkId`.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    slots: [Option<Landmark>; LandmarkId::COUNT],
}

impl Default for LandmarkSet {
    fn default() -> Self {
        Self {
            slots: [None; LandmarkId::COUNT],
        }
    }
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LandmarkId) -> Option<&Landmark> {
        self.slots[id.index()].as_ref()
    }

    pub fn set(&mut self, id: LandmarkId, landmark: Landmark) {
        self.slots[id.index()] = Some(landmark);
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Present landmarks in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (LandmarkId, &Landmark)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|lm| (LandmarkId::ALL[i], lm)))
    }

    /// Builds the set from the detector's list shape. A named entry goes to the
    /// slot of its name, an unnamed one to the slot of its list position.
    pub fn from_raw(raw: &[RawLandmark]) -> Self {
        let mut set = Self::new();
        for (index, lm) in raw.iter().enumerate() {
            let id = match lm.name.as_deref() {
                Some(name) => LandmarkId::from_name(name),
                None => LandmarkId::from_index(index),
            };
            match id {
                Some(id) => set.set(id, lm.to_landmark()),
                None => trace!(index, name = ?lm.name, "dropping landmark outside the body schema"),
            }
        }
        set
    }

    pub fn to_raw(&self) -> Vec<RawLandmark> {
        self.iter()
            .map(|(id, lm)| RawLandmark {
                name: Some(id.name().to_string()),
                x: lm.x,
                y: lm.y,
                z: lm.z,
                conf: lm.confidence,
            })
            .collect()
    }
}

#[derive(Serialize)]
struct LandmarkEntry {
    name: LandmarkId,
    x: Option<f32>,
    y: Option<f32>,
    z: Option<f32>,
    conf: Option<f32>,
}

impl Serialize for LandmarkSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for (id, lm) in self.iter() {
            seq.serialize_element(&LandmarkEntry {
                name: id,
                x: lm.x,
                y: lm.y,
                z: lm.z,
                conf: lm.confidence,
            })?;
        }
        seq.end()
    }
}

/// Landmark as handed over by the detector collaborator, in normalized image
/// coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawLandmark {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub z: Option<f32>,
    #[serde(default, alias = "confidence", alias = "visibility")]
    pub conf: Option<f32>,
}

impl RawLandmark {
    pub fn named(id: LandmarkId, x: f32, y: f32, conf: Option<f32>) -> Self {
        Self {
            name: Some(id.name().to_string()),
            x: Some(x),
            y: Some(y),
            z: Some(0.0),
            conf,
        }
    }

    fn to_landmark(&self) -> Landmark {
        Landmark {
            x: self.x,
            y: self.y,
            z: self.z,
            confidence: self.conf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_ids() {
        for id in LandmarkId::ALL {
            assert_eq!(LandmarkId::from_name(id.name()), Some(id));
            assert_eq!(LandmarkId::from_index(id.index()), Some(id));
        }
        assert_eq!(LandmarkId::from_name("left_heel"), Some(LandmarkId::LeftHeel));
        assert_eq!(LandmarkId::from_name("LANDMARK_40"), None);
        assert_eq!(LandmarkId::from_index(LandmarkId::COUNT), None);
    }

    #[test]
    fn test_from_raw_by_name_and_position() {
        let raw = vec![
            RawLandmark::named(LandmarkId::RightHip, 0.4, 0.6, Some(0.9)),
            RawLandmark {
                name: None,
                x: Some(0.1),
                y: Some(0.2),
                z: None,
                conf: None,
            },
            RawLandmark {
                name: Some("TAIL".to_string()),
                x: Some(0.5),
                y: Some(0.5),
                z: None,
                conf: None,
            },
        ];
        let set = LandmarkSet::from_raw(&raw);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(LandmarkId::RightHip).unwrap().x, Some(0.4));
        // unnamed second entry lands in slot 1
        assert_eq!(set.get(LandmarkId::LeftEyeInner).unwrap().y, Some(0.2));
    }

    #[test]
    fn test_serializes_as_named_list() {
        let mut set = LandmarkSet::new();
        set.set(LandmarkId::LeftWrist, Landmark::new(0.5, 0.25, 0.0, None));
        set.set(LandmarkId::Nose, Landmark::new(0.5, 0.1, -0.1, Some(0.75)));
        let json = serde_json::to_value(&set).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["name"], "NOSE");
        assert_eq!(arr[0]["conf"], 0.75);
        assert_eq!(arr[1]["name"], "LEFT_WRIST");
        assert!(arr[1]["conf"].is_null());
    }

    #[test]
    fn test_raw_conf_aliases() {
        let json = r#"{"name": "NOSE", "x": 0.5, "y": 0.5, "visibility": 0.8}"#;
        let lm: RawLandmark = serde_json::from_str(json).unwrap();
        assert_eq!(lm.conf, Some(0.8));
        let lm: RawLandmark = serde_json::from_str(r#"{"x": 0.5, "y": null}"#).unwrap();
        assert_eq!(lm.y, None);
        assert_eq!(lm.name, None);
    }
}
