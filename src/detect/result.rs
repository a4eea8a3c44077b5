use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

/// Distance reported when depth is unknown or disabled.
pub const FAR_DISTANCE: f32 = 999.0;

/// Candidate box produced by the decoder, in source-image pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_index: usize,
    pub confidence: f32,
}

impl RawDetection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Intersection over union. Zero when either box has no area.
    pub fn iou(&self, other: &RawDetection) -> f32 {
        let area_a = self.area();
        let area_b = other.area();
        if area_a <= 0.0 || area_b <= 0.0 {
            return 0.0;
        }
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = iw * ih;
        let union = area_a + area_b - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Box corners as fractions of the image size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Ordered distance tiers, most urgent first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceCategory {
    VeryClose,
    Close,
    Nearby,
    Far,
}

impl DistanceCategory {
    pub const ALL: [DistanceCategory; 4] = [Self::VeryClose, Self::Close, Self::Nearby, Self::Far];

    /// Upper bounds are exclusive: 3.0 is `Close`, 8.0 is `Nearby`, 15.0 is `Far`.
    /// NaN falls through to `Far`.
    pub fn from_distance(distance: f32) -> Self {
        if distance < 3.0 {
            Self::VeryClose
        } else if distance < 8.0 {
            Self::Close
        } else if distance < 15.0 {
            Self::Nearby
        } else {
            Self::Far
        }
    }

    /// Zero-based ordinal; lower is more urgent.
    pub fn priority(self) -> u8 {
        match self {
            Self::VeryClose => 0,
            Self::Close => 1,
            Self::Nearby => 2,
            Self::Far => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryClose => "very close",
            Self::Close => "close",
            Self::Nearby => "nearby",
            Self::Far => "far",
        }
    }
}

/// Final, externally visible detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub distance: f32,
    pub category: DistanceCategory,
}

impl Detection {
    /// Build a detection; the category follows from `distance`.
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox, distance: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            distance,
            category: DistanceCategory::from_distance(distance),
        }
    }

    pub fn priority(&self) -> u8 {
        self.category.priority()
    }
}

// Priority is derived, so it is written out but never stored.
impl Serialize for Detection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Detection", 6)?;
        state.serialize_field("class_name", &self.class_name)?;
        state.serialize_field("confidence", &self.confidence)?;
        state.serialize_field("bbox", &self.bbox)?;
        state.serialize_field("distance", &self.distance)?;
        state.serialize_field("category", &self.category)?;
        state.serialize_field("priority", &self.priority())?;
        state.end()
    }
}
