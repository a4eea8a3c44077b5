use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Class name reported for indices outside the label table.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Labels of the stock 80-class COCO detector, in model order.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Labels of the 12-class obstacle detector, in model order and spelled as the
/// model was trained.
pub const OBSTACLE_LABELS: [&str; 12] = [
    "Bicycle", "Bus", "Car", "Chair", "Cow", "Dogs", "Motorcycle", "Person", "Stair", "Table",
    "Trash", "Truck",
];

/// Ordered class names matching a detector's score vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(anyhow!("label table must not be empty"));
        }
        Ok(Self { names })
    }

    pub fn coco() -> Self {
        Self {
            names: COCO_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn obstacle() -> Self {
        Self {
            names: OBSTACLE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// One label per non-empty line.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        Self::new(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
        .with_context(|| format!("label file {} has no labels", path.display()))
    }

    pub fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
