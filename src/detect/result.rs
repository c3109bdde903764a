use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedRect;

/// One candidate label for a detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

/// Raw output of one detector invocation for a single object.
///
/// `bbox` is normalized to the frame, bottom-left origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub labels: Vec<LabelScore>,
    pub bbox: NormalizedRect,
}

impl RawDetection {
    /// Single-label detection, the `(label, confidence, box)` tuple most detectors emit.
    pub fn new(label: impl Into<String>, confidence: f32, bbox: NormalizedRect) -> Self {
        Self {
            labels: vec![LabelScore {
                label: label.into(),
                confidence,
            }],
            bbox,
        }
    }

    /// Highest-confidence label. Ties keep the earlier entry.
    pub fn top_label(&self) -> Option<&LabelScore> {
        self.labels.iter().fold(None, |best: Option<&LabelScore>, candidate| match best {
            Some(current) if current.confidence >= candidate.confidence => Some(current),
            _ => Some(candidate),
        })
    }
}
