//! Detection filter.
//!
//! Reduces one pass of raw detector output to at most one box per recognized
//! device category:
//! 1. keep only each detection's top label
//! 2. canonicalize the label spelling
//! 3. drop anything outside the allow-list
//!
//! When a category is reported more than once in a pass, the highest-confidence
//! detection wins; on an exact tie the earlier detection in detector order wins.

use std::collections::BTreeMap;

use crate::detect::RawDetection;
use crate::geometry::NormalizedRect;
use crate::labels::{canonicalize, DeviceCategory};

/// A detection that survived filtering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecognizedDetection {
    pub category: DeviceCategory,
    pub confidence: f32,
    pub bbox: NormalizedRect,
}

#[derive(Clone, Debug, Default)]
pub struct DetectionFilter {
    min_confidence: f32,
}

impl DetectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop top labels below this confidence. Defaults to 0 (keep everything).
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Filter one pass. Output is ordered by category.
    pub fn apply(&self, detections: &[RawDetection]) -> Vec<RecognizedDetection> {
        let mut by_category: BTreeMap<DeviceCategory, RecognizedDetection> = BTreeMap::new();

        for detection in detections {
            let Some(top) = detection.top_label() else {
                continue;
            };
            if top.confidence < self.min_confidence {
                continue;
            }
            let Some(category) = DeviceCategory::from_canonical(canonicalize(&top.label)) else {
                log::trace!("ignoring unrecognized label '{}'", top.label);
                continue;
            };

            let candidate = RecognizedDetection {
                category,
                confidence: top.confidence,
                bbox: detection.bbox,
            };
            by_category
                .entry(category)
                .and_modify(|current| {
                    if candidate.confidence > current.confidence {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }

        by_category.into_values().collect()
    }
}
