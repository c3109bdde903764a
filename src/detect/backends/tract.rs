#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{LabelScore, RawDetection};
use crate::frame::Frame;
use crate::geometry::NormalizedRect;
use crate::labels::COCO_CLASS_NAMES;

const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const MAX_LABELS_PER_DETECTION: usize = 3;

/// Per-label threshold for a configured minimum confidence.
pub(crate) fn confidence_threshold(configured: Option<f32>) -> f32 {
    configured.unwrap_or(DEFAULT_CONFIDENCE)
}

/// Class names for a model: `<model>.names` (one per line) when present,
/// otherwise the COCO table.
pub fn class_names_for(model_path: &Path) -> Result<Vec<String>> {
    let names_path = model_path.with_extension("names");
    if !names_path.exists() {
        return Ok(COCO_CLASS_NAMES.iter().map(|s| s.to_string()).collect());
    }
    let raw = std::fs::read_to_string(&names_path)
        .with_context(|| format!("failed to read class names {}", names_path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Tract-based backend for YOLO-style ONNX object detectors.
///
/// The model takes a `1x3xHxW` f32 RGB tensor in `[0, 1]` and produces a
/// `1xNxK` tensor where each row is `cx, cy, w, h` in input pixels followed by
/// either `C` class scores or an objectness score and `C` class scores.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    class_names: Vec<String>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        class_names: Vec<String>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if class_names.is_empty() {
            return Err(anyhow!("detector class table is empty"));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            class_names,
            width,
            height,
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let pixels = frame.pixels();
        if pixels.len() != frame.expected_rgb_len() {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                frame.expected_rgb_len(),
                pixels.len()
            ));
        }

        let width = frame.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, frame.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Candidate>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }

        let classes = self.class_names.len();
        let row_len = shape[2];
        let has_objectness = match row_len.checked_sub(4) {
            Some(n) if n == classes => false,
            Some(n) if n == classes + 1 => true,
            _ => {
                return Err(anyhow!(
                    "detector row length {} does not fit {} classes",
                    row_len,
                    classes
                ))
            }
        };
        let rows = view
            .into_shape((shape[1], row_len))
            .context("failed to reshape detector output")?;

        let (w, h) = (self.width as f32, self.height as f32);
        let mut candidates = Vec::new();
        for row in rows.outer_iter() {
            let objectness = if has_objectness { row[4] } else { 1.0 };
            let first_class = if has_objectness { 5 } else { 4 };

            let mut labels: Vec<LabelScore> = (0..classes)
                .map(|class| LabelScore {
                    label: self.class_names[class].clone(),
                    confidence: row[first_class + class] * objectness,
                })
                .filter(|score| score.confidence >= self.confidence_threshold)
                .collect();
            if labels.is_empty() {
                continue;
            }
            labels.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            labels.truncate(MAX_LABELS_PER_DETECTION);

            let Some(bbox) = row_bbox([row[0], row[1], row[2], row[3]], w, h) else {
                log::debug!("skipping detector row with non-finite box");
                continue;
            };
            candidates.push(Candidate { labels, bbox });
        }
        Ok(candidates)
    }
}

/// Convert a `cx, cy, w, h` pixel row to a bottom-left-origin unit box.
///
/// `None` when any coordinate is not finite.
fn row_bbox(coords: [f32; 4], w: f32, h: f32) -> Option<NormalizedRect> {
    if coords.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let [cx, cy, bw, bh] = coords;
    let left = ((cx - bw / 2.0) / w).clamp(0.0, 1.0);
    let top = ((cy - bh / 2.0) / h).clamp(0.0, 1.0);
    let width = (bw / w).clamp(0.0, 1.0 - left);
    let height = (bh / h).clamp(0.0, 1.0 - top);
    Some(NormalizedRect::new(left, 1.0 - top - height, width, height))
}

struct Candidate {
    labels: Vec<LabelScore>,
    bbox: NormalizedRect,
}

impl Candidate {
    fn top(&self) -> &LabelScore {
        &self.labels[0]
    }
}

fn iou(a: &NormalizedRect, b: &NormalizedRect) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);
    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class non-maximum suppression.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.top().confidence.total_cmp(&a.top().confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.top().label == candidate.top().label && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let candidates = self.decode(outputs)?;
        Ok(suppress(candidates, self.iou_threshold)
            .into_iter()
            .map(|c| RawDetection {
                labels: c.labels,
                bbox: c.bbox,
            })
            .collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(
            vec![0u8; (self.width as usize) * (self.height as usize) * 3],
            self.width,
            self.height,
            0,
        );
        self.detect(&blank).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(label: &str, confidence: f32, bbox: NormalizedRect) -> Candidate {
        Candidate {
            labels: vec![LabelScore {
                label: label.to_string(),
                confidence,
            }],
            bbox,
        }
    }

    #[test]
    fn suppression_keeps_best_box_per_class() {
        let a = candidate("laptop", 0.9, NormalizedRect::new(0.1, 0.1, 0.3, 0.3));
        let b = candidate("laptop", 0.6, NormalizedRect::new(0.12, 0.1, 0.3, 0.3));
        let c = candidate("mouse", 0.5, NormalizedRect::new(0.12, 0.1, 0.3, 0.3));
        let kept = suppress(vec![b, a, c], DEFAULT_IOU);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].top().confidence, 0.9);
        assert_eq!(kept[1].top().label, "mouse");
    }

    #[test]
    fn coco_table_spells_household_devices_like_the_allow_list() {
        use crate::labels::{canonicalize, DeviceCategory};
        let recognized = COCO_CLASS_NAMES
            .iter()
            .filter(|name| DeviceCategory::from_canonical(canonicalize(name)).is_some())
            .count();
        assert_eq!(recognized, DeviceCategory::ALL.len());
    }

    #[test]
    fn configured_confidence_replaces_default_threshold() {
        assert_eq!(confidence_threshold(None), DEFAULT_CONFIDENCE);
        assert_eq!(confidence_threshold(Some(0.1)), 0.1);
        assert_eq!(confidence_threshold(Some(0.6)), 0.6);
    }

    #[test]
    fn rows_map_to_bottom_left_unit_boxes() {
        let bbox = row_bbox([320.0, 120.0, 128.0, 96.0], 640.0, 480.0).unwrap();
        assert!((bbox.x - 0.4).abs() < 1e-6);
        assert!((bbox.width - 0.2).abs() < 1e-6);
        assert!((bbox.height - 0.2).abs() < 1e-6);
        // top edge at 72px from the top of a 480px frame
        assert!((bbox.y - (1.0 - 0.15 - 0.2)).abs() < 1e-6);
    }

    #[test]
    fn non_finite_rows_are_skipped() {
        assert_eq!(row_bbox([f32::NAN, 10.0, 5.0, 5.0], 640.0, 480.0), None);
        assert_eq!(row_bbox([10.0, 10.0, f32::INFINITY, 5.0], 640.0, 480.0), None);
        assert_eq!(row_bbox([10.0, 10.0, 5.0, f32::NEG_INFINITY], 640.0, 480.0), None);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = NormalizedRect::new(0.0, 0.0, 0.1, 0.1);
        let b = NormalizedRect::new(0.5, 0.5, 0.1, 0.1);
        assert_eq!(iou(&a, &b), 0.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }
}
