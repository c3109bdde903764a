//! Per-pass processing: filter, project, smooth, reconcile.
//!
//! `DetectionPipeline` is owned by whichever context renders overlays. It is
//! not thread-safe on purpose; passes arrive over a channel and are applied
//! one at a time.

use anyhow::Result;

use crate::detect::RawDetection;
use crate::filter::DetectionFilter;
use crate::geometry::ViewSize;
use crate::overlay::{OverlayChange, OverlayReconciler};
use crate::smoother::BoxSmoother;

#[derive(Debug)]
pub struct DetectionPipeline {
    filter: DetectionFilter,
    smoother: BoxSmoother,
    reconciler: OverlayReconciler,
    view: ViewSize,
}

impl DetectionPipeline {
    pub fn new(view: ViewSize, smoothing_factor: f32) -> Result<Self> {
        Ok(Self {
            filter: DetectionFilter::new(),
            smoother: BoxSmoother::new(smoothing_factor)?,
            reconciler: OverlayReconciler::new(),
            view,
        })
    }

    pub fn with_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Apply one completed pass and return the overlay changes it produced.
    pub fn process(&mut self, detections: &[RawDetection]) -> Vec<OverlayChange> {
        let present: Vec<_> = self
            .filter
            .apply(detections)
            .into_iter()
            .map(|recognized| {
                let raw = recognized.bbox.to_screen(self.view);
                (
                    recognized.category,
                    self.smoother.smooth(recognized.category, raw),
                )
            })
            .collect();

        let changes = self.reconciler.reconcile(&present);
        for change in &changes {
            if let OverlayChange::Removed { category, .. } = change {
                self.smoother.forget(*category);
            }
        }
        debug_assert!(self
            .smoother
            .tracked()
            .eq(self.reconciler.categories().into_iter()));
        changes
    }

    /// Change the view overlays are drawn into.
    ///
    /// Smoothing history is in the old pixel space, so it is dropped; each
    /// overlay re-seeds from its next raw box.
    pub fn set_view_size(&mut self, view: ViewSize) {
        if view != self.view {
            log::debug!(
                "view resized to {}x{}; resetting smoothing",
                view.width,
                view.height
            );
            self.view = view;
            self.smoother.reset();
        }
    }

    pub fn view_size(&self) -> ViewSize {
        self.view
    }

    /// Remove all overlays and smoothing state.
    pub fn clear(&mut self) -> Vec<OverlayChange> {
        self.smoother.reset();
        self.reconciler.clear()
    }

    pub fn overlays(&self) -> &OverlayReconciler {
        &self.reconciler
    }

    pub fn overlays_mut(&mut self) -> &mut OverlayReconciler {
        &mut self.reconciler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{NormalizedRect, ScreenRect};
    use crate::labels::{canonicalize, DeviceCategory, COCO_CLASS_NAMES};
    use crate::smoother::DEFAULT_SMOOTHING_FACTOR;

    fn pipeline() -> DetectionPipeline {
        DetectionPipeline::new(ViewSize::new(390.0, 844.0), DEFAULT_SMOOTHING_FACTOR).unwrap()
    }

    #[test]
    fn laptop_appears_holds_then_disappears() {
        let mut pipeline = pipeline();
        let laptop = RawDetection::new("laptop", 0.9, NormalizedRect::new(0.1, 0.1, 0.2, 0.2));
        let expected = ScreenRect::new(39.0, 0.7 * 844.0, 78.0, 0.2 * 844.0);

        let first = pipeline.process(std::slice::from_ref(&laptop));
        assert_eq!(first.len(), 1);
        match &first[0] {
            OverlayChange::Created(overlay) => {
                assert_eq!(overlay.label, "Laptop");
                assert!((overlay.rect.x - expected.x).abs() < 1e-3);
                assert!((overlay.rect.y - expected.y).abs() < 1e-3);
                assert!((overlay.rect.width - expected.width).abs() < 1e-3);
                assert!((overlay.rect.height - expected.height).abs() < 1e-3);
            }
            other => panic!("expected creation, got {:?}", other),
        }
        let seeded = pipeline.overlays().get(DeviceCategory::Laptop).unwrap().rect;

        let second = pipeline.process(std::slice::from_ref(&laptop));
        assert_eq!(
            second,
            vec![OverlayChange::Updated {
                category: DeviceCategory::Laptop,
                rect: seeded,
            }]
        );

        let third = pipeline.process(&[]);
        assert_eq!(
            third,
            vec![OverlayChange::Removed {
                category: DeviceCategory::Laptop,
                label: "Laptop".to_string(),
            }]
        );
        assert!(pipeline.overlays().is_empty());
    }

    #[test]
    fn unrecognized_labels_never_create_overlays() {
        let outside_allow_list = COCO_CLASS_NAMES
            .iter()
            .copied()
            .filter(|name| DeviceCategory::from_canonical(canonicalize(name)).is_none());
        let case_variants = [
            "Laptop",
            "TVMONITOR",
            "TvMonitor",
            "tv monitor",
            "Cell Phone",
            "MOUSE",
        ];
        let labels: Vec<&str> = outside_allow_list.chain(case_variants).collect();
        assert_eq!(labels.len(), 70 + case_variants.len());

        let mut pipeline = pipeline();
        for label in labels {
            for _ in 0..2 {
                let changes = pipeline.process(&[RawDetection::new(
                    label,
                    0.99,
                    NormalizedRect::new(0.0, 0.0, 0.5, 0.5),
                )]);
                assert!(changes.is_empty(), "'{}' produced {:?}", label, changes);
            }
            assert!(pipeline.overlays().is_empty());
        }
    }

    #[test]
    fn reappearing_category_is_not_smoothed_against_stale_history() {
        let mut pipeline = pipeline();
        pipeline.process(&[RawDetection::new(
            "toaster",
            0.8,
            NormalizedRect::new(0.0, 0.0, 0.1, 0.1),
        )]);
        pipeline.process(&[]);

        let far = NormalizedRect::new(0.8, 0.8, 0.1, 0.1);
        let changes = pipeline.process(&[RawDetection::new("toaster", 0.8, far)]);
        match &changes[0] {
            OverlayChange::Created(overlay) => {
                assert_eq!(overlay.rect, far.to_screen(pipeline.view_size()))
            }
            other => panic!("expected creation, got {:?}", other),
        }
    }

    #[test]
    fn selection_survives_geometry_updates() {
        let mut pipeline = pipeline();
        let pass = [RawDetection::new(
            "microwave",
            0.7,
            NormalizedRect::new(0.2, 0.2, 0.3, 0.3),
        )];
        pipeline.process(&pass);
        pipeline.overlays_mut().select(DeviceCategory::Microwave);
        pipeline.process(&[RawDetection::new(
            "microwave",
            0.7,
            NormalizedRect::new(0.25, 0.2, 0.3, 0.3),
        )]);
        assert!(pipeline.overlays().get(DeviceCategory::Microwave).unwrap().selected);
    }

    #[test]
    fn resize_reseeds_smoothing() {
        let mut pipeline = pipeline();
        let bbox = NormalizedRect::new(0.1, 0.1, 0.2, 0.2);
        pipeline.process(&[RawDetection::new("keyboard", 0.6, bbox)]);

        let view = ViewSize::new(800.0, 600.0);
        pipeline.set_view_size(view);
        pipeline.process(&[RawDetection::new("keyboard", 0.6, bbox)]);
        assert_eq!(
            pipeline.overlays().get(DeviceCategory::Keyboard).unwrap().rect,
            bbox.to_screen(view)
        );
    }

    #[test]
    fn clear_removes_everything() {
        let mut pipeline = pipeline();
        pipeline.process(&[
            RawDetection::new("oven", 0.6, NormalizedRect::new(0.1, 0.1, 0.2, 0.2)),
            RawDetection::new("refrigerator", 0.6, NormalizedRect::new(0.5, 0.1, 0.2, 0.2)),
        ]);
        assert_eq!(pipeline.clear().len(), 2);
        assert!(pipeline.overlays().is_empty());
    }
}
