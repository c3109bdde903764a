//! Overlay reconciliation.
//!
//! The reconciler owns the set of displayed overlays, keyed by category. Each
//! completed detection pass is reconciled against it: continuing categories are
//! moved in place, new ones are created, and every overlay whose category was
//! not reported in the pass is removed. There is no grace period.
//!
//! The display layer renders the returned `OverlayChange`s and nothing else.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::geometry::ScreenRect;
use crate::labels::DeviceCategory;

/// A displayed detection region.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overlay {
    pub category: DeviceCategory,
    /// Display text, also the catalog lookup key.
    pub label: String,
    pub rect: ScreenRect,
    /// UI state carried across geometry updates.
    pub selected: bool,
    /// Creation order; later overlays draw on top.
    pub z_order: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum OverlayChange {
    Created(Overlay),
    Updated {
        category: DeviceCategory,
        rect: ScreenRect,
    },
    Removed {
        category: DeviceCategory,
        label: String,
    },
}

impl OverlayChange {
    pub fn category(&self) -> DeviceCategory {
        match self {
            OverlayChange::Created(overlay) => overlay.category,
            OverlayChange::Updated { category, .. } => *category,
            OverlayChange::Removed { category, .. } => *category,
        }
    }
}

#[derive(Debug, Default)]
pub struct OverlayReconciler {
    overlays: BTreeMap<DeviceCategory, Overlay>,
    next_z: u64,
}

impl OverlayReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile one pass. `present` holds at most one entry per category.
    ///
    /// Changes are ordered: creations and updates in `present` order, then
    /// removals in category order.
    pub fn reconcile(&mut self, present: &[(DeviceCategory, ScreenRect)]) -> Vec<OverlayChange> {
        let mut changes = Vec::with_capacity(present.len());
        let mut seen = BTreeSet::new();

        for &(category, rect) in present {
            seen.insert(category);
            match self.overlays.get_mut(&category) {
                Some(existing) => {
                    existing.rect = rect;
                    changes.push(OverlayChange::Updated { category, rect });
                }
                None => {
                    let overlay = Overlay {
                        category,
                        label: category.display_label(),
                        rect,
                        selected: false,
                        z_order: self.next_z,
                    };
                    self.next_z += 1;
                    log::debug!("overlay created: {}", overlay.label);
                    self.overlays.insert(category, overlay.clone());
                    changes.push(OverlayChange::Created(overlay));
                }
            }
        }

        let stale: Vec<DeviceCategory> = self
            .overlays
            .keys()
            .filter(|category| !seen.contains(*category))
            .copied()
            .collect();
        for category in stale {
            if let Some(overlay) = self.overlays.remove(&category) {
                log::debug!("overlay removed: {}", overlay.label);
                changes.push(OverlayChange::Removed {
                    category,
                    label: overlay.label,
                });
            }
        }

        changes
    }

    /// Remove every overlay, e.g. when the screen stops.
    pub fn clear(&mut self) -> Vec<OverlayChange> {
        std::mem::take(&mut self.overlays)
            .into_values()
            .map(|overlay| OverlayChange::Removed {
                category: overlay.category,
                label: overlay.label,
            })
            .collect()
    }

    pub fn get(&self, category: DeviceCategory) -> Option<&Overlay> {
        self.overlays.get(&category)
    }

    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.values()
    }

    pub fn categories(&self) -> BTreeSet<DeviceCategory> {
        self.overlays.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Mark one overlay selected and clear the others.
    pub fn select(&mut self, category: DeviceCategory) -> Option<&Overlay> {
        for overlay in self.overlays.values_mut() {
            overlay.selected = overlay.category == category;
        }
        self.overlays.get(&category)
    }

    /// Topmost overlay containing a screen point.
    pub fn overlay_at(&self, x: f32, y: f32) -> Option<&Overlay> {
        self.overlays
            .values()
            .filter(|overlay| overlay.rect.contains(x, y))
            .max_by_key(|overlay| overlay.z_order)
    }
}
