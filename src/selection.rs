//! Overlay selection.
//!
//! A tap on an overlay becomes exactly one catalog lookup keyed by the
//! overlay's display text. There is no retry; the outcome is reported once.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;

use crate::models::Device;

/// Resolves a display label to a catalog record.
pub trait DeviceLookup: Send + Sync {
    /// `Ok(None)` when the catalog has no record for `name`.
    fn lookup_by_name(&self, name: &str) -> Result<Option<Device>>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectionOutcome {
    /// `label` is the tapped overlay's text; `device.name` is the catalog's.
    Found { label: String, device: Device },
    NotFound { label: String },
    Failed { label: String, message: String },
}

impl SelectionOutcome {
    /// The tapped overlay's label, whatever the catalog calls the device.
    pub fn label(&self) -> &str {
        match self {
            SelectionOutcome::Found { label, .. }
            | SelectionOutcome::NotFound { label }
            | SelectionOutcome::Failed { label, .. } => label,
        }
    }
}

#[derive(Clone)]
pub struct SelectionHandler {
    lookup: Arc<dyn DeviceLookup>,
}

impl SelectionHandler {
    pub fn new(lookup: Arc<dyn DeviceLookup>) -> Self {
        Self { lookup }
    }

    /// Run the lookup on the calling thread.
    pub fn resolve(&self, label: &str) -> SelectionOutcome {
        match self.lookup.lookup_by_name(label) {
            Ok(Some(device)) => SelectionOutcome::Found {
                label: label.to_string(),
                device,
            },
            Ok(None) => {
                log::info!("no catalog record for '{}'", label);
                SelectionOutcome::NotFound {
                    label: label.to_string(),
                }
            }
            Err(err) => {
                log::warn!("catalog lookup for '{}' failed: {:#}", label, err);
                SelectionOutcome::Failed {
                    label: label.to_string(),
                    message: err.to_string(),
                }
            }
        }
    }

    /// Run the lookup on a worker thread and send the outcome to `reply`.
    pub fn dispatch(&self, label: &str, reply: Sender<SelectionOutcome>) -> Result<JoinHandle<()>> {
        let handler = self.clone();
        let label = label.to_string();
        std::thread::Builder::new()
            .name("selection-lookup".to_string())
            .spawn(move || {
                let outcome = handler.resolve(&label);
                if reply.send(outcome).is_err() {
                    log::debug!("selection outcome for '{}' dropped; receiver gone", label);
                }
            })
            .map_err(|err| anyhow!("spawn selection lookup: {}", err))
    }
}
