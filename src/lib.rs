//! Device Detector
//!
//! Real-time detection of household devices in a camera feed, plus typed
//! clients for the account and catalog backend the detections are resolved
//! against.
//!
//! # Architecture
//!
//! Frames flow one way through the detection loop:
//!
//! ```text
//! FrameSource -> DetectorBackend -> DetectionFilter -> to_screen
//!     -> BoxSmoother -> OverlayReconciler -> display -> SelectionHandler
//! ```
//!
//! The loop holds these guarantees:
//!
//! 1. **Allow-list only**: labels outside `DeviceCategory` never reach the
//!    smoother or the overlay map.
//! 2. **Pass-exact overlays**: after each completed pass the overlay keys
//!    equal the categories that pass recognized.
//! 3. **One in flight**: frames arriving while the detector is busy are
//!    dropped, never queued.
//! 4. **Single owner**: overlay and smoothing state change only on the thread
//!    that owns the `DetectionScreen`.
//!
//! # Module Structure
//!
//! - `frame`, `ingest`: frames and the sources producing them
//! - `detect`: detector backends and their registry
//! - `filter`, `smoother`, `overlay`, `pipeline`: per-pass processing
//! - `screen`: worker threads and the event poll
//! - `selection`: overlay taps to catalog lookups
//! - `api`, `auth`, `catalog`, `models`: backend clients and session state
//! - `config`: file and environment configuration

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod filter;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod labels;
pub mod models;
pub mod overlay;
pub mod pipeline;
pub mod screen;
pub mod selection;
pub mod smoother;

pub use api::{ApiError, ApiGateway, HttpMethod, Session};
pub use config::ScannerConfig;
pub use detect::{BackendRegistry, DetectorBackend, LabelScore, RawDetection};
pub use frame::Frame;
pub use geometry::{NormalizedRect, ScreenRect, ViewSize};
pub use labels::DeviceCategory;
pub use overlay::{Overlay, OverlayChange};
pub use screen::{DetectionScreen, ScreenConfig, ScreenEvent, ScreenState};
pub use selection::{DeviceLookup, SelectionHandler, SelectionOutcome};
