//! The detection screen: capture and inference workers feeding the overlay
//! pipeline.
//!
//! Threads:
//! - capture: pulls frames at the target rate and hands one to inference only
//!   when nothing is in flight; every other frame is dropped and counted
//! - inference: runs the backend on one borrowed frame at a time and sends the
//!   completed pass back
//! - owner: whoever holds the `DetectionScreen`. Overlay and smoothing state
//!   live here and change only inside `poll`, so no locks guard them.
//!
//! Each `start` opens a new epoch. Passes from an older epoch, or arriving
//! while the screen is not running, are discarded.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::detect::{BackendRegistry, DetectorBackend, RawDetection};
use crate::filter::DetectionFilter;
use crate::frame::Frame;
use crate::geometry::ViewSize;
use crate::ingest::{open_source, FrameSource, SourceConfig};
use crate::labels::DeviceCategory;
use crate::overlay::{OverlayChange, OverlayReconciler};
use crate::pipeline::DetectionPipeline;
use crate::selection::{SelectionHandler, SelectionOutcome};
use crate::smoother::DEFAULT_SMOOTHING_FACTOR;

pub const NO_CAMERA_ACCESS: &str = "No camera access";
pub const DETECTION_UNAVAILABLE: &str = "Device detection is unavailable";

/// Frames dropped between periodic debug summaries.
const DROP_LOG_EVERY: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreenState {
    Idle,
    Running,
    /// Initialization failed; the message is shown to the user.
    Disabled(String),
    Stopped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScreenEvent {
    Overlay(OverlayChange),
    Selection(SelectionOutcome),
}

#[derive(Clone, Debug)]
pub struct ScreenConfig {
    pub target_fps: u32,
    pub view: ViewSize,
    pub smoothing_factor: f32,
    pub min_confidence: f32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            target_fps: 10,
            view: ViewSize::default(),
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            min_confidence: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenStats {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub passes_discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
    passes_discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ScreenStats {
        ScreenStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            passes_discarded: self.passes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Output of one completed detector invocation.
#[derive(Debug)]
struct Pass {
    epoch: u64,
    seq: u64,
    detections: Vec<RawDetection>,
}

pub struct DetectionScreen {
    config: ScreenConfig,
    state: ScreenState,
    pipeline: DetectionPipeline,
    selection: Option<SelectionHandler>,
    epoch: u64,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
    passes: Option<Receiver<Pass>>,
    outcomes_tx: Sender<SelectionOutcome>,
    outcomes_rx: Receiver<SelectionOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl DetectionScreen {
    pub fn new(config: ScreenConfig) -> Result<Self> {
        if config.target_fps == 0 {
            return Err(anyhow!("target_fps must be at least 1"));
        }
        let pipeline = DetectionPipeline::new(config.view, config.smoothing_factor)?
            .with_filter(DetectionFilter::new().with_min_confidence(config.min_confidence));
        let (outcomes_tx, outcomes_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            config,
            state: ScreenState::Idle,
            pipeline,
            selection: None,
            epoch: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            passes: None,
            outcomes_tx,
            outcomes_rx,
            workers: Vec::new(),
        })
    }

    /// Route overlay taps to a catalog lookup.
    pub fn with_selection(mut self, handler: SelectionHandler) -> Self {
        self.selection = Some(handler);
        self
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ScreenState::Running
    }

    pub fn stats(&self) -> ScreenStats {
        self.counters.snapshot()
    }

    pub fn overlays(&self) -> &OverlayReconciler {
        self.pipeline.overlays()
    }

    pub fn set_view_size(&mut self, view: ViewSize) {
        self.pipeline.set_view_size(view);
    }

    /// Connect the source, warm up the backend and spawn the workers.
    ///
    /// Initialization failures leave the screen `Disabled` and return `Ok`;
    /// `Err` means the screen could not be started at all.
    pub fn start(
        &mut self,
        mut source: Box<dyn FrameSource>,
        mut backend: Box<dyn DetectorBackend>,
    ) -> Result<()> {
        if self.is_running() {
            return Err(anyhow!("detection screen already running"));
        }

        if let Err(err) = source.connect() {
            log::warn!("frame source unavailable: {:#}", err);
            self.state = ScreenState::Disabled(NO_CAMERA_ACCESS.to_string());
            return Ok(());
        }
        if let Err(err) = backend.warm_up() {
            log::warn!("detector backend '{}' unavailable: {:#}", backend.name(), err);
            self.state = ScreenState::Disabled(DETECTION_UNAVAILABLE.to_string());
            return Ok(());
        }

        self.epoch += 1;
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Frame>(1);
        let (pass_tx, pass_rx) = crossbeam_channel::unbounded::<Pass>();

        let capture = {
            let shutdown = shutdown.clone();
            let in_flight = in_flight.clone();
            let counters = self.counters.clone();
            let interval = Duration::from_secs_f64(1.0 / self.config.target_fps as f64);
            std::thread::Builder::new()
                .name("frame-capture".to_string())
                .spawn(move || {
                    capture_loop(source, frame_tx, &shutdown, &in_flight, &counters, interval)
                })
                .map_err(|err| anyhow!("spawn capture thread: {}", err))?
        };

        let inference = {
            let shutdown = shutdown.clone();
            let counters = self.counters.clone();
            let epoch = self.epoch;
            std::thread::Builder::new()
                .name("inference".to_string())
                .spawn(move || {
                    inference_loop(
                        backend.as_mut(),
                        frame_rx,
                        pass_tx,
                        &shutdown,
                        &in_flight,
                        &counters,
                        epoch,
                    )
                })
        };
        let inference = match inference {
            Ok(handle) => handle,
            Err(err) => {
                shutdown.store(true, Ordering::SeqCst);
                let _ = capture.join();
                return Err(anyhow!("spawn inference thread: {}", err));
            }
        };

        self.shutdown = shutdown;
        self.passes = Some(pass_rx);
        self.workers = vec![capture, inference];
        self.state = ScreenState::Running;
        log::info!(
            "detection screen running (epoch {}, {} fps)",
            self.epoch,
            self.config.target_fps
        );
        Ok(())
    }

    /// Open the configured source, build the named backend and start.
    ///
    /// A source or backend that cannot be built disables the screen like a
    /// failed connect or warm-up would.
    pub fn launch(
        &mut self,
        source: SourceConfig,
        registry: &BackendRegistry,
        backend: &str,
    ) -> Result<()> {
        let source = match open_source(source) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("frame source unavailable: {:#}", err);
                self.state = ScreenState::Disabled(NO_CAMERA_ACCESS.to_string());
                return Ok(());
            }
        };
        let backend = match registry.create(backend) {
            Ok(backend) => backend,
            Err(err) => {
                log::warn!("detector backend '{}' unavailable: {:#}", backend, err);
                self.state = ScreenState::Disabled(DETECTION_UNAVAILABLE.to_string());
                return Ok(());
            }
        };
        self.start(source, backend)
    }

    /// Apply completed passes and selection outcomes, in arrival order.
    pub fn poll(&mut self) -> Vec<ScreenEvent> {
        let mut events = Vec::new();

        let passes: Vec<Pass> = match &self.passes {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for pass in passes {
            if !self.is_running() || pass.epoch != self.epoch {
                self.counters.passes_discarded.fetch_add(1, Ordering::Relaxed);
                log::debug!("discarding stale pass for frame {}", pass.seq);
                continue;
            }
            events.extend(
                self.pipeline
                    .process(&pass.detections)
                    .into_iter()
                    .map(ScreenEvent::Overlay),
            );
        }

        events.extend(self.outcomes_rx.try_iter().map(ScreenEvent::Selection));
        events
    }

    /// Hit-test a screen point, select the overlay and start its lookup.
    ///
    /// Returns the tapped overlay's label.
    pub fn tap(&mut self, x: f32, y: f32) -> Result<Option<String>> {
        let Some(category) = self.overlays().overlay_at(x, y).map(|o| o.category) else {
            return Ok(None);
        };
        self.select(category)
    }

    /// Select an overlay by category and start its lookup.
    pub fn select(&mut self, category: DeviceCategory) -> Result<Option<String>> {
        let Some(label) = self
            .pipeline
            .overlays_mut()
            .select(category)
            .map(|overlay| overlay.label.clone())
        else {
            return Ok(None);
        };
        match &self.selection {
            Some(handler) => {
                handler.dispatch(&label, self.outcomes_tx.clone())?;
            }
            None => log::debug!("no catalog configured; '{}' selected locally", label),
        }
        Ok(Some(label))
    }

    /// Stop the workers and remove every overlay.
    pub fn stop(&mut self) -> Result<Vec<ScreenEvent>> {
        if !self.is_running() {
            return Ok(Vec::new());
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.epoch += 1;
        self.state = ScreenState::Stopped;
        self.join_workers()?;

        if let Some(rx) = self.passes.take() {
            let stale = rx.try_iter().count() as u64;
            self.counters
                .passes_discarded
                .fetch_add(stale, Ordering::Relaxed);
        }
        let stats = self.stats();
        log::info!(
            "detection screen stopped: {} frames, {} dropped, {} passes, {} failed",
            stats.frames_captured,
            stats.frames_dropped,
            stats.passes_completed,
            stats.passes_failed
        );
        Ok(self
            .pipeline
            .clear()
            .into_iter()
            .map(ScreenEvent::Overlay)
            .collect())
    }

    fn join_workers(&mut self) -> Result<()> {
        let mut panicked = Vec::new();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                panicked.push(name);
            }
        }
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("worker thread panicked: {}", panicked.join(", ")))
        }
    }
}

impl Drop for DetectionScreen {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(err) = self.stop() {
                log::warn!("detection screen shutdown: {:#}", err);
            }
        }
    }
}

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    frames: Sender<Frame>,
    shutdown: &AtomicBool,
    in_flight: &AtomicBool,
    counters: &Counters,
    interval: Duration,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let tick = Instant::now();
        match source.next_frame() {
            Ok(frame) => {
                counters.frames_captured.fetch_add(1, Ordering::Relaxed);
                let handed_off = in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                    && match frames.try_send(frame) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) => {
                            in_flight.store(false, Ordering::Release);
                            false
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    };
                if !handed_off {
                    let dropped = counters.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped % DROP_LOG_EVERY == 0 {
                        log::debug!("{} frames dropped while inference was busy", dropped);
                    }
                }
            }
            Err(err) => {
                log::warn!("frame capture failed: {:#}", err);
            }
        }
        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    log::debug!(
        "capture loop exiting after {} frames",
        source.stats().frames_captured
    );
}

fn inference_loop(
    backend: &mut dyn DetectorBackend,
    frames: Receiver<Frame>,
    passes: Sender<Pass>,
    shutdown: &AtomicBool,
    in_flight: &AtomicBool,
    counters: &Counters,
    epoch: u64,
) {
    for frame in frames.iter() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let seq = frame.seq;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| backend.detect(&frame)))
            .unwrap_or_else(|payload| {
                Err(anyhow!("detector panicked: {}", panic_message(payload.as_ref())))
            });
        drop(frame);
        match result {
            Ok(detections) => {
                counters.passes_completed.fetch_add(1, Ordering::Relaxed);
                let sent = passes.send(Pass {
                    epoch,
                    seq,
                    detections,
                });
                if sent.is_err() {
                    break;
                }
            }
            Err(err) => {
                counters.passes_failed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "detector '{}' failed on frame {}: {:#}",
                    backend.name(),
                    seq,
                    err
                );
            }
        }
        in_flight.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
