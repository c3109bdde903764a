//! device_scan - run the detection screen against a frame source and log
//! overlay changes.

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use device_detector::api::FileCredentialStore;
use device_detector::auth::AuthService;
use device_detector::catalog::DeviceCatalog;
use device_detector::{
    ApiGateway, BackendRegistry, DetectionScreen, DeviceCategory, OverlayChange, ScannerConfig,
    ScreenEvent, ScreenState, SelectionHandler, SelectionOutcome, Session,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait after stopping for a lookup still in flight.
const SELECTION_GRACE: Duration = Duration::from_secs(20);

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan a camera feed for household devices")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "DEVICE_SCAN_CONFIG")]
    config: Option<PathBuf>,
    /// Run time in seconds; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Frame source URL (overrides config).
    #[arg(long)]
    source: Option<String>,
    /// Detector backend name (overrides config).
    #[arg(long)]
    backend: Option<String>,
    /// Detector script for the scripted backend (overrides config).
    #[arg(long)]
    script: Option<PathBuf>,
    /// Select the overlay with this label once it appears and look it up.
    #[arg(long, value_name = "LABEL")]
    tap: Option<String>,
    /// Skip the catalog backend entirely.
    #[arg(long)]
    offline: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ScannerConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(backend) = args.backend {
        cfg.detector.backend = backend;
    }
    if let Some(script) = args.script {
        cfg.detector.script_path = Some(script);
    }

    let mut screen = DetectionScreen::new(cfg.screen_config())?;
    if !args.offline {
        let store = Arc::new(FileCredentialStore::new(&cfg.credentials_path));
        let gateway = ApiGateway::new(&cfg.server_url, Session::shared(store))?;
        match AuthService::new(gateway.clone(), cfg.device_token.clone()).restore() {
            Ok(Some(step)) => log::info!("signed in (onboarding: {:?})", step),
            Ok(None) => log::info!("not signed in; catalog lookups may be rejected"),
            Err(err) => log::warn!("could not restore session: {:#}", err),
        }
        let catalog = DeviceCatalog::new(gateway);
        screen = screen.with_selection(SelectionHandler::new(Arc::new(catalog)));
    }

    let tap_target = match args.tap.as_deref() {
        Some(label) => Some(
            DeviceCategory::ALL
                .into_iter()
                .find(|category| category.display_label().eq_ignore_ascii_case(label))
                .ok_or_else(|| anyhow!("'{}' is not a recognized device label", label))?,
        ),
        None => None,
    };

    let registry = BackendRegistry::builtin(&cfg.detector, cfg.source.width, cfg.source.height);
    log::info!(
        "device_scan: source {} backend {} (available: {})",
        cfg.source.url,
        cfg.detector.backend,
        registry.list().join(", ")
    );
    screen.launch(cfg.source_config(), &registry, &cfg.detector.backend)?;
    if let ScreenState::Disabled(message) = screen.state() {
        return Err(anyhow!("{}", message));
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    let deadline = (args.seconds > 0).then(|| Instant::now() + Duration::from_secs(args.seconds));
    let mut tap_pending = tap_target;
    let mut awaiting_selection = false;
    let mut interrupted = false;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received");
                interrupted = true;
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        for event in screen.poll() {
            awaiting_selection &= !matches!(event, ScreenEvent::Selection(_));
            report(&event);
        }

        if let Some(category) = tap_pending {
            if screen.overlays().get(category).is_some() {
                if let Some(label) = screen.select(category)? {
                    log::info!("tapped '{}'", label);
                    awaiting_selection = !args.offline;
                }
                tap_pending = None;
            }
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    for event in screen.stop()? {
        report(&event);
    }

    // Selection outcomes still arrive after the workers stop.
    let grace = Instant::now() + SELECTION_GRACE;
    while awaiting_selection && !interrupted && Instant::now() < grace {
        if rx.recv_timeout(POLL_INTERVAL).is_ok() {
            break;
        }
        for event in screen.poll() {
            awaiting_selection &= !matches!(event, ScreenEvent::Selection(_));
            report(&event);
        }
    }
    if awaiting_selection {
        log::warn!("exiting before the catalog lookup finished");
    }
    let stats = screen.stats();
    log::info!(
        "device_scan finished: {} frames captured, {} dropped, {} passes ({} failed, {} discarded)",
        stats.frames_captured,
        stats.frames_dropped,
        stats.passes_completed,
        stats.passes_failed,
        stats.passes_discarded
    );
    Ok(())
}

fn report(event: &ScreenEvent) {
    match event {
        ScreenEvent::Overlay(OverlayChange::Created(overlay)) => log::info!(
            "+ {} at ({:.0}, {:.0}) {:.0}x{:.0}",
            overlay.label,
            overlay.rect.x,
            overlay.rect.y,
            overlay.rect.width,
            overlay.rect.height
        ),
        ScreenEvent::Overlay(OverlayChange::Updated { category, rect }) => log::debug!(
            "~ {} at ({:.0}, {:.0}) {:.0}x{:.0}",
            category.display_label(),
            rect.x,
            rect.y,
            rect.width,
            rect.height
        ),
        ScreenEvent::Overlay(OverlayChange::Removed { label, .. }) => log::info!("- {}", label),
        ScreenEvent::Selection(SelectionOutcome::Found { label, device }) => log::info!(
            "{}: {} ({}) in {} ({})",
            label,
            device.name,
            device.kind,
            device.location,
            device.specifications
        ),
        ScreenEvent::Selection(SelectionOutcome::NotFound { label }) => {
            log::info!("{}: no catalog record", label)
        }
        ScreenEvent::Selection(SelectionOutcome::Failed { label, message }) => {
            log::warn!("{}: lookup failed: {}", label, message)
        }
    }
}
