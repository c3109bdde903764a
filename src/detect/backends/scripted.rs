use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// One scripted detector invocation.
#[derive(Clone, Debug, Deserialize)]
pub enum ScriptedPass {
    #[serde(rename = "detections")]
    Detections(Vec<RawDetection>),
    #[serde(rename = "error")]
    Fail(String),
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    passes: Vec<ScriptedPass>,
    #[serde(default)]
    repeat: bool,
    #[serde(default)]
    latency_ms: u64,
}

/// Replays a fixed sequence of detector outputs, one per invocation.
///
/// Used by tests and by the demo binary when no model is configured. Once the
/// script is exhausted the backend either wraps around (`repeat`) or reports
/// empty passes.
pub struct ScriptedBackend {
    passes: Vec<ScriptedPass>,
    cursor: usize,
    repeat: bool,
    latency: Duration,
    unavailable: Option<String>,
    invocations: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub fn new(passes: Vec<ScriptedPass>) -> Self {
        Self {
            passes,
            cursor: 0,
            repeat: false,
            latency: Duration::ZERO,
            unavailable: None,
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Load a script from a JSON file of the form `{"passes": [...], "repeat": true}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detector script {}", path.display()))?;
        let script: ScriptFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detector script {}: {}", path.display(), e))?;
        Ok(Self::new(script.passes)
            .with_repeat(script.repeat)
            .with_latency(Duration::from_millis(script.latency_ms)))
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Simulated inference time per invocation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `warm_up` fail, as a missing or unloadable model would.
    pub fn unavailable(mut self, reason: impl Into<String>) -> Self {
        self.unavailable = Some(reason.into());
        self
    }

    /// Shared counter of `detect` calls.
    pub fn invocations(&self) -> Arc<AtomicU64> {
        self.invocations.clone()
    }

    fn next_pass(&mut self) -> Option<ScriptedPass> {
        if self.cursor >= self.passes.len() {
            if !self.repeat || self.passes.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let pass = self.passes.get(self.cursor).cloned();
        self.cursor += 1;
        pass
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        match self.next_pass() {
            Some(ScriptedPass::Detections(detections)) => Ok(detections),
            Some(ScriptedPass::Fail(reason)) => Err(anyhow!("scripted inference failure: {}", reason)),
            None => Ok(Vec::new()),
        }
    }

    fn warm_up(&mut self) -> Result<()> {
        match &self.unavailable {
            Some(reason) => Err(anyhow!("detector model unavailable: {}", reason)),
            None => Ok(()),
        }
    }
}
