use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::ScriptedBackend;
use crate::config::DetectorSettings;

type BackendFactory = Box<dyn Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Registry of detector backend factories, keyed by name.
///
/// Backends are built lazily: a model is only loaded when the detection screen
/// asks for it, so a missing model surfaces as an initialization failure of
/// that screen rather than of the whole process.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Register a factory. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Build a backend by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn DetectorBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))?;
        factory()
    }

    /// Build the default backend.
    pub fn create_default(&self) -> Result<Box<dyn DetectorBackend>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        self.create(name)
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl BackendRegistry {
    /// Registry of the backends compiled into this build, configured from
    /// detector settings. Models load when a backend is created.
    pub fn builtin(settings: &DetectorSettings, input_width: u32, input_height: u32) -> Self {
        let mut registry = Self::new();

        let script_path = settings.script_path.clone();
        registry.register("scripted", move || {
            let backend = match &script_path {
                Some(path) => ScriptedBackend::from_file(path)?,
                None => ScriptedBackend::new(Vec::new()),
            };
            Ok(Box::new(backend) as Box<dyn DetectorBackend>)
        });

        #[cfg(feature = "backend-tract")]
        {
            let model_path = settings.model_path.clone();
            let min_confidence = settings.min_confidence;
            registry.register("tract", move || {
                let model_path = model_path
                    .as_deref()
                    .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
                let class_names = super::backends::class_names_for(model_path)?;
                let backend = super::backends::TractBackend::new(
                    model_path,
                    class_names,
                    input_width,
                    input_height,
                )?
                .with_threshold(super::backends::tract::confidence_threshold(min_confidence));
                Ok(Box::new(backend) as Box<dyn DetectorBackend>)
            });
        }
        #[cfg(not(feature = "backend-tract"))]
        let _ = (input_width, input_height);

        registry
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
