use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::engine::InferenceEngine;

/// Registry of available inference engines, keyed by backend name.
///
/// Engines are boxed and handed out by value: the scheduler owns the single
/// engine it runs, so no locking is needed around `run`.
pub struct EngineRegistry {
    engines: HashMap<String, Box<dyn InferenceEngine>>,
    default_name: Option<String>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            default_name: None,
        }
    }

    /// Register an engine. The first registered engine becomes the default.
    pub fn register<E: InferenceEngine + 'static>(&mut self, engine: E) {
        let name = engine.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.engines.insert(name, Box::new(engine));
    }

    /// Set default engine by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(anyhow!("engine '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// List registered engines, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Take an engine out of the registry by name.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn InferenceEngine>> {
        self.engines.remove(name).ok_or_else(|| {
            anyhow!(
                "engine '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })
    }

    /// Take the default engine out of the registry.
    pub fn take_default(&mut self) -> Result<Box<dyn InferenceEngine>> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no engines registered"))?;
        self.take(&name)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubEngine;

    #[test]
    fn first_registered_engine_is_default() -> Result<()> {
        let mut registry = EngineRegistry::new();
        registry.register(StubEngine::default());
        assert_eq!(registry.list(), vec!["stub".to_string()]);
        let engine = registry.take_default()?;
        assert_eq!(engine.name(), "stub");
        assert!(registry.take("stub").is_err());
        Ok(())
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = EngineRegistry::new();
        registry.register(StubEngine::default());
        assert!(registry.set_default("tract").is_err());
    }
}
