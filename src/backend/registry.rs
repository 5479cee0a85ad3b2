//! Backend registry
//!
//! Name → factory mapping, built once at startup and read-only afterwards.
//! It is an ordinary value passed to whoever needs to open a backend.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FlatError, Result};

use super::{Backend, BackendFactory, BackendOptions, LsmFactory, MemoryFactory};

/// Available backend drivers
pub struct Registry {
    factories: HashMap<&'static str, Box<dyn BackendFactory>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding the drivers shipped with flatkv
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(MemoryFactory));
        registry.register(Box::new(LsmFactory));
        registry
    }

    /// Add or replace a driver
    pub fn register(&mut self, factory: Box<dyn BackendFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    /// Open `name` with the driver registered as `driver`
    pub fn open(
        &self,
        driver: &str,
        name: &str,
        options: &BackendOptions,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(driver)
            .ok_or_else(|| FlatError::UnknownBackend(driver.to_string()))?;

        tracing::info!(driver, name, "opening backend");
        let backend = factory.open(name, options)?;
        Ok(Arc::from(backend))
    }

    pub fn contains(&self, driver: &str) -> bool {
        self.factories.contains_key(driver)
    }

    /// Registered driver names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
