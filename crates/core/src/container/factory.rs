use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::config::{ConfigLoader, LocatorConfig};
use crate::container::locator::ServiceLocator;
use crate::errors::CoreError;

/// Creates locators and keeps them addressable by name
///
/// Locator names are unique within a factory; a parent named in the
/// configuration must already exist here.
#[derive(Debug, Default)]
pub struct LocatorFactory {
    next_id: AtomicU64,
    locators: RwLock<HashMap<String, ServiceLocator>>,
}

impl LocatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a locator from its configuration
    pub fn create(&self, config: LocatorConfig) -> Result<ServiceLocator, CoreError> {
        config
            .validate()
            .map_err(|e| CoreError::configuration(e.to_string()))?;

        let mut locators = self
            .locators
            .write()
            .map_err(|_| CoreError::lock("locator factory"))?;
        if locators.contains_key(&config.name) {
            return Err(CoreError::configuration(format!(
                "a locator named '{}' already exists",
                config.name
            )));
        }
        let parent = match &config.parent {
            Some(parent) => Some(locators.get(parent).cloned().ok_or_else(|| {
                CoreError::configuration(format!("parent locator '{}' does not exist", parent))
            })?),
            None => None,
        };

        let name = config.name.clone();
        let locator = ServiceLocator::open(self.next_id.fetch_add(1, Ordering::SeqCst), config, parent)?;
        locators.insert(name, locator.clone());
        tracing::info!("Locator '{}' registered with id {}", locator.name(), locator.id());
        Ok(locator)
    }

    /// Create a root locator with default settings
    pub fn create_named(&self, name: impl Into<String>) -> Result<ServiceLocator, CoreError> {
        self.create(LocatorConfig::named(name))
    }

    /// Create a locator whose lookups fall back to `parent`
    pub fn create_child(&self, name: impl Into<String>, parent: &ServiceLocator) -> Result<ServiceLocator, CoreError> {
        let mut config = LocatorConfig::named(name);
        config.parent = Some(parent.name().to_string());
        self.create(config)
    }

    pub fn find(&self, name: &str) -> Option<ServiceLocator> {
        self.locators
            .read()
            .ok()
            .and_then(|locators| locators.get(name).cloned())
    }

    /// Shut a locator down and forget it; false if no such locator exists
    pub fn destroy(&self, name: &str) -> bool {
        let removed = match self.locators.write() {
            Ok(mut locators) => locators.remove(name),
            Err(_) => {
                tracing::error!("Locator factory lock is poisoned");
                None
            }
        };
        match removed {
            Some(locator) => {
                locator.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.locators.read().map(|locators| locators.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let factory = LocatorFactory::new();
        factory.create_named("app").unwrap();
        let error = factory.create_named("app").unwrap_err();
        assert!(error.is_configuration());
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_parent_must_exist() {
        let factory = LocatorFactory::new();
        let mut config = LocatorConfig::named("child");
        config.parent = Some("missing".to_string());
        assert!(factory.create(config).unwrap_err().is_configuration());
    }

    #[test]
    fn test_child_links_to_parent() {
        let factory = LocatorFactory::new();
        let parent = factory.create_named("parent").unwrap();
        let child = factory.create_child("child", &parent).unwrap();

        assert_eq!(child.parent().map(|p| p.name()), Some("parent"));
        assert_ne!(child.id(), parent.id());
        assert_eq!(factory.find("child").map(|l| l.id()), Some(child.id()));
    }

    #[test]
    fn test_destroy_shuts_down() {
        let factory = LocatorFactory::new();
        let locator = factory.create_named("short-lived").unwrap();

        assert!(factory.destroy("short-lived"));
        assert!(!factory.destroy("short-lived"));
        assert!(locator.is_shutdown());
        assert!(factory.find("short-lived").is_none());
    }
}
