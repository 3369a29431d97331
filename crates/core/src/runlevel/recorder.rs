use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::container::active::ActiveDescriptor;
use crate::container::lifecycle::{InstanceLifecycleEvent, InstanceLifecycleEventType, InstanceLifecycleListener};
use crate::runlevel::{is_run_level_component, level_of};

/// Remembers, per level, the order in which run-level components came up
///
/// Registered as an instance lifecycle listener. A component is recorded at
/// its own level when produced and forgotten when destroyed.
pub struct RunLevelRecorder {
    environment: String,
    levels: Mutex<BTreeMap<i32, Vec<Arc<ActiveDescriptor>>>>,
}

impl RunLevelRecorder {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            levels: Mutex::new(BTreeMap::new()),
        }
    }

    fn levels(&self) -> MutexGuard<'_, BTreeMap<i32, Vec<Arc<ActiveDescriptor>>>> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Components activated at `level`, oldest first
    pub fn recorded(&self, level: i32) -> Vec<Arc<ActiveDescriptor>> {
        self.levels().get(&level).cloned().unwrap_or_default()
    }

    /// Levels with at least one live component, lowest first
    pub fn recorded_levels(&self) -> Vec<i32> {
        self.levels()
            .iter()
            .filter(|(_, stack)| !stack.is_empty())
            .map(|(level, _)| *level)
            .collect()
    }

    /// Remove and return a level's stack, oldest first
    pub(crate) fn take_level(&self, level: i32) -> Vec<Arc<ActiveDescriptor>> {
        self.levels().remove(&level).unwrap_or_default()
    }

    fn push(&self, descriptor: &Arc<ActiveDescriptor>) {
        let level = match level_of(&descriptor.read()) {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!("Not recording '{}': {}", descriptor, e);
                return;
            }
        };
        tracing::debug!("Run level {} activated '{}'", level, descriptor);
        self.levels().entry(level).or_default().push(descriptor.clone());
    }

    fn forget(&self, descriptor: &Arc<ActiveDescriptor>) {
        let mut levels = self.levels();
        for stack in levels.values_mut() {
            stack.retain(|recorded| !Arc::ptr_eq(recorded, descriptor));
        }
        levels.retain(|_, stack| !stack.is_empty());
    }
}

impl InstanceLifecycleListener for RunLevelRecorder {
    fn accepts(&self, descriptor: &ActiveDescriptor) -> bool {
        is_run_level_component(&descriptor.read(), &self.environment)
    }

    fn lifecycle_event(&self, event: &InstanceLifecycleEvent) {
        match event.event_type() {
            InstanceLifecycleEventType::PostProduction => self.push(event.descriptor()),
            InstanceLifecycleEventType::PreDestruction => self.forget(event.descriptor()),
            InstanceLifecycleEventType::PreProduction => {}
        }
    }
}

impl fmt::Debug for RunLevelRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: BTreeMap<i32, usize> = self
            .levels()
            .iter()
            .map(|(level, stack)| (*level, stack.len()))
            .collect();
        f.debug_struct("RunLevelRecorder")
            .field("environment", &self.environment)
            .field("levels", &levels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::Descriptor;
    use crate::runlevel::RunLevelDescriptorExt;
    use std::sync::Weak;

    fn component(name: &str, level: i32) -> Arc<ActiveDescriptor> {
        Arc::new(ActiveDescriptor::new(
            Descriptor::builder(name).at_run_level(level).build(),
            Weak::new(),
        ))
    }

    fn event(kind: InstanceLifecycleEventType, descriptor: &Arc<ActiveDescriptor>) -> InstanceLifecycleEvent {
        InstanceLifecycleEvent::new(kind, descriptor.clone(), None)
    }

    #[test]
    fn test_records_per_level_in_order() {
        let recorder = RunLevelRecorder::new("default");
        let a = component("app::A", 1);
        let b = component("app::B", 1);
        let c = component("app::C", 2);

        for descriptor in [&a, &b, &c] {
            recorder.lifecycle_event(&event(InstanceLifecycleEventType::PostProduction, descriptor));
        }
        let names: Vec<String> = recorder.recorded(1).iter().map(|d| d.implementation()).collect();
        assert_eq!(names, vec!["app::A", "app::B"]);
        assert_eq!(recorder.recorded_levels(), vec![1, 2]);

        recorder.lifecycle_event(&event(InstanceLifecycleEventType::PreDestruction, &c));
        assert_eq!(recorder.recorded_levels(), vec![1]);
        assert_eq!(recorder.take_level(1).len(), 2);
        assert!(recorder.recorded(1).is_empty());
    }

    #[test]
    fn test_accepts_only_its_environment() {
        let recorder = RunLevelRecorder::new("test");
        let plain = component("app::Plain", 0);
        let scoped = Arc::new(ActiveDescriptor::new(
            Descriptor::builder("app::Scoped")
                .at_run_level(0)
                .in_environment("test")
                .build(),
            Weak::new(),
        ));

        assert!(!recorder.accepts(&plain));
        assert!(recorder.accepts(&scoped));
    }
}
