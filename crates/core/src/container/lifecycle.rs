use std::fmt;
use std::sync::Arc;

use crate::container::active::ActiveDescriptor;
use crate::container::implementation::Instance;

/// Point in an instance's life a listener is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceLifecycleEventType {
    /// Every injectee resolved, the instance is about to be produced
    PreProduction,
    /// The instance is produced and post-construct has run
    PostProduction,
    /// The instance is about to be released
    PreDestruction,
}

impl fmt::Display for InstanceLifecycleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceLifecycleEventType::PreProduction => "PRE_PRODUCTION",
            InstanceLifecycleEventType::PostProduction => "POST_PRODUCTION",
            InstanceLifecycleEventType::PreDestruction => "PRE_DESTRUCTION",
        };
        f.write_str(name)
    }
}

/// Lifecycle event of a single instance
#[derive(Clone)]
pub struct InstanceLifecycleEvent {
    event_type: InstanceLifecycleEventType,
    descriptor: Arc<ActiveDescriptor>,
    instance: Option<Instance>,
}

impl InstanceLifecycleEvent {
    pub(crate) fn new(
        event_type: InstanceLifecycleEventType,
        descriptor: Arc<ActiveDescriptor>,
        instance: Option<Instance>,
    ) -> Self {
        Self {
            event_type,
            descriptor,
            instance,
        }
    }

    pub fn event_type(&self) -> InstanceLifecycleEventType {
        self.event_type
    }

    pub fn descriptor(&self) -> &Arc<ActiveDescriptor> {
        &self.descriptor
    }

    /// The instance, absent before production
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }
}

impl fmt::Debug for InstanceLifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLifecycleEvent")
            .field("event_type", &self.event_type)
            .field("descriptor", &self.descriptor.to_string())
            .field("has_instance", &self.instance.is_some())
            .finish()
    }
}

/// Synchronous observer of instance creation and destruction
///
/// Listeners are singleton services advertising `dyn InstanceLifecycleListener`.
/// They run on the creating thread, outside any registry lock.
pub trait InstanceLifecycleListener: Send + Sync {
    /// Limit the descriptors this listener hears about
    fn accepts(&self, _descriptor: &ActiveDescriptor) -> bool {
        true
    }

    fn lifecycle_event(&self, event: &InstanceLifecycleEvent);
}

/// Deliver an event to every accepting listener, containing panics
pub(crate) fn notify(listeners: &[Arc<dyn InstanceLifecycleListener>], event: &InstanceLifecycleEvent) {
    for listener in listeners {
        if !listener.accepts(event.descriptor()) {
            continue;
        }
        let delivered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            listener.lifecycle_event(event)
        }));
        if delivered.is_err() {
            tracing::warn!(
                "Instance lifecycle listener panicked on {} of '{}'",
                event.event_type(),
                event.descriptor()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::Descriptor;
    use std::sync::{Mutex, Weak};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<InstanceLifecycleEventType>>,
    }

    impl InstanceLifecycleListener for Recording {
        fn accepts(&self, descriptor: &ActiveDescriptor) -> bool {
            descriptor.implementation() != "app::Ignored"
        }

        fn lifecycle_event(&self, event: &InstanceLifecycleEvent) {
            self.seen.lock().unwrap().push(event.event_type());
        }
    }

    struct Panicking;

    impl InstanceLifecycleListener for Panicking {
        fn lifecycle_event(&self, _event: &InstanceLifecycleEvent) {
            panic!("listener failure");
        }
    }

    fn event(implementation: &str, event_type: InstanceLifecycleEventType) -> InstanceLifecycleEvent {
        let descriptor = ActiveDescriptor::new(Descriptor::builder(implementation).build(), Weak::new());
        InstanceLifecycleEvent::new(event_type, Arc::new(descriptor), None)
    }

    #[test]
    fn test_notify_filters_and_contains_panics() {
        let recording = Arc::new(Recording::default());
        let listeners: Vec<Arc<dyn InstanceLifecycleListener>> =
            vec![Arc::new(Panicking), recording.clone()];

        notify(&listeners, &event("app::Seen", InstanceLifecycleEventType::PreProduction));
        notify(&listeners, &event("app::Ignored", InstanceLifecycleEventType::PostProduction));
        notify(&listeners, &event("app::Seen", InstanceLifecycleEventType::PreDestruction));

        assert_eq!(
            *recording.seen.lock().unwrap(),
            vec![
                InstanceLifecycleEventType::PreProduction,
                InstanceLifecycleEventType::PreDestruction
            ]
        );
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(InstanceLifecycleEventType::PostProduction.to_string(), "POST_PRODUCTION");
    }
}
