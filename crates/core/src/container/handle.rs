use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::container::active::ActiveDescriptor;
use crate::container::autowiring::{InjectedValue, Injectee};
use crate::container::contract::Contract;
use crate::container::descriptor::Descriptor;
use crate::container::implementation::Instance;
use crate::container::locator::LocatorInner;
use crate::container::scope::PER_LOOKUP;
use crate::errors::CoreError;

#[derive(Default)]
struct HandleState {
    service: Option<Instance>,
    destroyed: bool,
    sub_handles: Vec<ServiceHandle>,
}

struct HandleInner {
    locator: Weak<LocatorInner>,
    descriptor: Arc<ActiveDescriptor>,
    injectee: Option<Injectee>,
    state: Mutex<HandleState>,
}

/// Caller-held reference to one lookup of a service
///
/// The first `service` call creates or finds the instance through the
/// descriptor's scope context; later calls return the same instance until the
/// handle is destroyed. Clones share the same state.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: Arc<HandleInner>,
}

impl ServiceHandle {
    pub(crate) fn new(
        locator: Weak<LocatorInner>,
        descriptor: Arc<ActiveDescriptor>,
        injectee: Option<Injectee>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                locator,
                descriptor,
                injectee,
                state: Mutex::new(HandleState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HandleState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_descriptor(&self) -> &Arc<ActiveDescriptor> {
        &self.inner.descriptor
    }

    /// Snapshot of the descriptor behind this handle
    pub fn descriptor(&self) -> Descriptor {
        self.inner.descriptor.descriptor()
    }

    /// Injectee this handle was looked up for, `None` for root lookups
    pub fn injectee(&self) -> Option<&Injectee> {
        self.inner.injectee.as_ref()
    }

    pub fn scope(&self) -> String {
        self.inner.descriptor.scope()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Whether an instance exists for this handle's descriptor
    pub fn is_active(&self) -> bool {
        {
            let state = self.state();
            if state.destroyed {
                return false;
            }
            if state.service.is_some() {
                return true;
            }
        }
        self.inner
            .locator
            .upgrade()
            .and_then(|locator| locator.context_for(&self.inner.descriptor).ok())
            .map(|context| context.contains_key(&self.inner.descriptor))
            .unwrap_or(false)
    }

    /// Number of per-lookup dependencies created on behalf of this handle
    pub fn sub_handle_count(&self) -> usize {
        self.state().sub_handles.len()
    }

    pub(crate) fn add_sub_handle(&self, handle: ServiceHandle) {
        if Arc::ptr_eq(&self.inner, &handle.inner) {
            return;
        }
        self.state().sub_handles.push(handle);
    }

    /// The service as its raw instance
    pub fn service_any(&self) -> Result<Instance, CoreError> {
        self.instance(None)
    }

    /// The service viewed as contract `T`
    pub fn service<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        let contract = Contract::of::<T>();
        self.resolve_value(&contract, None)?.downcast::<T>().map_err(|_| {
            CoreError::resolution(format!(
                "'{}' cannot be viewed as {}",
                self.inner.descriptor, contract
            ))
        })
    }

    /// The service cast to a contract view, created on behalf of `root`
    pub(crate) fn resolve_value(
        &self,
        contract: &Contract,
        root: Option<&ServiceHandle>,
    ) -> Result<InjectedValue, CoreError> {
        let instance = self.instance(root)?;
        let descriptor = &self.inner.descriptor;
        let reified = descriptor.reified().ok_or_else(|| {
            CoreError::illegal_state(format!("'{}' has not been reified", descriptor))
        })?;
        reified
            .view_for(contract)
            .and_then(|view| view.cast(&instance))
            .ok_or_else(|| {
                CoreError::resolution(format!("'{}' does not provide {}", descriptor, contract))
            })
    }

    fn instance(&self, root: Option<&ServiceHandle>) -> Result<Instance, CoreError> {
        {
            let state = self.state();
            if state.destroyed {
                return Err(CoreError::illegal_state(format!(
                    "handle for '{}' has been destroyed",
                    self.inner.descriptor
                )));
            }
            if let Some(service) = &state.service {
                return Ok(service.clone());
            }
        }

        let locator = self.inner.locator.upgrade().ok_or_else(|| CoreError::Shutdown {
            locator: "<dropped>".to_string(),
        })?;
        locator.ensure_running()?;
        let context = locator.context_for(&self.inner.descriptor)?;
        let instance = context.find_or_create(&self.inner.descriptor, Some(root.unwrap_or(self)))?;

        let mut state = self.state();
        if state.destroyed {
            return Err(CoreError::illegal_state(format!(
                "handle for '{}' was destroyed during creation",
                self.inner.descriptor
            )));
        }
        Ok(state.service.get_or_insert(instance).clone())
    }

    /// Destroy the handle, its per-lookup dependencies and, depending on scope, its instance
    ///
    /// Idempotent. Per-lookup instances are disposed directly; every other scope
    /// is asked to destroy the descriptor's instance through its context.
    pub fn destroy(&self) {
        let (service, sub_handles) = {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            (state.service.take(), std::mem::take(&mut state.sub_handles))
        };

        for sub_handle in sub_handles.iter().rev() {
            sub_handle.destroy();
        }

        let Some(instance) = service else {
            return;
        };
        let descriptor = &self.inner.descriptor;
        if descriptor.scope() == PER_LOOKUP {
            if let Err(e) = descriptor.dispose(&instance) {
                tracing::warn!("Failed to dispose '{}': {}", descriptor, e);
            }
            return;
        }
        if let Some(locator) = self.inner.locator.upgrade() {
            match locator.context_for(descriptor) {
                Ok(context) => context.destroy_one(descriptor),
                Err(e) => tracing::debug!("No context to destroy '{}' in: {}", descriptor, e),
            }
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ServiceHandle")
            .field("descriptor", &self.inner.descriptor.to_string())
            .field("injectee", &self.inner.injectee)
            .field("has_service", &state.service.is_some())
            .field("destroyed", &state.destroyed)
            .field("sub_handles", &state.sub_handles.len())
            .finish()
    }
}
