//! Active descriptors
//!
//! An [`ActiveDescriptor`] is the locator-owned form of a committed
//! [`Descriptor`]. It is reified lazily, at most once, into a [`Reified`]
//! injection plan, and it carries the single-slot instance cache that the
//! singleton-like contexts use.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, Weak};
use std::thread::{self, ThreadId};

use crate::container::autowiring::{Injectee, InjectionPoint};
use crate::container::contract::Contract;
use crate::container::descriptor::{Descriptor, DescriptorType};
use crate::container::handle::ServiceHandle;
use crate::container::implementation::{ContractView, ImplementationLoader, ImplementationType, Instance};
use crate::container::locator::LocatorInner;
use crate::container::scope::PER_LOOKUP;
use crate::container::creator;
use crate::errors::{CoreError, MultiError};

/// Result of reifying a descriptor
#[derive(Debug)]
pub struct Reified {
    implementation: Arc<ImplementationType>,
    scope: String,
    views: Vec<ContractView>,
    injectees: Vec<Injectee>,
}

impl Reified {
    pub fn implementation(&self) -> &Arc<ImplementationType> {
        &self.implementation
    }

    /// Effective scope
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Views for the advertised contracts
    pub fn views(&self) -> &[ContractView] {
        &self.views
    }

    pub fn injectees(&self) -> &[Injectee] {
        &self.injectees
    }

    /// View matching the exact contract type, if any
    pub fn view_for(&self, contract: &Contract) -> Option<&ContractView> {
        self.views
            .iter()
            .find(|view| view.contract().type_id() == contract.type_id())
    }
}

enum Reification {
    Pending,
    Reified(Arc<Reified>),
    Failed(CoreError),
}

#[derive(Default)]
struct CacheSlot {
    value: Option<Instance>,
    generation: Option<u64>,
    creating: Option<ThreadId>,
}

/// A committed descriptor together with its reification and instance cache
pub struct ActiveDescriptor {
    descriptor: RwLock<Descriptor>,
    locator: Weak<LocatorInner>,
    reification: Mutex<Reification>,
    cache: Mutex<CacheSlot>,
    cache_ready: Condvar,
}

impl ActiveDescriptor {
    pub(crate) fn new(descriptor: Descriptor, locator: Weak<LocatorInner>) -> Self {
        Self {
            descriptor: RwLock::new(descriptor),
            locator,
            reification: Mutex::new(Reification::Pending),
            cache: Mutex::new(CacheSlot::default()),
            cache_ready: Condvar::new(),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Descriptor> {
        self.descriptor.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the underlying descriptor
    pub fn descriptor(&self) -> Descriptor {
        self.read().clone()
    }

    pub fn implementation(&self) -> String {
        self.read().implementation().to_string()
    }

    pub fn name(&self) -> Option<String> {
        self.read().name().map(str::to_string)
    }

    pub fn rank(&self) -> i32 {
        self.read().rank()
    }

    pub fn service_id(&self) -> Option<u64> {
        self.read().service_id()
    }

    pub fn locator_id(&self) -> Option<u64> {
        self.read().locator_id()
    }

    pub fn metadata_value(&self, key: &str) -> Option<String> {
        self.read().metadata_value(key).map(str::to_string)
    }

    pub(crate) fn set_rank(&self, rank: i32) -> i32 {
        let mut descriptor = self.descriptor.write().unwrap_or_else(PoisonError::into_inner);
        let previous = descriptor.rank();
        descriptor.set_rank(rank);
        previous
    }

    pub(crate) fn locator(&self) -> Option<Arc<LocatorInner>> {
        self.locator.upgrade()
    }

    pub(crate) fn locator_ref(&self) -> Weak<LocatorInner> {
        self.locator.clone()
    }

    /// Whether a reification attempt already failed
    pub fn reification_failed(&self) -> bool {
        matches!(*self.reification_state(), Reification::Failed(_))
    }

    /// Effective scope once reified, the declared scope otherwise
    pub fn scope(&self) -> String {
        if let Some(reified) = self.reified() {
            return reified.scope.clone();
        }
        self.read().scope().unwrap_or(PER_LOOKUP).to_string()
    }

    pub fn is_reified(&self) -> bool {
        matches!(*self.reification_state(), Reification::Reified(_))
    }

    /// Reification result, if reification succeeded
    pub fn reified(&self) -> Option<Arc<Reified>> {
        match &*self.reification_state() {
            Reification::Reified(reified) => Some(reified.clone()),
            _ => None,
        }
    }

    fn reification_state(&self) -> MutexGuard<'_, Reification> {
        self.reification.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reify at most once; a failure is remembered and reported again
    pub(crate) fn reify(&self, default_loader: &dyn ImplementationLoader) -> Result<Arc<Reified>, CoreError> {
        let mut state = self.reification_state();
        match &*state {
            Reification::Reified(reified) => return Ok(reified.clone()),
            Reification::Failed(error) => return Err(error.clone()),
            Reification::Pending => {}
        }

        let descriptor = self.descriptor();
        match reify_descriptor(&descriptor, default_loader) {
            Ok(reified) => {
                let reified = Arc::new(reified);
                *state = Reification::Reified(reified.clone());
                Ok(reified)
            }
            Err(error) => {
                *state = Reification::Failed(error.clone());
                Err(error)
            }
        }
    }

    /// Create a new instance; the descriptor must already be reified
    pub fn create(self: &Arc<Self>, root: Option<&ServiceHandle>) -> Result<Instance, CoreError> {
        let reified = self.reified().ok_or_else(|| {
            CoreError::illegal_state(format!("'{}' has not been reified", self.implementation()))
        })?;
        let locator = self.locator().ok_or_else(|| CoreError::Shutdown {
            locator: "<dropped>".to_string(),
        })?;
        creator::create(&locator, self, &reified, root)
    }

    /// Release an instance; hook failures are logged, never returned
    pub fn dispose(self: &Arc<Self>, instance: &Instance) -> Result<(), CoreError> {
        let reified = self.reified().ok_or_else(|| {
            CoreError::illegal_state(format!("'{}' has not been reified", self.implementation()))
        })?;
        creator::dispose(self.locator().as_ref(), self, &reified, instance);
        Ok(())
    }

    fn cache_slot(&self) -> MutexGuard<'_, CacheSlot> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached instance, if set
    pub fn cached(&self) -> Option<Instance> {
        self.cache_slot().value.clone()
    }

    pub fn is_cached(&self) -> bool {
        self.cache_slot().value.is_some()
    }

    /// Creation generation of the cached instance
    pub fn cache_generation(&self) -> Option<u64> {
        self.cache_slot().generation
    }

    /// Unset the cache, handing back the value that was in it
    pub fn release_cache(&self) -> Option<Instance> {
        let mut slot = self.cache_slot();
        slot.generation = None;
        slot.value.take()
    }

    /// Double-checked creation into the cache slot
    ///
    /// Concurrent callers for this descriptor wait for the creating thread; the
    /// creating thread asking again is a circular dependency. `create` runs
    /// without the slot locked. Returns the instance and, when this call created
    /// it, the generation it was stored under.
    pub(crate) fn cache_or_create(
        &self,
        next_generation: impl FnOnce() -> u64,
        create: impl FnOnce() -> Result<Instance, CoreError>,
    ) -> Result<(Instance, Option<u64>), CoreError> {
        let me = thread::current().id();
        {
            let mut slot = self.cache_slot();
            loop {
                if let Some(value) = &slot.value {
                    return Ok((value.clone(), None));
                }
                match slot.creating {
                    Some(owner) if owner == me => {
                        return Err(CoreError::CircularDependency {
                            implementation: self.implementation(),
                        })
                    }
                    Some(_) => {
                        slot = self
                            .cache_ready
                            .wait(slot)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    None => break,
                }
            }
            slot.creating = Some(me);
        }

        let mut pending = Creating {
            descriptor: self,
            armed: true,
        };
        let created = create();
        pending.armed = false;

        let mut slot = self.cache_slot();
        slot.creating = None;
        let result = match created {
            Ok(value) => {
                let generation = next_generation();
                slot.value = Some(value.clone());
                slot.generation = Some(generation);
                Ok((value, Some(generation)))
            }
            Err(error) => Err(error),
        };
        drop(slot);
        self.cache_ready.notify_all();
        result
    }
}

/// Releases the creation marker when `create` unwinds
struct Creating<'a> {
    descriptor: &'a ActiveDescriptor,
    armed: bool,
}

impl Drop for Creating<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.descriptor.cache_slot().creating = None;
            self.descriptor.cache_ready.notify_all();
        }
    }
}

impl fmt::Debug for ActiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDescriptor")
            .field("descriptor", &*self.read())
            .field("reified", &self.is_reified())
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl fmt::Display for ActiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.read(), f)
    }
}

/// Bind a descriptor to its implementation type and injection plan
///
/// Every problem found is collected; the result names all of them.
pub(crate) fn reify_descriptor(
    descriptor: &Descriptor,
    default_loader: &dyn ImplementationLoader,
) -> Result<Reified, CoreError> {
    let name = descriptor.implementation();
    let loader: &dyn ImplementationLoader = match descriptor.loader() {
        Some(loader) => loader.as_ref(),
        None => default_loader,
    };
    let implementation = loader.load(name)?;

    let mut errors = MultiError::with_context(format!("reification of '{}' failed", name));

    if implementation.kind() != descriptor.descriptor_type() {
        errors.push(CoreError::reification(
            name,
            format!(
                "descriptor is of type {} but the implementation is a {}",
                descriptor.descriptor_type(),
                implementation.kind()
            ),
        ));
    }

    let scope = match (descriptor.scope(), implementation.declared_scope()) {
        (Some(declared), Some(discovered)) if declared != discovered => {
            errors.push(CoreError::reification(
                name,
                format!(
                    "descriptor scope '{}' does not match the implementation scope '{}'",
                    declared, discovered
                ),
            ));
            declared.to_string()
        }
        (Some(declared), _) => declared.to_string(),
        (None, Some(discovered)) => discovered.to_string(),
        (None, None) => PER_LOOKUP.to_string(),
    };

    let mut views = Vec::new();
    for contract in descriptor.contracts() {
        let before = views.len();
        views.extend(implementation.views_named(contract).cloned());
        if views.len() == before {
            errors.push(CoreError::reification(
                name,
                format!("implementation does not provide contract '{}'", contract),
            ));
        }
    }

    let mut seen: HashSet<InjectionPoint> = HashSet::new();
    let mut injectees = Vec::with_capacity(implementation.injectees().len());
    for injectee in implementation.injectees() {
        if !seen.insert(injectee.point().clone()) {
            errors.push(CoreError::reification(
                name,
                format!("{} is declared more than once", injectee.point()),
            ));
        }
        if descriptor.descriptor_type() == DescriptorType::Factory && injectee.is_self() {
            errors.push(CoreError::reification(
                name,
                "factories cannot inject their own descriptor",
            ));
        }
        injectees.push(injectee.clone().with_parent(name));
    }

    errors.into_result()?;

    Ok(Reified {
        implementation,
        scope,
        views,
        injectees,
    })
}
