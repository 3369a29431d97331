//! The service locator
//!
//! A [`ServiceLocator`] owns the descriptor registry of one locator, the
//! built-in scope contexts and the event dispatcher. Lookups see the local
//! descriptors first and then those of the parent chain that are not
//! [`Local`](crate::container::descriptor::DescriptorVisibility::Local).

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io::BufRead;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use uuid::Uuid;

use crate::config::LocatorConfig;
use crate::container::active::{ActiveDescriptor, Reified};
use crate::container::autowiring::{Injectable, Injectee, DEFAULT_RESOLVER_KIND};
use crate::container::configuration::DynamicConfiguration;
use crate::container::contract::{contract_name, Contract};
use crate::container::descriptor::{Descriptor, DescriptorVisibility};
use crate::container::filter::{ContractAndNameFilter, ContractFilter, Filter, SpecificFilter};
use crate::container::handle::ServiceHandle;
use crate::container::implementation::{ImplementationType, TypeCatalog};
use crate::container::lifecycle::InstanceLifecycleListener;
use crate::container::registry::Registry;
use crate::container::resolver::{DefaultResolver, InjectionResolver};
use crate::container::scope::{
    is_reserved, Context, PerLookupContext, PerThreadContext, SingletonContext, PER_LOOKUP, PER_THREAD, SINGLETON,
};
use crate::container::text;
use crate::container::validation::{self, Operation, ValidationService};
use crate::errors::{CoreError, ErrorInformation, ErrorService, ErrorType, MultiError};
use crate::events::{EventDispatcher, ListenerRegistration, LocatorEvent, LocatorEventKind, LocatorListener};

/// Contracts whose services the locator itself consumes
pub fn system_contracts() -> [String; 5] {
    [
        contract_name::<dyn ValidationService>(),
        contract_name::<dyn ErrorService>(),
        contract_name::<dyn InjectionResolver>(),
        contract_name::<dyn Context>(),
        contract_name::<dyn InstanceLifecycleListener>(),
    ]
}

pub(crate) struct LocatorInner {
    id: u64,
    config: LocatorConfig,
    parent: Option<ServiceLocator>,
    registry: RwLock<Registry>,
    next_service_id: AtomicU64,
    catalog: Arc<TypeCatalog>,
    singletons: Arc<SingletonContext>,
    per_lookup: Arc<PerLookupContext>,
    per_thread: Arc<PerThreadContext>,
    default_resolver: Arc<DefaultResolver>,
    dispatcher: EventDispatcher,
    running: AtomicBool,
    closing: AtomicBool,
    system_contracts: [String; 5],
    this: Weak<LocatorInner>,
}

impl LocatorInner {
    fn read(&self) -> Result<RwLockReadGuard<'_, Registry>, CoreError> {
        self.registry.read().map_err(|_| CoreError::lock("registry"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>, CoreError> {
        self.registry.write().map_err(|_| CoreError::lock("registry"))
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn ensure_running(&self) -> Result<(), CoreError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::Shutdown {
                locator: self.config.name.clone(),
            })
        }
    }

    pub(crate) fn publish(&self, kind: LocatorEventKind) {
        self.dispatcher.dispatch(LocatorEvent::new(self.config.name.clone(), kind));
    }

    pub(crate) fn is_system_descriptor(&self, descriptor: &Descriptor) -> bool {
        self.system_contracts
            .iter()
            .any(|contract| descriptor.advertises(contract))
    }

    /// Hand a failure to every error service; they only observe
    pub(crate) fn report(
        &self,
        error_type: ErrorType,
        descriptor: Option<&Descriptor>,
        injectee: Option<&Injectee>,
        error: &CoreError,
    ) {
        let services = self.system_services::<dyn ErrorService>();
        if services.is_empty() {
            return;
        }
        let information = ErrorInformation {
            error_type,
            descriptor,
            injectee,
            error,
        };
        for service in services {
            if catch_unwind(AssertUnwindSafe(|| service.on_failure(&information))).is_err() {
                tracing::warn!("Error service panicked while handling {:?}", error_type);
            }
        }
    }

    /// Local matches followed by the parent chain's visible ones, rank ordered
    fn candidates(&self, filter: &dyn Filter) -> Result<Vec<Arc<ActiveDescriptor>>, CoreError> {
        let mut candidates = self.read()?.matching(filter);
        if let Some(parent) = &self.parent {
            if parent.inner.running.load(Ordering::SeqCst) {
                let inherited = parent.inner.candidates(filter)?;
                candidates.extend(
                    inherited
                        .into_iter()
                        .filter(|d| d.read().visibility() == DescriptorVisibility::Normal),
                );
            }
        }
        // stable: local stays ahead of parent on equal rank
        candidates.sort_by_key(|d| std::cmp::Reverse(d.rank()));
        Ok(candidates)
    }

    /// Reify through the locator that owns the descriptor
    pub(crate) fn reify_active(&self, descriptor: &ActiveDescriptor) -> Result<Arc<Reified>, CoreError> {
        if let Some(reified) = descriptor.reified() {
            return Ok(reified);
        }
        let owner = descriptor.locator();
        let owner: &LocatorInner = owner.as_deref().unwrap_or(self);
        let already_failed = descriptor.reification_failed();
        descriptor.reify(owner.catalog.as_ref()).map_err(|error| {
            if !already_failed {
                tracing::warn!("Failed to reify '{}': {}", descriptor, error);
                let snapshot = descriptor.descriptor();
                owner.report(ErrorType::FailureToReify, Some(&snapshot), None, &error);
            }
            error
        })
    }

    /// Live services of a system contract, skipping any that cannot be produced
    pub(crate) fn system_services<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let contract = Contract::of::<T>();
        let Ok(candidates) = self.candidates(&ContractFilter::new(contract.name())) else {
            return Vec::new();
        };

        let mut services = Vec::new();
        for descriptor in candidates {
            let handle = ServiceHandle::new(descriptor.locator_ref(), descriptor.clone(), None);
            match handle.service::<T>() {
                Ok(service) => services.push(service),
                Err(e) => tracing::debug!("Skipping {} '{}': {}", contract, descriptor, e),
            }
        }
        services
    }

    pub(crate) fn validators(&self) -> Vec<Arc<dyn ValidationService>> {
        self.system_services::<dyn ValidationService>()
    }

    pub(crate) fn lifecycle_listeners(&self) -> Vec<Arc<dyn InstanceLifecycleListener>> {
        self.system_services::<dyn InstanceLifecycleListener>()
    }

    /// Resolver for an injectee kind; registered resolvers win over the built-in one
    pub(crate) fn injection_resolver(&self, kind: &str) -> Result<Arc<dyn InjectionResolver>, CoreError> {
        if let Some(resolver) = self
            .system_services::<dyn InjectionResolver>()
            .into_iter()
            .find(|resolver| resolver.kind() == kind)
        {
            return Ok(resolver);
        }
        if kind == DEFAULT_RESOLVER_KIND {
            return Ok(self.default_resolver.clone());
        }
        Err(CoreError::resolution(format!(
            "no injection resolver for injectee kind '{}'",
            kind
        )))
    }

    /// The one active context serving the descriptor's scope
    pub(crate) fn context_for(&self, descriptor: &ActiveDescriptor) -> Result<Arc<dyn Context>, CoreError> {
        let reified = self.reify_active(descriptor)?;
        let scope = reified.scope();
        match scope {
            SINGLETON => return Ok(self.singletons.clone()),
            PER_LOOKUP => return Ok(self.per_lookup.clone()),
            _ => {}
        }

        let mut found: Vec<Arc<dyn Context>> = self
            .system_services::<dyn Context>()
            .into_iter()
            .filter(|context| context.scope() == scope && context.is_active())
            .collect();
        if scope == PER_THREAD {
            found.push(self.per_thread.clone());
        }

        match found.len() {
            0 => Err(CoreError::ScopeNotActive {
                scope: scope.to_string(),
            }),
            1 => Ok(found.remove(0)),
            n => Err(CoreError::configuration(format!(
                "{} active contexts serve scope '{}'",
                n, scope
            ))),
        }
    }

    fn handles(
        &self,
        contract: &Contract,
        name: Option<&str>,
        qualifiers: &[&str],
        injectee: Option<&Injectee>,
    ) -> Result<Vec<ServiceHandle>, CoreError> {
        self.ensure_running()?;
        let candidates = match name {
            Some(name) => self.candidates(&ContractAndNameFilter::new(contract.name(), name))?,
            None => self.candidates(&ContractFilter::new(contract.name()))?,
        };
        let validators = self.validators();

        let mut handles = Vec::new();
        for descriptor in candidates {
            if !descriptor.read().has_qualifiers(qualifiers.iter().copied()) {
                continue;
            }
            let Ok(reified) = self.reify_active(&descriptor) else {
                continue;
            };
            if reified.view_for(contract).is_none() {
                continue;
            }
            if !validation::approve(&validators, Operation::Lookup, &descriptor.descriptor(), injectee) {
                continue;
            }
            handles.push(ServiceHandle::new(
                descriptor.locator_ref(),
                descriptor.clone(),
                injectee.cloned(),
            ));
        }
        Ok(handles)
    }

    fn commit(&self, added: Vec<Descriptor>, unbinds: Vec<Box<dyn Filter>>) -> Result<Vec<Descriptor>, CoreError> {
        self.ensure_running()?;
        let transaction = Uuid::new_v4();
        let validators = self.validators();

        let removed: Vec<Arc<ActiveDescriptor>> = {
            let registry = self.read()?;
            let mut seen = HashSet::new();
            unbinds
                .iter()
                .flat_map(|filter| registry.matching(&**filter))
                .filter(|descriptor| seen.insert(Arc::as_ptr(descriptor) as usize))
                .collect()
        };

        let mut errors = MultiError::with_context(format!("configuration {} was rejected", transaction));
        for descriptor in &removed {
            if !validation::approve(&validators, Operation::Unbind, &descriptor.descriptor(), None) {
                errors.push(CoreError::configuration(format!(
                    "unbinding '{}' was vetoed",
                    descriptor
                )));
            }
        }

        let mut staged = Vec::with_capacity(added.len());
        for mut descriptor in added {
            if !validation::approve(&validators, Operation::Bind, &descriptor, None) {
                errors.push(CoreError::configuration(format!(
                    "binding '{}' was vetoed",
                    descriptor
                )));
                continue;
            }
            descriptor.assign_ids(self.id, self.next_service_id.fetch_add(1, Ordering::SeqCst));
            let system = self.is_system_descriptor(&descriptor);
            let active = Arc::new(ActiveDescriptor::new(descriptor, self.this.clone()));
            if system {
                match active.reify(self.catalog.as_ref()) {
                    Ok(reified) if reified.scope() == SINGLETON => {}
                    Ok(reified) => errors.push(CoreError::configuration(format!(
                        "'{}' provides a locator service and must be a {} but is {}",
                        active,
                        SINGLETON,
                        reified.scope()
                    ))),
                    Err(e) => errors.push(e),
                }
            }
            staged.push(active);
        }

        if !errors.is_empty() {
            let error = CoreError::Multiple(errors);
            tracing::warn!("Rejected configuration for locator '{}': {}", self.name(), error);
            self.report(ErrorType::DynamicConfigurationFailure, None, None, &error);
            return Err(error);
        }

        let removed: Vec<Arc<ActiveDescriptor>> = {
            let mut registry = self.write()?;
            let removed = removed
                .into_iter()
                .filter(|descriptor| registry.remove(descriptor))
                .collect();
            for descriptor in &staged {
                registry.insert(descriptor.clone());
            }
            registry.resort();
            removed
        };

        for descriptor in &removed {
            self.release(descriptor);
            self.publish(LocatorEventKind::DescriptorRemoved(descriptor.descriptor()));
        }
        let committed: Vec<Descriptor> = staged.iter().map(|d| d.descriptor()).collect();
        for descriptor in &committed {
            self.publish(LocatorEventKind::DescriptorAdded(descriptor.clone()));
        }

        tracing::info!(
            "Locator '{}' committed configuration {}: {} added, {} removed",
            self.name(),
            transaction,
            committed.len(),
            removed.len()
        );
        self.publish(LocatorEventKind::ConfigurationCommitted {
            transaction,
            added: committed.len(),
            removed: removed.len(),
        });
        Ok(committed)
    }

    /// Destroy whatever instance an unbound descriptor still holds
    fn release(&self, descriptor: &Arc<ActiveDescriptor>) {
        if !descriptor.is_reified() {
            return;
        }
        match self.context_for(descriptor) {
            Ok(context) => context.destroy_one(descriptor),
            Err(_) => {
                if let Some(instance) = descriptor.release_cache() {
                    if let Err(e) = descriptor.dispose(&instance) {
                        tracing::warn!("Failed to dispose '{}': {}", descriptor, e);
                    }
                }
            }
        }
    }

    fn shutdown(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down locator '{}'", self.name());

        // contexts still see a running locator so disposal reaches the listeners
        for context in self.system_services::<dyn Context>() {
            if !is_reserved(context.scope()) {
                context.shutdown();
            }
        }
        self.per_thread.shutdown();
        self.singletons.shutdown();
        self.running.store(false, Ordering::SeqCst);

        match self.registry.write() {
            Ok(mut registry) => {
                registry.clear();
            }
            Err(_) => tracing::error!("Registry lock of '{}' is poisoned", self.name()),
        }
        self.dispatcher.shutdown();
    }
}

/// Registry and resolution facade of one locator
///
/// Clones share the same locator.
#[derive(Clone)]
pub struct ServiceLocator {
    inner: Arc<LocatorInner>,
}

impl ServiceLocator {
    pub(crate) fn open(id: u64, config: LocatorConfig, parent: Option<ServiceLocator>) -> Result<Self, CoreError> {
        let dispatcher = EventDispatcher::new(config.dispatch)?;
        let inner = Arc::new_cyclic(|this| LocatorInner {
            id,
            config,
            parent,
            registry: RwLock::new(Registry::new()),
            next_service_id: AtomicU64::new(0),
            catalog: Arc::new(TypeCatalog::new()),
            singletons: Arc::new(SingletonContext::new()),
            per_lookup: Arc::new(PerLookupContext),
            per_thread: Arc::new(PerThreadContext::new()),
            default_resolver: Arc::new(DefaultResolver),
            dispatcher,
            running: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            system_contracts: system_contracts(),
            this: this.clone(),
        });
        tracing::debug!("Created locator '{}' with id {}", inner.name(), id);
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<LocatorInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.inner.config
    }

    pub fn parent(&self) -> Option<&ServiceLocator> {
        self.inner.parent.as_ref()
    }

    /// Default loader for descriptors that carry none
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.inner.catalog
    }

    pub fn is_shutdown(&self) -> bool {
        !self.inner.running.load(Ordering::SeqCst)
    }

    /// Start a configuration transaction
    pub fn configuration(&self) -> DynamicConfiguration {
        DynamicConfiguration::new(self.clone())
    }

    pub(crate) fn commit(
        &self,
        added: Vec<Descriptor>,
        unbinds: Vec<Box<dyn Filter>>,
    ) -> Result<Vec<Descriptor>, CoreError> {
        self.inner.commit(added, unbinds)
    }

    /// Bind descriptors in one transaction
    pub fn bind(&self, descriptors: impl IntoIterator<Item = Descriptor>) -> Result<Vec<Descriptor>, CoreError> {
        self.commit(descriptors.into_iter().collect(), Vec::new())
    }

    /// Bind an implementation type under all of its views
    pub fn bind_implementation(&self, implementation: &Arc<ImplementationType>) -> Result<Descriptor, CoreError> {
        let mut configuration = self.configuration();
        configuration.add_implementation(implementation);
        configuration
            .commit()?
            .pop()
            .ok_or_else(|| CoreError::illegal_state("commit returned no descriptor"))
    }

    /// Remove every descriptor matching the filter in one transaction
    pub fn unbind(&self, filter: impl Filter + 'static) -> Result<(), CoreError> {
        self.commit(Vec::new(), vec![Box::new(filter)]).map(|_| ())
    }

    /// Descriptors matching the filter, rank ordered, parents included
    pub fn descriptors(&self, filter: &dyn Filter) -> Result<Vec<Descriptor>, CoreError> {
        Ok(self
            .active_descriptors(filter)?
            .iter()
            .map(|descriptor| descriptor.descriptor())
            .collect())
    }

    /// Like [`descriptors`](Self::descriptors) but returning the active descriptors
    pub fn active_descriptors(&self, filter: &dyn Filter) -> Result<Vec<Arc<ActiveDescriptor>>, CoreError> {
        self.inner.ensure_running()?;
        let validators = self.inner.validators();
        Ok(self
            .inner
            .candidates(filter)?
            .into_iter()
            .filter(|descriptor| validation::approve(&validators, Operation::Lookup, &descriptor.descriptor(), None))
            .collect())
    }

    /// Highest ranked descriptor matching the filter
    pub fn best_descriptor(&self, filter: &dyn Filter) -> Result<Option<Descriptor>, CoreError> {
        Ok(self.descriptors(filter)?.into_iter().next())
    }

    /// Best handle for contract `T` carrying every qualifier
    pub fn service_handle<T: ?Sized + 'static>(&self, qualifiers: &[&str]) -> Result<Option<ServiceHandle>, CoreError> {
        Ok(self
            .inner
            .handles(&Contract::of::<T>(), None, qualifiers, None)?
            .into_iter()
            .next())
    }

    /// Best handle for contract `T` with the given name
    pub fn named_service_handle<T: ?Sized + 'static>(
        &self,
        name: &str,
        qualifiers: &[&str],
    ) -> Result<Option<ServiceHandle>, CoreError> {
        Ok(self
            .inner
            .handles(&Contract::of::<T>(), Some(name), qualifiers, None)?
            .into_iter()
            .next())
    }

    /// Every handle for contract `T`, rank ordered
    pub fn all_service_handles<T: ?Sized + 'static>(&self, qualifiers: &[&str]) -> Result<Vec<ServiceHandle>, CoreError> {
        self.inner.handles(&Contract::of::<T>(), None, qualifiers, None)
    }

    /// Handle for a specific active descriptor
    pub fn handle_for(&self, descriptor: &Arc<ActiveDescriptor>) -> Result<ServiceHandle, CoreError> {
        self.inner.ensure_running()?;
        self.inner.reify_active(descriptor)?;
        Ok(ServiceHandle::new(descriptor.locator_ref(), descriptor.clone(), None))
    }

    /// The best service for contract `T`, if any
    pub fn service<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, CoreError> {
        self.service_handle::<T>(&[])?
            .map(|handle| handle.service::<T>())
            .transpose()
    }

    /// The best service for contract `T` with the given name, if any
    pub fn named_service<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Option<Arc<T>>, CoreError> {
        self.named_service_handle::<T>(name, &[])?
            .map(|handle| handle.service::<T>())
            .transpose()
    }

    /// The best service for contract `T`; missing is an error
    pub fn require<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        self.service::<T>()?
            .ok_or_else(|| CoreError::service_not_found(std::any::type_name::<T>()))
    }

    /// Every service for contract `T`, rank ordered
    pub fn all_services<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, CoreError> {
        self.all_service_handles::<T>(&[])?
            .iter()
            .map(|handle| handle.service::<T>())
            .collect()
    }

    /// Best handle satisfying an injectee
    pub fn injectee_handle(&self, injectee: &Injectee) -> Result<Option<ServiceHandle>, CoreError> {
        Ok(self.injectee_handles(injectee)?.into_iter().next())
    }

    /// Every handle satisfying an injectee, rank ordered
    pub fn injectee_handles(&self, injectee: &Injectee) -> Result<Vec<ServiceHandle>, CoreError> {
        let qualifiers: Vec<&str> = injectee.qualifiers().iter().map(String::as_str).collect();
        self.inner.handles(
            injectee.required_contract(),
            injectee.name(),
            &qualifiers,
            Some(injectee),
        )
    }

    /// Every advertised contract name, local and inherited
    pub fn all_contracts(&self) -> Result<BTreeSet<String>, CoreError> {
        self.inner.ensure_running()?;
        let mut contracts = self.inner.read()?.contracts();
        if let Some(parent) = &self.inner.parent {
            if !parent.is_shutdown() {
                contracts.extend(parent.all_contracts()?);
            }
        }
        Ok(contracts)
    }

    /// Change the rank of a committed local descriptor, returning the old rank
    pub fn set_rank(&self, descriptor: &Descriptor, rank: i32) -> Result<i32, CoreError> {
        self.inner.ensure_running()?;
        let filter = SpecificFilter::of(descriptor)
            .ok_or_else(|| CoreError::illegal_state(format!("'{}' has not been committed", descriptor)))?;
        if descriptor.locator_id() != Some(self.id()) {
            return Err(CoreError::illegal_state(format!(
                "'{}' does not belong to locator '{}'",
                descriptor,
                self.name()
            )));
        }

        let (previous, updated) = {
            let mut registry = self.inner.write()?;
            let active = registry
                .matching(&filter)
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::illegal_state(format!("'{}' is no longer bound", descriptor)))?;
            let previous = active.set_rank(rank);
            registry.resort();
            (previous, active.descriptor())
        };

        tracing::debug!("Rank of '{}' changed from {} to {}", updated, previous, rank);
        self.inner.publish(LocatorEventKind::RankChanged {
            descriptor: updated,
            previous,
        });
        Ok(previous)
    }

    /// Create an unregistered injectable type with its dependencies resolved here
    pub fn create<T: Injectable>(&self) -> Result<Arc<T>, CoreError> {
        let implementation = ImplementationType::of::<T>().build();
        let active = self.reify(&implementation.descriptor().build())?;
        active
            .create(None)?
            .downcast::<T>()
            .map_err(|_| CoreError::illegal_state(format!("'{}' produced another type", active)))
    }

    /// Reify a descriptor without registering it
    pub fn reify(&self, descriptor: &Descriptor) -> Result<Arc<ActiveDescriptor>, CoreError> {
        self.inner.ensure_running()?;
        let active = Arc::new(ActiveDescriptor::new(descriptor.clone(), self.inner.this.clone()));
        self.inner.reify_active(&active)?;
        Ok(active)
    }

    /// Read descriptor records and bind them in one transaction
    pub fn populate(&self, reader: impl BufRead) -> Result<Vec<Descriptor>, CoreError> {
        let descriptors = text::read_descriptors(reader)?;
        self.bind(descriptors)
    }

    /// Register a structural event listener; it is held weakly
    pub fn add_listener(&self, listener: &Arc<dyn LocatorListener>) -> ListenerRegistration {
        self.inner.dispatcher.subscribe(listener)
    }

    /// Wait for queued events to reach their listeners
    pub fn flush_events(&self) {
        self.inner.dispatcher.flush();
    }

    /// Destroy every instance, empty the registry and refuse further work
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptors = self.inner.read().map(|registry| registry.len()).unwrap_or(0);
        f.debug_struct("ServiceLocator")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("parent", &self.inner.parent.as_ref().map(|p| p.name().to_string()))
            .field("descriptors", &descriptors)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
