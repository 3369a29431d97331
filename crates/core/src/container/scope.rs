//! Scopes and the contexts that manage them
//!
//! Every scope is served by exactly one active [`Context`]. The locator ships
//! the Singleton, PerLookup and PerThread contexts; any other context is a
//! singleton service advertising `dyn Context`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::container::active::ActiveDescriptor;
use crate::container::handle::ServiceHandle;
use crate::container::implementation::Instance;
use crate::errors::CoreError;

/// One instance per locator
pub const SINGLETON: &str = "Singleton";

/// A new instance for every lookup
pub const PER_LOOKUP: &str = "PerLookup";

/// One instance per thread
pub const PER_THREAD: &str = "PerThread";

/// Scopes that no custom context may serve
pub(crate) fn is_reserved(scope: &str) -> bool {
    scope == SINGLETON || scope == PER_LOOKUP
}

/// Lifecycle manager for all instances of one scope
pub trait Context: Send + Sync {
    /// Scope this context serves
    fn scope(&self) -> &str;

    /// Return the existing instance for the descriptor or create one
    fn find_or_create(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Instance, CoreError>;

    /// Whether an instance currently exists for the descriptor
    fn contains_key(&self, descriptor: &ActiveDescriptor) -> bool;

    /// Destroy the instance held for the descriptor, if any
    fn destroy_one(&self, descriptor: &Arc<ActiveDescriptor>);

    fn is_active(&self) -> bool;

    /// Destroy everything the context holds
    fn shutdown(&self);
}

fn dispose_logged(descriptor: &Arc<ActiveDescriptor>, instance: &Instance) {
    if let Err(e) = descriptor.dispose(instance) {
        tracing::warn!("Failed to dispose '{}': {}", descriptor, e);
    }
}

/// Context of the `Singleton` scope
///
/// Instances live in the descriptor's cache slot; the context remembers the
/// creation order so shutdown can run it backwards.
pub struct SingletonContext {
    generation: AtomicU64,
    created: Mutex<BTreeMap<u64, Arc<ActiveDescriptor>>>,
    active: AtomicBool,
}

impl SingletonContext {
    /// Create a new singleton context
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            created: Mutex::new(BTreeMap::new()),
            active: AtomicBool::new(true),
        }
    }

    fn created(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<ActiveDescriptor>>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of singletons currently alive
    pub fn len(&self) -> usize {
        self.created().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SingletonContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for SingletonContext {
    fn scope(&self) -> &str {
        SINGLETON
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Instance, CoreError> {
        if !self.is_active() {
            // survivors of a running shutdown stay reachable until released
            return descriptor.cached().ok_or_else(|| CoreError::ScopeNotActive {
                scope: SINGLETON.to_string(),
            });
        }
        let (instance, generation) = descriptor.cache_or_create(
            || self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            || descriptor.create(root),
        )?;
        if let Some(generation) = generation {
            tracing::debug!("Singleton '{}' created as generation {}", descriptor, generation);
            self.created().insert(generation, descriptor.clone());
        }
        Ok(instance)
    }

    fn contains_key(&self, descriptor: &ActiveDescriptor) -> bool {
        descriptor.is_cached()
    }

    fn destroy_one(&self, descriptor: &Arc<ActiveDescriptor>) {
        let generation = descriptor.cache_generation();
        if let Some(instance) = descriptor.release_cache() {
            if let Some(generation) = generation {
                self.created().remove(&generation);
            }
            dispose_logged(descriptor, &instance);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        let created = std::mem::take(&mut *self.created());
        for (generation, descriptor) in created.into_iter().rev() {
            tracing::debug!("Destroying singleton '{}' (generation {})", descriptor, generation);
            if let Some(instance) = descriptor.release_cache() {
                dispose_logged(&descriptor, &instance);
            }
        }
    }
}

impl fmt::Debug for SingletonContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonContext")
            .field("alive", &self.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Context of the `PerLookup` scope; nothing is cached
#[derive(Debug, Default)]
pub struct PerLookupContext;

impl Context for PerLookupContext {
    fn scope(&self) -> &str {
        PER_LOOKUP
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Instance, CoreError> {
        descriptor.create(root)
    }

    fn contains_key(&self, _descriptor: &ActiveDescriptor) -> bool {
        false
    }

    // handles dispose per-lookup instances themselves
    fn destroy_one(&self, _descriptor: &Arc<ActiveDescriptor>) {}

    fn is_active(&self) -> bool {
        true
    }

    fn shutdown(&self) {}
}

type ThreadKey = (ThreadId, usize);

/// Context of the `PerThread` scope
#[derive(Default)]
pub struct PerThreadContext {
    instances: Mutex<HashMap<ThreadKey, (Arc<ActiveDescriptor>, Instance)>>,
}

impl PerThreadContext {
    /// Create a new per-thread context
    pub fn new() -> Self {
        Self::default()
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<ThreadKey, (Arc<ActiveDescriptor>, Instance)>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(descriptor: &ActiveDescriptor) -> ThreadKey {
        (thread::current().id(), descriptor as *const ActiveDescriptor as usize)
    }
}

impl Context for PerThreadContext {
    fn scope(&self) -> &str {
        PER_THREAD
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Instance, CoreError> {
        let key = Self::key(descriptor);
        if let Some((_, instance)) = self.instances().get(&key) {
            return Ok(instance.clone());
        }
        // only this thread can fill its own key
        let instance = descriptor.create(root)?;
        self.instances()
            .insert(key, (descriptor.clone(), instance.clone()));
        Ok(instance)
    }

    fn contains_key(&self, descriptor: &ActiveDescriptor) -> bool {
        self.instances().contains_key(&Self::key(descriptor))
    }

    fn destroy_one(&self, descriptor: &Arc<ActiveDescriptor>) {
        let target = Arc::as_ptr(descriptor) as usize;
        let removed: Vec<(Arc<ActiveDescriptor>, Instance)> = {
            let mut instances = self.instances();
            let keys: Vec<ThreadKey> = instances
                .keys()
                .filter(|(_, address)| *address == target)
                .copied()
                .collect();
            keys.iter().filter_map(|key| instances.remove(key)).collect()
        };
        for (descriptor, instance) in removed {
            dispose_logged(&descriptor, &instance);
        }
    }

    fn is_active(&self) -> bool {
        true
    }

    fn shutdown(&self) {
        let removed: Vec<(Arc<ActiveDescriptor>, Instance)> =
            self.instances().drain().map(|(_, entry)| entry).collect();
        for (descriptor, instance) in removed {
            dispose_logged(&descriptor, &instance);
        }
    }
}

impl fmt::Debug for PerThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerThreadContext")
            .field("instances", &self.instances().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_scopes() {
        assert!(is_reserved(SINGLETON));
        assert!(is_reserved(PER_LOOKUP));
        assert!(!is_reserved(PER_THREAD));
        assert!(!is_reserved("Request"));
    }

    #[test]
    fn test_built_in_contexts_report_their_scope() {
        assert_eq!(SingletonContext::new().scope(), SINGLETON);
        assert_eq!(PerLookupContext.scope(), PER_LOOKUP);
        assert_eq!(PerThreadContext::new().scope(), PER_THREAD);
    }

    #[test]
    fn test_singleton_context_stops_after_shutdown() {
        let context = SingletonContext::new();
        assert!(context.is_active());
        context.shutdown();
        assert!(!context.is_active());
        assert!(context.is_empty());
    }
}
