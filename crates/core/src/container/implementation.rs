//! Implementation types and the loader abstraction
//!
//! An [`ImplementationType`] is the loaded, static metadata of one component
//! implementation: its injection plan, how to produce and release instances, and
//! the contract views instances can be cast to. Descriptors only name an
//! implementation; an [`ImplementationLoader`] maps that name to the type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::container::autowiring::{split_arguments, Arguments, InjectedValue, Injectable, Injectee, InjectionPoint};
use crate::container::contract::Contract;
use crate::container::descriptor::{Descriptor, DescriptorBuilder, DescriptorType};
use crate::container::scope::SINGLETON;
use crate::errors::CoreError;

/// A created component instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Resolved values for every injectee, in plan order
pub type ResolvedValues = Vec<(InjectionPoint, Option<InjectedValue>)>;

type ProduceFn = Arc<dyn Fn(ResolvedValues) -> Result<Instance, CoreError> + Send + Sync>;
type HookFn = Arc<dyn Fn(&Instance) -> Result<(), CoreError> + Send + Sync>;
type CastFn = Arc<dyn Fn(&Instance) -> Option<InjectedValue> + Send + Sync>;

/// One contract an implementation's instances can be viewed as
#[derive(Clone)]
pub struct ContractView {
    contract: Contract,
    cast: CastFn,
}

impl ContractView {
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Cast an instance to this view
    pub fn cast(&self, instance: &Instance) -> Option<InjectedValue> {
        (self.cast)(instance)
    }
}

impl fmt::Debug for ContractView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContractView").field(&self.contract.type_name()).finish()
    }
}

/// Loaded metadata of a component implementation
pub struct ImplementationType {
    name: String,
    kind: DescriptorType,
    scope: Option<String>,
    injectees: Vec<Injectee>,
    views: Vec<ContractView>,
    produce: ProduceFn,
    post_construct: Option<HookFn>,
    pre_destroy: Option<HookFn>,
}

impl ImplementationType {
    /// Describe an injectable type
    pub fn of<T: Injectable>() -> ImplementationBuilder<T> {
        let produce: ProduceFn = Arc::new(|values: ResolvedValues| {
            let implementation = std::any::type_name::<T>();
            let (mut constructor, mut members) = split_arguments(implementation, values);
            let mut value = T::create(&mut constructor)?;
            value.initialize(&mut members)?;
            Ok(Arc::new(value) as Instance)
        });
        let post_construct: HookFn = Arc::new(|instance: &Instance| match downcast::<T>(instance) {
            Some(value) => value.post_construct(),
            None => Ok(()),
        });
        let pre_destroy: HookFn = Arc::new(|instance: &Instance| match downcast::<T>(instance) {
            Some(value) => value.pre_destroy(),
            None => Ok(()),
        });

        ImplementationBuilder::new(ImplementationType {
            name: std::any::type_name::<T>().to_string(),
            kind: DescriptorType::Class,
            scope: T::scope().map(str::to_string),
            injectees: T::injectees(),
            views: Vec::new(),
            produce,
            post_construct: Some(post_construct),
            pre_destroy: Some(pre_destroy),
        })
    }

    /// Describe a factory whose provide function produces `T`
    pub fn factory<T, F>(name: impl Into<String>, injectees: Vec<Injectee>, provide: F) -> ImplementationBuilder<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<T, CoreError> + Send + Sync + 'static,
    {
        let name = name.into();
        let implementation = name.clone();
        let produce: ProduceFn = Arc::new(move |values: ResolvedValues| {
            let mut args = Arguments::new(implementation.clone(), values.into_iter().collect());
            Ok(Arc::new(provide(&mut args)?) as Instance)
        });

        ImplementationBuilder::new(ImplementationType {
            name,
            kind: DescriptorType::Factory,
            scope: None,
            injectees,
            views: Vec::new(),
            produce,
            post_construct: None,
            pre_destroy: None,
        })
    }

    /// Describe a pre-built singleton value
    pub fn constant<T: Send + Sync + 'static>(name: impl Into<String>, value: Arc<T>) -> ImplementationBuilder<T> {
        let produce: ProduceFn = Arc::new(move |_: ResolvedValues| Ok(value.clone() as Instance));

        ImplementationBuilder::new(ImplementationType {
            name: name.into(),
            kind: DescriptorType::Class,
            scope: Some(SINGLETON.to_string()),
            injectees: Vec::new(),
            views: Vec::new(),
            produce,
            post_construct: None,
            pre_destroy: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DescriptorType {
        self.kind
    }

    /// Scope declared by the implementation
    pub fn declared_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Injection plan in declaration order
    pub fn injectees(&self) -> &[Injectee] {
        &self.injectees
    }

    pub fn views(&self) -> &[ContractView] {
        &self.views
    }

    /// Views registered under an erased contract name
    pub fn views_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ContractView> + 'a {
        self.views.iter().filter(move |view| view.contract.name() == name)
    }

    /// Produce an instance from resolved values; no lifecycle hooks run here
    pub fn produce(&self, values: ResolvedValues) -> Result<Instance, CoreError> {
        (self.produce)(values)
    }

    pub fn post_construct(&self, instance: &Instance) -> Result<(), CoreError> {
        match &self.post_construct {
            Some(hook) => hook(instance),
            None => Ok(()),
        }
    }

    pub fn pre_destroy(&self, instance: &Instance) -> Result<(), CoreError> {
        match &self.pre_destroy {
            Some(hook) => hook(instance),
            None => Ok(()),
        }
    }

    /// A descriptor advertising every view of this type, loadable without a catalog
    pub fn descriptor(self: &Arc<Self>) -> DescriptorBuilder {
        let mut builder = Descriptor::builder(self.name.clone())
            .of_type(self.kind)
            .with_loader(Arc::new(SingleTypeLoader(self.clone())));
        for view in &self.views {
            builder = builder.to(view.contract.name());
        }
        if let Some(scope) = &self.scope {
            builder = builder.in_scope(scope.clone());
        }
        builder
    }
}

impl fmt::Debug for ImplementationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("injectees", &self.injectees)
            .field("views", &self.views)
            .finish()
    }
}

fn downcast<T: Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.clone().downcast::<T>().ok()
}

/// Typed builder for [`ImplementationType`]
pub struct ImplementationBuilder<T> {
    inner: ImplementationType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ImplementationBuilder<T> {
    fn new(inner: ImplementationType) -> Self {
        let mut builder = Self {
            inner,
            _marker: PhantomData,
        };
        builder.push_view(Contract::of::<T>(), Arc::new(|instance: &Instance| {
            downcast::<T>(instance).map(InjectedValue::new)
        }));
        builder
    }

    fn push_view(&mut self, contract: Contract, cast: CastFn) {
        self.inner.views.retain(|view| view.contract != contract);
        self.inner.views.push(ContractView { contract, cast });
    }

    /// Override the implementation identifier
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Declare the scope on the implementation
    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.inner.scope = Some(scope.into());
        self
    }

    /// Add injectees on top of the type's own plan
    pub fn inject(mut self, injectee: Injectee) -> Self {
        self.inner.injectees.push(injectee);
        self
    }

    /// Advertise a contract view; `cast` is usually just `|this| this`
    pub fn contract<C, F>(mut self, cast: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static,
    {
        self.push_view(Contract::of::<C>(), Arc::new(move |instance: &Instance| {
            downcast::<T>(instance).map(|value| InjectedValue::new(cast(value)))
        }));
        self
    }

    /// Release hook for factory-produced or constant values
    pub fn disposer<F>(mut self, dispose: F) -> Self
    where
        F: Fn(&T) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.inner.pre_destroy = Some(Arc::new(move |instance: &Instance| match downcast::<T>(instance) {
            Some(value) => dispose(&value),
            None => Ok(()),
        }));
        self
    }

    pub fn build(self) -> Arc<ImplementationType> {
        Arc::new(self.inner)
    }
}

/// Maps implementation identifiers to loaded implementation types
pub trait ImplementationLoader: Send + Sync {
    fn load(&self, implementation: &str) -> Result<Arc<ImplementationType>, CoreError>;
}

/// Loader that knows exactly one implementation
pub struct SingleTypeLoader(pub Arc<ImplementationType>);

impl ImplementationLoader for SingleTypeLoader {
    fn load(&self, implementation: &str) -> Result<Arc<ImplementationType>, CoreError> {
        if self.0.name() == implementation {
            Ok(self.0.clone())
        } else {
            Err(CoreError::reification(
                implementation,
                format!("loader only provides '{}'", self.0.name()),
            ))
        }
    }
}

/// In-memory catalog of implementation types, the default loader of a locator
#[derive(Default)]
pub struct TypeCatalog {
    types: RwLock<HashMap<String, Arc<ImplementationType>>>,
}

impl TypeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under its implementation identifier, replacing any previous one
    pub fn register(&self, implementation: Arc<ImplementationType>) -> Result<(), CoreError> {
        let mut types = self.types.write().map_err(|_| CoreError::lock("type_catalog"))?;
        types.insert(implementation.name().to_string(), implementation);
        Ok(())
    }

    /// Check if an implementation identifier is registered
    pub fn contains(&self, implementation: &str) -> bool {
        self.types
            .read()
            .map(|types| types.contains_key(implementation))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.types.read().map(|types| types.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImplementationLoader for TypeCatalog {
    fn load(&self, implementation: &str) -> Result<Arc<ImplementationType>, CoreError> {
        let types = self.types.read().map_err(|_| CoreError::lock("type_catalog"))?;
        types.get(implementation).cloned().ok_or_else(|| {
            CoreError::reification(implementation, "implementation type not found")
        })
    }
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog").field("types", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::autowiring::Injectee;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English {
        punctuation: Arc<String>,
    }

    impl Greeter for English {
        fn greet(&self) -> String {
            format!("hello{}", self.punctuation)
        }
    }

    impl Injectable for English {
        fn injectees() -> Vec<Injectee> {
            vec![Injectee::constructor::<String>(0)]
        }

        fn scope() -> Option<&'static str> {
            Some(SINGLETON)
        }

        fn create(args: &mut Arguments) -> Result<Self, CoreError> {
            Ok(Self {
                punctuation: args.required::<String>(0)?,
            })
        }
    }

    #[test]
    fn test_injectable_type_produces_and_casts() {
        let english = ImplementationType::of::<English>()
            .contract::<dyn Greeter, _>(|this| this)
            .build();

        assert_eq!(english.declared_scope(), Some(SINGLETON));
        assert_eq!(english.injectees().len(), 1);
        assert_eq!(english.views().len(), 2);

        let instance = english
            .produce(vec![(0.into(), Some(InjectedValue::new(Arc::new("!".to_string()))))])
            .unwrap();
        let view = english
            .views()
            .iter()
            .find(|view| view.contract().is::<dyn Greeter>())
            .unwrap();
        let greeter = view.cast(&instance).unwrap().downcast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello!");
    }

    #[test]
    fn test_descriptor_carries_views_scope_and_loader() {
        let english = ImplementationType::of::<English>()
            .contract::<dyn Greeter, _>(|this| this)
            .build();
        let descriptor = english.descriptor().build();

        assert_eq!(descriptor.implementation(), english.name());
        assert_eq!(descriptor.contracts().len(), 2);
        assert_eq!(descriptor.scope(), Some(SINGLETON));
        let loaded = descriptor.loader().unwrap().load(english.name()).unwrap();
        assert!(Arc::ptr_eq(&loaded, &english));
    }

    #[test]
    fn test_catalog_reports_missing_types() {
        let catalog = TypeCatalog::new();
        catalog
            .register(ImplementationType::constant("app::Answer", Arc::new(42u32)).build())
            .unwrap();

        assert!(catalog.contains("app::Answer"));
        assert!(catalog.load("app::Answer").is_ok());
        assert!(matches!(
            catalog.load("app::Missing"),
            Err(CoreError::Reification { .. })
        ));
    }

    #[test]
    fn test_factory_disposer_runs_on_pre_destroy() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let disposed = Arc::new(AtomicBool::new(false));
        let flag = disposed.clone();
        let factory = ImplementationType::factory("app::PortFactory", Vec::new(), |_| Ok(8080u16))
            .disposer(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .build();

        assert_eq!(factory.kind(), DescriptorType::Factory);
        let instance = factory.produce(Vec::new()).unwrap();
        factory.pre_destroy(&instance).unwrap();
        assert!(disposed.load(Ordering::SeqCst));
    }
}
