pub mod active;
pub mod autowiring;
pub mod configuration;
pub mod contract;
mod creator;
pub mod descriptor;
pub mod factory;
pub mod filter;
pub mod handle;
pub mod implementation;
pub mod lifecycle;
pub mod locator;
mod registry;
pub mod resolver;
pub mod scope;
pub mod text;
pub mod validation;

pub use active::{ActiveDescriptor, Reified};
pub use autowiring::{Arguments, Injectable, InjectedValue, Injectee, InjectionPoint, DEFAULT_RESOLVER_KIND};
pub use configuration::DynamicConfiguration;
pub use contract::{contract_name, Contract};
pub use descriptor::{Descriptor, DescriptorBuilder, DescriptorType, DescriptorVisibility};
pub use factory::LocatorFactory;
pub use filter::{AllFilter, ContractAndNameFilter, ContractFilter, Filter, NameFilter, SpecificFilter};
pub use handle::ServiceHandle;
pub use implementation::{
    ContractView, ImplementationBuilder, ImplementationLoader, ImplementationType, Instance, SingleTypeLoader,
    TypeCatalog,
};
pub use lifecycle::{InstanceLifecycleEvent, InstanceLifecycleEventType, InstanceLifecycleListener};
pub use locator::ServiceLocator;
pub use resolver::{DefaultResolver, InjectionResolver};
pub use scope::{Context, PerLookupContext, PerThreadContext, SingletonContext, PER_LOOKUP, PER_THREAD, SINGLETON};
pub use text::{read_descriptors, write_descriptors};
pub use validation::{Operation, ValidationInformation, ValidationService};
