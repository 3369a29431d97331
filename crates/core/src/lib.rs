pub mod config;
pub mod container;
pub mod errors;
pub mod events;
pub mod runlevel;

// Re-export key types for convenience
pub use config::{ConfigError, ConfigLoader, ConfigSource, DispatchMode, LocatorConfig, RunLevelConfig};
pub use container::{
    ActiveDescriptor, Arguments, Context, Contract, Descriptor, DescriptorBuilder, DescriptorType,
    DescriptorVisibility, DynamicConfiguration, Filter, ImplementationType, Injectable, InjectedValue, Injectee,
    InjectionResolver, InstanceLifecycleListener, LocatorFactory, ServiceHandle, ServiceLocator, TypeCatalog,
    ValidationService, PER_LOOKUP, PER_THREAD, SINGLETON,
};
pub use errors::{CoreError, ErrorInformation, ErrorService, ErrorType, MultiError};
pub use events::{ListenerRegistration, LocatorEvent, LocatorEventKind, LocatorListener};
pub use runlevel::{
    RunLevelController, RunLevelDescriptorExt, RunLevelFuture, RunLevelListener, RUN_LEVEL, RUNLEVEL_IMMEDIATE,
    RUNLEVEL_INITIAL,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the crate version
pub fn version() -> &'static str {
    VERSION
}
