//! Staged activation by run level
//!
//! Components in the [`RUN_LEVEL`] scope carry a `runLevel` metadata value.
//! The [`RunLevelController`] walks the levels one at a time: going up it
//! activates every component of the level it enters, going down it releases
//! what was activated at the level it leaves, newest first.

pub mod context;
pub mod controller;
pub mod future;
pub mod listener;
pub mod recorder;

pub use context::RunLevelContext;
pub use controller::{ControllerState, RunLevelController};
pub use future::RunLevelFuture;
pub use listener::RunLevelListener;
pub use recorder::RunLevelRecorder;

use crate::container::descriptor::{Descriptor, DescriptorBuilder};
use crate::errors::CoreError;

/// Scope of run-level components
pub const RUN_LEVEL: &str = "RunLevel";

/// Metadata key holding a component's level
pub const RUN_LEVEL_METADATA: &str = "runLevel";

/// Metadata key holding a component's environment
pub const RUN_LEVEL_ENVIRONMENT_METADATA: &str = "runLevelEnvironment";

pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Level of a controller that has activated nothing
pub const RUNLEVEL_INITIAL: i32 = -2;

/// Level of components that start as soon as the controller exists
pub const RUNLEVEL_IMMEDIATE: i32 = -1;

/// Level declared by a descriptor; components without one start immediately
pub fn level_of(descriptor: &Descriptor) -> Result<i32, CoreError> {
    match descriptor.metadata_value(RUN_LEVEL_METADATA) {
        None => Ok(RUNLEVEL_IMMEDIATE),
        Some(value) => value.trim().parse::<i32>().map_err(|_| {
            CoreError::configuration(format!(
                "'{}' declares run level '{}' which is not an integer",
                descriptor, value
            ))
        }),
    }
}

/// Environment declared by a descriptor
pub fn environment_of(descriptor: &Descriptor) -> &str {
    descriptor
        .metadata_value(RUN_LEVEL_ENVIRONMENT_METADATA)
        .unwrap_or(DEFAULT_ENVIRONMENT)
}

/// Whether the descriptor is a run-level component of the environment
pub(crate) fn is_run_level_component(descriptor: &Descriptor, environment: &str) -> bool {
    descriptor.scope() == Some(RUN_LEVEL) && environment_of(descriptor) == environment
}

/// Run-level shorthands for [`DescriptorBuilder`]
pub trait RunLevelDescriptorExt {
    /// Put the component in the run-level scope at `level`
    fn at_run_level(self, level: i32) -> Self;

    /// Restrict the component to controllers of `environment`
    fn in_environment(self, environment: impl Into<String>) -> Self;
}

impl RunLevelDescriptorExt for DescriptorBuilder {
    fn at_run_level(self, level: i32) -> Self {
        self.in_scope(RUN_LEVEL).has(RUN_LEVEL_METADATA, level.to_string())
    }

    fn in_environment(self, environment: impl Into<String>) -> Self {
        self.has(RUN_LEVEL_ENVIRONMENT_METADATA, environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_defaults_to_immediate() {
        let descriptor = Descriptor::builder("app::Boot").in_scope(RUN_LEVEL).build();
        assert_eq!(level_of(&descriptor).unwrap(), RUNLEVEL_IMMEDIATE);
        assert_eq!(environment_of(&descriptor), DEFAULT_ENVIRONMENT);
    }

    #[test]
    fn test_builder_shorthands() {
        let descriptor = Descriptor::builder("app::Web")
            .at_run_level(3)
            .in_environment("test")
            .build();

        assert_eq!(descriptor.scope(), Some(RUN_LEVEL));
        assert_eq!(level_of(&descriptor).unwrap(), 3);
        assert!(is_run_level_component(&descriptor, "test"));
        assert!(!is_run_level_component(&descriptor, DEFAULT_ENVIRONMENT));
    }

    #[test]
    fn test_malformed_level_is_a_configuration_error() {
        let descriptor = Descriptor::builder("app::Odd")
            .in_scope(RUN_LEVEL)
            .has(RUN_LEVEL_METADATA, "soon")
            .build();
        assert!(level_of(&descriptor).unwrap_err().is_configuration());
    }
}
