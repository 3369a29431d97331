use crate::container::autowiring::Injectee;
use crate::container::descriptor::Descriptor;
use crate::errors::CoreError;

/// Category of a failure reported to error services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// A descriptor could not be reified
    FailureToReify,
    /// A configuration commit was rejected
    DynamicConfigurationFailure,
    /// An instance could not be created
    ServiceCreationFailure,
    /// A pre-destroy hook or disposer failed
    ServiceDestructionFailure,
}

/// Everything an error service gets to see about one failure
#[derive(Debug)]
pub struct ErrorInformation<'a> {
    pub error_type: ErrorType,
    pub descriptor: Option<&'a Descriptor>,
    pub injectee: Option<&'a Injectee>,
    pub error: &'a CoreError,
}

/// Observer of failures on the resolution, creation and configuration paths
///
/// Error services are registered as singleton services advertising this contract.
/// They observe only: a failure has already been decided by the time they run.
pub trait ErrorService: Send + Sync {
    fn on_failure(&self, information: &ErrorInformation<'_>);
}
