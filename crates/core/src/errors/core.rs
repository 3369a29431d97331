use std::fmt;
use thiserror::Error;

/// Core error type for the warden runtime
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Resolution error: {message}")]
    Resolution { message: String },

    #[error("Reification of '{implementation}' failed: {message}")]
    Reification {
        implementation: String,
        message: String,
    },

    #[error("Unsatisfied dependency {injectee} of '{implementation}'")]
    UnsatisfiedDependency {
        implementation: String,
        injectee: String,
    },

    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("Service locator '{locator}' has been shut down")]
    Shutdown { locator: String },

    #[error("Circular dependency detected while creating '{implementation}'")]
    CircularDependency { implementation: String },

    #[error("No active context for scope '{scope}'")]
    ScopeNotActive { scope: String },

    #[error("Run level violation: '{implementation}' is at run level {service_level} but the active run level is {active_level}")]
    RunLevelViolation {
        implementation: String,
        service_level: i32,
        active_level: i32,
    },

    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },

    #[error("Service not found: {service_type}")]
    ServiceNotFound { service_type: String },

    #[error("Lifecycle error in component '{component}' during '{operation}': {message}")]
    Lifecycle {
        component: String,
        operation: String,
        message: String,
    },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Multiple(MultiError),
}

impl Clone for CoreError {
    /// IO errors are not cloneable; the copy keeps their kind and message
    fn clone(&self) -> Self {
        match self {
            Self::Configuration { message } => Self::Configuration {
                message: message.clone(),
            },
            Self::Resolution { message } => Self::Resolution {
                message: message.clone(),
            },
            Self::Reification {
                implementation,
                message,
            } => Self::Reification {
                implementation: implementation.clone(),
                message: message.clone(),
            },
            Self::UnsatisfiedDependency {
                implementation,
                injectee,
            } => Self::UnsatisfiedDependency {
                implementation: implementation.clone(),
                injectee: injectee.clone(),
            },
            Self::IllegalState { message } => Self::IllegalState {
                message: message.clone(),
            },
            Self::Shutdown { locator } => Self::Shutdown {
                locator: locator.clone(),
            },
            Self::CircularDependency { implementation } => Self::CircularDependency {
                implementation: implementation.clone(),
            },
            Self::ScopeNotActive { scope } => Self::ScopeNotActive { scope: scope.clone() },
            Self::RunLevelViolation {
                implementation,
                service_level,
                active_level,
            } => Self::RunLevelViolation {
                implementation: implementation.clone(),
                service_level: *service_level,
                active_level: *active_level,
            },
            Self::Cancelled { message } => Self::Cancelled {
                message: message.clone(),
            },
            Self::LockError { resource } => Self::LockError {
                resource: resource.clone(),
            },
            Self::ServiceNotFound { service_type } => Self::ServiceNotFound {
                service_type: service_type.clone(),
            },
            Self::Lifecycle {
                component,
                operation,
                message,
            } => Self::Lifecycle {
                component: component.clone(),
                operation: operation.clone(),
                message: message.clone(),
            },
            Self::Parse { line, message } => Self::Parse {
                line: *line,
                message: message.clone(),
            },
            Self::Io(error) => Self::Io(std::io::Error::new(error.kind(), error.to_string())),
            Self::Multiple(errors) => Self::Multiple(errors.clone()),
        }
    }
}

impl CoreError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new resolution error
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Create a new reification error
    pub fn reification(implementation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reification {
            implementation: implementation.into(),
            message: message.into(),
        }
    }

    /// Create a new illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Create a new service not found error
    pub fn service_not_found(service_type: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            service_type: service_type.into(),
        }
    }

    /// Create a new lock error
    pub fn lock(resource: impl Into<String>) -> Self {
        Self::LockError {
            resource: resource.into(),
        }
    }

    /// Create a new lifecycle error
    pub fn lifecycle(
        component: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Lifecycle {
            component: component.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if the error is a configuration error
    ///
    /// Run level violations are configuration errors too, as is an aggregate whose
    /// causes contain one.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::RunLevelViolation { .. } => true,
            Self::Multiple(errors) => errors.iter().any(CoreError::is_configuration),
            _ => false,
        }
    }

    /// Check if the error is a shutdown error
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }

    /// Check if the error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check whether this error or any aggregated cause matches the predicate
    pub fn any(&self, predicate: &dyn Fn(&CoreError) -> bool) -> bool {
        match self {
            Self::Multiple(errors) => errors.iter().any(|e| e.any(predicate)),
            other => predicate(other),
        }
    }
}

/// An aggregate of independent failures, reported together
#[derive(Debug, Default, Clone)]
pub struct MultiError {
    context: Option<String>,
    errors: Vec<CoreError>,
}

impl MultiError {
    /// Create an empty aggregate
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty aggregate whose report starts with `context`
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            errors: Vec::new(),
        }
    }

    /// Add a failure; nested aggregates are flattened
    pub fn push(&mut self, error: CoreError) {
        match error {
            CoreError::Multiple(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreError> {
        self.errors.iter()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// `Ok(())` when nothing was collected, the aggregate otherwise
    pub fn into_result(self) -> Result<(), CoreError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Multiple(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: ", context)?;
        }
        write!(f, "{} error(s)", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            write!(f, "\n  {}. {}", index + 1, error)?;
        }
        Ok(())
    }
}

impl IntoIterator for MultiError {
    type Item = CoreError;
    type IntoIter = std::vec::IntoIter<CoreError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
