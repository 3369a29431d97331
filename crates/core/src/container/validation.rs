use std::fmt;
use std::sync::Arc;

use crate::container::autowiring::Injectee;
use crate::container::descriptor::Descriptor;

/// Registry operation being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A descriptor is about to be added
    Bind,
    /// A descriptor is about to be removed
    Unbind,
    /// A descriptor is about to be returned from a lookup
    Lookup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Bind => "BIND",
            Operation::Unbind => "UNBIND",
            Operation::Lookup => "LOOKUP",
        };
        f.write_str(name)
    }
}

/// What a validator is asked to approve
#[derive(Debug, Clone, Copy)]
pub struct ValidationInformation<'a> {
    operation: Operation,
    candidate: &'a Descriptor,
    injectee: Option<&'a Injectee>,
}

impl<'a> ValidationInformation<'a> {
    pub(crate) fn new(operation: Operation, candidate: &'a Descriptor, injectee: Option<&'a Injectee>) -> Self {
        Self {
            operation,
            candidate,
            injectee,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn candidate(&self) -> &'a Descriptor {
        self.candidate
    }

    /// Injectee being resolved, for lookups done on behalf of an injection
    pub fn injectee(&self) -> Option<&'a Injectee> {
        self.injectee
    }
}

/// Veto authority over binds, unbinds and lookups
///
/// Validators are singleton services advertising `dyn ValidationService`.
/// They are called outside the registry lock.
pub trait ValidationService: Send + Sync {
    /// Limit the descriptors this validator is consulted about
    fn applies_to(&self, _descriptor: &Descriptor) -> bool {
        true
    }

    /// Return false to veto the operation
    fn validate(&self, information: &ValidationInformation<'_>) -> bool;
}

/// Run every applicable validator; the first veto wins
pub(crate) fn approve(
    validators: &[Arc<dyn ValidationService>],
    operation: Operation,
    candidate: &Descriptor,
    injectee: Option<&Injectee>,
) -> bool {
    let information = ValidationInformation::new(operation, candidate, injectee);
    validators
        .iter()
        .filter(|validator| validator.applies_to(candidate))
        .all(|validator| {
            let approved = validator.validate(&information);
            if !approved {
                tracing::debug!("{} of '{}' vetoed by a validation service", operation, candidate);
            }
            approved
        })
}
