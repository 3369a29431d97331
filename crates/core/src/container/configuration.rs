use std::fmt;
use std::sync::Arc;

use crate::container::descriptor::Descriptor;
use crate::container::filter::Filter;
use crate::container::implementation::ImplementationType;
use crate::container::locator::ServiceLocator;
use crate::errors::CoreError;

/// One configuration transaction against a locator
///
/// Nothing is visible to lookups until [`commit`](Self::commit); a rejected
/// commit changes nothing. Unbind filters are evaluated against the registry
/// as it stood before the transaction's own additions.
pub struct DynamicConfiguration {
    locator: ServiceLocator,
    added: Vec<Descriptor>,
    unbinds: Vec<Box<dyn Filter>>,
}

impl DynamicConfiguration {
    pub(crate) fn new(locator: ServiceLocator) -> Self {
        Self {
            locator,
            added: Vec::new(),
            unbinds: Vec::new(),
        }
    }

    /// Stage a descriptor
    pub fn bind(&mut self, descriptor: impl Into<Descriptor>) -> &mut Self {
        self.added.push(descriptor.into());
        self
    }

    /// Stage an implementation type under every contract it provides
    pub fn add_implementation(&mut self, implementation: &Arc<ImplementationType>) -> &mut Self {
        self.added.push(implementation.descriptor().build());
        self
    }

    /// Stage removal of every descriptor the filter matches
    pub fn unbind(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.unbinds.push(Box::new(filter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.unbinds.is_empty()
    }

    /// Apply the transaction, returning the committed descriptors with their ids
    pub fn commit(self) -> Result<Vec<Descriptor>, CoreError> {
        self.locator.commit(self.added, self.unbinds)
    }
}

impl fmt::Debug for DynamicConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicConfiguration")
            .field("locator", &self.locator.name())
            .field("added", &self.added)
            .field("unbinds", &self.unbinds.len())
            .finish()
    }
}
