//! Descriptor filters
//!
//! A filter that names an advertised contract and/or a name is answered from
//! the registry's hash indices; every other filter scans all descriptors.

use crate::container::contract::contract_name;
use crate::container::descriptor::Descriptor;

/// Predicate over descriptors
pub trait Filter: Send + Sync {
    fn matches(&self, descriptor: &Descriptor) -> bool;

    /// Contract every match advertises, enabling the contract index
    fn advertised_contract(&self) -> Option<&str> {
        None
    }

    /// Name every match carries, enabling the name index
    fn name(&self) -> Option<&str> {
        None
    }
}

impl<F> Filter for F
where
    F: Fn(&Descriptor) -> bool + Send + Sync,
{
    fn matches(&self, descriptor: &Descriptor) -> bool {
        self(descriptor)
    }
}

/// Matches every descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFilter;

impl Filter for AllFilter {
    fn matches(&self, _descriptor: &Descriptor) -> bool {
        true
    }
}

/// Descriptors advertising a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractFilter {
    contract: String,
}

impl ContractFilter {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
        }
    }

    /// Filter on the contract of a type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(contract_name::<T>())
    }
}

impl Filter for ContractFilter {
    fn matches(&self, descriptor: &Descriptor) -> bool {
        descriptor.advertises(&self.contract)
    }

    fn advertised_contract(&self) -> Option<&str> {
        Some(&self.contract)
    }
}

/// Descriptors carrying a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    name: String,
}

impl NameFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Filter for NameFilter {
    fn matches(&self, descriptor: &Descriptor) -> bool {
        descriptor.name() == Some(self.name.as_str())
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Descriptors advertising a contract under a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAndNameFilter {
    contract: String,
    name: String,
}

impl ContractAndNameFilter {
    pub fn new(contract: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            name: name.into(),
        }
    }

    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(contract_name::<T>(), name)
    }
}

impl Filter for ContractAndNameFilter {
    fn matches(&self, descriptor: &Descriptor) -> bool {
        descriptor.name() == Some(self.name.as_str()) && descriptor.advertises(&self.contract)
    }

    fn advertised_contract(&self) -> Option<&str> {
        Some(&self.contract)
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Exactly one committed descriptor, by its ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecificFilter {
    locator_id: u64,
    service_id: u64,
}

impl SpecificFilter {
    pub fn new(locator_id: u64, service_id: u64) -> Self {
        Self {
            locator_id,
            service_id,
        }
    }

    /// Filter matching a committed descriptor; `None` for uncommitted ones
    pub fn of(descriptor: &Descriptor) -> Option<Self> {
        Some(Self::new(descriptor.locator_id()?, descriptor.service_id()?))
    }
}

impl Filter for SpecificFilter {
    fn matches(&self, descriptor: &Descriptor) -> bool {
        descriptor.locator_id() == Some(self.locator_id)
            && descriptor.service_id() == Some(self.service_id)
    }
}
