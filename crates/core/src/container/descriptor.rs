use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::container::contract::contract_name;
use crate::container::implementation::ImplementationLoader;
use crate::errors::CoreError;

/// How instances of a descriptor are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DescriptorType {
    /// The implementation itself is constructed
    #[default]
    Class,
    /// A factory's provide function produces the instance
    Factory,
}

impl DescriptorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorType::Class => "CLASS",
            DescriptorType::Factory => "FACTORY",
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DescriptorType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CLASS" => Ok(DescriptorType::Class),
            "FACTORY" => Ok(DescriptorType::Factory),
            _ => Err(CoreError::configuration(format!("unknown descriptor type '{}'", s))),
        }
    }
}

/// Whether child locators can see a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DescriptorVisibility {
    #[default]
    Normal,
    /// Only visible in the locator it was bound to
    Local,
}

impl DescriptorVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorVisibility::Normal => "NORMAL",
            DescriptorVisibility::Local => "LOCAL",
        }
    }
}

impl std::str::FromStr for DescriptorVisibility {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NORMAL" => Ok(DescriptorVisibility::Normal),
            "LOCAL" => Ok(DescriptorVisibility::Local),
            _ => Err(CoreError::configuration(format!("unknown visibility '{}'", s))),
        }
    }
}

/// Declarative record describing one bindable component
#[derive(Clone, Default)]
pub struct Descriptor {
    implementation: String,
    contracts: Vec<String>,
    scope: Option<String>,
    name: Option<String>,
    qualifiers: BTreeSet<String>,
    metadata: BTreeMap<String, Vec<String>>,
    descriptor_type: DescriptorType,
    visibility: DescriptorVisibility,
    rank: i32,
    loader: Option<Arc<dyn ImplementationLoader>>,
    base: Option<Box<Descriptor>>,
    service_id: Option<u64>,
    locator_id: Option<u64>,
}

impl Descriptor {
    /// Start building a descriptor for an implementation identifier
    pub fn builder(implementation: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(implementation)
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    /// Advertised contract names, in declaration order
    pub fn contracts(&self) -> &[String] {
        &self.contracts
    }

    /// Check if the descriptor advertises a contract name
    pub fn advertises(&self, contract: &str) -> bool {
        self.contracts.iter().any(|c| c == contract)
    }

    /// Declared scope, if any
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn qualifiers(&self) -> &BTreeSet<String> {
        &self.qualifiers
    }

    pub fn metadata(&self) -> &BTreeMap<String, Vec<String>> {
        &self.metadata
    }

    /// First metadata value stored under `key`
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    pub fn visibility(&self) -> DescriptorVisibility {
        self.visibility
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Loader this descriptor's implementation must be loaded with
    pub fn loader(&self) -> Option<&Arc<dyn ImplementationLoader>> {
        self.loader.as_ref()
    }

    /// The descriptor this one was derived from
    pub fn base(&self) -> Option<&Descriptor> {
        self.base.as_deref()
    }

    /// Id assigned by the locator at commit time
    pub fn service_id(&self) -> Option<u64> {
        self.service_id
    }

    pub fn locator_id(&self) -> Option<u64> {
        self.locator_id
    }

    pub(crate) fn assign_ids(&mut self, locator_id: u64, service_id: u64) {
        self.locator_id = Some(locator_id);
        self.service_id = Some(service_id);
    }

    pub(crate) fn set_rank(&mut self, rank: i32) {
        self.rank = rank;
    }

    /// Check whether every required qualifier is present on this descriptor
    pub fn has_qualifiers<'q>(&self, required: impl IntoIterator<Item = &'q str>) -> bool {
        required.into_iter().all(|q| self.qualifiers.contains(q))
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("implementation", &self.implementation)
            .field("contracts", &self.contracts)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("qualifiers", &self.qualifiers)
            .field("metadata", &self.metadata)
            .field("descriptor_type", &self.descriptor_type)
            .field("visibility", &self.visibility)
            .field("rank", &self.rank)
            .field("has_loader", &self.loader.is_some())
            .field("service_id", &self.service_id)
            .field("locator_id", &self.locator_id)
            .finish()
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.implementation == other.implementation
            && self.contracts == other.contracts
            && self.scope == other.scope
            && self.name == other.name
            && self.qualifiers == other.qualifiers
            && self.metadata == other.metadata
            && self.descriptor_type == other.descriptor_type
            && self.visibility == other.visibility
            && self.rank == other.rank
            && self.base == other.base
            && self.service_id == other.service_id
            && self.locator_id == other.locator_id
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.implementation)?;
        if let Some(name) = &self.name {
            write!(f, "({})", name)?;
        }
        if let (Some(locator), Some(service)) = (self.locator_id, self.service_id) {
            write!(f, "#{}.{}", locator, service)?;
        }
        Ok(())
    }
}

/// Fluent builder for descriptors
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    descriptor: Descriptor,
}

impl DescriptorBuilder {
    /// Create a builder for an implementation identifier
    pub fn new(implementation: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor {
                implementation: implementation.into(),
                ..Descriptor::default()
            },
        }
    }

    /// Advertise a contract by name
    pub fn to(mut self, contract: impl Into<String>) -> Self {
        let contract = contract.into();
        if !self.descriptor.contracts.contains(&contract) {
            self.descriptor.contracts.push(contract);
        }
        self
    }

    /// Advertise the contract of a type
    pub fn to_contract<T: ?Sized + 'static>(self) -> Self {
        self.to(contract_name::<T>())
    }

    /// Set the scope
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.descriptor.scope = Some(scope.into());
        self
    }

    /// Set the name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = Some(name.into());
        self
    }

    /// Add a qualifier
    pub fn qualified_by(mut self, qualifier: impl Into<String>) -> Self {
        self.descriptor.qualifiers.insert(qualifier.into());
        self
    }

    /// Append a metadata value under a key
    pub fn has(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor
            .metadata
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set the rank
    pub fn of_rank(mut self, rank: i32) -> Self {
        self.descriptor.rank = rank;
        self
    }

    /// Set the descriptor type
    pub fn of_type(mut self, descriptor_type: DescriptorType) -> Self {
        self.descriptor.descriptor_type = descriptor_type;
        self
    }

    /// Hide the descriptor from child locators
    pub fn local(mut self) -> Self {
        self.descriptor.visibility = DescriptorVisibility::Local;
        self
    }

    /// Set the visibility
    pub fn with_visibility(mut self, visibility: DescriptorVisibility) -> Self {
        self.descriptor.visibility = visibility;
        self
    }

    /// Load the implementation with a specific loader
    pub fn with_loader(mut self, loader: Arc<dyn ImplementationLoader>) -> Self {
        self.descriptor.loader = Some(loader);
        self
    }

    /// Record the descriptor this one is derived from
    pub fn wrapping(mut self, base: Descriptor) -> Self {
        self.descriptor.base = Some(Box::new(base));
        self
    }

    /// Build the descriptor
    pub fn build(self) -> Descriptor {
        self.descriptor
    }
}

impl From<DescriptorBuilder> for Descriptor {
    fn from(builder: DescriptorBuilder) -> Self {
        builder.build()
    }
}
