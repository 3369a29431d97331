use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::container::active::ActiveDescriptor;
use crate::container::filter::Filter;

/// Indexed descriptor store of one locator
///
/// Every list is kept ordered by rank (highest first), then by service id.
/// Callers serialize access through the locator's `RwLock`.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    all: Vec<Arc<ActiveDescriptor>>,
    by_contract: HashMap<String, Vec<Arc<ActiveDescriptor>>>,
    by_name: HashMap<String, Vec<Arc<ActiveDescriptor>>>,
}

fn sort(descriptors: &mut [Arc<ActiveDescriptor>]) {
    descriptors.sort_by_cached_key(|descriptor| {
        let descriptor = descriptor.read();
        (Reverse(descriptor.rank()), descriptor.service_id().unwrap_or(u64::MAX))
    });
}

fn same(a: &Arc<ActiveDescriptor>, b: &Arc<ActiveDescriptor>) -> bool {
    Arc::ptr_eq(a, b)
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.all.len()
    }

    /// Add without re-sorting; call `resort` once the batch is in
    pub(crate) fn insert(&mut self, descriptor: Arc<ActiveDescriptor>) {
        {
            let raw = descriptor.read();
            for contract in raw.contracts() {
                self.by_contract
                    .entry(contract.clone())
                    .or_default()
                    .push(descriptor.clone());
            }
            if let Some(name) = raw.name() {
                self.by_name
                    .entry(name.to_string())
                    .or_default()
                    .push(descriptor.clone());
            }
        }
        self.all.push(descriptor);
    }

    /// Remove a descriptor from every index; false if it was not present
    pub(crate) fn remove(&mut self, descriptor: &Arc<ActiveDescriptor>) -> bool {
        let before = self.all.len();
        self.all.retain(|candidate| !same(candidate, descriptor));
        if self.all.len() == before {
            return false;
        }

        let raw = descriptor.read();
        for contract in raw.contracts() {
            if let Some(list) = self.by_contract.get_mut(contract) {
                list.retain(|candidate| !same(candidate, descriptor));
                if list.is_empty() {
                    self.by_contract.remove(contract);
                }
            }
        }
        if let Some(name) = raw.name() {
            if let Some(list) = self.by_name.get_mut(name) {
                list.retain(|candidate| !same(candidate, descriptor));
                if list.is_empty() {
                    self.by_name.remove(name);
                }
            }
        }
        true
    }

    /// Restore rank order in every index
    pub(crate) fn resort(&mut self) {
        sort(&mut self.all);
        self.by_contract.values_mut().for_each(|list| sort(list));
        self.by_name.values_mut().for_each(|list| sort(list));
    }

    /// Find a descriptor by its service id
    pub(crate) fn find(&self, service_id: u64) -> Option<&Arc<ActiveDescriptor>> {
        self.all
            .iter()
            .find(|descriptor| descriptor.service_id() == Some(service_id))
    }

    /// Matches in rank order, answered from an index where the filter allows
    pub(crate) fn matching(&self, filter: &dyn Filter) -> Vec<Arc<ActiveDescriptor>> {
        let source: &[Arc<ActiveDescriptor>] = match (filter.advertised_contract(), filter.name()) {
            (Some(contract), Some(name)) => {
                let by_contract = self.by_contract.get(contract).map(Vec::len).unwrap_or(0);
                let by_name = self.by_name.get(name).map(Vec::len).unwrap_or(0);
                let index = if by_name <= by_contract {
                    self.by_name.get(name)
                } else {
                    self.by_contract.get(contract)
                };
                index.map(Vec::as_slice).unwrap_or(&[])
            }
            (Some(contract), None) => self.by_contract.get(contract).map(Vec::as_slice).unwrap_or(&[]),
            (None, Some(name)) => self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[]),
            (None, None) => &self.all,
        };

        source
            .iter()
            .filter(|descriptor| filter.matches(&descriptor.read()))
            .cloned()
            .collect()
    }

    /// Every advertised contract name
    pub(crate) fn contracts(&self) -> BTreeSet<String> {
        self.by_contract.keys().cloned().collect()
    }

    /// Empty the store, handing back what it held in rank order
    pub(crate) fn clear(&mut self) -> Vec<Arc<ActiveDescriptor>> {
        self.by_contract.clear();
        self.by_name.clear();
        std::mem::take(&mut self.all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::Descriptor;
    use crate::container::filter::{AllFilter, ContractAndNameFilter, ContractFilter, NameFilter};
    use std::sync::Weak;

    fn active(service_id: u64, contract: &str, name: Option<&str>, rank: i32) -> Arc<ActiveDescriptor> {
        let mut builder = Descriptor::builder(format!("app::Impl{}", service_id))
            .to(contract)
            .of_rank(rank);
        if let Some(name) = name {
            builder = builder.named(name);
        }
        let mut descriptor = builder.build();
        descriptor.assign_ids(0, service_id);
        Arc::new(ActiveDescriptor::new(descriptor, Weak::new()))
    }

    fn ids(descriptors: &[Arc<ActiveDescriptor>]) -> Vec<u64> {
        descriptors.iter().filter_map(|d| d.service_id()).collect()
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.insert(active(1, "app::Foo", None, 1));
        registry.insert(active(2, "app::Foo", Some("x"), 5));
        registry.insert(active(3, "app::Bar", Some("x"), 5));
        registry.insert(active(4, "app::Foo", None, 5));
        registry.resort();
        registry
    }

    #[test]
    fn test_rank_then_insertion_order() {
        let registry = registry();
        assert_eq!(ids(&registry.matching(&AllFilter)), vec![2, 3, 4, 1]);
        assert_eq!(ids(&registry.matching(&ContractFilter::new("app::Foo"))), vec![2, 4, 1]);
        assert_eq!(ids(&registry.matching(&NameFilter::new("x"))), vec![2, 3]);
        assert_eq!(ids(&registry.matching(&ContractAndNameFilter::new("app::Foo", "x"))), vec![2]);
    }

    #[test]
    fn test_unindexed_filters_scan() {
        let registry = registry();
        let filter = |d: &Descriptor| d.rank() < 5;
        assert_eq!(ids(&registry.matching(&filter)), vec![1]);
    }

    #[test]
    fn test_remove_cleans_every_index() {
        let mut registry = registry();
        let bar = registry.find(3).cloned().unwrap();

        assert!(registry.remove(&bar));
        assert!(!registry.remove(&bar));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.contracts(), BTreeSet::from(["app::Foo".to_string()]));
        assert_eq!(ids(&registry.matching(&NameFilter::new("x"))), vec![2]);
    }

    #[test]
    fn test_resort_after_rank_change() {
        let mut registry = registry();
        registry.find(1).unwrap().set_rank(10);
        registry.resort();
        assert_eq!(ids(&registry.matching(&ContractFilter::new("app::Foo"))), vec![1, 2, 4]);
    }
}
