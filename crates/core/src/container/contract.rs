use std::any::TypeId;
use std::fmt;

/// Identity of a contract a component can be looked up by
///
/// `name` is the erased type name (generic arguments stripped) and is what
/// descriptors advertise and what the contract index is keyed by. `type_id`
/// is the exact, fully parameterized type used for the type-safety check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contract {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
}

impl Contract {
    /// Create the contract for a type
    pub fn of<T: ?Sized + 'static>() -> Self {
        let type_name = std::any::type_name::<T>();
        Self {
            name: erase(type_name),
            type_id: TypeId::of::<T>(),
            type_name,
        }
    }

    /// Erased name, as advertised in descriptors
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full type name including generic arguments
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Check whether this contract is exactly the type `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Erased contract name of a type
pub fn contract_name<T: ?Sized + 'static>() -> String {
    erase(std::any::type_name::<T>())
}

/// Strip every generic argument list from a type name
///
/// `app::Repo<app::User>` and `app::Repo<app::Order>` both erase to `app::Repo`.
pub fn erase(type_name: &str) -> String {
    let mut erased = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for c in type_name.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => erased.push(c),
            _ => {}
        }
    }
    erased
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Repository<T>(T);
    struct User;
    struct Order;

    #[allow(dead_code)]
    trait Greeter {}

    #[test]
    fn test_generic_arguments_are_erased_from_the_name() {
        let users = Contract::of::<Repository<User>>();
        let orders = Contract::of::<Repository<Order>>();

        assert_eq!(users.name(), orders.name());
        assert!(users.name().ends_with("Repository"));
        assert_ne!(users.type_id(), orders.type_id());
        assert_ne!(users, orders);
    }

    #[test]
    fn test_trait_object_contract_names() {
        let contract = Contract::of::<dyn Greeter>();
        assert!(contract.name().starts_with("dyn "));
        assert!(contract.name().ends_with("Greeter"));
        assert!(contract.is::<dyn Greeter>());
        assert!(!contract.is::<User>());
    }

    #[test]
    fn test_erase_nested_generics() {
        assert_eq!(erase("a::B<c::D<e::F>, g::H>"), "a::B");
        assert_eq!(erase("alloc::string::String"), "alloc::string::String");
        assert_eq!(contract_name::<Vec<Vec<u8>>>(), "alloc::vec::Vec");
    }
}
