use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::container::active::ActiveDescriptor;
use crate::container::contract::Contract;
use crate::errors::CoreError;

/// Resolver kind used by injectees that do not ask for another one
pub const DEFAULT_RESOLVER_KIND: &str = "Inject";

/// Trait for components the container can construct and inject
///
/// `injectees` is the one-time injection plan of the type; `create` receives the
/// resolved constructor arguments and `initialize` the resolved field and method
/// arguments. Nothing is constructed unless every mandatory injectee resolved.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Injection points of this type, in declaration order
    fn injectees() -> Vec<Injectee> {
        Vec::new()
    }

    /// Scope declared by the implementation itself
    fn scope() -> Option<&'static str> {
        None
    }

    /// Construct an instance from its constructor arguments
    fn create(args: &mut Arguments) -> Result<Self, CoreError>;

    /// Receive field and initializer-method injection
    fn initialize(&mut self, _members: &mut Arguments) -> Result<(), CoreError> {
        Ok(())
    }

    /// Called once the instance is fully injected
    fn post_construct(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Called before the instance is released
    fn pre_destroy(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Where on a component an injectee is injected
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectionPoint {
    /// Constructor parameter at a position
    Constructor(usize),
    /// Field by name
    Field(&'static str),
    /// Initializer method parameter at a position
    Method(&'static str, usize),
}

impl InjectionPoint {
    /// Position of the parameter, zero for fields
    pub fn position(&self) -> usize {
        match self {
            InjectionPoint::Constructor(position) | InjectionPoint::Method(_, position) => *position,
            InjectionPoint::Field(_) => 0,
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, InjectionPoint::Constructor(_))
    }
}

impl From<usize> for InjectionPoint {
    fn from(position: usize) -> Self {
        InjectionPoint::Constructor(position)
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionPoint::Constructor(position) => write!(f, "constructor parameter {}", position),
            InjectionPoint::Field(name) => write!(f, "field '{}'", name),
            InjectionPoint::Method(name, position) => {
                write!(f, "parameter {} of method '{}'", position, name)
            }
        }
    }
}

/// One resolvable dependency slot of a component
#[derive(Debug, Clone)]
pub struct Injectee {
    required: Contract,
    qualifiers: BTreeSet<String>,
    name: Option<String>,
    point: InjectionPoint,
    optional: bool,
    self_reference: bool,
    multiple: bool,
    resolver: String,
    parent: Option<String>,
}

impl Injectee {
    fn new(required: Contract, point: InjectionPoint) -> Self {
        Self {
            required,
            qualifiers: BTreeSet::new(),
            name: None,
            point,
            optional: false,
            self_reference: false,
            multiple: false,
            resolver: DEFAULT_RESOLVER_KIND.to_string(),
            parent: None,
        }
    }

    /// Constructor parameter requiring `T`
    pub fn constructor<T: ?Sized + 'static>(position: usize) -> Self {
        Self::new(Contract::of::<T>(), InjectionPoint::Constructor(position))
    }

    /// Field requiring `T`
    pub fn field<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self::new(Contract::of::<T>(), InjectionPoint::Field(name))
    }

    /// Initializer method parameter requiring `T`
    pub fn method<T: ?Sized + 'static>(method: &'static str, position: usize) -> Self {
        Self::new(Contract::of::<T>(), InjectionPoint::Method(method, position))
    }

    /// Injection point receiving the component's own active descriptor
    pub fn self_descriptor(point: impl Into<InjectionPoint>) -> Self {
        let mut injectee = Self::new(Contract::of::<ActiveDescriptor>(), point.into());
        injectee.self_reference = true;
        injectee
    }

    /// Allow the injectee to stay unresolved
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Require a qualifier on the candidate
    pub fn qualified_by(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.insert(qualifier.into());
        self
    }

    /// Require the candidate's name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Inject every match instead of the best one
    pub fn all(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Resolve through the injection resolver of another kind
    pub fn resolved_by(mut self, kind: impl Into<String>) -> Self {
        self.resolver = kind.into();
        self
    }

    pub(crate) fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn required_contract(&self) -> &Contract {
        &self.required
    }

    pub fn qualifiers(&self) -> &BTreeSet<String> {
        &self.qualifiers
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn point(&self) -> &InjectionPoint {
        &self.point
    }

    pub fn position(&self) -> usize {
        self.point.position()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_self(&self) -> bool {
        self.self_reference
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Kind of injection resolver responsible for this injectee
    pub fn resolver_kind(&self) -> &str {
        &self.resolver
    }

    /// Implementation owning this injection point
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

impl fmt::Display for Injectee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.point, self.required.type_name())?;
        if let Some(name) = &self.name {
            write!(f, " named '{}'", name)?;
        }
        if !self.qualifiers.is_empty() {
            let qualifiers: Vec<&str> = self.qualifiers.iter().map(String::as_str).collect();
            write!(f, " qualified by [{}]", qualifiers.join(", "))?;
        }
        Ok(())
    }
}

/// A resolved value, type-erased until the component takes it
pub struct InjectedValue(Box<dyn Any + Send + Sync>);

impl InjectedValue {
    /// Wrap a shared value
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self(Box::new(value))
    }

    /// Wrap the values of a multiple injectee
    pub fn many(values: Vec<InjectedValue>) -> Self {
        Self(Box::new(values))
    }

    /// Take the value back as `Arc<T>`
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(self) -> Result<Arc<T>, Self> {
        match self.0.downcast::<Arc<T>>() {
            Ok(value) => Ok(*value),
            Err(other) => Err(Self(other)),
        }
    }

    /// Take the values of a multiple injectee back
    pub fn into_many(self) -> Result<Vec<InjectedValue>, Self> {
        match self.0.downcast::<Vec<InjectedValue>>() {
            Ok(values) => Ok(*values),
            Err(other) => Err(Self(other)),
        }
    }
}

impl fmt::Debug for InjectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InjectedValue(<value>)")
    }
}

/// Resolved values handed to a component, keyed by injection point
#[derive(Debug)]
pub struct Arguments {
    implementation: String,
    values: HashMap<InjectionPoint, Option<InjectedValue>>,
}

impl Arguments {
    pub(crate) fn new(
        implementation: impl Into<String>,
        values: HashMap<InjectionPoint, Option<InjectedValue>>,
    ) -> Self {
        Self {
            implementation: implementation.into(),
            values,
        }
    }

    /// Arguments with nothing in them
    pub fn empty(implementation: impl Into<String>) -> Self {
        Self::new(implementation, HashMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn take(&mut self, point: &InjectionPoint) -> Result<Option<InjectedValue>, CoreError> {
        self.values.remove(point).ok_or_else(|| {
            CoreError::illegal_state(format!(
                "'{}' declares no injectee at {} (or it was already taken)",
                self.implementation, point
            ))
        })
    }

    fn mismatch<T: ?Sized>(&self, point: &InjectionPoint) -> CoreError {
        CoreError::resolution(format!(
            "value injected at {} of '{}' is not a {}",
            point,
            self.implementation,
            std::any::type_name::<T>()
        ))
    }

    /// Take a mandatory value
    pub fn required<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        point: impl Into<InjectionPoint>,
    ) -> Result<Arc<T>, CoreError> {
        let point = point.into();
        match self.take(&point)? {
            Some(value) => value.downcast::<T>().map_err(|_| self.mismatch::<T>(&point)),
            None => Err(CoreError::UnsatisfiedDependency {
                implementation: self.implementation.clone(),
                injectee: point.to_string(),
            }),
        }
    }

    /// Take an optional value
    pub fn optional<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        point: impl Into<InjectionPoint>,
    ) -> Result<Option<Arc<T>>, CoreError> {
        let point = point.into();
        match self.take(&point)? {
            Some(value) => value
                .downcast::<T>()
                .map(Some)
                .map_err(|_| self.mismatch::<T>(&point)),
            None => Ok(None),
        }
    }

    /// Take every value of a multiple injectee
    pub fn all<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        point: impl Into<InjectionPoint>,
    ) -> Result<Vec<Arc<T>>, CoreError> {
        let point = point.into();
        let Some(value) = self.take(&point)? else {
            return Ok(Vec::new());
        };
        let values = value.into_many().map_err(|_| self.mismatch::<Vec<Arc<T>>>(&point))?;
        values
            .into_iter()
            .map(|v| v.downcast::<T>().map_err(|_| self.mismatch::<T>(&point)))
            .collect()
    }

    /// Take the component's own active descriptor
    pub fn self_descriptor(
        &mut self,
        point: impl Into<InjectionPoint>,
    ) -> Result<Arc<ActiveDescriptor>, CoreError> {
        self.required::<ActiveDescriptor>(point)
    }
}

/// Split resolved values into constructor and member arguments
pub(crate) fn split_arguments(
    implementation: &str,
    values: Vec<(InjectionPoint, Option<InjectedValue>)>,
) -> (Arguments, Arguments) {
    let (constructor, members): (Vec<_>, Vec<_>) =
        values.into_iter().partition(|(point, _)| point.is_constructor());
    (
        Arguments::new(implementation, constructor.into_iter().collect()),
        Arguments::new(implementation, members.into_iter().collect()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            42
        }
    }

    fn arguments(values: Vec<(InjectionPoint, Option<InjectedValue>)>) -> Arguments {
        Arguments::new("app::Component", values.into_iter().collect())
    }

    #[test]
    fn test_required_trait_object_round_trips() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock);
        let mut args = arguments(vec![(0.into(), Some(InjectedValue::new(clock)))]);

        let clock = args.required::<dyn Clock>(0).unwrap();
        assert_eq!(clock.now(), 42);
        assert!(args.is_empty());
    }

    #[test]
    fn test_unresolved_required_value_is_unsatisfied() {
        let mut args = arguments(vec![(InjectionPoint::Field("clock"), None)]);
        let error = args
            .required::<dyn Clock>(InjectionPoint::Field("clock"))
            .err()
            .expect("clock was never provided");
        assert!(matches!(error, CoreError::UnsatisfiedDependency { .. }));
    }

    #[test]
    fn test_optional_and_multiple_values() {
        let first: Arc<dyn Clock> = Arc::new(FixedClock);
        let second: Arc<dyn Clock> = Arc::new(FixedClock);
        let mut args = arguments(vec![
            (0.into(), None),
            (
                1.into(),
                Some(InjectedValue::many(vec![
                    InjectedValue::new(first),
                    InjectedValue::new(second),
                ])),
            ),
        ]);

        assert!(args.optional::<dyn Clock>(0).unwrap().is_none());
        assert_eq!(args.all::<dyn Clock>(1).unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_type_is_a_resolution_error() {
        let mut args = arguments(vec![(0.into(), Some(InjectedValue::new(Arc::new(5u32))))]);
        let error = args.required::<String>(0).unwrap_err();
        assert!(matches!(error, CoreError::Resolution { .. }));
    }

    #[test]
    fn test_undeclared_point_is_illegal_state() {
        let mut args = arguments(Vec::new());
        assert!(matches!(
            args.required::<String>(3),
            Err(CoreError::IllegalState { .. })
        ));
    }

    #[test]
    fn test_injectee_description() {
        let injectee = Injectee::method::<String>("set_greeting", 1)
            .named("greeting")
            .qualified_by("Loud")
            .optional();
        let rendered = injectee.to_string();

        assert!(rendered.contains("parameter 1 of method 'set_greeting'"));
        assert!(rendered.contains("named 'greeting'"));
        assert!(rendered.contains("Loud"));
        assert!(injectee.is_optional());
        assert_eq!(injectee.resolver_kind(), DEFAULT_RESOLVER_KIND);
    }
}
