use crate::container::autowiring::{InjectedValue, Injectee, DEFAULT_RESOLVER_KIND};
use crate::container::handle::ServiceHandle;
use crate::container::locator::ServiceLocator;
use crate::container::scope::PER_LOOKUP;
use crate::errors::CoreError;

/// Resolves injectees of one kind into values
///
/// Custom resolvers are singleton services advertising `dyn InjectionResolver`.
/// `Ok(None)` means nothing matched; the creator decides whether that is fatal.
pub trait InjectionResolver: Send + Sync {
    /// Injectee kind this resolver is responsible for
    fn kind(&self) -> &str;

    fn resolve(
        &self,
        locator: &ServiceLocator,
        injectee: &Injectee,
        root: Option<&ServiceHandle>,
    ) -> Result<Option<InjectedValue>, CoreError>;
}

/// Built-in resolver for the default injectee kind
///
/// Picks the best handle for the injectee's contract, name and qualifiers.
/// Per-lookup dependencies are recorded on the root handle so they are
/// destroyed with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl DefaultResolver {
    fn value_of(
        handle: &ServiceHandle,
        injectee: &Injectee,
        root: Option<&ServiceHandle>,
    ) -> Result<InjectedValue, CoreError> {
        let value = handle.resolve_value(injectee.required_contract(), root)?;
        if let Some(root) = root {
            if handle.scope() == PER_LOOKUP {
                root.add_sub_handle(handle.clone());
            }
        }
        Ok(value)
    }
}

impl InjectionResolver for DefaultResolver {
    fn kind(&self) -> &str {
        DEFAULT_RESOLVER_KIND
    }

    fn resolve(
        &self,
        locator: &ServiceLocator,
        injectee: &Injectee,
        root: Option<&ServiceHandle>,
    ) -> Result<Option<InjectedValue>, CoreError> {
        if injectee.is_multiple() {
            let values = locator
                .injectee_handles(injectee)?
                .iter()
                .map(|handle| Self::value_of(handle, injectee, root))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some(InjectedValue::many(values)));
        }

        match locator.injectee_handle(injectee)? {
            Some(handle) => Self::value_of(&handle, injectee, root).map(Some),
            None => Ok(None),
        }
    }
}
