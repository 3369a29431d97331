//! Instance creation and disposal
//!
//! Creation resolves the whole injection plan before anything is produced; one
//! unresolved mandatory injectee fails the creation with every problem listed.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::container::active::{ActiveDescriptor, Reified};
use crate::container::autowiring::InjectedValue;
use crate::container::handle::ServiceHandle;
use crate::container::implementation::{Instance, ResolvedValues};
use crate::container::lifecycle::{self, InstanceLifecycleEvent, InstanceLifecycleEventType};
use crate::container::locator::{LocatorInner, ServiceLocator};
use crate::errors::{CoreError, ErrorType, MultiError};
use crate::events::LocatorEventKind;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run a component hook, turning a panic into a lifecycle error
fn guarded<T>(implementation: &str, hook: &str, run: impl FnOnce() -> Result<T, CoreError>) -> Result<T, CoreError> {
    catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        Err(CoreError::lifecycle(
            implementation,
            hook,
            format!("panicked: {}", panic_message(payload.as_ref())),
        ))
    })
}

fn resolve_injectees(
    locator: &Arc<LocatorInner>,
    descriptor: &Arc<ActiveDescriptor>,
    reified: &Reified,
    root: Option<&ServiceHandle>,
) -> Result<ResolvedValues, MultiError> {
    let implementation = reified.implementation().name();
    let service_locator = ServiceLocator::from_inner(locator.clone());
    let mut errors = MultiError::with_context(format!("unable to create '{}'", implementation));
    let mut values = ResolvedValues::with_capacity(reified.injectees().len());

    for injectee in reified.injectees() {
        let point = injectee.point().clone();
        if injectee.is_self() {
            values.push((point, Some(InjectedValue::new(descriptor.clone()))));
            continue;
        }

        let resolver = match locator.injection_resolver(injectee.resolver_kind()) {
            Ok(resolver) => resolver,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        match resolver.resolve(&service_locator, injectee, root) {
            Ok(Some(value)) => values.push((point, Some(value))),
            Ok(None) if injectee.is_optional() => values.push((point, None)),
            Ok(None) => errors.push(CoreError::UnsatisfiedDependency {
                implementation: implementation.to_string(),
                injectee: injectee.to_string(),
            }),
            Err(e) => {
                errors.push(CoreError::UnsatisfiedDependency {
                    implementation: implementation.to_string(),
                    injectee: injectee.to_string(),
                });
                errors.push(e);
            }
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

/// Create one instance of a reified descriptor
pub(crate) fn create(
    locator: &Arc<LocatorInner>,
    descriptor: &Arc<ActiveDescriptor>,
    reified: &Reified,
    root: Option<&ServiceHandle>,
) -> Result<Instance, CoreError> {
    let implementation = reified.implementation();
    let snapshot = descriptor.descriptor();

    let values = match resolve_injectees(locator, descriptor, reified, root) {
        Ok(values) => values,
        Err(errors) => {
            let error = CoreError::Multiple(errors);
            tracing::debug!("Creation of '{}' failed: {}", snapshot, error);
            locator.report(ErrorType::ServiceCreationFailure, Some(&snapshot), None, &error);
            return Err(error);
        }
    };

    let listeners = if locator.is_system_descriptor(&snapshot) {
        Vec::new()
    } else {
        locator.lifecycle_listeners()
    };
    lifecycle::notify(
        &listeners,
        &InstanceLifecycleEvent::new(InstanceLifecycleEventType::PreProduction, descriptor.clone(), None),
    );

    let produced = guarded(implementation.name(), "produce", || implementation.produce(values));
    let instance = produced.map_err(|error| {
        tracing::debug!("Producing '{}' failed: {}", snapshot, error);
        locator.report(ErrorType::ServiceCreationFailure, Some(&snapshot), None, &error);
        error
    })?;

    let constructed = guarded(implementation.name(), "post_construct", || {
        implementation.post_construct(&instance)
    });
    if let Err(error) = constructed {
        tracing::warn!("Post-construct of '{}' failed: {}", snapshot, error);
        locator.report(ErrorType::ServiceCreationFailure, Some(&snapshot), None, &error);
    }

    lifecycle::notify(
        &listeners,
        &InstanceLifecycleEvent::new(
            InstanceLifecycleEventType::PostProduction,
            descriptor.clone(),
            Some(instance.clone()),
        ),
    );

    tracing::debug!("Created '{}' in scope {}", snapshot, reified.scope());
    locator.publish(LocatorEventKind::Activated(snapshot));
    Ok(instance)
}

/// Release one instance; nothing here propagates
pub(crate) fn dispose(
    locator: Option<&Arc<LocatorInner>>,
    descriptor: &Arc<ActiveDescriptor>,
    reified: &Reified,
    instance: &Instance,
) {
    let snapshot = descriptor.descriptor();

    if let Some(locator) = locator {
        if !locator.is_system_descriptor(&snapshot) {
            lifecycle::notify(
                &locator.lifecycle_listeners(),
                &InstanceLifecycleEvent::new(
                    InstanceLifecycleEventType::PreDestruction,
                    descriptor.clone(),
                    Some(instance.clone()),
                ),
            );
        }
    }

    let implementation = reified.implementation();
    if let Err(error) = guarded(implementation.name(), "pre_destroy", || implementation.pre_destroy(instance)) {
        tracing::warn!("Pre-destroy of '{}' failed: {}", snapshot, error);
        if let Some(locator) = locator {
            locator.report(ErrorType::ServiceDestructionFailure, Some(&snapshot), None, &error);
        }
    }

    if let Some(locator) = locator {
        locator.publish(LocatorEventKind::Released(snapshot));
    }
}
