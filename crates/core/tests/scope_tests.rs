//! Integration tests for scopes, contexts and service handles

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use warden_core::container::{
    ActiveDescriptor, Arguments, Context, ImplementationType, Injectable, Injectee, Instance, LocatorFactory,
    ServiceHandle, ServiceLocator, PER_LOOKUP, PER_THREAD, SINGLETON,
};
use warden_core::{CoreError, ErrorInformation, ErrorService, ErrorType};

fn locator(name: &str) -> ServiceLocator {
    LocatorFactory::new().create_named(name).unwrap()
}

struct Counted(usize);

/// Bind a `Counted` in `scope`; the counter tracks constructions
fn bind_counted(locator: &ServiceLocator, scope: &str, delay: Duration) -> Arc<AtomicUsize> {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let implementation = ImplementationType::factory("test::Counted", Vec::new(), move |_: &mut Arguments| {
        thread::sleep(delay);
        Ok(Counted(counter.fetch_add(1, Ordering::SeqCst) + 1))
    })
    .build();
    locator
        .bind(vec![implementation.descriptor().in_scope(scope).build()])
        .unwrap();
    created
}

#[test]
fn test_singleton_is_constructed_once_under_contention() {
    let locator = locator("contention");
    let created = bind_counted(&locator, SINGLETON, Duration::from_millis(20));

    let barrier = Arc::new(Barrier::new(16));
    let workers: Vec<_> = (0..16)
        .map(|_| {
            let locator = locator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                locator.require::<Counted>().unwrap()
            })
        })
        .collect();
    let instances: Vec<Arc<Counted>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}

#[test]
fn test_per_lookup_handles_get_distinct_instances() {
    let locator = locator("per-lookup");
    let created = bind_counted(&locator, PER_LOOKUP, Duration::ZERO);

    let handles: Vec<ServiceHandle> = (0..5)
        .map(|_| locator.service_handle::<Counted>(&[]).unwrap().unwrap())
        .collect();
    let instances: Vec<Arc<Counted>> = handles.iter().map(|h| h.service::<Counted>().unwrap()).collect();

    assert_eq!(created.load(Ordering::SeqCst), 5);
    for (i, a) in instances.iter().enumerate() {
        for b in &instances[i + 1..] {
            assert!(!Arc::ptr_eq(a, b));
        }
    }

    // a handle keeps answering with its own instance
    let again = handles[0].service::<Counted>().unwrap();
    assert!(Arc::ptr_eq(&again, &instances[0]));
}

#[test]
fn test_per_thread_instances() {
    let locator = locator("per-thread");
    let created = bind_counted(&locator, PER_THREAD, Duration::ZERO);

    let first = locator.require::<Counted>().unwrap();
    let second = locator.require::<Counted>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = {
        let locator = locator.clone();
        thread::spawn(move || locator.require::<Counted>().unwrap().0)
            .join()
            .unwrap()
    };
    assert_ne!(other, first.0);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

struct First;
struct Second(#[allow(dead_code)] Arc<First>);

#[test]
fn test_shutdown_destroys_singletons_in_reverse_creation_order() {
    let locator = locator("teardown");
    let log = Arc::new(Mutex::new(Vec::new()));

    let first_log = log.clone();
    let first = ImplementationType::factory("test::First", Vec::new(), |_: &mut Arguments| Ok(First))
        .scoped(SINGLETON)
        .disposer(move |_| {
            first_log.lock().unwrap().push("first");
            Ok(())
        })
        .build();
    let second_log = log.clone();
    let second = ImplementationType::factory(
        "test::Second",
        vec![Injectee::constructor::<First>(0)],
        |args: &mut Arguments| Ok(Second(args.required::<First>(0)?)),
    )
    .scoped(SINGLETON)
    .disposer(move |_| {
        second_log.lock().unwrap().push("second");
        Ok(())
    })
    .build();
    locator
        .bind(vec![first.descriptor().build(), second.descriptor().build()])
        .unwrap();

    locator.require::<Second>().unwrap();
    locator.shutdown();

    assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
}

#[derive(Default)]
struct Failures(Mutex<Vec<ErrorType>>);

impl ErrorService for Failures {
    fn on_failure(&self, information: &ErrorInformation<'_>) {
        self.0.lock().unwrap().push(information.error_type);
    }
}

/// Bind a `Failures` error service and resolve it up front
fn watch_failures(locator: &ServiceLocator) -> Arc<Failures> {
    let failures = Arc::new(Failures::default());
    locator
        .bind_implementation(
            &ImplementationType::constant("test::Failures", failures.clone())
                .contract::<dyn ErrorService, _>(|e| e)
                .build(),
        )
        .unwrap();
    locator.require::<dyn ErrorService>().unwrap();
    failures
}

struct Third(#[allow(dead_code)] Arc<Second>);

#[test]
fn test_failing_disposers_do_not_stop_shutdown() {
    let locator = locator("teardown-failures");
    let failures = watch_failures(&locator);
    let log = Arc::new(Mutex::new(Vec::new()));

    let first_log = log.clone();
    let first = ImplementationType::factory("test::First", Vec::new(), |_: &mut Arguments| Ok(First))
        .scoped(SINGLETON)
        .disposer(move |_| {
            first_log.lock().unwrap().push("first");
            Ok(())
        })
        .build();
    let second_log = log.clone();
    let second = ImplementationType::factory(
        "test::Second",
        vec![Injectee::constructor::<First>(0)],
        |args: &mut Arguments| Ok(Second(args.required::<First>(0)?)),
    )
    .scoped(SINGLETON)
    .disposer(move |_| {
        second_log.lock().unwrap().push("second");
        Err(CoreError::lifecycle("test::Second", "pre_destroy", "socket already closed"))
    })
    .build();
    let third_log = log.clone();
    let third = ImplementationType::factory(
        "test::Third",
        vec![Injectee::constructor::<Second>(0)],
        |args: &mut Arguments| Ok(Third(args.required::<Second>(0)?)),
    )
    .scoped(SINGLETON)
    .disposer(move |_| -> Result<(), CoreError> {
        third_log.lock().unwrap().push("third");
        panic!("disposer exploded")
    })
    .build();
    locator
        .bind(vec![
            first.descriptor().build(),
            second.descriptor().build(),
            third.descriptor().build(),
        ])
        .unwrap();

    locator.require::<Third>().unwrap();
    locator.shutdown();

    assert!(locator.is_shutdown());
    assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    assert_eq!(
        *failures.0.lock().unwrap(),
        vec![ErrorType::ServiceDestructionFailure, ErrorType::ServiceDestructionFailure]
    );
}

struct Fragile;

impl Injectable for Fragile {
    fn scope() -> Option<&'static str> {
        Some(SINGLETON)
    }

    fn create(_args: &mut Arguments) -> Result<Self, CoreError> {
        Ok(Fragile)
    }

    fn post_construct(&self) -> Result<(), CoreError> {
        panic!("half initialised")
    }
}

#[test]
fn test_panicking_post_construct_is_reported() {
    let locator = locator("post-construct-panic");
    let failures = watch_failures(&locator);
    locator
        .bind_implementation(&ImplementationType::of::<Fragile>().build())
        .unwrap();

    assert!(locator.require::<Fragile>().is_ok());
    assert_eq!(*failures.0.lock().unwrap(), vec![ErrorType::ServiceCreationFailure]);
}

#[test]
fn test_singleton_can_be_retried_after_its_factory_panics() {
    let locator = locator("retry-after-panic");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let flaky = ImplementationType::factory("test::Counted", Vec::new(), move |_: &mut Arguments| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 {
            panic!("first construction fails");
        }
        Ok(Counted(call))
    })
    .scoped(SINGLETON)
    .build();
    locator.bind(vec![flaky.descriptor().build()]).unwrap();

    let error = locator.require::<Counted>().err().expect("the first construction panics");
    assert!(!error.any(&|e: &CoreError| matches!(e, CoreError::CircularDependency { .. })));

    assert_eq!(locator.require::<Counted>().unwrap().0, 2);
    assert_eq!(locator.require::<Counted>().unwrap().0, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

struct Inner;
struct Outer(#[allow(dead_code)] Arc<Inner>);

#[test]
fn test_destroying_a_handle_cascades_to_per_lookup_dependencies() {
    let locator = locator("cascade");
    let log = Arc::new(Mutex::new(Vec::new()));

    let inner_log = log.clone();
    let inner = ImplementationType::factory("test::Inner", Vec::new(), |_: &mut Arguments| Ok(Inner))
        .disposer(move |_| {
            inner_log.lock().unwrap().push("inner");
            Ok(())
        })
        .build();
    let outer_log = log.clone();
    let outer = ImplementationType::factory(
        "test::Outer",
        vec![Injectee::constructor::<Inner>(0)],
        |args: &mut Arguments| Ok(Outer(args.required::<Inner>(0)?)),
    )
    .disposer(move |_| {
        outer_log.lock().unwrap().push("outer");
        Ok(())
    })
    .build();
    locator
        .bind(vec![inner.descriptor().build(), outer.descriptor().build()])
        .unwrap();

    let handle = locator.service_handle::<Outer>(&[]).unwrap().unwrap();
    handle.service::<Outer>().unwrap();
    assert_eq!(handle.sub_handle_count(), 1);
    assert!(handle.is_active());

    handle.destroy();
    handle.destroy();
    assert_eq!(*log.lock().unwrap(), vec!["inner", "outer"]);
    assert!(handle.is_destroyed());
    assert!(handle.service::<Outer>().is_err());
}

#[test]
fn test_destroying_a_singleton_handle_releases_the_instance() {
    let locator = locator("singleton-destroy");
    let created = bind_counted(&locator, SINGLETON, Duration::ZERO);

    let handle = locator.service_handle::<Counted>(&[]).unwrap().unwrap();
    assert_eq!(handle.service::<Counted>().unwrap().0, 1);
    handle.destroy();

    assert_eq!(locator.require::<Counted>().unwrap().0, 2);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

struct CycleA;
struct CycleB;

#[test]
fn test_circular_singletons_fail_instead_of_hanging() {
    let locator = locator("cycle");
    let a = ImplementationType::factory(
        "test::CycleA",
        vec![Injectee::constructor::<CycleB>(0)],
        |args: &mut Arguments| {
            args.required::<CycleB>(0)?;
            Ok(CycleA)
        },
    )
    .scoped(SINGLETON)
    .build();
    let b = ImplementationType::factory(
        "test::CycleB",
        vec![Injectee::constructor::<CycleA>(0)],
        |args: &mut Arguments| {
            args.required::<CycleA>(0)?;
            Ok(CycleB)
        },
    )
    .scoped(SINGLETON)
    .build();
    locator
        .bind(vec![a.descriptor().build(), b.descriptor().build()])
        .unwrap();

    let error = locator.require::<CycleA>().err().expect("the cycle must be detected");
    assert!(error.any(&|e: &CoreError| matches!(e, CoreError::CircularDependency { .. })));
}

const REQUEST: &str = "Request";

#[derive(Default)]
struct RequestContext {
    instances: Mutex<HashMap<u64, Instance>>,
}

impl Context for RequestContext {
    fn scope(&self) -> &str {
        REQUEST
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Instance, CoreError> {
        let key = descriptor.service_id().unwrap_or_default();
        if let Some(instance) = self.instances.lock().unwrap().get(&key) {
            return Ok(instance.clone());
        }
        let created = descriptor.create(root)?;
        Ok(self.instances.lock().unwrap().entry(key).or_insert(created).clone())
    }

    fn contains_key(&self, descriptor: &ActiveDescriptor) -> bool {
        let key = descriptor.service_id().unwrap_or_default();
        self.instances.lock().unwrap().contains_key(&key)
    }

    fn destroy_one(&self, descriptor: &Arc<ActiveDescriptor>) {
        let key = descriptor.service_id().unwrap_or_default();
        let removed = self.instances.lock().unwrap().remove(&key);
        if let Some(instance) = removed {
            let _ = descriptor.dispose(&instance);
        }
    }

    fn is_active(&self) -> bool {
        true
    }

    fn shutdown(&self) {
        self.instances.lock().unwrap().clear();
    }
}

fn request_context() -> Arc<ImplementationType> {
    ImplementationType::constant("test::RequestContext", Arc::new(RequestContext::default()))
        .contract::<dyn Context, _>(|context| context)
        .build()
}

#[test]
fn test_custom_scope_needs_exactly_one_context() {
    let locator = locator("custom-scope");
    let created = bind_counted(&locator, REQUEST, Duration::ZERO);

    let error = locator.require::<Counted>().err().expect("no context serves the scope");
    assert!(matches!(error, CoreError::ScopeNotActive { ref scope } if scope == REQUEST));

    locator.bind_implementation(&request_context()).unwrap();
    let first = locator.require::<Counted>().unwrap();
    let second = locator.require::<Counted>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let mut competing = locator.configuration();
    competing.bind(request_context().descriptor().named("second"));
    competing.commit().unwrap();
    let error = locator.require::<Counted>().err().expect("two contexts serve the scope");
    assert!(error.is_configuration());
}
