//! Integration tests for the run-level controller

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use warden_core::container::{Arguments, ImplementationType, Injectee, LocatorFactory, ServiceLocator};
use warden_core::runlevel::ControllerState;
use warden_core::{
    CoreError, LocatorConfig, RunLevelConfig, RunLevelController, RunLevelDescriptorExt, RunLevelListener,
    RUNLEVEL_IMMEDIATE, RUNLEVEL_INITIAL,
};

type Log = Arc<Mutex<Vec<String>>>;

fn locator(name: &str) -> ServiceLocator {
    LocatorFactory::new().create_named(name).unwrap()
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A factory logging `+name` when created and `-name` when released
fn logged<T, F>(name: &'static str, injectees: Vec<Injectee>, log: &Log, make: F) -> Arc<ImplementationType>
where
    T: Send + Sync + 'static,
    F: Fn(&mut Arguments) -> Result<T, CoreError> + Send + Sync + 'static,
{
    let created = log.clone();
    let released = log.clone();
    ImplementationType::factory(name, injectees, move |args: &mut Arguments| {
        let value = make(args)?;
        created.lock().unwrap().push(format!("+{}", name));
        Ok(value)
    })
    .disposer(move |_| {
        released.lock().unwrap().push(format!("-{}", name));
        Ok(())
    })
    .build()
}

struct Storage;
struct Cache(#[allow(dead_code)] Arc<Storage>);
struct Server(#[allow(dead_code)] Arc<Cache>);

fn bind_stack(locator: &ServiceLocator, log: &Log) {
    let storage = logged("Storage", Vec::new(), log, |_| Ok(Storage));
    let cache = logged("Cache", vec![Injectee::constructor::<Storage>(0)], log, |args| {
        Ok(Cache(args.required::<Storage>(0)?))
    });
    let server = logged("Server", vec![Injectee::constructor::<Cache>(0)], log, |args| {
        Ok(Server(args.required::<Cache>(0)?))
    });
    locator
        .bind(vec![
            server.descriptor().at_run_level(2).build(),
            cache.descriptor().at_run_level(1).build(),
            storage.descriptor().at_run_level(0).build(),
        ])
        .unwrap();
}

#[test]
fn test_levels_activate_upwards_and_release_downwards() {
    let locator = locator("stack");
    let log = Log::default();
    bind_stack(&locator, &log);

    let controller = RunLevelController::for_locator(&locator).unwrap();
    assert_eq!(controller.current_run_level(), RUNLEVEL_IMMEDIATE);
    assert!(entries(&log).is_empty());

    assert_eq!(controller.proceed_to(2).unwrap(), 2);
    assert_eq!(entries(&log), vec!["+Storage", "+Cache", "+Server"]);
    assert_eq!(controller.current_run_level(), 2);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(controller.recorded(1).len(), 1);
    assert_eq!(controller.recorded(1)[0].implementation(), "Cache");

    assert_eq!(controller.proceed_to(0).unwrap(), 0);
    assert_eq!(
        entries(&log),
        vec!["+Storage", "+Cache", "+Server", "-Server", "-Cache"]
    );
    assert_eq!(controller.recorded(0).len(), 1);
    assert!(controller.recorded(1).is_empty());

    // the surviving component is still the cached one
    assert!(locator.require::<Storage>().is_ok());
    assert_eq!(entries(&log).len(), 5);
}

#[test]
fn test_shutdown_releases_every_level() {
    let locator = locator("stack-shutdown");
    let log = Log::default();
    bind_stack(&locator, &log);

    let controller = RunLevelController::for_locator(&locator).unwrap();
    controller.proceed_to(2).unwrap();
    assert_eq!(controller.shutdown().unwrap(), RUNLEVEL_INITIAL);
    assert_eq!(
        entries(&log)[3..].to_vec(),
        vec!["-Server", "-Cache", "-Storage"]
    );
}

struct Early(#[allow(dead_code)] Arc<Late>);
struct Late;

#[test]
fn test_depending_on_a_higher_level_is_a_violation() {
    let locator = locator("violation");
    let log = Log::default();
    let early = logged("Early", vec![Injectee::constructor::<Late>(0)], &log, |args| {
        Ok(Early(args.required::<Late>(0)?))
    });
    let late = logged("Late", Vec::new(), &log, |_| Ok(Late));
    locator
        .bind(vec![
            early.descriptor().at_run_level(1).build(),
            late.descriptor().at_run_level(2).build(),
        ])
        .unwrap();

    let controller = RunLevelController::for_locator(&locator).unwrap();
    let error = controller.proceed_to(2).unwrap_err();

    assert!(error.is_configuration());
    assert!(error.any(&|e: &CoreError| matches!(
        e,
        CoreError::RunLevelViolation {
            service_level: 2,
            active_level: 1,
            ..
        }
    )));
    assert_eq!(controller.current_run_level(), 0);
    assert!(entries(&log).is_empty());
    assert!(controller.recorded(1).is_empty());
}

#[test]
fn test_reaching_up_to_a_running_higher_level_is_a_violation() {
    let locator = locator("violation-after-start");
    let log = Log::default();
    let late = logged("Late", Vec::new(), &log, |_| Ok(Late));
    locator.bind(vec![late.descriptor().at_run_level(2).build()]).unwrap();

    let controller = RunLevelController::for_locator(&locator).unwrap();
    controller.proceed_to(2).unwrap();
    assert_eq!(entries(&log), vec!["+Late"]);

    let early = logged("Early", vec![Injectee::constructor::<Late>(0)], &log, |args| {
        Ok(Early(args.required::<Late>(0)?))
    });
    locator.bind(vec![early.descriptor().at_run_level(1).build()]).unwrap();

    let error = locator.require::<Early>().err().expect("early may not reach up to late");
    assert!(error.any(&|e: &CoreError| matches!(
        e,
        CoreError::RunLevelViolation {
            service_level: 2,
            active_level: 1,
            ..
        }
    )));
    assert_eq!(entries(&log), vec!["+Late"]);

    // the level-2 component itself is still served
    assert!(locator.require::<Late>().is_ok());
}

#[derive(Default)]
struct Progress {
    reached: Mutex<Vec<i32>>,
    cancelled: Mutex<Vec<i32>>,
    failed: Mutex<Vec<i32>>,
}

impl RunLevelListener for Progress {
    fn on_progress(&self, level: i32) {
        self.reached.lock().unwrap().push(level);
    }

    fn on_cancelled(&self, level: i32) {
        self.cancelled.lock().unwrap().push(level);
    }

    fn on_error(&self, level: i32, _error: &CoreError) {
        self.failed.lock().unwrap().push(level);
    }
}

#[test]
fn test_listeners_follow_progress() {
    let locator = locator("progress");
    let controller = RunLevelController::for_locator(&locator).unwrap();
    let progress = Arc::new(Progress::default());
    controller.add_listener(progress.clone());

    controller.proceed_to(2).unwrap();
    controller.proceed_to(1).unwrap();
    assert_eq!(*progress.reached.lock().unwrap(), vec![0, 1, 2, 1]);

    let error = controller.proceed_to(-3).unwrap_err();
    assert!(error.is_configuration());
    assert_eq!(controller.current_run_level(), 1);
    assert_eq!(controller.planned_run_level(), 1);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(progress.failed.lock().unwrap().is_empty());
}

#[test]
fn test_failed_level_notifies_on_error() {
    let locator = locator("failing");
    let broken = ImplementationType::factory("Broken", Vec::new(), |_: &mut Arguments| -> Result<Late, CoreError> {
        Err(CoreError::lifecycle("Broken", "create", "disk missing"))
    })
    .build();
    locator
        .bind(vec![broken.descriptor().at_run_level(1).build()])
        .unwrap();

    let controller = RunLevelController::for_locator(&locator).unwrap();
    let progress = Arc::new(Progress::default());
    controller.add_listener(progress.clone());

    assert!(controller.proceed_to(3).is_err());
    assert_eq!(controller.current_run_level(), 0);
    assert_eq!(*progress.reached.lock().unwrap(), vec![0]);
    assert_eq!(*progress.failed.lock().unwrap(), vec![1]);
}

#[test]
fn test_other_environments_are_left_alone() {
    let locator = locator("environments");
    let log = Log::default();
    let staging = logged("Staging", Vec::new(), &log, |_| Ok(Late));
    let default = logged("Default", Vec::new(), &log, |_| Ok(Storage));
    locator
        .bind(vec![
            staging.descriptor().at_run_level(0).in_environment("staging").build(),
            default.descriptor().at_run_level(0).build(),
        ])
        .unwrap();

    let controller = RunLevelController::for_locator(&locator).unwrap();
    controller.proceed_to(1).unwrap();
    assert_eq!(entries(&log), vec!["+Default"]);
    let error = locator.require::<Late>().err().expect("staging components are not served");
    assert!(error.is_configuration());
}

#[test]
fn test_controller_starts_at_the_configured_baseline() {
    let factory = LocatorFactory::new();
    let locator = factory
        .create(LocatorConfig::named("baseline").with_run_level(RunLevelConfig {
            baseline: 1,
            ..RunLevelConfig::default()
        }))
        .unwrap();
    let log = Log::default();
    bind_stack(&locator, &log);

    let controller = RunLevelController::for_locator(&locator).unwrap();
    assert_eq!(controller.current_run_level(), 1);
    assert_eq!(entries(&log), vec!["+Storage", "+Cache"]);
}

#[test]
fn test_one_controller_per_locator() {
    let locator = locator("single");
    let _controller = RunLevelController::for_locator(&locator).unwrap();
    let error = RunLevelController::for_locator(&locator).unwrap_err();
    assert!(error.is_configuration());
}

fn asynchronous() -> RunLevelConfig {
    RunLevelConfig {
        asynchronous: true,
        ..RunLevelConfig::default()
    }
}

#[tokio::test]
async fn test_asynchronous_transition_can_be_awaited() {
    let locator = locator("async");
    let log = Log::default();
    bind_stack(&locator, &log);

    let controller = RunLevelController::new(&locator, asynchronous()).unwrap();
    assert!(controller.is_asynchronous());
    assert_eq!(controller.proceed_to_async(2).await.unwrap(), 2);
    assert_eq!(controller.current_run_level(), 2);
    assert_eq!(entries(&log), vec!["+Storage", "+Cache", "+Server"]);
}

#[test]
fn test_cancelling_unwinds_the_partial_level() {
    let locator = locator("cancel");
    let log = Log::default();
    let quick = logged("Quick", Vec::new(), &log, |_| Ok(Storage));
    let slow = logged("Slow", Vec::new(), &log, |_| {
        thread::sleep(Duration::from_millis(200));
        Ok(Late)
    });
    let never = logged("Never", Vec::new(), &log, |_| Ok(Cache(Arc::new(Storage))));
    locator
        .bind(vec![
            quick.descriptor().at_run_level(0).build(),
            slow.descriptor().at_run_level(1).build(),
            never.descriptor().at_run_level(2).build(),
        ])
        .unwrap();

    let controller = RunLevelController::new(&locator, asynchronous()).unwrap();
    let progress = Arc::new(Progress::default());
    controller.add_listener(progress.clone());

    let future = controller.proceed_to_async(2);
    thread::sleep(Duration::from_millis(50));
    assert!(future.cancel());
    assert!(future.is_done());
    assert!(future.wait().unwrap_err().is_cancelled());

    // queued behind the cancelled transition
    assert_eq!(controller.proceed_to(0).unwrap(), 0);
    assert_eq!(entries(&log), vec!["+Quick", "+Slow", "-Slow"]);
    assert_eq!(controller.current_run_level(), 0);
    assert_eq!(*progress.cancelled.lock().unwrap(), vec![0]);
}
