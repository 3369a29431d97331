//! The run-level controller
//!
//! Transitions are serialized: a new request cancels the one in flight and
//! then waits for it to unwind. In asynchronous mode every transition runs on
//! the controller's worker thread; otherwise on the caller's.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use crate::config::RunLevelConfig;
use crate::container::contract::contract_name;
use crate::container::descriptor::Descriptor;
use crate::container::filter::SpecificFilter;
use crate::container::implementation::ImplementationType;
use crate::container::lifecycle::InstanceLifecycleListener;
use crate::container::locator::ServiceLocator;
use crate::container::scope::Context;
use crate::errors::{CoreError, MultiError};
use crate::runlevel::context::{Levels, RunLevelContext};
use crate::runlevel::future::{Progress, RunLevelFuture};
use crate::runlevel::listener::{self, RunLevelListener};
use crate::runlevel::recorder::RunLevelRecorder;
use crate::runlevel::{is_run_level_component, level_of, RUN_LEVEL, RUNLEVEL_INITIAL};

/// What the controller is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Ascending,
    Descending,
}

struct Job {
    target: i32,
    progress: Arc<Progress>,
    reply: oneshot::Sender<Result<i32, CoreError>>,
}

struct Worker {
    sender: mpsc::UnboundedSender<Job>,
    thread: JoinHandle<()>,
}

struct ControllerInner {
    locator: ServiceLocator,
    config: RunLevelConfig,
    levels: Arc<Levels>,
    context: Arc<RunLevelContext>,
    recorder: Arc<RunLevelRecorder>,
    operation: Mutex<()>,
    in_flight: Mutex<Option<Arc<Progress>>>,
    state: Mutex<ControllerState>,
    listeners: RwLock<Vec<Arc<dyn RunLevelListener>>>,
}

impl ControllerInner {
    fn set_state(&self, state: ControllerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> ControllerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<Arc<Progress>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> Vec<Arc<dyn RunLevelListener>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Make `progress` the in-flight operation, cancelling the previous one
    fn begin(&self, progress: &Arc<Progress>) {
        if let Some(previous) = self.in_flight().replace(progress.clone()) {
            if previous.cancel() {
                tracing::debug!("Cancelled the run-level transition in flight");
            }
        }
    }

    fn end(&self, progress: &Arc<Progress>) {
        progress.finish();
        let mut in_flight = self.in_flight();
        if in_flight.as_ref().is_some_and(|current| Arc::ptr_eq(current, progress)) {
            *in_flight = None;
        }
    }

    fn execute(&self, target: i32, progress: &Arc<Progress>) -> Result<i32, CoreError> {
        let result = self.run(target, progress);
        self.end(progress);
        result
    }

    fn run(&self, target: i32, progress: &Progress) -> Result<i32, CoreError> {
        if target < RUNLEVEL_INITIAL {
            return Err(CoreError::configuration(format!(
                "run level {} is below the initial run level {}",
                target, RUNLEVEL_INITIAL
            )));
        }

        let _operation = self.operation.lock().unwrap_or_else(PoisonError::into_inner);
        let start = self.levels.current();
        if progress.is_cancelled() {
            return Err(self.cancelled(start, target));
        }
        self.levels.plan(target);

        let result = if target >= start {
            self.ascend(start, target, progress)
        } else {
            self.descend(start, target, progress)
        };
        self.set_state(ControllerState::Idle);
        self.levels.plan(self.levels.current());
        result
    }

    fn ascend(&self, from: i32, target: i32, progress: &Progress) -> Result<i32, CoreError> {
        self.set_state(ControllerState::Ascending);
        for level in from + 1..=target {
            if progress.is_cancelled() {
                return Err(self.cancelled(level - 1, target));
            }

            tracing::info!("Entering run level {}", level);
            self.levels.enter(level);
            match self.activate(level, target, progress) {
                Ok(activated) => {
                    self.levels.settle(level);
                    tracing::debug!("Run level {} reached with {} component(s)", level, activated);
                    listener::each(&self.listeners(), |l| l.on_progress(level));
                }
                Err(error) => {
                    self.context.release_level(level);
                    self.levels.settle(level - 1);
                    if !error.is_cancelled() {
                        tracing::warn!("Run level {} failed: {}", level, error);
                        listener::each(&self.listeners(), |l| l.on_error(level, &error));
                    }
                    return Err(error);
                }
            }
        }
        Ok(target)
    }

    fn descend(&self, from: i32, target: i32, progress: &Progress) -> Result<i32, CoreError> {
        self.set_state(ControllerState::Descending);
        for level in (target + 1..=from).rev() {
            if progress.is_cancelled() {
                return Err(self.cancelled(level, target));
            }

            tracing::info!("Leaving run level {}", level);
            self.levels.settle(level - 1);
            self.context.release_level(level);
            listener::each(&self.listeners(), |l| l.on_progress(level - 1));
        }
        Ok(target)
    }

    /// Activate every local component of one level in rank order
    fn activate(&self, level: i32, target: i32, progress: &Progress) -> Result<usize, CoreError> {
        let locator_id = self.locator.id();
        let environment = self.config.environment.clone();
        let filter = move |descriptor: &Descriptor| {
            descriptor.locator_id() == Some(locator_id)
                && is_run_level_component(descriptor, &environment)
                && level_of(descriptor).ok() == Some(level)
        };
        let components = self.locator.active_descriptors(&filter)?;

        let mut errors = MultiError::with_context(format!("activating run level {} failed", level));
        for descriptor in &components {
            if progress.is_cancelled() {
                break;
            }
            let activated = self
                .locator
                .handle_for(descriptor)
                .and_then(|handle| handle.service_any());
            if let Err(error) = activated {
                tracing::debug!("Could not activate '{}': {}", descriptor, error);
                errors.push(error);
            }
        }

        if progress.is_cancelled() {
            return Err(self.cancelled(level - 1, target));
        }
        errors.into_result()?;
        Ok(components.len())
    }

    fn cancelled(&self, settled: i32, target: i32) -> CoreError {
        tracing::info!("Transition to run level {} cancelled at {}", target, settled);
        listener::each(&self.listeners(), |l| l.on_cancelled(settled));
        CoreError::Cancelled {
            message: format!("proceeding to run level {} was cancelled", target),
        }
    }
}

/// Drives the run levels of one locator
///
/// Creating a controller registers its [`RunLevelContext`] and
/// [`RunLevelRecorder`] with the locator and advances to the configured
/// baseline level. A locator supports one controller.
pub struct RunLevelController {
    inner: Arc<ControllerInner>,
    worker: Mutex<Option<Worker>>,
    registrations: Vec<Descriptor>,
}

impl RunLevelController {
    /// Create a controller using the locator's own run-level settings
    pub fn for_locator(locator: &ServiceLocator) -> Result<Self, CoreError> {
        Self::new(locator, locator.config().run_level.clone())
    }

    pub fn new(locator: &ServiceLocator, config: RunLevelConfig) -> Result<Self, CoreError> {
        let locator_id = locator.id();
        let existing = locator.descriptors(&move |descriptor: &Descriptor| {
            descriptor.locator_id() == Some(locator_id)
                && descriptor.name() == Some(RUN_LEVEL)
                && descriptor.advertises(&contract_name::<dyn Context>())
        })?;
        if !existing.is_empty() {
            return Err(CoreError::configuration(format!(
                "locator '{}' already has a run-level controller",
                locator.name()
            )));
        }

        let levels = Arc::new(Levels::new());
        let recorder = Arc::new(RunLevelRecorder::new(config.environment.clone()));
        let context = Arc::new(RunLevelContext::new(
            config.environment.clone(),
            levels.clone(),
            recorder.clone(),
        ));

        let mut configuration = locator.configuration();
        configuration
            .bind(
                ImplementationType::constant(std::any::type_name::<RunLevelContext>(), context.clone())
                    .contract::<dyn Context, _>(|context| context)
                    .build()
                    .descriptor()
                    .named(RUN_LEVEL)
                    .local(),
            )
            .bind(
                ImplementationType::constant(std::any::type_name::<RunLevelRecorder>(), recorder.clone())
                    .contract::<dyn InstanceLifecycleListener, _>(|recorder| recorder)
                    .build()
                    .descriptor()
                    .local(),
            );
        let registrations = configuration.commit()?;

        let inner = Arc::new(ControllerInner {
            locator: locator.clone(),
            config,
            levels,
            context,
            recorder,
            operation: Mutex::new(()),
            in_flight: Mutex::new(None),
            state: Mutex::new(ControllerState::Idle),
            listeners: RwLock::new(Vec::new()),
        });

        let worker = if inner.config.asynchronous {
            match Self::spawn_worker(&inner) {
                Ok(worker) => Some(worker),
                Err(error) => {
                    Self::unregister(locator, &registrations);
                    return Err(error);
                }
            }
        } else {
            None
        };
        let controller = Self {
            inner,
            worker: Mutex::new(worker),
            registrations,
        };

        let baseline = controller.inner.config.baseline;
        if let Err(error) = controller.inner.execute(baseline, &Progress::new()) {
            tracing::warn!("Run-level controller could not reach baseline {}: {}", baseline, error);
            controller.stop_worker();
            controller.inner.context.shutdown();
            Self::unregister(locator, &controller.registrations);
            return Err(error);
        }
        tracing::info!(
            "Run-level controller for locator '{}' started at level {}",
            locator.name(),
            controller.current_run_level()
        );
        Ok(controller)
    }

    fn spawn_worker(inner: &Arc<ControllerInner>) -> Result<Worker, CoreError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let controller = inner.clone();
        let thread = thread::Builder::new()
            .name("warden-runlevel".to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    let result = controller.execute(job.target, &job.progress);
                    let _ = job.reply.send(result);
                }
                tracing::debug!("Run-level worker stopped");
            })?;
        Ok(Worker { sender, thread })
    }

    fn unregister(locator: &ServiceLocator, registrations: &[Descriptor]) {
        let mut configuration = locator.configuration();
        for descriptor in registrations {
            if let Some(filter) = SpecificFilter::of(descriptor) {
                configuration.unbind(filter);
            }
        }
        if let Err(e) = configuration.commit() {
            tracing::warn!("Could not unregister the run-level services: {}", e);
        }
    }

    fn stop_worker(&self) {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Worker { sender, thread }) = worker {
            drop(sender);
            if thread.join().is_err() {
                tracing::error!("Run-level worker thread panicked");
            }
        }
    }

    /// Proceed to `level`, returning once the controller settled
    ///
    /// Any transition in flight is cancelled first. On failure the controller
    /// rests on the last level it completed.
    pub fn proceed_to(&self, level: i32) -> Result<i32, CoreError> {
        if self.inner.config.asynchronous {
            return self.proceed_to_async(level).wait();
        }
        let progress = Progress::new();
        self.inner.begin(&progress);
        self.inner.execute(level, &progress)
    }

    /// Start proceeding to `level`
    ///
    /// Without an asynchronous configuration the transition completes before
    /// this returns and the future is already resolved.
    pub fn proceed_to_async(&self, level: i32) -> RunLevelFuture {
        let progress = Progress::new();
        self.inner.begin(&progress);
        let (reply, receiver) = oneshot::channel();

        let job = Job {
            target: level,
            progress: progress.clone(),
            reply,
        };
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match worker.as_ref() {
            Some(worker) => {
                if let Err(mpsc::error::SendError(job)) = worker.sender.send(job) {
                    self.inner.end(&job.progress);
                    let _ = job.reply.send(Err(CoreError::illegal_state("run-level worker is gone")));
                }
            }
            None => {
                drop(worker);
                let result = self.inner.execute(job.target, &job.progress);
                let _ = job.reply.send(result);
            }
        }
        RunLevelFuture::new(level, progress, receiver)
    }

    /// Cancel the transition in flight, if any
    pub fn cancel(&self) -> bool {
        match self.inner.in_flight().as_ref() {
            Some(progress) => progress.cancel(),
            None => false,
        }
    }

    /// Last level fully reached
    pub fn current_run_level(&self) -> i32 {
        self.inner.levels.current()
    }

    /// Level the controller is heading for
    pub fn planned_run_level(&self) -> i32 {
        self.inner.levels.planned()
    }

    /// Highest level whose components may currently be created
    pub fn active_run_level(&self) -> i32 {
        self.inner.levels.active()
    }

    pub fn state(&self) -> ControllerState {
        self.inner.state()
    }

    pub fn environment(&self) -> &str {
        &self.inner.config.environment
    }

    pub fn is_asynchronous(&self) -> bool {
        self.inner.config.asynchronous
    }

    pub fn context(&self) -> &Arc<RunLevelContext> {
        &self.inner.context
    }

    pub fn add_listener(&self, listener: Arc<dyn RunLevelListener>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Components activated at `level`, in activation order
    pub fn recorded(&self, level: i32) -> Vec<Descriptor> {
        self.inner
            .recorder
            .recorded(level)
            .iter()
            .map(|descriptor| descriptor.descriptor())
            .collect()
    }

    /// Release every level and stop the worker
    pub fn shutdown(&self) -> Result<i32, CoreError> {
        self.cancel();
        self.stop_worker();
        let progress = Progress::new();
        self.inner.begin(&progress);
        self.inner.execute(RUNLEVEL_INITIAL, &progress)
    }
}

impl Drop for RunLevelController {
    fn drop(&mut self) {
        self.cancel();
        self.stop_worker();
    }
}

impl fmt::Debug for RunLevelController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLevelController")
            .field("locator", &self.inner.locator.name())
            .field("environment", &self.inner.config.environment)
            .field("current", &self.current_run_level())
            .field("planned", &self.planned_run_level())
            .field("state", &self.state())
            .finish()
    }
}
