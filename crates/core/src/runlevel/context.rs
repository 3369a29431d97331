use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::container::active::ActiveDescriptor;
use crate::container::handle::ServiceHandle;
use crate::container::implementation::Instance;
use crate::container::scope::Context;
use crate::errors::CoreError;
use crate::runlevel::recorder::RunLevelRecorder;
use crate::runlevel::{environment_of, is_run_level_component, level_of, RUN_LEVEL, RUNLEVEL_INITIAL};

/// Levels shared between a controller and its context
#[derive(Debug)]
pub(crate) struct Levels {
    current: AtomicI32,
    planned: AtomicI32,
    active: AtomicI32,
}

impl Levels {
    pub(crate) fn new() -> Self {
        Self {
            current: AtomicI32::new(RUNLEVEL_INITIAL),
            planned: AtomicI32::new(RUNLEVEL_INITIAL),
            active: AtomicI32::new(RUNLEVEL_INITIAL),
        }
    }

    pub(crate) fn current(&self) -> i32 {
        self.current.load(Ordering::SeqCst)
    }

    pub(crate) fn planned(&self) -> i32 {
        self.planned.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> i32 {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn plan(&self, level: i32) {
        self.planned.store(level, Ordering::SeqCst);
    }

    /// Open a level for creation
    pub(crate) fn enter(&self, level: i32) {
        self.active.store(level, Ordering::SeqCst);
    }

    /// Settle on a level; creation is allowed up to it
    pub(crate) fn settle(&self, level: i32) {
        self.current.store(level, Ordering::SeqCst);
        self.active.store(level, Ordering::SeqCst);
    }
}

/// Context of the [`RUN_LEVEL`] scope
///
/// A component may only be created once the controller has opened its level.
/// Instances are cached like singletons until their level is released.
pub struct RunLevelContext {
    environment: String,
    levels: Arc<Levels>,
    recorder: Arc<RunLevelRecorder>,
    generation: AtomicU64,
    active: AtomicBool,
}

impl RunLevelContext {
    pub(crate) fn new(environment: impl Into<String>, levels: Arc<Levels>, recorder: Arc<RunLevelRecorder>) -> Self {
        Self {
            environment: environment.into(),
            levels,
            recorder,
            generation: AtomicU64::new(0),
            active: AtomicBool::new(true),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Level creation is currently allowed up to
    pub fn active_level(&self) -> i32 {
        self.levels.active()
    }

    /// Release everything recorded at one level, newest first
    pub(crate) fn release_level(&self, level: i32) -> usize {
        let stack = self.recorder.take_level(level);
        let released = stack.len();
        for descriptor in stack.iter().rev() {
            self.destroy_one(descriptor);
        }
        if released > 0 {
            tracing::debug!("Released {} component(s) of run level {}", released, level);
        }
        released
    }

    /// Level of the run-level component the lookup started from
    fn requesting_level(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Option<i32>, CoreError> {
        let Some(root) = root else {
            return Ok(None);
        };
        let requester = root.active_descriptor();
        if Arc::ptr_eq(requester, descriptor) {
            return Ok(None);
        }
        let raw = requester.read();
        if !is_run_level_component(&raw, &self.environment) {
            return Ok(None);
        }
        level_of(&raw).map(Some)
    }
}

impl Context for RunLevelContext {
    fn scope(&self) -> &str {
        RUN_LEVEL
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<ActiveDescriptor>,
        root: Option<&ServiceHandle>,
    ) -> Result<Instance, CoreError> {
        if !self.is_active() {
            return Err(CoreError::ScopeNotActive {
                scope: RUN_LEVEL.to_string(),
            });
        }
        let (level, environment) = {
            let raw = descriptor.read();
            (level_of(&raw)?, environment_of(&raw).to_string())
        };
        if environment != self.environment {
            return Err(CoreError::configuration(format!(
                "'{}' belongs to run-level environment '{}' but the controller runs '{}'",
                descriptor, environment, self.environment
            )));
        }
        // a component may only reach down, even to instances that are already up
        if let Some(requester) = self.requesting_level(descriptor, root)? {
            if level > requester {
                return Err(CoreError::RunLevelViolation {
                    implementation: descriptor.implementation(),
                    service_level: level,
                    active_level: requester,
                });
            }
        }
        if let Some(instance) = descriptor.cached() {
            return Ok(instance);
        }

        let active_level = self.levels.active();
        if level > active_level {
            return Err(CoreError::RunLevelViolation {
                implementation: descriptor.implementation(),
                service_level: level,
                active_level,
            });
        }

        descriptor
            .cache_or_create(
                || self.generation.fetch_add(1, Ordering::SeqCst) + 1,
                || descriptor.create(root),
            )
            .map(|(instance, _)| instance)
    }

    fn contains_key(&self, descriptor: &ActiveDescriptor) -> bool {
        descriptor.is_cached()
    }

    fn destroy_one(&self, descriptor: &Arc<ActiveDescriptor>) {
        if let Some(instance) = descriptor.release_cache() {
            if let Err(e) = descriptor.dispose(&instance) {
                tracing::warn!("Failed to release '{}': {}", descriptor, e);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut levels = self.recorder.recorded_levels();
        levels.reverse();
        for level in levels {
            self.release_level(level);
        }
        self.levels.plan(RUNLEVEL_INITIAL);
        self.levels.settle(RUNLEVEL_INITIAL);
    }
}

impl fmt::Debug for RunLevelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLevelContext")
            .field("environment", &self.environment)
            .field("levels", &self.levels)
            .field("active", &self.is_active())
            .finish()
    }
}
