//! Structural events of a locator and their fan-out to listeners
//!
//! Listeners are held weakly and dropped as soon as their owner lets go of
//! them or they answer `false`. Delivery happens on the caller's thread or on
//! one dedicated worker thread, depending on [`DispatchMode`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::DispatchMode;
use crate::container::descriptor::Descriptor;
use crate::errors::CoreError;

/// What happened in the locator
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorEventKind {
    DescriptorAdded(Descriptor),
    DescriptorRemoved(Descriptor),
    RankChanged { descriptor: Descriptor, previous: i32 },
    /// An instance was created
    Activated(Descriptor),
    /// An instance was released
    Released(Descriptor),
    ConfigurationCommitted {
        transaction: Uuid,
        added: usize,
        removed: usize,
    },
}

/// One structural event
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorEvent {
    pub locator: String,
    pub occurred_at: DateTime<Utc>,
    pub kind: LocatorEventKind,
}

impl LocatorEvent {
    /// Create a new event stamped with the current time
    pub fn new(locator: impl Into<String>, kind: LocatorEventKind) -> Self {
        Self {
            locator: locator.into(),
            occurred_at: Utc::now(),
            kind,
        }
    }
}

/// Observer of locator events
pub trait LocatorListener: Send + Sync {
    /// Handle an event; return false to stop listening
    fn on_event(&self, event: &LocatorEvent) -> bool;
}

struct ListenerEntry {
    id: u64,
    listener: Weak<dyn LocatorListener>,
}

#[derive(Default)]
struct ListenerSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<ListenerEntry>>,
}

impl ListenerSet {
    fn entries(&self) -> MutexGuard<'_, Vec<ListenerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, listener: Weak<dyn LocatorListener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries().push(ListenerEntry { id, listener });
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    fn deliver(&self, event: &LocatorEvent) {
        let live: Vec<(u64, Option<Arc<dyn LocatorListener>>)> = self
            .entries()
            .iter()
            .map(|entry| (entry.id, entry.listener.upgrade()))
            .collect();

        let mut finished = Vec::new();
        for (id, listener) in live {
            let Some(listener) = listener else {
                finished.push(id);
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(true) => {}
                Ok(false) => finished.push(id),
                Err(_) => tracing::warn!("Locator listener {} panicked on {:?}", id, event.kind),
            }
        }

        if !finished.is_empty() {
            self.entries().retain(|entry| !finished.contains(&entry.id));
        }
    }

    fn len(&self) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.listener.strong_count() > 0)
            .count()
    }
}

/// Handle returned by [`EventDispatcher::subscribe`]
#[derive(Debug)]
pub struct ListenerRegistration {
    id: u64,
    set: Weak<ListenerSet>,
}

impl ListenerRegistration {
    /// Unregister the listener; false if it was already gone
    pub fn remove(&self) -> bool {
        self.set.upgrade().map(|set| set.remove(self.id)).unwrap_or(false)
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet").field("listeners", &self.len()).finish()
    }
}

enum Message {
    Event(LocatorEvent),
    Flush(oneshot::Sender<()>),
}

struct Worker {
    sender: mpsc::UnboundedSender<Message>,
    thread: JoinHandle<()>,
}

/// Fans events out to the registered listeners
pub struct EventDispatcher {
    mode: DispatchMode,
    listeners: Arc<ListenerSet>,
    worker: Mutex<Option<Worker>>,
    worker_thread: Option<ThreadId>,
}

impl EventDispatcher {
    /// Create a new dispatcher, starting the worker thread in background mode
    pub fn new(mode: DispatchMode) -> Result<Self, CoreError> {
        let listeners = Arc::new(ListenerSet::default());
        let (worker, worker_thread) = match mode {
            DispatchMode::Synchronous => (None, None),
            DispatchMode::Background => {
                let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();
                let delivery = listeners.clone();
                let thread = thread::Builder::new()
                    .name("warden-events".to_string())
                    .spawn(move || {
                        while let Some(message) = receiver.blocking_recv() {
                            match message {
                                Message::Event(event) => delivery.deliver(&event),
                                Message::Flush(done) => {
                                    let _ = done.send(());
                                }
                            }
                        }
                        tracing::debug!("Event worker stopped");
                    })?;
                let id = thread.thread().id();
                (Some(Worker { sender, thread }), Some(id))
            }
        };

        Ok(Self {
            mode,
            listeners,
            worker: Mutex::new(worker),
            worker_thread,
        })
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener; it stays registered while something else owns it
    pub fn subscribe(&self, listener: &Arc<dyn LocatorListener>) -> ListenerRegistration {
        let id = self.listeners.add(Arc::downgrade(listener));
        ListenerRegistration {
            id,
            set: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of listeners still alive
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver an event according to the dispatch mode
    pub fn dispatch(&self, event: LocatorEvent) {
        match self.mode {
            DispatchMode::Synchronous => self.listeners.deliver(&event),
            DispatchMode::Background => {
                let worker = self.worker();
                match worker.as_ref() {
                    Some(worker) => {
                        if worker.sender.send(Message::Event(event)).is_err() {
                            tracing::warn!("Event worker is gone, event dropped");
                        }
                    }
                    None => tracing::debug!("Dispatcher stopped, dropping {:?}", event.kind),
                }
            }
        }
    }

    /// Wait until every event dispatched so far has been delivered
    ///
    /// Blocks the calling thread; must not be called from async code.
    pub fn flush(&self) {
        if self.is_worker_thread() {
            return;
        }
        let receiver = {
            let worker = self.worker();
            let Some(worker) = worker.as_ref() else {
                return;
            };
            let (done, receiver) = oneshot::channel();
            if worker.sender.send(Message::Flush(done)).is_err() {
                return;
            }
            receiver
        };
        let _ = receiver.blocking_recv();
    }

    fn is_worker_thread(&self) -> bool {
        self.worker_thread == Some(thread::current().id())
    }

    /// Deliver what is queued and stop the worker thread
    pub fn shutdown(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };
        let Worker { sender, thread } = worker;
        drop(sender);
        if self.is_worker_thread() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("Event worker thread panicked");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("mode", &self.mode)
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        events: Mutex<Vec<LocatorEventKind>>,
        limit: Option<usize>,
    }

    impl LocatorListener for Collector {
        fn on_event(&self, event: &LocatorEvent) -> bool {
            let mut events = self.events.lock().unwrap();
            events.push(event.kind.clone());
            self.limit.map(|limit| events.len() < limit).unwrap_or(true)
        }
    }

    struct Exploding;

    impl LocatorListener for Exploding {
        fn on_event(&self, _event: &LocatorEvent) -> bool {
            panic!("listener failure")
        }
    }

    fn added(implementation: &str) -> LocatorEvent {
        LocatorEvent::new(
            "test",
            LocatorEventKind::DescriptorAdded(Descriptor::builder(implementation).build()),
        )
    }

    #[test]
    fn test_synchronous_delivery_survives_panicking_listeners() {
        let dispatcher = EventDispatcher::new(DispatchMode::Synchronous).unwrap();
        let exploding: Arc<dyn LocatorListener> = Arc::new(Exploding);
        let collector = Arc::new(Collector::default());
        let listener: Arc<dyn LocatorListener> = collector.clone();
        let _first = dispatcher.subscribe(&exploding);
        let _second = dispatcher.subscribe(&listener);

        dispatcher.dispatch(added("app::A"));
        assert_eq!(collector.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_returning_false_is_dropped() {
        let dispatcher = EventDispatcher::new(DispatchMode::Synchronous).unwrap();
        let collector = Arc::new(Collector {
            limit: Some(1),
            ..Collector::default()
        });
        let listener: Arc<dyn LocatorListener> = collector.clone();
        let _registration = dispatcher.subscribe(&listener);

        dispatcher.dispatch(added("app::A"));
        dispatcher.dispatch(added("app::B"));
        assert_eq!(collector.events.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_dropped_and_removed_listeners_stop_receiving() {
        let dispatcher = EventDispatcher::new(DispatchMode::Synchronous).unwrap();
        let collector = Arc::new(Collector::default());
        let listener: Arc<dyn LocatorListener> = collector.clone();
        let registration = dispatcher.subscribe(&listener);
        let transient: Arc<dyn LocatorListener> = Arc::new(Collector::default());
        let _transient = dispatcher.subscribe(&transient);
        drop(transient);
        assert_eq!(dispatcher.listener_count(), 1);

        assert!(registration.remove());
        assert!(!registration.remove());
        dispatcher.dispatch(added("app::A"));
        assert!(collector.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_background_delivery_in_order() {
        let dispatcher = EventDispatcher::new(DispatchMode::Background).unwrap();
        let collector = Arc::new(Collector::default());
        let listener: Arc<dyn LocatorListener> = collector.clone();
        let _registration = dispatcher.subscribe(&listener);

        for name in ["app::A", "app::B", "app::C"] {
            dispatcher.dispatch(added(name));
        }
        dispatcher.flush();

        let events = collector.events.lock().unwrap();
        let names: Vec<&str> = events
            .iter()
            .map(|kind| match kind {
                LocatorEventKind::DescriptorAdded(descriptor) => descriptor.implementation(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["app::A", "app::B", "app::C"]);
        drop(events);
        dispatcher.shutdown();
        dispatcher.dispatch(added("app::D"));
        assert_eq!(collector.events.lock().unwrap().len(), 3);
    }
}
