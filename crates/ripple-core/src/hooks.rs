//! Instrumentation hook points.
//!
//! Observers register against named extension points instead of rebinding
//! manager methods at runtime. All hooks have empty default bodies so an
//! observer implements only what it cares about.

use std::sync::{Arc, Mutex};

/// Extension points raised by the room manager.
pub trait EventObserver: Send + Sync {
    /// A session registered with a namespace.
    fn on_connect(&self, _sid: &str, _namespace: &str) {}

    /// A session left a namespace.
    fn on_disconnect(&self, _sid: &str, _namespace: &str) {}

    /// An emit is about to fan out.
    fn pre_emit(&self, _event: &str, _namespace: &str, _room: Option<&str>) {}

    /// An emit finished fanning out to `delivered` sessions.
    fn post_emit(&self, _event: &str, _namespace: &str, _room: Option<&str>, _delivered: usize) {}
}

/// The set of registered observers.
#[derive(Default)]
pub(crate) struct Observers {
    inner: Mutex<Vec<Arc<dyn EventObserver>>>,
}

impl Observers {
    pub(crate) fn register(&self, observer: Arc<dyn EventObserver>) {
        self.inner.lock().unwrap().push(observer);
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventObserver>> {
        self.inner.lock().unwrap().clone()
    }

    pub(crate) fn connected(&self, sid: &str, namespace: &str) {
        for observer in self.snapshot() {
            observer.on_connect(sid, namespace);
        }
    }

    pub(crate) fn disconnected(&self, sid: &str, namespace: &str) {
        for observer in self.snapshot() {
            observer.on_disconnect(sid, namespace);
        }
    }

    pub(crate) fn pre_emit(&self, event: &str, namespace: &str, room: Option<&str>) {
        for observer in self.snapshot() {
            observer.pre_emit(event, namespace, room);
        }
    }

    pub(crate) fn post_emit(
        &self,
        event: &str,
        namespace: &str,
        room: Option<&str>,
        delivered: usize,
    ) {
        for observer in self.snapshot() {
            observer.post_emit(event, namespace, room, delivered);
        }
    }
}
