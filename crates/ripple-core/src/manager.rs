//! Connection lifecycle and event fan-out.

use std::sync::Arc;

use ripple_history::MessageHistoryStore;
use serde_json::Value;
use tracing::{debug, trace};

use crate::ack::{AckCallback, AckRegistry};
use crate::hooks::{EventObserver, Observers};
use crate::rooms::RoomTable;

/// The façade's "deliver to one session" primitive.
///
/// This is the only way the core reaches a connected client. Errors from
/// the underlying transport are the implementor's concern and must not
/// surface here.
pub trait Delivery: Send + Sync {
    /// Hand one event to one session, with an acknowledgement id when the
    /// emit requested a callback.
    fn deliver(&self, sid: &str, event: &str, data: &Value, namespace: &str, ack_id: Option<u64>);
}

/// Targeting options for an emit.
#[derive(Default)]
pub struct EmitOptions {
    /// Target room. `None` addresses every session in the namespace.
    pub room: Option<String>,
    /// A session to leave out of the fan-out, typically the sender.
    pub skip_sid: Option<String>,
    /// Callback to invoke when a recipient acknowledges the event.
    pub callback: Option<AckCallback>,
}

impl EmitOptions {
    /// Target a single room.
    #[must_use]
    pub fn to_room(room: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            ..Self::default()
        }
    }

    /// Leave one session out of the fan-out.
    #[must_use]
    pub fn skip(mut self, sid: impl Into<String>) -> Self {
        self.skip_sid = Some(sid.into());
        self
    }

    /// Request an acknowledgement.
    #[must_use]
    pub fn with_callback(mut self, callback: AckCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Process-local ground truth for membership and callbacks.
///
/// On connect a session joins the namespace-wide "no room" room and a
/// private room named after its own sid, which is how single-session
/// delivery is addressed.
pub struct RoomManager {
    delivery: Arc<dyn Delivery>,
    rooms: RoomTable,
    acks: AckRegistry,
    history: Arc<MessageHistoryStore>,
    observers: Observers,
}

impl RoomManager {
    /// Create a manager that fans out through `delivery`.
    #[must_use]
    pub fn new(delivery: Arc<dyn Delivery>) -> Self {
        Self {
            delivery,
            rooms: RoomTable::new(),
            acks: AckRegistry::new(),
            history: Arc::new(MessageHistoryStore::new()),
            observers: Observers::default(),
        }
    }

    /// The message history populated by the emit path.
    #[must_use]
    pub fn history(&self) -> &Arc<MessageHistoryStore> {
        &self.history
    }

    /// Register an instrumentation observer.
    pub fn observe(&self, observer: Arc<dyn EventObserver>) {
        self.observers.register(observer);
    }

    /// Register a session with a namespace. Idempotent; hooks fire only
    /// for the first registration.
    pub fn connect(&self, sid: &str, namespace: &str) {
        let already_connected = self.rooms.is_active(sid, namespace, None);
        self.rooms.enter(sid, namespace, None);
        self.rooms.enter(sid, namespace, Some(sid));
        if !already_connected {
            debug!(sid = %sid, namespace = %namespace, "Session connected");
            self.observers.connected(sid, namespace);
        }
    }

    /// Whether the session holds an active connection to the namespace.
    #[must_use]
    pub fn is_connected(&self, sid: &str, namespace: &str) -> bool {
        self.rooms.is_active(sid, namespace, None)
    }

    /// Add a session to a room, creating the room lazily.
    pub fn enter_room(&self, sid: &str, namespace: &str, room: &str) {
        self.rooms.enter(sid, namespace, Some(room));
    }

    /// Remove a session from a room. Never an error, even if the room or
    /// sid is unknown.
    pub fn leave_room(&self, sid: &str, namespace: &str, room: &str) {
        self.rooms.leave(sid, namespace, Some(room));
    }

    /// Tear a session out of a namespace: every room it still appears in,
    /// plus all of its outstanding acknowledgement callbacks. Unknown
    /// sessions are a no-op and do not fire hooks, so a cluster-wide
    /// disconnect can be applied on every process.
    pub fn disconnect(&self, sid: &str, namespace: &str) {
        let rooms = self.rooms.rooms_containing(sid, namespace);
        self.acks.purge(sid, namespace);
        if rooms.is_empty() {
            return;
        }
        for room in rooms {
            self.rooms.leave(sid, namespace, room.as_deref());
        }
        debug!(sid = %sid, namespace = %namespace, "Session disconnected");
        self.observers.disconnected(sid, namespace);
    }

    /// Active participants of a room (the whole namespace for `None`).
    #[must_use]
    pub fn get_participants(&self, namespace: &str, room: Option<&str>) -> Vec<String> {
        self.rooms.participants(namespace, room)
    }

    /// Remove every active participant from a room. A no-op if the room
    /// does not exist. Memberships outside this room are untouched.
    pub fn close_room(&self, namespace: &str, room: &str) {
        for sid in self.rooms.participants(namespace, Some(room)) {
            self.rooms.leave(&sid, namespace, Some(room));
        }
        debug!(namespace = %namespace, room = %room, "Room closed");
    }

    /// Named rooms the session is an active member of.
    #[must_use]
    pub fn get_rooms(&self, sid: &str, namespace: &str) -> Vec<String> {
        self.rooms.rooms_of(sid, namespace)
    }

    /// Active namespace names.
    #[must_use]
    pub fn get_namespaces(&self) -> Vec<String> {
        self.rooms.namespaces()
    }

    /// Allocate an acknowledgement id for `(sid, namespace)` and store the
    /// callback under it.
    pub fn generate_ack_id(&self, sid: &str, namespace: &str, callback: AckCallback) -> u64 {
        self.acks.generate(sid, namespace, callback)
    }

    /// Fire a stored acknowledgement callback exactly once. Unknown ids
    /// are ignored with a warning.
    pub fn trigger_callback(&self, sid: &str, namespace: &str, id: u64, args: Value) {
        self.acks.trigger(sid, namespace, id, args);
    }

    /// Fan an event out to the resolved participants, skipping
    /// `skip_sid`, and record it into the room's history.
    ///
    /// Unknown namespaces and rooms are a no-op. Returns the number of
    /// sessions delivered to. When a callback is supplied, each recipient
    /// gets its own acknowledgement id bound to that callback.
    pub fn emit(&self, event: &str, data: &Value, namespace: &str, options: EmitOptions) -> usize {
        let room = options.room.as_deref();
        self.observers.pre_emit(event, namespace, room);

        let mut delivered = 0;
        for sid in self.rooms.participants(namespace, room) {
            if options.skip_sid.as_deref() == Some(sid.as_str()) {
                continue;
            }
            let ack_id = options
                .callback
                .as_ref()
                .map(|callback| self.acks.generate(&sid, namespace, Arc::clone(callback)));
            trace!(sid = %sid, event = %event, "Delivering event");
            self.delivery.deliver(&sid, event, data, namespace, ack_id);
            delivered += 1;
        }

        // Namespace-wide broadcasts have no room key to file history under.
        if let Some(room) = room {
            self.history.record(event, data, namespace, room);
        }

        self.observers.post_emit(event, namespace, room, delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<(String, String, Value, String, Option<u64>)>>,
    }

    impl Delivery for RecordingDelivery {
        fn deliver(
            &self,
            sid: &str,
            event: &str,
            data: &Value,
            namespace: &str,
            ack_id: Option<u64>,
        ) {
            self.sent.lock().unwrap().push((
                sid.to_string(),
                event.to_string(),
                data.clone(),
                namespace.to_string(),
                ack_id,
            ));
        }
    }

    fn manager() -> (Arc<RecordingDelivery>, RoomManager) {
        let delivery = Arc::new(RecordingDelivery::default());
        let manager = RoomManager::new(delivery.clone() as Arc<dyn Delivery>);
        (delivery, manager)
    }

    #[test]
    fn test_connect_joins_no_room_and_self_room() {
        let (_, manager) = manager();
        manager.connect("123", "/foo");

        assert!(manager.is_connected("123", "/foo"));
        assert_eq!(manager.get_participants("/foo", None), vec!["123"]);
        assert_eq!(manager.get_participants("/foo", Some("123")), vec!["123"]);
    }

    #[test]
    fn test_emit_skips_inactive_members() {
        let (delivery, manager) = manager();
        for sid in ["a", "b", "c"] {
            manager.connect(sid, "/");
            manager.enter_room(sid, "/", "room");
        }
        manager.leave_room("b", "/", "room");

        let delivered = manager.emit("msg", &json!("hi"), "/", EmitOptions::to_room("room"));
        assert_eq!(delivered, 2);

        let mut sids: Vec<_> = delivery
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(sid, ..)| sid.clone())
            .collect();
        sids.sort();
        assert_eq!(sids, vec!["a", "c"]);
    }

    #[test]
    fn test_emit_skip_sid() {
        let (delivery, manager) = manager();
        manager.connect("a", "/");
        manager.connect("b", "/");

        let delivered = manager.emit("msg", &json!(1), "/", EmitOptions::default().skip("a"));
        assert_eq!(delivered, 1);
        assert_eq!(delivery.sent.lock().unwrap()[0].0, "b");
    }

    #[test]
    fn test_emit_unknown_namespace_or_room_is_noop() {
        let (delivery, manager) = manager();
        manager.connect("a", "/");

        assert_eq!(manager.emit("msg", &json!(1), "/none", EmitOptions::default()), 0);
        assert_eq!(
            manager.emit("msg", &json!(1), "/", EmitOptions::to_room("nowhere")),
            0
        );
        assert!(delivery.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_emit_with_callback_assigns_ack_ids() {
        let (delivery, manager) = manager();
        manager.connect("a", "/");
        manager.connect("b", "/");
        manager.enter_room("a", "/", "room");
        manager.enter_room("b", "/", "room");

        let fired = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&fired);
        let callback: AckCallback = Arc::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });

        manager.emit(
            "msg",
            &json!(1),
            "/",
            EmitOptions::to_room("room").with_callback(callback),
        );

        let sent = delivery.sent.lock().unwrap().clone();
        assert!(sent.iter().all(|(.., ack_id)| ack_id.is_some()));

        // Each recipient's ack fires the callback once.
        for (sid, _, _, _, ack_id) in &sent {
            manager.trigger_callback(sid, "/", ack_id.unwrap(), json!(null));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // A duplicate acknowledgement is ignored.
        let (sid, _, _, _, ack_id) = &sent[0];
        manager.trigger_callback(sid, "/", ack_id.unwrap(), json!(null));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect_clears_rooms_and_callbacks() {
        let (_, manager) = manager();
        manager.connect("123", "/");
        manager.enter_room("123", "/", "chat");
        let callback: AckCallback = Arc::new(|_| {});
        manager.generate_ack_id("123", "/", callback);

        manager.disconnect("123", "/");

        assert!(manager.get_rooms("123", "/").is_empty());
        assert!(!manager.is_connected("123", "/"));
        assert_eq!(manager.emit("msg", &json!(1), "/", EmitOptions::default()), 0);
    }

    #[test]
    fn test_close_room_keeps_other_memberships() {
        let (_, manager) = manager();
        for sid in ["a", "b", "c"] {
            manager.connect(sid, "/");
            manager.enter_room(sid, "/", "bar");
        }

        manager.close_room("/", "bar");

        assert!(manager.get_participants("/", Some("bar")).is_empty());
        for sid in ["a", "b", "c"] {
            assert!(manager.is_connected(sid, "/"));
            assert_eq!(manager.get_participants("/", Some(sid)), vec![sid]);
        }
    }

    #[test]
    fn test_close_unknown_room_is_noop() {
        let (_, manager) = manager();
        manager.close_room("/", "nowhere");
    }

    #[test]
    fn test_get_rooms_matches_active_memberships() {
        let (_, manager) = manager();
        manager.connect("123", "/");
        manager.enter_room("123", "/", "a");
        manager.enter_room("123", "/", "b");
        manager.leave_room("123", "/", "a");

        let mut rooms = manager.get_rooms("123", "/");
        rooms.sort();
        assert_eq!(rooms, vec!["123", "b"]);
    }

    #[test]
    fn test_emit_records_room_history() {
        let (_, manager) = manager();
        manager.connect("a", "/");
        manager.enter_room("a", "/", "room");
        manager
            .history()
            .enable("room", "/", ripple_history::HistoryLimits::default())
            .unwrap();

        manager.emit("msg", &json!("hello"), "/", EmitOptions::to_room("room"));

        let entries = manager
            .history()
            .get("room", "/", &ripple_history::HistoryQuery::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "msg");
    }

    #[test]
    fn test_observer_hooks_fire() {
        #[derive(Default)]
        struct Counting {
            connects: AtomicUsize,
            disconnects: AtomicUsize,
            emits: AtomicUsize,
            delivered: AtomicUsize,
        }

        impl EventObserver for Counting {
            fn on_connect(&self, _sid: &str, _namespace: &str) {
                self.connects.fetch_add(1, Ordering::SeqCst);
            }
            fn on_disconnect(&self, _sid: &str, _namespace: &str) {
                self.disconnects.fetch_add(1, Ordering::SeqCst);
            }
            fn pre_emit(&self, _event: &str, _namespace: &str, _room: Option<&str>) {
                self.emits.fetch_add(1, Ordering::SeqCst);
            }
            fn post_emit(
                &self,
                _event: &str,
                _namespace: &str,
                _room: Option<&str>,
                delivered: usize,
            ) {
                self.delivered.fetch_add(delivered, Ordering::SeqCst);
            }
        }

        let (_, manager) = manager();
        let observer = Arc::new(Counting::default());
        manager.observe(observer.clone());

        manager.connect("a", "/");
        manager.emit("msg", &json!(1), "/", EmitOptions::default());
        manager.disconnect("a", "/");

        assert_eq!(observer.connects.load(Ordering::SeqCst), 1);
        assert_eq!(observer.emits.load(Ordering::SeqCst), 1);
        assert_eq!(observer.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);
    }
}
