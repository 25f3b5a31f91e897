//! Namespace and room membership tables.
//!
//! Membership is tracked with an active flag per `(namespace, room, sid)`
//! so that removal never mutates a room while a fan-out is iterating it:
//! `leave` only marks the entry inactive and queues it, and the queued
//! entries are physically purged after the next participant snapshot.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Rooms within one namespace. The `None` key is the distinguished
/// "no room" room holding every session connected to the namespace.
type NamespaceRooms = HashMap<Option<String>, HashMap<String, bool>>;

#[derive(Debug, Default)]
struct Tables {
    namespaces: HashMap<String, NamespaceRooms>,
    pending_removals: Vec<(String, Option<String>, String)>,
}

/// Membership table for all namespaces.
///
/// All operations complete without suspension; a single mutex keeps the
/// purge pass from interleaving with a participant snapshot.
#[derive(Debug, Default)]
pub struct RoomTable {
    inner: Mutex<Tables>,
}

impl RoomTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room, creating namespace and room tables
    /// lazily. Re-entering reactivates an entry pending removal.
    pub fn enter(&self, sid: &str, namespace: &str, room: Option<&str>) {
        let mut tables = self.inner.lock().unwrap();
        tables
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(room.map(String::from))
            .or_default()
            .insert(sid.to_string(), true);
    }

    /// Mark a session as removed from a room and queue it for purging.
    /// Unknown namespaces, rooms, and sids are ignored.
    pub fn leave(&self, sid: &str, namespace: &str, room: Option<&str>) {
        let mut tables = self.inner.lock().unwrap();
        let tables = &mut *tables;
        let entry = tables
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.get_mut(&room.map(String::from)))
            .and_then(|members| members.get_mut(sid));
        if let Some(active) = entry {
            *active = false;
            tables
                .pending_removals
                .push((namespace.to_string(), room.map(String::from), sid.to_string()));
        }
    }

    /// Whether a session holds an active membership in a room.
    #[must_use]
    pub fn is_active(&self, sid: &str, namespace: &str, room: Option<&str>) -> bool {
        let tables = self.inner.lock().unwrap();
        tables
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(&room.map(String::from)))
            .and_then(|members| members.get(sid))
            .copied()
            .unwrap_or(false)
    }

    /// Snapshot the active participants of a room, then run the deferred
    /// purge pass. Unknown namespaces and rooms yield an empty snapshot.
    #[must_use]
    pub fn participants(&self, namespace: &str, room: Option<&str>) -> Vec<String> {
        let mut tables = self.inner.lock().unwrap();
        let snapshot = tables
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(&room.map(String::from)))
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, active)| **active)
                    .map(|(sid, _)| sid.clone())
                    .collect()
            })
            .unwrap_or_default();
        purge(&mut tables);
        snapshot
    }

    /// Named rooms in which the session holds an active membership. The
    /// "no room" entry is excluded.
    #[must_use]
    pub fn rooms_of(&self, sid: &str, namespace: &str) -> Vec<String> {
        let tables = self.inner.lock().unwrap();
        let Some(ns) = tables.namespaces.get(namespace) else {
            return Vec::new();
        };
        ns.iter()
            .filter_map(|(room, members)| match room {
                Some(name) if members.get(sid).copied().unwrap_or(false) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every room the session still appears in, active or not. Used to
    /// tear a session down completely on disconnect.
    #[must_use]
    pub fn rooms_containing(&self, sid: &str, namespace: &str) -> Vec<Option<String>> {
        let tables = self.inner.lock().unwrap();
        let Some(ns) = tables.namespaces.get(namespace) else {
            return Vec::new();
        };
        ns.iter()
            .filter(|(_, members)| members.contains_key(sid))
            .map(|(room, _)| room.clone())
            .collect()
    }

    /// Names of namespaces that currently have a room table.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let tables = self.inner.lock().unwrap();
        tables.namespaces.keys().cloned().collect()
    }
}

/// Drain the pending-removal queue. An entry that was reactivated after
/// being queued is left in place; a room or namespace is deleted only
/// when its last entry is removed here.
fn purge(tables: &mut Tables) {
    let pending = std::mem::take(&mut tables.pending_removals);
    for (namespace, room, sid) in pending {
        let Some(ns) = tables.namespaces.get_mut(&namespace) else {
            continue;
        };
        let Some(members) = ns.get_mut(&room) else {
            continue;
        };
        if members.get(&sid).copied() == Some(false) {
            members.remove(&sid);
            debug!(namespace = %namespace, sid = %sid, "Purged room member");
        }
        if members.is_empty() {
            ns.remove(&room);
        }
        if ns.is_empty() {
            tables.namespaces.remove(&namespace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_participants() {
        let table = RoomTable::new();
        table.enter("123", "/", Some("chat"));
        table.enter("456", "/", Some("chat"));

        let mut sids = table.participants("/", Some("chat"));
        sids.sort();
        assert_eq!(sids, vec!["123", "456"]);
    }

    #[test]
    fn test_leave_is_lazy_then_purged() {
        let table = RoomTable::new();
        table.enter("123", "/", Some("chat"));
        table.leave("123", "/", Some("chat"));

        // Marked inactive immediately.
        assert!(!table.is_active("123", "/", Some("chat")));
        assert_eq!(table.rooms_containing("123", "/"), vec![Some("chat".to_string())]);

        // The snapshot triggers the purge pass.
        assert!(table.participants("/", Some("chat")).is_empty());
        assert!(table.rooms_containing("123", "/").is_empty());
    }

    #[test]
    fn test_leave_unknown_room_is_noop() {
        let table = RoomTable::new();
        table.leave("123", "/", Some("nowhere"));
        table.leave("123", "/none", None);
        assert!(table.namespaces().is_empty());
    }

    #[test]
    fn test_empty_room_and_namespace_deleted_after_purge() {
        let table = RoomTable::new();
        table.enter("123", "/", Some("chat"));
        table.leave("123", "/", Some("chat"));
        assert_eq!(table.namespaces(), vec!["/"]);

        let _ = table.participants("/", Some("chat"));
        assert!(table.namespaces().is_empty());
    }

    #[test]
    fn test_reenter_survives_queued_removal() {
        let table = RoomTable::new();
        table.enter("123", "/", Some("chat"));
        table.leave("123", "/", Some("chat"));
        table.enter("123", "/", Some("chat"));

        assert_eq!(table.participants("/", Some("chat")), vec!["123"]);
        // Still present after the purge pass ran.
        assert!(table.is_active("123", "/", Some("chat")));
    }

    #[test]
    fn test_rooms_of_tracks_active_flags() {
        let table = RoomTable::new();
        table.enter("123", "/", None);
        table.enter("123", "/", Some("a"));
        table.enter("123", "/", Some("b"));
        table.leave("123", "/", Some("a"));

        let mut rooms = table.rooms_of("123", "/");
        rooms.sort();
        assert_eq!(rooms, vec!["b"]);

        let _ = table.participants("/", Some("a"));
        assert_eq!(table.rooms_of("123", "/"), vec!["b"]);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let table = RoomTable::new();
        table.enter("123", "/", Some("chat"));
        table.enter("123", "/admin", Some("chat"));
        table.leave("123", "/", Some("chat"));
        let _ = table.participants("/", Some("chat"));

        assert_eq!(table.participants("/admin", Some("chat")), vec!["123"]);
    }
}
