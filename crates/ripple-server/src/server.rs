//! The server façade.
//!
//! Owns exactly one room manager - standalone, or wrapped in a cluster
//! coordinator - and forwards connect/disconnect/emit requests into it.
//! Delivery comes back out through the session outboxes in
//! [`SessionRegistry`](crate::session::SessionRegistry).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use ripple_cluster::{Backend, ClusterCoordinator, ClusterError};
use ripple_core::{Delivery, EmitOptions, EventObserver, RoomManager};
use ripple_history::{HistoryEntry, HistoryError, HistoryQuery, HistoryStats};

use crate::config::Config;
use crate::metrics::MetricsObserver;
use crate::session::{OutboundEvent, SessionRegistry};

/// Closes a session's outbox when the core tears the session down,
/// no matter which process initiated the disconnect.
struct OutboxCloser {
    sessions: Arc<SessionRegistry>,
}

impl EventObserver for OutboxCloser {
    fn on_disconnect(&self, sid: &str, namespace: &str) {
        self.sessions.close(sid, namespace);
    }
}

/// The server-facing façade over one room manager.
pub struct Server {
    config: Config,
    sessions: Arc<SessionRegistry>,
    manager: Arc<RoomManager>,
    coordinator: Option<ClusterCoordinator>,
}

impl Server {
    /// A single-process server.
    #[must_use]
    pub fn standalone(config: Config) -> Self {
        let (sessions, manager) = build_core(&config);
        info!("Server started (standalone)");
        Self {
            config,
            sessions,
            manager,
            coordinator: None,
        }
    }

    /// A server coordinating with peers over a shared backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend subscription cannot be opened.
    pub async fn clustered(config: Config, backend: Arc<dyn Backend>) -> Result<Self, ClusterError> {
        let (sessions, manager) = build_core(&config);
        let coordinator = ClusterCoordinator::new(Arc::clone(&manager), backend);
        coordinator.start().await?;
        Ok(Self {
            config,
            sessions,
            manager,
            coordinator: Some(coordinator),
        })
    }

    /// The underlying room manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.manager
    }

    /// Register a session and open its outbox. The transport layer owns
    /// the receiving end.
    pub fn connect(&self, sid: &str, namespace: &str) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let outbox = self.sessions.open(sid, namespace);
        self.manager.connect(sid, namespace);
        outbox
    }

    /// Whether a session is connected to this process.
    #[must_use]
    pub fn is_connected(&self, sid: &str, namespace: &str) -> bool {
        self.manager.is_connected(sid, namespace)
    }

    /// Disconnect a session. On a clustered server a locally connected
    /// session is torn down directly; anything else goes through the
    /// shared channel so the owning process applies it.
    pub async fn disconnect(&self, sid: &str, namespace: &str) {
        match &self.coordinator {
            Some(coordinator) => {
                let local = self.manager.is_connected(sid, namespace);
                coordinator.disconnect(sid, namespace, local).await;
            }
            None => self.manager.disconnect(sid, namespace),
        }
    }

    /// Emit an event. `ignore_queue` skips the cluster round-trip for
    /// callers that know every eligible session is local; a standalone
    /// server always delivers locally.
    ///
    /// # Errors
    ///
    /// Returns an error for a callback-carrying emit without a room.
    pub async fn emit(
        &self,
        event: &str,
        data: &Value,
        namespace: &str,
        options: EmitOptions,
        ignore_queue: bool,
    ) -> Result<(), ClusterError> {
        match &self.coordinator {
            Some(coordinator) => {
                coordinator
                    .emit(event, data, namespace, options, ignore_queue)
                    .await
            }
            None => {
                self.manager.emit(event, data, namespace, options);
                Ok(())
            }
        }
    }

    /// Forward a client acknowledgement into the callback registry.
    pub fn ack(&self, sid: &str, namespace: &str, id: u64, args: Value) {
        self.manager.trigger_callback(sid, namespace, id, args);
    }

    /// Add a session to a room.
    pub fn enter_room(&self, sid: &str, namespace: &str, room: &str) {
        self.manager.enter_room(sid, namespace, room);
    }

    /// Remove a session from a room.
    pub fn leave_room(&self, sid: &str, namespace: &str, room: &str) {
        self.manager.leave_room(sid, namespace, room);
    }

    /// Remove every participant from a room, cluster-wide when
    /// coordinated.
    pub async fn close_room(&self, room: &str, namespace: &str) {
        match &self.coordinator {
            Some(coordinator) => coordinator.close_room(room, namespace).await,
            None => self.manager.close_room(namespace, room),
        }
    }

    /// Named rooms a session is a member of.
    #[must_use]
    pub fn rooms(&self, sid: &str, namespace: &str) -> Vec<String> {
        self.manager.get_rooms(sid, namespace)
    }

    /// Enable history for a room with the configured default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured limits are invalid.
    pub fn enable_history(&self, room: &str, namespace: &str) -> Result<(), HistoryError> {
        self.manager
            .history()
            .enable(room, namespace, self.config.history.limits())
    }

    /// Replay a room's history.
    #[must_use]
    pub fn history(&self, room: &str, namespace: &str, query: &HistoryQuery) -> Vec<HistoryEntry> {
        self.manager.history().get(room, namespace, query)
    }

    /// History statistics for a room.
    #[must_use]
    pub fn history_stats(&self, room: &str, namespace: &str) -> HistoryStats {
        self.manager.history().stats(room, namespace)
    }

    /// Stop the cluster listener, if one is running.
    pub async fn shutdown(&self) {
        if let Some(coordinator) = &self.coordinator {
            coordinator.shutdown().await;
        }
    }
}

fn build_core(config: &Config) -> (Arc<SessionRegistry>, Arc<RoomManager>) {
    let sessions = Arc::new(SessionRegistry::new());
    let manager = Arc::new(RoomManager::new(
        Arc::clone(&sessions) as Arc<dyn Delivery>
    ));
    manager.observe(Arc::new(OutboxCloser {
        sessions: Arc::clone(&sessions),
    }));
    if config.metrics.enabled {
        manager.observe(Arc::new(MetricsObserver));
    }
    (sessions, manager)
}
