//! The cluster coordinator.
//!
//! Wraps a process-local [`RoomManager`] and turns its operations into
//! envelopes on a shared channel. Local delivery happens when this
//! process's own listener receives the envelope back, so the publisher
//! and every other process apply an emit through the same path.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use ripple_core::{AckCallback, EmitOptions, RoomManager};

use crate::backend::{Backend, BackendError, Subscription};
use crate::envelope::{AckRef, Envelope};

/// Initial delay before a broken subscription is reopened.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for the reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Coordinator errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A callback-carrying emit did not address a single session's room.
    #[error("Callbacks require a room addressing a single session")]
    CallbackRequiresRoom,

    /// The backend rejected an operation that cannot be recovered
    /// locally, such as the initial subscription.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Keeps one process's [`RoomManager`] consistent with its peers through
/// a shared pub/sub backend.
pub struct ClusterCoordinator {
    manager: Arc<RoomManager>,
    backend: Arc<dyn Backend>,
    host_id: String,
    shutdown: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterCoordinator {
    /// Create a coordinator over a local manager and a backend handle.
    #[must_use]
    pub fn new(manager: Arc<RoomManager>, backend: Arc<dyn Backend>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            manager,
            backend,
            host_id: Uuid::new_v4().simple().to_string(),
            shutdown,
            listener: Mutex::new(None),
        }
    }

    /// The wrapped process-local manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.manager
    }

    /// This process's random host id, used to scope callback replies.
    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Subscribe to the shared channel and spawn the listener loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial subscription cannot be opened.
    pub async fn start(&self) -> Result<(), ClusterError> {
        let subscription = self.backend.subscribe().await?;
        let task = ListenerTask {
            manager: Arc::clone(&self.manager),
            backend: Arc::clone(&self.backend),
            host_id: self.host_id.clone(),
        };
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(task.run(subscription, shutdown));
        *self.listener.lock().unwrap() = Some(handle);
        info!(
            backend = self.backend.name(),
            channel = %self.backend.channel(),
            host = %self.host_id,
            "Cluster coordinator started"
        );
        Ok(())
    }

    /// Signal the listener loop to stop and wait for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.listener.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!(host = %self.host_id, "Cluster coordinator stopped");
    }

    /// Emit an event cluster-wide.
    ///
    /// The envelope is published and applied by every process's listener,
    /// including this one; there is no direct local fan-out on this path.
    /// With `ignore_queue` the publish round-trip is skipped entirely and
    /// the local manager delivers directly, for callers that already know
    /// every eligible session is colocated here.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::CallbackRequiresRoom`] when a callback is
    /// supplied without a room addressing a single session.
    pub async fn emit(
        &self,
        event: &str,
        data: &Value,
        namespace: &str,
        options: EmitOptions,
        ignore_queue: bool,
    ) -> Result<(), ClusterError> {
        if ignore_queue {
            self.manager.emit(event, data, namespace, options);
            return Ok(());
        }

        let callback = match options.callback {
            Some(callback) => {
                let Some(room) = options.room.as_deref() else {
                    return Err(ClusterError::CallbackRequiresRoom);
                };
                // The callback stays local; only its coordinates travel.
                let id = self.manager.generate_ack_id(room, namespace, callback);
                Some(AckRef {
                    sid: room.to_string(),
                    namespace: namespace.to_string(),
                    id,
                })
            }
            None => None,
        };

        let envelope = Envelope::Emit {
            event: event.to_string(),
            data: data.clone(),
            namespace: namespace.to_string(),
            room: options.room,
            skip_sid: options.skip_sid,
            callback,
            host_id: self.host_id.clone(),
        };
        publish_with_retry(self.backend.as_ref(), &envelope).await;
        Ok(())
    }

    /// Disconnect a session wherever in the cluster it is connected.
    /// With `ignore_queue` the local manager is updated directly.
    pub async fn disconnect(&self, sid: &str, namespace: &str, ignore_queue: bool) {
        if ignore_queue {
            self.manager.disconnect(sid, namespace);
            return;
        }
        let envelope = Envelope::Disconnect {
            sid: sid.to_string(),
            namespace: namespace.to_string(),
            host_id: self.host_id.clone(),
        };
        publish_with_retry(self.backend.as_ref(), &envelope).await;
    }

    /// Close a room on every process.
    pub async fn close_room(&self, room: &str, namespace: &str) {
        let envelope = Envelope::CloseRoom {
            room: room.to_string(),
            namespace: namespace.to_string(),
            host_id: self.host_id.clone(),
        };
        publish_with_retry(self.backend.as_ref(), &envelope).await;
    }
}

/// Publish with a single retry; a second failure drops the message.
async fn publish_with_retry(backend: &dyn Backend, envelope: &Envelope) {
    let payload = match envelope.encode() {
        Ok(payload) => payload,
        Err(e) => {
            error!(method = envelope.method(), error = %e, "Envelope encoding failed");
            return;
        }
    };
    if let Err(first) = backend.publish(payload.clone()).await {
        warn!(method = envelope.method(), error = %first, "Publish failed, retrying");
        if let Err(second) = backend.publish(payload).await {
            error!(
                method = envelope.method(),
                error = %second,
                "Publish failed twice, dropping message"
            );
        }
    }
}

/// The per-process listener: drains the subscription and applies every
/// envelope to the local manager.
struct ListenerTask {
    manager: Arc<RoomManager>,
    backend: Arc<dyn Backend>,
    host_id: String,
}

impl ListenerTask {
    /// Drain the subscription until shutdown, reopening it with
    /// exponential backoff after a connection loss.
    async fn run(self, mut subscription: Box<dyn Subscription>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(host = %self.host_id, "Listener stopping");
                    return;
                }
                received = subscription.next() => {
                    match received {
                        Ok(payload) => {
                            backoff = INITIAL_BACKOFF;
                            self.dispatch(&payload);
                        }
                        Err(e) => {
                            warn!(error = %e, "Subscription lost, reconnecting");
                            match self.resubscribe(&mut shutdown, &mut backoff).await {
                                Some(fresh) => subscription = fresh,
                                None => return,
                            }
                        }
                    }
                }
            }
        }
    }

    /// Reopen the subscription, sleeping `backoff` before each attempt
    /// and doubling it up to [`MAX_BACKOFF`]. Returns `None` on shutdown.
    async fn resubscribe(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Duration,
    ) -> Option<Box<dyn Subscription>> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return None,
                () = tokio::time::sleep(*backoff) => {}
            }
            *backoff = (*backoff * 2).min(MAX_BACKOFF);
            match self.backend.subscribe().await {
                Ok(subscription) => return Some(subscription),
                Err(e) => warn!(error = %e, "Resubscribe failed"),
            }
        }
    }

    /// Apply one raw message from the shared channel. Malformed payloads
    /// are dropped; they never take the listener down.
    fn dispatch(&self, payload: &[u8]) {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed cluster message");
                return;
            }
        };
        trace!(method = envelope.method(), origin = %envelope.host_id(), "Cluster message");
        match envelope {
            Envelope::Emit {
                event,
                data,
                namespace,
                room,
                skip_sid,
                callback,
                host_id,
            } => self.apply_emit(&event, &data, &namespace, room, skip_sid, callback, &host_id),
            Envelope::Disconnect { sid, namespace, .. } => {
                self.manager.disconnect(&sid, &namespace);
            }
            Envelope::CloseRoom { room, namespace, .. } => {
                self.manager.close_room(&namespace, &room);
            }
            Envelope::Callback {
                host_id,
                sid,
                namespace,
                id,
                args,
            } => {
                // Every process sees every reply; only the origin acts.
                if host_id == self.host_id {
                    self.manager.trigger_callback(&sid, &namespace, id, args);
                }
            }
        }
    }

    /// Fan a received emit out to the local participants. A callback
    /// reference is rewired so that a client acknowledgement finds its
    /// way back to the publishing process.
    #[allow(clippy::too_many_arguments)]
    fn apply_emit(
        &self,
        event: &str,
        data: &Value,
        namespace: &str,
        room: Option<String>,
        skip_sid: Option<String>,
        callback: Option<AckRef>,
        origin: &str,
    ) {
        let callback: Option<AckCallback> = callback.map(|ack| {
            let manager = Arc::clone(&self.manager);
            let backend = Arc::clone(&self.backend);
            let host_id = self.host_id.clone();
            let origin = origin.to_string();
            Arc::new(move |args: Value| {
                if origin == host_id {
                    // The publisher is this process; no round-trip needed.
                    manager.trigger_callback(&ack.sid, &ack.namespace, ack.id, args);
                    return;
                }
                let envelope = Envelope::Callback {
                    host_id: origin.clone(),
                    sid: ack.sid.clone(),
                    namespace: ack.namespace.clone(),
                    id: ack.id,
                    args,
                };
                let backend = Arc::clone(&backend);
                tokio::spawn(async move {
                    publish_with_retry(backend.as_ref(), &envelope).await;
                });
            }) as AckCallback
        });
        let options = EmitOptions {
            room,
            skip_sid,
            callback,
        };
        self.manager.emit(event, data, namespace, options);
    }
}
