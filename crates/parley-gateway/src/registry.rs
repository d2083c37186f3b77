use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::events::WsEvent;

/// Sweep interval for detecting channels whose transport dropped without the
/// registry being told.
pub const PRUNE_INTERVAL: Duration = Duration::from_millis(50);

/// Close code used when the server force-disconnects a channel (session
/// revoked, account deleted).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// What a connection's write task pulls off its queue: ordinary events, or a
/// final close instruction.
#[derive(Debug)]
pub enum OutboundFrame {
    Event(WsEvent),
    Close { code: u16, reason: String },
}

/// One live channel: a device or tab connected under a (username, token)
/// pair. Holds the sending half of the connection's outbound queue; the
/// receiving half lives in the connection's write task, so a closed sender
/// means the transport is gone.
#[derive(Clone)]
pub struct ClientHandle {
    id: Uuid,
    connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ClientHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue an event. Returns false if the channel is already gone.
    pub fn send(&self, event: WsEvent) -> bool {
        self.tx.send(OutboundFrame::Event(event)).is_ok()
    }

    /// Queue a close frame. Idempotent: closing an already-closed channel is
    /// a no-op.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(OutboundFrame::Close {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Tracks every open channel, grouped by username and then by the session
/// token that authenticated it. In-memory only: rebuilt empty on restart,
/// which matches the transport connections not surviving one either.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// username -> token -> channels open under that token
    clients: RwLock<HashMap<String, HashMap<String, Vec<ClientHandle>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                clients: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Add a channel for an already-authenticated (username, token) pair.
    /// Infallible by construction. Returns the handle and the receiving half
    /// of its outbound queue.
    pub async fn register(
        &self,
        username: &str,
        token: &str,
    ) -> (ClientHandle, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ClientHandle {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            tx,
        };

        let mut clients = self.inner.clients.write().await;
        clients
            .entry(username.to_string())
            .or_default()
            .entry(token.to_string())
            .or_default()
            .push(handle.clone());

        (handle, rx)
    }

    /// Remove one channel explicitly (normal connection teardown). Channels
    /// that vanish without this call are collected by `prune`.
    pub async fn deregister(&self, username: &str, token: &str, id: Uuid) {
        let mut clients = self.inner.clients.write().await;
        if let Some(tokens) = clients.get_mut(username) {
            if let Some(handles) = tokens.get_mut(token) {
                handles.retain(|h| h.id != id);
                if handles.is_empty() {
                    tokens.remove(token);
                }
            }
            if tokens.is_empty() {
                clients.remove(username);
            }
        }
    }

    /// Best-effort fan-out to every channel the user currently has open,
    /// across all tokens. Iterates a snapshot so a concurrent prune cannot
    /// invalidate the walk; a dead channel is logged and skipped, never
    /// blocking delivery to the rest. Zero open channels is a silent no-op.
    pub async fn broadcast(&self, username: &str, event: WsEvent) {
        let handles: Vec<ClientHandle> = {
            let clients = self.inner.clients.read().await;
            match clients.get(username) {
                Some(tokens) => tokens.values().flatten().cloned().collect(),
                None => return,
            }
        };

        for handle in handles {
            if !handle.send(event.clone()) {
                warn!(
                    "Could not broadcast '{}' to a dropped channel of user '{}'",
                    event.message, username
                );
            }
        }
    }

    /// Send a final event, then force-close every channel registered under
    /// exactly this (username, token) pair. Channels under the user's other
    /// tokens are untouched.
    pub async fn disconnect_by_token(&self, username: &str, token: &str, event: WsEvent) {
        let handles = {
            let mut clients = self.inner.clients.write().await;
            let Some(tokens) = clients.get_mut(username) else {
                return;
            };
            let handles = tokens.remove(token).unwrap_or_default();
            if tokens.is_empty() {
                clients.remove(username);
            }
            handles
        };

        debug!(
            "Disconnecting {} channel(s) of user '{}' for revoked token",
            handles.len(),
            username
        );
        for handle in handles {
            handle.send(event.clone());
            handle.close(CLOSE_POLICY_VIOLATION, &event.message);
        }
    }

    /// `disconnect_by_token` for every token the user has open. Used when the
    /// account itself is deleted.
    pub async fn disconnect_all(&self, username: &str, event: WsEvent) {
        let tokens: Vec<String> = {
            let clients = self.inner.clients.read().await;
            match clients.get(username) {
                Some(tokens) => tokens.keys().cloned().collect(),
                None => return,
            }
        };

        for token in tokens {
            self.disconnect_by_token(username, &token, event.clone()).await;
        }
    }

    /// Drop channels whose transport already went away without a deregister.
    /// Without this, broadcast would keep attempting sends to dead channels
    /// and per-user channel counts would grow unboundedly.
    pub async fn prune(&self) {
        let mut clients = self.inner.clients.write().await;
        for tokens in clients.values_mut() {
            for handles in tokens.values_mut() {
                handles.retain(|h| !h.is_closed());
            }
            tokens.retain(|_, handles| !handles.is_empty());
        }
        clients.retain(|_, tokens| !tokens.is_empty());
    }

    /// Spawn the recurring prune sweep. Runs until the returned handle is
    /// aborted or the runtime shuts down.
    pub fn spawn_pruner(&self) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                registry.prune().await;
            }
        })
    }

    /// Number of live channels currently registered for a user.
    pub async fn channel_count(&self, username: &str) -> usize {
        let clients = self.inner.clients.read().await;
        clients
            .get(username)
            .map(|tokens| tokens.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::events::{AUTH_REVOKED, MESSAGE_RECEIVED};

    fn event(name: &str) -> WsEvent {
        WsEvent::empty(name)
    }

    #[tokio::test]
    async fn broadcast_reaches_all_channels_across_tokens() {
        let registry = Registry::new();
        let (_h1, mut rx1) = registry.register("alice", "token-a").await;
        let (_h2, mut rx2) = registry.register("alice", "token-a").await;
        let (_h3, mut rx3) = registry.register("alice", "token-b").await;
        let (_h4, mut rx4) = registry.register("bob", "token-c").await;

        registry.broadcast("alice", event(MESSAGE_RECEIVED)).await;

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            match rx.recv().await.unwrap() {
                OutboundFrame::Event(ev) => assert_eq!(ev.message, MESSAGE_RECEIVED),
                other => panic!("expected event, got {:?}", other),
            }
        }
        assert!(rx4.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_absent_user_is_a_noop() {
        let registry = Registry::new();
        registry.broadcast("nobody", event(MESSAGE_RECEIVED)).await;
    }

    #[tokio::test]
    async fn one_dead_channel_does_not_block_the_rest() {
        let registry = Registry::new();
        let (_h1, rx1) = registry.register("alice", "token-a").await;
        let (_h2, mut rx2) = registry.register("alice", "token-a").await;
        drop(rx1);

        registry.broadcast("alice", event(MESSAGE_RECEIVED)).await;
        assert!(matches!(
            rx2.recv().await.unwrap(),
            OutboundFrame::Event(_)
        ));
    }

    #[tokio::test]
    async fn disconnect_by_token_targets_exactly_one_token() {
        let registry = Registry::new();
        let (_h1, mut revoked_rx) = registry.register("alice", "token-a").await;
        let (_h2, mut kept_rx) = registry.register("alice", "token-b").await;
        let (_h3, mut other_rx) = registry.register("bob", "token-a").await;

        registry
            .disconnect_by_token("alice", "token-a", event(AUTH_REVOKED))
            .await;

        // Revoked channel gets the final event, then the close frame
        match revoked_rx.recv().await.unwrap() {
            OutboundFrame::Event(ev) => assert_eq!(ev.message, AUTH_REVOKED),
            other => panic!("expected event, got {:?}", other),
        }
        match revoked_rx.recv().await.unwrap() {
            OutboundFrame::Close { code, .. } => assert_eq!(code, CLOSE_POLICY_VIOLATION),
            other => panic!("expected close, got {:?}", other),
        }

        // Other token and other user untouched
        assert!(kept_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
        assert_eq!(registry.channel_count("alice").await, 1);
    }

    #[tokio::test]
    async fn disconnect_all_closes_every_token() {
        let registry = Registry::new();
        let (_h1, mut rx1) = registry.register("alice", "token-a").await;
        let (_h2, mut rx2) = registry.register("alice", "token-b").await;

        registry.disconnect_all("alice", event(AUTH_REVOKED)).await;

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(rx.recv().await.unwrap(), OutboundFrame::Event(_)));
            assert!(matches!(
                rx.recv().await.unwrap(),
                OutboundFrame::Close { .. }
            ));
        }
        assert_eq!(registry.channel_count("alice").await, 0);
    }

    #[tokio::test]
    async fn prune_collects_silently_dropped_channels() {
        let registry = Registry::new();
        let (_h1, rx1) = registry.register("alice", "token-a").await;
        let (_h2, _rx2) = registry.register("alice", "token-a").await;
        assert_eq!(registry.channel_count("alice").await, 2);

        drop(rx1);
        registry.prune().await;
        assert_eq!(registry.channel_count("alice").await, 1);
    }

    #[tokio::test]
    async fn deregister_removes_only_the_named_channel() {
        let registry = Registry::new();
        let (h1, _rx1) = registry.register("alice", "token-a").await;
        let (_h2, _rx2) = registry.register("alice", "token-a").await;

        registry.deregister("alice", "token-a", h1.id()).await;
        assert_eq!(registry.channel_count("alice").await, 1);
    }
}
