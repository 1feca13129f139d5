use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

/// Unique identifier for one joined socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// Live sockets by user id. A user may have several (one per device);
/// every one of them receives the user's events.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_subscriber(&self, user_id: &str) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        let subs = guard.entry(user_id.to_string()).or_default();
        subs.push(Subscriber { id: subscriber_id, sender: tx });

        log::debug!("user {} joined ({:?}), {} live session(s)", user_id, subscriber_id, subs.len());
        (subscriber_id, rx)
    }

    /// Must run when a socket closes, or the entry leaks until the next send.
    pub async fn remove_subscriber(&self, user_id: &str, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.get_mut(user_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(user_id);
                log::debug!("user {} has no live sessions", user_id);
            }
        }
    }

    /// Sends a frame to every live socket of `user_id`, pruning dead ones.
    /// Returns how many sockets accepted it.
    pub async fn send_to_user(&self, user_id: &str, frame: &str) -> usize {
        let mut guard = self.inner.write().await;
        let Some(subscribers) = guard.get_mut(user_id) else {
            return 0;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.sender.send(frame.to_string()).is_ok());
        let after = subscribers.len();
        if before != after {
            log::debug!("pruned {} dead session(s) of {}", before - after, user_id);
        }
        if subscribers.is_empty() {
            guard.remove(user_id);
        }
        after
    }

    pub async fn subscriber_count(&self, user_id: &str) -> usize {
        let guard = self.inner.read().await;
        guard.get(user_id).map(|v| v.len()).unwrap_or(0)
    }
}
