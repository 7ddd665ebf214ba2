//! Broadcast hub: bounded history plus fan-out to every subscriber.

use std::collections::VecDeque;

use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::message::ChatMessage;

/// Replay window served to newly-connected subscribers.
pub const HISTORY_CAPACITY: usize = 50;

/// Size of the broadcast channel for relayed messages.
const EVENT_BUFFER_SIZE: usize = 256;

struct HubInner {
    history: VecDeque<ChatMessage>,
    tx: broadcast::Sender<String>,
}

/// Fan-out sink fed by every source adapter.
///
/// Messages are serialized once and relayed to all live subscribers; a
/// subscriber that lags past the channel buffer drops messages rather than
/// slowing the hub down. History and subscription share one lock so a new
/// subscriber sees each message exactly once: either in the replay snapshot
/// or live, never both.
pub struct ChatHub {
    inner: Mutex<HubInner>,
}

impl ChatHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            inner: Mutex::new(HubInner {
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
                tx,
            }),
        }
    }

    /// Append to history (evicting the oldest past capacity) and relay to
    /// current subscribers. Never blocks on or fails because of a
    /// subscriber.
    pub async fn post(&self, message: ChatMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!("hub: failed to serialize message: {e}");
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.history.len() == HISTORY_CAPACITY {
            inner.history.pop_front();
        }
        inner.history.push_back(message);
        // Err here just means nobody is connected right now.
        let _ = inner.tx.send(json);
    }

    /// Snapshot the current history and register a live receiver, atomically
    /// with respect to `post`.
    pub async fn subscribe(&self) -> (Vec<ChatMessage>, broadcast::Receiver<String>) {
        let inner = self.inner.lock().await;
        let history = inner.history.iter().cloned().collect();
        (history, inner.tx.subscribe())
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Platform;

    fn message(n: usize) -> ChatMessage {
        ChatMessage {
            platform: Platform::Twitch,
            user: format!("user{n}"),
            text: format!("msg{n}"),
            color: "#9146FF".to_string(),
            badges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn history_never_exceeds_capacity() {
        let hub = ChatHub::new();
        for n in 0..=HISTORY_CAPACITY {
            hub.post(message(n)).await;
        }

        let (history, _rx) = hub.subscribe().await;
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // message(0) was evicted; the rest arrive in posting order.
        assert_eq!(history[0].user, "user1");
        assert_eq!(history[HISTORY_CAPACITY - 1].user, format!("user{HISTORY_CAPACITY}"));
    }

    #[tokio::test]
    async fn new_subscriber_gets_exactly_the_posted_history() {
        let hub = ChatHub::new();
        for n in 0..7 {
            hub.post(message(n)).await;
        }

        let (history, mut rx) = hub.subscribe().await;
        assert_eq!(history.len(), 7);
        for (n, msg) in history.iter().enumerate() {
            assert_eq!(msg.user, format!("user{n}"));
        }

        // Nothing live yet: history came through the snapshot only.
        assert!(rx.try_recv().is_err());

        hub.post(message(7)).await;
        let live = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&live).unwrap();
        assert_eq!(value["user"], "user7");
        assert_eq!(value["platform"], "twitch");
    }

    #[tokio::test]
    async fn empty_hub_replays_nothing() {
        let hub = ChatHub::new();
        let (history, _rx) = hub.subscribe().await;
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn posting_without_subscribers_is_fine() {
        let hub = ChatHub::new();
        hub.post(message(0)).await;
        let (history, _rx) = hub.subscribe().await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_message() {
        let hub = ChatHub::new();
        let (_, mut rx_a) = hub.subscribe().await;
        let (_, mut rx_b) = hub.subscribe().await;

        hub.post(message(0)).await;

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a, b);
    }
}
