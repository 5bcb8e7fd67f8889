//! Subscriber registry and fan-out
//!
//! Each subscriber gets its own bounded channel. Publishing waits for
//! room in every subscriber's buffer: dropping topology events would
//! desynchronize the subscriber from the graph, so a slow subscriber
//! back-pressures the writer instead. The only way out is cancelling
//! the subscriber's token (or dropping its `Subscription`).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

use super::Event;

/// Identifier of a registered subscriber
pub type SubscriberId = u64;

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Event>,
    token: CancellationToken,
}

/// Registry of live subscribers
///
/// Owned by the cache and mutated under the same lock as the stores, so
/// registration and publishing are ordered with respect to mutations.
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: SubscriberId,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `capacity` live events
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber
    ///
    /// `replay` is delivered before any event published after this call.
    /// The subscription listens on a child of `token`, so cancelling the
    /// caller's token ends it, and dropping the subscription never
    /// cancels the caller's token.
    pub fn subscribe(&mut self, token: CancellationToken, replay: Vec<Event>) -> Subscription {
        let token = token.child_token();
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id;
        self.next_id += 1;

        self.subscribers.push(Subscriber {
            id,
            tx,
            token: token.clone(),
        });
        debug!(subscriber = id, replay = replay.len(), "subscriber registered");

        Subscription {
            id,
            replay: replay.into(),
            rx,
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
            closed: false,
        }
    }

    /// Remove a subscriber; returns false if it was already gone
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    /// Number of subscribers that are still live
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| !s.token.is_cancelled() && !s.tx.is_closed())
            .count()
    }

    /// Deliver `events`, in order, to every subscriber
    ///
    /// Blocks while a subscriber's buffer is full. Cancelled subscribers
    /// and subscribers whose receiver was dropped are removed.
    pub async fn publish(&mut self, events: &[Event]) {
        if events.is_empty() || self.subscribers.is_empty() {
            return;
        }

        let mut gone = Vec::new();
        for subscriber in &self.subscribers {
            for event in events {
                if !deliver(subscriber, event.clone()).await {
                    gone.push(subscriber.id);
                    break;
                }
            }
        }

        if !gone.is_empty() {
            debug!(subscribers = ?gone, "dropping closed subscribers");
            self.subscribers.retain(|s| !gone.contains(&s.id));
        }
    }
}

async fn deliver(subscriber: &Subscriber, event: Event) -> bool {
    if subscriber.token.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = subscriber.token.cancelled() => false,
        sent = subscriber.tx.send(event) => sent.is_ok(),
    }
}

/// Read side of a subscription
///
/// Yields the replayed state first, then live events. Once the token is
/// cancelled the stream ends immediately, discarding anything buffered.
pub struct Subscription {
    id: SubscriberId,
    replay: VecDeque<Event>,
    rx: mpsc::Receiver<Event>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    closed: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Token controlling this subscription (a child of the caller's)
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the subscription
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Receive the next event, or `None` once the subscription is over
    pub async fn recv(&mut self) -> Option<Event> {
        futures_util::StreamExt::next(self).await
    }

    /// Take the next event if one is ready without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.closed || self.token.is_cancelled() {
            self.close();
            return None;
        }
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        self.rx.try_recv().ok()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.replay.clear();
            self.rx.close();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        if this.token.is_cancelled() || this.cancelled.as_mut().poll(cx).is_ready() {
            this.close();
            return Poll::Ready(None);
        }
        if let Some(event) = this.replay.pop_front() {
            return Poll::Ready(Some(event));
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(None) => {
                this.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Change, Layer};
    use crate::models::NotePath;
    use std::time::Duration;

    fn note_event(path: &str) -> Event {
        Event::new(
            Layer::Persisted,
            Change::create_note(&NotePath::from(path), false),
        )
    }

    #[tokio::test]
    async fn test_replay_then_live() {
        let mut bus = EventBus::new(8);
        let mut sub = bus.subscribe(CancellationToken::new(), vec![note_event("old.md")]);

        bus.publish(&[note_event("new.md")]).await;

        assert_eq!(sub.recv().await, Some(note_event("old.md")));
        assert_eq!(sub.recv().await, Some(note_event("new.md")));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_fan_out_preserves_order() {
        let mut bus = EventBus::new(8);
        let mut first = bus.subscribe(CancellationToken::new(), vec![]);
        let mut second = bus.subscribe(CancellationToken::new(), vec![]);

        bus.publish(&[note_event("a.md"), note_event("b.md")]).await;

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await, Some(note_event("a.md")));
            assert_eq!(sub.recv().await, Some(note_event("b.md")));
        }
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_events() {
        let mut bus = EventBus::new(8);
        let token = CancellationToken::new();
        let mut sub = bus.subscribe(token.clone(), vec![note_event("replayed.md")]);

        bus.publish(&[note_event("a.md")]).await;
        token.cancel();

        assert_eq!(sub.recv().await, None);
        assert_eq!(sub.recv().await, None);

        bus.publish(&[note_event("b.md")]).await;
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_removed() {
        let mut bus = EventBus::new(2);
        let sub = bus.subscribe(CancellationToken::new(), vec![]);
        drop(sub);

        bus.publish(&[note_event("a.md")]).await;
        assert!(bus.subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_full_buffer_blocks_until_cancelled() {
        let mut bus = EventBus::new(1);
        let token = CancellationToken::new();
        let _sub = bus.subscribe(token.clone(), vec![]);

        bus.publish(&[note_event("a.md")]).await;

        // The buffer is full: the next publish must wait.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            bus.publish(&[note_event("b.md")]),
        )
        .await;
        assert!(blocked.is_err());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        tokio::time::timeout(Duration::from_secs(5), bus.publish(&[note_event("c.md")]))
            .await
            .expect("publish should resume once the subscriber is cancelled");
        assert!(bus.subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_full_buffer_resumes_when_drained() {
        let mut bus = EventBus::new(1);
        let mut sub = bus.subscribe(CancellationToken::new(), vec![]);

        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = sub.recv().await {
                seen.push(event);
                if seen.len() == 3 {
                    break;
                }
            }
            seen
        });

        bus.publish(&[note_event("a.md"), note_event("b.md"), note_event("c.md")])
            .await;

        let seen = reader.await.unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], note_event("c.md"));
    }

    #[tokio::test]
    async fn test_drop_does_not_cancel_parent() {
        let mut bus = EventBus::new(4);
        let parent = CancellationToken::new();
        let sub = bus.subscribe(parent.clone(), vec![]);
        let child = sub.token().clone();

        drop(sub);
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new(4);
        let sub = bus.subscribe(CancellationToken::new(), vec![]);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(bus.unsubscribe(sub.id()));
        assert!(!bus.unsubscribe(sub.id()));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
