// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Stream Implementation - Pub/Sub for Domain Events
//
// Every subscriber owns its own tokio broadcast channel, used as a bounded
// mailbox. Publishing never blocks: when a mailbox is full the channel
// overwrites the oldest event, and the subscriber counts the loss when it
// next reads (`Lagged`). Push-style subscribers are drained by a dedicated
// tokio task that isolates handler errors and panics; pull-style subscribers
// read through an EventReceiver.

use crate::domain::events::{Event, EventFilter, EventHandler, SubscriptionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStreamConfig {
    /// Events buffered per subscriber before the oldest is dropped
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_max_subscribers() -> usize {
    64
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            max_subscribers: default_max_subscribers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventStreamError {
    #[error("Event stream closed")]
    Closed,

    #[error("Subscriber limit reached ({limit})")]
    TooManySubscribers { limit: usize },

    #[error("No tokio runtime available to drive the subscription")]
    NoRuntime,

    #[error("No event available")]
    Empty,
}

// ============================================================================
// Mailbox
// ============================================================================

/// Upper bound handed to `broadcast::channel`, which rejects huge capacities
const MAX_MAILBOX_CAPACITY: usize = 1 << 16;

/// Receiving half of one subscriber's channel
struct Mailbox {
    id: SubscriptionId,
    receiver: broadcast::Receiver<Arc<Event>>,
    dropped: u64,
    stream_dropped: Arc<AtomicU64>,
}

impl Mailbox {
    fn lagged(&mut self, missed: u64) {
        self.dropped += missed;
        self.stream_dropped.fetch_add(missed, Ordering::Relaxed);
        metrics::counter!("agent_graph_events_dropped_total").increment(missed);
        warn!(
            subscription_id = %self.id,
            dropped = missed,
            "Subscriber mailbox overflowed, oldest events dropped"
        );
    }

    /// Next event; `None` once the sender is gone and the mailbox drained
    async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => self.lagged(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn try_recv(&mut self) -> Result<Arc<Event>, EventStreamError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(event),
                Err(TryRecvError::Lagged(missed)) => self.lagged(missed),
                Err(TryRecvError::Empty) => return Err(EventStreamError::Empty),
                Err(TryRecvError::Closed) => return Err(EventStreamError::Closed),
            }
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    sender: broadcast::Sender<Arc<Event>>,
}

struct Inner {
    config: EventStreamConfig,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    dropped: Arc<AtomicU64>,
    published: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    /// Dropping the sender lets the receiver drain what is queued, then close
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.write();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| subscribers.remove(index))
        };
        match removed {
            Some(_) => {
                debug!(subscription_id = %id, "Unsubscribed from event stream");
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// Process-wide publish/subscribe stream for domain events
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<Inner>,
}

impl EventStream {
    pub fn new(config: EventStreamConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                dropped: Arc::new(AtomicU64::new(0)),
                published: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(EventStreamConfig::default())
    }

    /// Deliver `event` to every matching subscriber without blocking.
    ///
    /// Succeeds with zero subscribers. Fails only once the stream is closed.
    pub fn publish(&self, event: Event) -> Result<(), EventStreamError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EventStreamError::Closed);
        }

        let event = Arc::new(event);
        let mut delivered = 0usize;
        {
            let subscribers = self.inner.subscribers.read();
            for subscriber in subscribers.iter().filter(|s| s.filter.matches(&event)) {
                // Fails only if the receiver is already gone
                if subscriber.sender.send(Arc::clone(&event)).is_ok() {
                    delivered += 1;
                }
            }
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        debug!(
            event_type = %event.event_type,
            source = %event.source,
            subscribers = delivered,
            "Published event"
        );
        Ok(())
    }

    /// Register a push-style handler driven by a task on the current runtime.
    pub fn subscribe(
        &self,
        filter: impl Into<EventFilter>,
        handler: EventHandler,
    ) -> Result<SubscriptionId, EventStreamError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| EventStreamError::NoRuntime)?;
        let (id, mut mailbox) = self.register(filter.into())?;

        runtime.spawn(async move {
            while let Some(event) = mailbox.recv().await {
                match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(
                        subscription_id = %id,
                        event_type = %event.event_type,
                        error = %e,
                        "Event handler failed"
                    ),
                    Err(_) => error!(
                        subscription_id = %id,
                        event_type = %event.event_type,
                        "Event handler panicked"
                    ),
                }
            }
            debug!(subscription_id = %id, "Subscription drained");
        });

        Ok(id)
    }

    /// Register a pull-style subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe_receiver(
        &self,
        filter: impl Into<EventFilter>,
    ) -> Result<EventReceiver, EventStreamError> {
        let (id, mailbox) = self.register(filter.into())?;
        Ok(EventReceiver {
            id,
            mailbox,
            stream: Arc::downgrade(&self.inner),
        })
    }

    fn register(
        &self,
        filter: EventFilter,
    ) -> Result<(SubscriptionId, Mailbox), EventStreamError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EventStreamError::Closed);
        }

        let mut subscribers = self.inner.subscribers.write();
        let limit = self.inner.config.max_subscribers;
        if subscribers.len() >= limit {
            warn!(limit, "Rejected subscription: subscriber limit reached");
            return Err(EventStreamError::TooManySubscribers { limit });
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let capacity = self.inner.config.mailbox_capacity.clamp(1, MAX_MAILBOX_CAPACITY);
        let (sender, receiver) = broadcast::channel(capacity);
        subscribers.push(Subscriber {
            id,
            filter: filter.clone(),
            sender,
        });
        let mailbox = Mailbox {
            id,
            receiver,
            dropped: 0,
            stream_dropped: Arc::clone(&self.inner.dropped),
        };

        debug!(subscription_id = %id, filter = ?filter, "Subscribed to event stream");
        Ok((id, mailbox))
    }

    /// Idempotent
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id);
    }

    /// Stop accepting events and release every subscriber after it drains.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscribers = std::mem::take(&mut *self.inner.subscribers.write());
        debug!(subscribers = subscribers.len(), "Event stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Events evicted from full mailboxes, across all subscribers.
    /// A subscriber reports its losses when it next reads.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn published_events(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::with_default_config()
    }
}

// ============================================================================
// Pull-style receiver
// ============================================================================

/// Subscription handle that reads its mailbox directly
pub struct EventReceiver {
    id: SubscriptionId,
    mailbox: Mailbox,
    stream: Weak<Inner>,
}

impl EventReceiver {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event; `Closed` once unsubscribed and drained
    pub async fn recv(&mut self) -> Result<Arc<Event>, EventStreamError> {
        self.mailbox.recv().await.ok_or(EventStreamError::Closed)
    }

    pub fn try_recv(&mut self) -> Result<Arc<Event>, EventStreamError> {
        self.mailbox.try_recv()
    }

    /// Events this subscriber lost to overflow, as observed so far
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        if let Some(inner) = self.stream.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventType;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn stream(capacity: usize, max_subscribers: usize) -> EventStream {
        EventStream::new(EventStreamConfig {
            mailbox_capacity: capacity,
            max_subscribers,
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let stream = EventStream::default();
        assert!(stream
            .publish(Event::new(EventType::AgentAction, "orchestrator"))
            .is_ok());
        assert_eq!(stream.published_events(), 1);
    }

    #[tokio::test]
    async fn test_receiver_filtering() {
        let stream = EventStream::default();
        let mut actions = stream.subscribe_receiver(EventType::AgentAction).unwrap();
        let mut all = stream.subscribe_receiver(EventFilter::All).unwrap();

        stream
            .publish(Event::new(EventType::ToolUsage, "codegen"))
            .unwrap();
        stream
            .publish(Event::new(EventType::AgentAction, "frontend").with_data("n", json!(1)))
            .unwrap();

        let event = actions.recv().await.unwrap();
        assert_eq!(event.source, "frontend");
        assert_eq!(actions.try_recv().unwrap_err(), EventStreamError::Empty);

        assert_eq!(all.recv().await.unwrap().event_type, EventType::ToolUsage);
        assert_eq!(all.recv().await.unwrap().event_type, EventType::AgentAction);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let stream = stream(2, 8);
        let mut receiver = stream.subscribe_receiver(EventFilter::All).unwrap();

        for i in 0..5 {
            stream
                .publish(Event::new(EventType::AgentAction, "a").with_data("i", json!(i)))
                .unwrap();
        }

        assert_eq!(stream.published_events(), 5);
        assert_eq!(receiver.recv().await.unwrap().data["i"], json!(3));
        assert_eq!(receiver.dropped(), 3);
        assert_eq!(stream.dropped_events(), 3);
        assert_eq!(receiver.try_recv().unwrap().data["i"], json!(4));
        assert_eq!(receiver.try_recv().unwrap_err(), EventStreamError::Empty);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overflow_counted_for_push_subscribers() {
        let stream = stream(2, 8);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let gate = Arc::new(std::sync::Barrier::new(2));
        let handler_gate = Arc::clone(&gate);
        stream
            .subscribe(
                EventFilter::All,
                Arc::new(move |_event: &Event| -> anyhow::Result<()> {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        handler_gate.wait();
                    }
                    Ok(())
                }),
            )
            .unwrap();

        stream.publish(Event::new(EventType::AgentAction, "a")).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // The handler is parked on the first event; overflow the mailbox
        for _ in 0..5 {
            stream.publish(Event::new(EventType::AgentAction, "a")).unwrap();
        }
        gate.wait();

        tokio::time::timeout(Duration::from_secs(2), async {
            while stream.dropped_events() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("lost events are counted");
        assert_eq!(stream.dropped_events(), 3);
    }

    #[tokio::test]
    async fn test_subscriber_limit() {
        let stream = stream(4, 1);
        let _first = stream.subscribe_receiver(EventFilter::All).unwrap();
        let err = stream.subscribe_receiver(EventFilter::All).err();
        assert_eq!(err, Some(EventStreamError::TooManySubscribers { limit: 1 }));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let stream = EventStream::default();
        let receiver = stream.subscribe_receiver(EventFilter::All).unwrap();
        let id = receiver.id();
        assert_eq!(stream.subscriber_count(), 1);

        stream.unsubscribe(id);
        stream.unsubscribe(id);
        assert_eq!(stream.subscriber_count(), 0);

        drop(receiver);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_receiver_unsubscribes() {
        let stream = EventStream::default();
        {
            let _receiver = stream.subscribe_receiver(EventFilter::All).unwrap();
            assert_eq!(stream.subscriber_count(), 1);
        }
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_affect_others() {
        let stream = EventStream::default();
        let seen = Arc::new(AtomicUsize::new(0));

        stream
            .subscribe(
                EventFilter::All,
                Arc::new(|_event: &Event| -> anyhow::Result<()> {
                    anyhow::bail!("handler exploded")
                }),
            )
            .unwrap();
        stream
            .subscribe(
                EventFilter::All,
                Arc::new(|_event: &Event| -> anyhow::Result<()> {
                    panic!("handler panicked")
                }),
            )
            .unwrap();
        let counter = Arc::clone(&seen);
        stream
            .subscribe(
                EventFilter::All,
                Arc::new(move |_event: &Event| -> anyhow::Result<()> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        for _ in 0..3 {
            stream
                .publish(Event::new(EventType::ComponentUpdated, "frontend"))
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("healthy handler should see every event");
    }

    #[test]
    fn test_subscribe_requires_runtime() {
        let stream = EventStream::default();
        let err = stream
            .subscribe(
                EventFilter::All,
                Arc::new(|_event: &Event| -> anyhow::Result<()> { Ok(()) }),
            )
            .unwrap_err();
        assert_eq!(err, EventStreamError::NoRuntime);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_publish_and_drains_receivers() {
        let stream = EventStream::default();
        let mut receiver = stream.subscribe_receiver(EventFilter::All).unwrap();
        stream
            .publish(Event::new(EventType::AgentAction, "a"))
            .unwrap();

        stream.close();
        assert_eq!(
            stream.publish(Event::new(EventType::AgentAction, "a")),
            Err(EventStreamError::Closed)
        );
        assert!(receiver.recv().await.is_ok());
        assert_eq!(receiver.recv().await.unwrap_err(), EventStreamError::Closed);
    }
}
