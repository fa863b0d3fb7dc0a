//! In-process queue with broker-like settlement semantics.
//!
//! Used by tests and the `memory` transport. Mirrors the parts of RabbitMQ
//! the consumer relies on: at most one unsettled delivery per queue,
//! requeued messages come back first flagged `redelivered`, and rejected
//! messages without requeue are dead-lettered.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::error::QueueError;
use crate::queue::{Delivery, Subscription};

#[derive(Debug)]
struct Message {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<Message>,
    in_flight: Option<(u64, Message)>,
    next_tag: u64,
    acked: u64,
    rejected: u64,
    dead_letters: Vec<Vec<u8>>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    name: String,
    state: Mutex<State>,
    notify: Notify,
}

/// Shared handle to an in-memory queue. Cloning shares the queue.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Append a message.
    pub async fn publish(&self, body: impl Into<Vec<u8>>) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed(self.inner.name.clone()));
        }
        state.pending.push_back(Message {
            body: body.into(),
            redelivered: false,
        });
        drop(state);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Stop accepting messages. Subscribers drain what is left, then see the end.
    pub async fn close(&self) {
        self.inner.state.lock().await.closed = true;
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    pub fn subscribe(&self) -> MemorySubscription {
        MemorySubscription {
            queue: self.clone(),
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn acked_count(&self) -> u64 {
        self.inner.state.lock().await.acked
    }

    pub async fn rejected_count(&self) -> u64 {
        self.inner.state.lock().await.rejected
    }

    /// Bodies of messages rejected without requeue.
    pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().await.dead_letters.clone()
    }

    async fn take_in_flight(&self, tag: u64) -> Result<Message, String> {
        let mut state = self.inner.state.lock().await;
        match state.in_flight.take() {
            Some((current, message)) if current == tag => Ok(message),
            other => {
                state.in_flight = other;
                Err(format!("unknown delivery tag on queue {}", self.inner.name))
            }
        }
    }
}

/// Consumer handle for a `MemoryQueue`.
#[derive(Debug, Clone)]
pub struct MemorySubscription {
    queue: MemoryQueue,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn queue_name(&self) -> &str {
        &self.queue.inner.name
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
        let inner = &self.queue.inner;
        loop {
            let notified = inner.notify.notified();
            {
                let mut state = inner.state.lock().await;
                if state.in_flight.is_none() {
                    if let Some(message) = state.pending.pop_front() {
                        state.next_tag += 1;
                        let delivery = Delivery {
                            tag: state.next_tag,
                            body: message.body.clone(),
                            redelivered: message.redelivered,
                        };
                        state.in_flight = Some((delivery.tag, message));
                        return Ok(Some(delivery));
                    }
                    if state.closed {
                        return Ok(None);
                    }
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.queue
            .take_in_flight(delivery.tag)
            .await
            .map_err(|reason| QueueError::Ack {
                tag: delivery.tag,
                reason,
            })?;
        self.queue.inner.state.lock().await.acked += 1;
        self.queue.inner.notify.notify_one();
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let message = self
            .queue
            .take_in_flight(delivery.tag)
            .await
            .map_err(|reason| QueueError::Reject {
                tag: delivery.tag,
                reason,
            })?;
        let mut state = self.queue.inner.state.lock().await;
        state.rejected += 1;
        if requeue {
            state.pending.push_front(Message {
                body: message.body,
                redelivered: true,
            });
        } else {
            state.dead_letters.push(message.body);
        }
        drop(state);
        self.queue.inner.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn delivers_in_order() {
        let queue = MemoryQueue::new("q");
        queue.publish("a").await.unwrap();
        queue.publish("b").await.unwrap();
        let mut sub = queue.subscribe();

        let first = sub.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.body, b"a");
        sub.ack(&first).await.unwrap();
        let second = sub.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.body, b"b");
        assert!(second.tag > first.tag);
    }

    #[tokio::test]
    async fn holds_back_while_unsettled() {
        let queue = MemoryQueue::new("q");
        queue.publish("a").await.unwrap();
        queue.publish("b").await.unwrap();
        let mut sub = queue.subscribe();

        let first = sub.next_delivery().await.unwrap().unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), sub.next_delivery()).await;
        assert!(blocked.is_err(), "second delivery must wait for settlement");

        sub.ack(&first).await.unwrap();
        let second = sub.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.body, b"b");
    }

    #[tokio::test]
    async fn requeue_returns_message_first_and_flagged() {
        let queue = MemoryQueue::new("q");
        queue.publish("a").await.unwrap();
        queue.publish("b").await.unwrap();
        let mut sub = queue.subscribe();

        let first = sub.next_delivery().await.unwrap().unwrap();
        assert!(!first.redelivered);
        sub.reject(&first, true).await.unwrap();

        let again = sub.next_delivery().await.unwrap().unwrap();
        assert_eq!(again.body, b"a");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn reject_without_requeue_dead_letters() {
        let queue = MemoryQueue::new("q");
        queue.publish("bad").await.unwrap();
        let mut sub = queue.subscribe();

        let d = sub.next_delivery().await.unwrap().unwrap();
        sub.reject(&d, false).await.unwrap();

        assert_eq!(queue.dead_letters().await, vec![b"bad".to_vec()]);
        assert_eq!(queue.rejected_count().await, 1);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn double_ack_is_an_error() {
        let queue = MemoryQueue::new("q");
        queue.publish("a").await.unwrap();
        let mut sub = queue.subscribe();

        let d = sub.next_delivery().await.unwrap().unwrap();
        sub.ack(&d).await.unwrap();
        assert!(matches!(sub.ack(&d).await, Err(QueueError::Ack { .. })));
        assert_eq!(queue.acked_count().await, 1);
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = MemoryQueue::new("q");
        queue.publish("last").await.unwrap();
        queue.close().await;
        assert!(queue.publish("late").await.is_err());

        let mut sub = queue.subscribe();
        let d = sub.next_delivery().await.unwrap().unwrap();
        sub.ack(&d).await.unwrap();
        assert!(sub.next_delivery().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn waiting_subscriber_wakes_on_publish() {
        let queue = MemoryQueue::new("q");
        let mut sub = queue.subscribe();
        let publisher = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("hello").await.unwrap();
        });
        let d = tokio::time::timeout(Duration::from_secs(2), sub.next_delivery())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(d.body, b"hello");
    }
}
