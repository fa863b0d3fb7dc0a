//! Job transport: durable queue subscription with manual acknowledgement.
//!
//! A `Subscription` hands out one delivery at a time. Every delivery must be
//! settled with exactly one `ack` or `reject` before the next one arrives.

pub mod memory;
pub mod rabbitmq;

pub use memory::{MemoryQueue, MemorySubscription};
pub use rabbitmq::RabbitMqSubscription;

use async_trait::async_trait;

use crate::error::QueueError;

/// One message taken from the queue and not yet settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned tag used to settle the delivery.
    pub tag: u64,
    pub body: Vec<u8>,
    /// Set when the broker has handed this message out before.
    pub redelivered: bool,
}

/// Consumer side of a job queue.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Wait for the next delivery. `Ok(None)` means the queue was closed.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError>;

    /// Positively acknowledge a delivery.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Negatively acknowledge a delivery, optionally returning it to the queue.
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;
}
