//! RabbitMQ subscription over `lapin` (AMQP 0.9.1).
//!
//! Declares a durable queue, limits unacknowledged deliveries to one with
//! `basic_qos(1)`, and consumes with manual acknowledgement. When dead
//! lettering is enabled, rejected messages route to `<queue>_dlx` and land
//! in `<queue>_dlq`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::queue::{Delivery, Subscription};

/// Unacknowledged deliveries allowed per consumer.
const PREFETCH_COUNT: u16 = 1;

/// A live consumer on one RabbitMQ queue.
pub struct RabbitMqSubscription {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

impl RabbitMqSubscription {
    /// Connect, declare the queue, and start consuming.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let uri = config.amqp_uri();
        let connection = Connection::connect(
            &uri,
            ConnectionProperties::default().with_connection_name("ticket-enricher".into()),
        )
        .await
        .map_err(|e| {
            QueueError::Connection(format!(
                "RabbitMQ connection to {} failed: {e}",
                config.redacted_address()
            ))
        })?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("RabbitMQ channel creation failed: {e}")))?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Setup {
                queue: config.queue_name.clone(),
                reason: format!("Failed to set QoS: {e}"),
            })?;

        let queue = config.queue_name.clone();
        let mut args = FieldTable::default();
        if config.dead_letter {
            let dlx_name = setup_dlx(&channel, &queue).await?;
            args.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(dlx_name.into()),
            );
            args.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(queue.clone().into()),
            );
        }

        channel
            .queue_declare(
                &queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await
            .map_err(|e| QueueError::Setup {
                queue: queue.clone(),
                reason: format!("Queue declaration failed: {e}"),
            })?;

        let consumer_tag = format!("ticket-enricher-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                &queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Consume {
                queue: queue.clone(),
                reason: e.to_string(),
            })?;

        info!(
            queue = %queue,
            address = %config.redacted_address(),
            consumer_tag = %consumer_tag,
            dead_letter = config.dead_letter,
            "Subscribed to RabbitMQ queue"
        );

        Ok(Self {
            connection,
            channel,
            consumer,
            queue,
        })
    }

    /// Close the channel and connection.
    pub async fn close(&self) -> Result<(), QueueError> {
        self.channel
            .close(200, "shutdown")
            .await
            .map_err(|e| QueueError::Closed(format!("channel close: {e}")))?;
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| QueueError::Closed(format!("connection close: {e}")))?;
        debug!(queue = %self.queue, "RabbitMQ connection closed");
        Ok(())
    }
}

/// Declare `<queue>_dlx` and `<queue>_dlq` and bind them. Returns the DLX name.
async fn setup_dlx(channel: &Channel, queue_name: &str) -> Result<String, QueueError> {
    let dlx_name = format!("{queue_name}_dlx");
    let dlq_name = format!("{queue_name}_dlq");
    let setup_err = |name: &str, what: &str, e: lapin::Error| QueueError::Setup {
        queue: name.to_string(),
        reason: format!("{what} failed: {e}"),
    };

    channel
        .exchange_declare(
            &dlx_name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| setup_err(&dlx_name, "DLX declaration", e))?;

    channel
        .queue_declare(
            &dlq_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| setup_err(&dlq_name, "DLQ declaration", e))?;

    channel
        .queue_bind(
            &dlq_name,
            &dlx_name,
            queue_name,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| setup_err(&dlq_name, "DLQ binding", e))?;

    Ok(dlx_name)
}

#[async_trait]
impl Subscription for RabbitMqSubscription {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery {
                tag: delivery.delivery_tag,
                body: delivery.data,
                redelivered: delivery.redelivered,
            })),
            Some(Err(e)) => Err(QueueError::Consume {
                queue: self.queue.clone(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.channel
            .basic_ack(delivery.tag, BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::Ack {
                tag: delivery.tag,
                reason: e.to_string(),
            })
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        self.channel
            .basic_nack(
                delivery.tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::Reject {
                tag: delivery.tag,
                reason: e.to_string(),
            })
    }
}
