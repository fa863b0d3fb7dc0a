//! Consumer loop: one delivery at a time through decode, pipeline, commit
//! and settlement.
//!
//! Every delivery ends in exactly one `ack` or `reject`. Whether a failed
//! delivery goes back to the queue is decided by `RetryPolicy`.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, PipelineError, QueueError};
use crate::pipeline::decoder::decode_job;
use crate::pipeline::processor::EnrichmentPipeline;
use crate::pipeline::types::TicketId;
use crate::queue::{Delivery, Subscription};
use crate::worker::health::WorkerHealth;
use crate::worker::state::ConsumerState;

/// What happens to a delivery whose job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Reject without requeue on every failure.
    #[default]
    Discard,
    /// Requeue a transient failure once. Redeliveries are rejected for good.
    RequeueOnce,
}

impl RetryPolicy {
    pub fn should_requeue(&self, error: &PipelineError, redelivered: bool) -> bool {
        match self {
            Self::Discard => false,
            Self::RequeueOnce => error.is_transient() && !redelivered,
        }
    }
}

impl FromStr for RetryPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "requeue_once" | "requeue-once" => Ok(Self::RequeueOnce),
            other => Err(ConfigError::InvalidValue {
                key: "WORKER_RETRY_POLICY".into(),
                message: format!("unknown policy '{other}', expected discard or requeue_once"),
            }),
        }
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool },
}

enum Event {
    Shutdown,
    Delivery(Result<Option<Delivery>, QueueError>),
}

pub struct Consumer {
    pipeline: Arc<EnrichmentPipeline>,
    health: Arc<WorkerHealth>,
    policy: RetryPolicy,
}

impl Consumer {
    pub fn new(pipeline: Arc<EnrichmentPipeline>, health: Arc<WorkerHealth>) -> Self {
        let policy = pipeline.config().retry_policy;
        Self {
            pipeline,
            health,
            policy,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.health.consumer_state()
    }

    fn transition(&self, to: ConsumerState) {
        let from = self.health.consumer_state();
        if !from.can_transition_to(to) {
            warn!(from = %from, to = %to, "Unexpected consumer state transition");
        }
        debug!(from = %from, to = %to, "Consumer state");
        self.health.set_consumer_state(to);
    }

    /// Consume until shutdown or until the subscription fails.
    ///
    /// Shutdown is only observed while idle. A closed subscription is an
    /// error so the caller can reconnect.
    pub async fn run(
        &self,
        subscription: &mut dyn Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        self.health.set_consumer_state(ConsumerState::Idle);
        info!(
            queue = subscription.queue_name(),
            policy = ?self.policy,
            "Waiting for messages"
        );

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, consumer stopping");
                return Ok(());
            }

            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => Event::Shutdown,
                },
                next = subscription.next_delivery() => Event::Delivery(next),
            };

            let delivery = match event {
                Event::Shutdown => {
                    info!("Shutdown channel dropped, consumer stopping");
                    return Ok(());
                }
                Event::Delivery(Ok(Some(delivery))) => delivery,
                Event::Delivery(Ok(None)) => {
                    return Err(QueueError::Closed(subscription.queue_name().to_string()));
                }
                Event::Delivery(Err(e)) => return Err(e),
            };

            self.handle_delivery(&*subscription, &delivery).await?;
        }
    }

    /// Take one delivery through every stage and settle it.
    pub async fn handle_delivery(
        &self,
        subscription: &dyn Subscription,
        delivery: &Delivery,
    ) -> Result<Disposition, QueueError> {
        self.transition(ConsumerState::Received);
        self.health.record_processed();
        debug!(
            delivery_tag = delivery.tag,
            redelivered = delivery.redelivered,
            bytes = delivery.body.len(),
            "Received delivery"
        );

        self.transition(ConsumerState::Decoding);
        let job = match decode_job(&delivery.body) {
            Ok(job) => job,
            Err(e) => return self.settle_failure(subscription, delivery, None, e).await,
        };

        self.transition(ConsumerState::ProcessingPipeline);
        let record = match self.pipeline.enrich(&job).await {
            Ok(record) => record,
            Err(e) => {
                return self
                    .settle_failure(subscription, delivery, Some(&job.ticket_id), e)
                    .await;
            }
        };

        self.transition(ConsumerState::Persisting);
        if let Err(e) = self.pipeline.persist(&job, &record).await {
            return self
                .settle_failure(subscription, delivery, Some(&job.ticket_id), e)
                .await;
        }

        self.transition(ConsumerState::Acknowledging);
        if let Err(e) = subscription.ack(delivery).await {
            self.transition(ConsumerState::Error);
            return Err(e);
        }
        self.health.record_ack();
        info!(
            ticket_id = %job.ticket_id,
            category = %record.category,
            delivery_tag = delivery.tag,
            "Ticket enriched"
        );
        self.transition(ConsumerState::Idle);
        Ok(Disposition::Ack)
    }

    async fn settle_failure(
        &self,
        subscription: &dyn Subscription,
        delivery: &Delivery,
        ticket_id: Option<&TicketId>,
        err: PipelineError,
    ) -> Result<Disposition, QueueError> {
        self.transition(ConsumerState::Error);
        let requeue = self.policy.should_requeue(&err, delivery.redelivered);
        let ticket = ticket_id.map(ToString::to_string).unwrap_or_default();

        if requeue {
            warn!(
                ticket_id = %ticket,
                kind = err.kind(),
                error = %err,
                delivery_tag = delivery.tag,
                "Job failed, requeueing once"
            );
        } else {
            error!(
                ticket_id = %ticket,
                kind = err.kind(),
                error = %err,
                delivery_tag = delivery.tag,
                redelivered = delivery.redelivered,
                "Job failed, rejecting"
            );
        }

        subscription.reject(delivery, requeue).await?;
        self.health.record_reject(requeue);
        self.transition(ConsumerState::Idle);
        Ok(Disposition::Reject { requeue })
    }
}
