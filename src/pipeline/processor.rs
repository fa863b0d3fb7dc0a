//! Enrichment pipeline: runs the stages in order and commits the result.
//!
//! Flow:
//! 1. Classify (fatal on failure)
//! 2. Embed (fatal on failure)
//! 3. Recommend (best-effort)
//! 4. Compose
//! 5. Commit through the persistence gateway
//!
//! `enrich()` covers 1–4 and `persist()` covers 5 so the consumer can report
//! which phase a job is in.

use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::inference::Providers;
use crate::pipeline::composer::compose;
use crate::pipeline::stages;
use crate::pipeline::types::{EnrichmentRecord, Job};
use crate::store::gateway::PersistenceGateway;

/// The pipeline shared by every job a worker processes.
pub struct EnrichmentPipeline {
    providers: Providers,
    gateway: PersistenceGateway,
    config: PipelineConfig,
}

impl EnrichmentPipeline {
    pub fn new(providers: Providers, gateway: PersistenceGateway, config: PipelineConfig) -> Self {
        Self {
            providers,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the inference stages and compose the record. Nothing is written.
    pub async fn enrich(&self, job: &Job) -> Result<EnrichmentRecord, PipelineError> {
        let timeout = self.config.call_timeout;

        let category =
            stages::classify(self.providers.classifier.as_ref(), &job.description, timeout)
                .await?;
        let embedding =
            stages::embed(self.providers.embedder.as_ref(), &job.description, timeout).await?;
        let recommendations = stages::recommend(
            self.providers.search.as_ref(),
            &embedding,
            self.config.similarity_threshold,
            self.config.max_recommendations,
            timeout,
        )
        .await;

        debug!(
            ticket_id = %job.ticket_id,
            category = %category,
            recommendations = recommendations.label(),
            "Stages complete"
        );

        Ok(compose(
            job,
            category,
            embedding,
            &recommendations,
            self.config.summary_prefix_chars,
        ))
    }

    /// Commit a composed record for the job.
    pub async fn persist(&self, job: &Job, record: &EnrichmentRecord) -> Result<(), PipelineError> {
        self.gateway.commit(&job.ticket_id, record).await?;
        info!(
            ticket_id = %job.ticket_id,
            category = %record.category,
            "Ticket updated"
        );
        Ok(())
    }

    /// Full run: enrich then persist.
    pub async fn run(&self, job: &Job) -> Result<EnrichmentRecord, PipelineError> {
        let record = self.enrich(job).await?;
        self.persist(job, &record).await?;
        Ok(record)
    }
}
