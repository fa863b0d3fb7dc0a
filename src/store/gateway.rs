//! Persistence gateway: the single write path from the pipeline to the store.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::DatabaseError;
use crate::pipeline::types::{EnrichmentRecord, TicketId};
use crate::store::traits::TicketStore;

/// Commits enrichment records with a bounded wait.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn TicketStore>,
    timeout: Duration,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn TicketStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Write every enrichment field for `ticket_id` in one upsert.
    pub async fn commit(
        &self,
        ticket_id: &TicketId,
        record: &EnrichmentRecord,
    ) -> Result<(), DatabaseError> {
        let key = ticket_id.as_key();
        tokio::time::timeout(self.timeout, self.store.upsert_enrichment(&key, record))
            .await
            .map_err(|_| DatabaseError::Timeout(self.timeout))??;
        debug!(ticket_id = %key, "Enrichment committed");
        Ok(())
    }
}
