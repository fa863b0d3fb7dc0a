//! `TicketStore` trait: async interface for ticket persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::pipeline::types::{EnrichmentRecord, SimilarTicket};

/// A ticket row as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTicket {
    pub id: String,
    pub description: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub ai_solution: Option<String>,
    /// Human-written resolution, set once the ticket is closed.
    pub resolution: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend-agnostic ticket store.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a fresh ticket with status `new`. Existing rows are left alone.
    async fn create_ticket(&self, id: &str, description: &str) -> Result<(), DatabaseError>;

    /// Write the enrichment fields for a ticket in one statement.
    ///
    /// Creates the row if it does not exist. Writing the same record twice
    /// leaves the row in the same state.
    async fn upsert_enrichment(
        &self,
        ticket_id: &str,
        record: &EnrichmentRecord,
    ) -> Result<(), DatabaseError>;

    /// Record the final resolution of a ticket and mark it `resolved`.
    ///
    /// Only resolved tickets are candidates for `match_tickets`.
    async fn resolve_ticket(&self, ticket_id: &str, resolution: &str) -> Result<(), DatabaseError>;

    /// Get a ticket by ID.
    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<StoredTicket>, DatabaseError>;

    /// Tickets with a resolution and a stored embedding whose cosine similarity to
    /// `query` is at least `threshold`, best first, at most `limit`.
    ///
    /// `solution_text` is the ticket's `resolution`. Enrichment drafts are
    /// never returned.
    async fn match_tickets(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarTicket>, DatabaseError>;
}
