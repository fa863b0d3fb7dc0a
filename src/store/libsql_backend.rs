//! libSQL backend: async `TicketStore` implementation.
//!
//! Supports local file and in-memory databases. Embeddings are stored as a
//! JSON array in a TEXT column and matched with a cosine scan.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::pipeline::types::{EnrichmentRecord, SimilarTicket};
use crate::store::migrations;
use crate::store::traits::{StoredTicket, TicketStore};

/// libSQL ticket store.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and the memory transport).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_embedding(raw: Option<String>) -> Result<Option<Vec<f32>>, DatabaseError> {
    raw.map(|s| {
        serde_json::from_str::<Vec<f32>>(&s)
            .map_err(|e| DatabaseError::Serialization(format!("embedding column: {e}")))
    })
    .transpose()
}

/// Cosine similarity. Zero-norm or mismatched vectors score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn row_to_ticket(row: &libsql::Row) -> Result<StoredTicket, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("ticket row parse: {e}"));
    let created_at: String = row.get(9).map_err(parse)?;
    let updated_at: String = row.get(10).map_err(parse)?;
    Ok(StoredTicket {
        id: row.get(0).map_err(parse)?,
        description: row.get(1).map_err(parse)?,
        title: row.get(2).map_err(parse)?,
        summary: row.get(3).map_err(parse)?,
        category: row.get(4).map_err(parse)?,
        ai_solution: row.get(5).map_err(parse)?,
        resolution: row.get(6).map_err(parse)?,
        embedding: parse_embedding(row.get(7).map_err(parse)?)?,
        status: row.get(8).map_err(parse)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TICKET_COLUMNS: &str = "id, description, title, summary, category, ai_solution, resolution, \
     embedding, status, created_at, updated_at";

#[async_trait]
impl TicketStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn create_ticket(&self, id: &str, description: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO tickets (id, description, status, created_at, updated_at)
                 VALUES (?1, ?2, 'new', ?3, ?3)",
                params![id, description, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_ticket: {e}")))?;
        debug!(ticket_id = id, "Ticket created");
        Ok(())
    }

    async fn upsert_enrichment(
        &self,
        ticket_id: &str,
        record: &EnrichmentRecord,
    ) -> Result<(), DatabaseError> {
        let embedding = serde_json::to_string(record.embedding.as_slice())
            .map_err(|e| DatabaseError::Serialization(format!("embedding: {e}")))?;
        let updated_at = record.updated_at.to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO tickets
                    (id, title, summary, category, ai_solution, embedding, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    summary = excluded.summary,
                    category = excluded.category,
                    ai_solution = excluded.ai_solution,
                    embedding = excluded.embedding,
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![
                    ticket_id,
                    record.title.as_str(),
                    record.summary.as_str(),
                    record.category.as_str(),
                    record.ai_solution.as_str(),
                    embedding,
                    record.status.as_str(),
                    updated_at
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_enrichment: {e}")))?;

        debug!(ticket_id, category = %record.category, "Enrichment written");
        Ok(())
    }

    async fn resolve_ticket(&self, ticket_id: &str, resolution: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE tickets SET resolution = ?2, status = 'resolved', updated_at = ?3
                 WHERE id = ?1",
                params![ticket_id, resolution, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("resolve_ticket: {e}")))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "ticket".into(),
                id: ticket_id.to_string(),
            });
        }
        debug!(ticket_id, "Ticket resolved");
        Ok(())
    }

    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<StoredTicket>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                params![ticket_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_ticket: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_ticket(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_ticket: {e}"))),
        }
    }

    async fn match_tickets(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarTicket>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, resolution, embedding FROM tickets
                 WHERE embedding IS NOT NULL
                   AND resolution IS NOT NULL
                   AND trim(resolution) != ''",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("match_tickets: {e}")))?;

        let mut matches = Vec::new();
        loop {
            let row = match rows.next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("match_tickets: {e}"))),
            };
            let parse = |e: libsql::Error| DatabaseError::Query(format!("match_tickets row: {e}"));
            let id: String = row.get(0).map_err(parse)?;
            let solution_text: String = row.get(1).map_err(parse)?;
            let raw: String = row.get(2).map_err(parse)?;

            let Ok(stored) = serde_json::from_str::<Vec<f32>>(&raw) else {
                debug!(ticket_id = %id, "Skipping ticket with unreadable embedding");
                continue;
            };
            if stored.len() != query.len() {
                continue;
            }
            let score = cosine_similarity(query, &stored);
            if score >= threshold {
                matches.push(SimilarTicket {
                    id,
                    solution_text,
                    score,
                });
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }
}
