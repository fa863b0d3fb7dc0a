//! Ticket enrichment pipeline.
//!
//! Every job taken from the queue flows through:
//! 1. `decoder::decode_job()`: bytes to a validated `Job`
//! 2. `stages::classify()`: category from the classifier scores
//! 3. `stages::embed()`: fixed-width description embedding
//! 4. `stages::recommend()`: similar solved tickets, best-effort
//! 5. `composer::compose()`: one `EnrichmentRecord`
//! 6. `processor::EnrichmentPipeline::persist()`: single upsert
//!
//! **No partial writes.** A job either commits every field or none.

pub mod composer;
pub mod decoder;
pub mod processor;
pub mod stages;
pub mod types;
