//! Ticket Enricher: queue-driven support ticket enrichment worker.

pub mod config;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod worker;
