//! Capability providers consumed by the pipeline stages.
//!
//! Three narrow contracts:
//! - **Classifier**: text → one score per `Category`, in label order
//! - **Embedder**: text → `EMBEDDING_DIM` floats
//! - **SimilaritySearch**: vector → past tickets above a similarity threshold
//!
//! Providers are built once at startup and shared read-only by every job
//! through `Providers`. All methods take `&self`.

pub mod http;

pub use http::{HttpClassifier, HttpEmbedder, RpcSimilaritySearch};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::{PipelineConfig, ProviderConfig, SimilarityBackend};
use crate::error::{InferenceError, RecommendationError};
use crate::pipeline::types::SimilarTicket;
use crate::store::TicketStore;

/// Default classifier input budget, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;

/// Text classification provider.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Longest input the provider accepts. Callers truncate to this.
    fn max_input_chars(&self) -> usize {
        DEFAULT_MAX_INPUT_CHARS
    }

    /// Probability-like scores, one per `Category::ALL` entry.
    async fn scores(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Sentence embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Similarity lookup over previously solved tickets.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    fn name(&self) -> &str;

    /// Rows at or above `threshold`, best first, at most `limit`.
    async fn search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarTicket>, RecommendationError>;
}

/// Immutable bundle of capability handles shared across jobs.
#[derive(Clone)]
pub struct Providers {
    pub classifier: Arc<dyn Classifier>,
    pub embedder: Arc<dyn Embedder>,
    pub search: Arc<dyn SimilaritySearch>,
}

/// Similarity search answered by the local ticket store.
///
/// Only tickets with a recorded resolution are candidates.
pub struct StoreSimilaritySearch {
    store: Arc<dyn TicketStore>,
}

impl StoreSimilaritySearch {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SimilaritySearch for StoreSimilaritySearch {
    fn name(&self) -> &str {
        "store"
    }

    async fn search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarTicket>, RecommendationError> {
        Ok(self.store.match_tickets(vector, threshold, limit).await?)
    }
}

/// Build every provider from configuration.
///
/// `store` backs similarity search when `SimilarityBackend::Store` is chosen.
pub fn create_providers(
    config: &ProviderConfig,
    pipeline: &PipelineConfig,
    store: Arc<dyn TicketStore>,
) -> Result<Providers, InferenceError> {
    let classifier = HttpClassifier::new(&config.classifier_url, pipeline.call_timeout)?;
    tracing::info!(url = %config.classifier_url, "Using HTTP classifier");

    let embedder = HttpEmbedder::new(
        &config.embedding_url,
        &config.embedding_model,
        config.embedding_api_key.clone(),
        pipeline.call_timeout,
    )?;
    tracing::info!(
        url = %config.embedding_url,
        model = %config.embedding_model,
        "Using HTTP embedder"
    );

    let search: Arc<dyn SimilaritySearch> = match config.similarity_backend {
        SimilarityBackend::Store => {
            tracing::info!("Using local store for similarity search");
            Arc::new(StoreSimilaritySearch::new(store))
        }
        SimilarityBackend::Rpc => {
            let url = config.similarity_url.as_deref().unwrap_or_default();
            let key = config
                .similarity_api_key
                .clone()
                .unwrap_or_else(|| SecretString::from(String::new()));
            tracing::info!(url = %url, "Using remote similarity RPC");
            Arc::new(
                RpcSimilaritySearch::new(url, key, pipeline.call_timeout)
                    .map_err(|e| InferenceError::RequestFailed {
                        provider: "similarity".into(),
                        reason: e.to_string(),
                    })?,
            )
        }
    };

    Ok(Providers {
        classifier: Arc::new(classifier),
        embedder: Arc::new(embedder),
        search,
    })
}
