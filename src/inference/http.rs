//! HTTP clients for remote inference and similarity endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Classifier, Embedder, SimilaritySearch};
use crate::error::{InferenceError, RecommendationError};
use crate::pipeline::types::{Category, SimilarTicket};

fn build_client(timeout: Duration, headers: HeaderMap) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
}

fn request_failed(provider: &str, reason: impl ToString) -> InferenceError {
    InferenceError::RequestFailed {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

fn invalid_response(provider: &str, reason: impl ToString) -> InferenceError {
    InferenceError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

// ── Classifier ──────────────────────────────────────────────────────

const CLASSIFIER: &str = "http-classifier";

/// Text-classification endpoint (`{"inputs": text}` → label scores).
///
/// Accepts both the flat `[{label, score}]` and the batched
/// `[[{label, score}]]` response shapes.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = build_client(timeout, headers).map_err(|e| request_failed(CLASSIFIER, e))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Map provider label scores onto `Category::ALL` order.
fn scores_from_labels(raw: Value) -> Result<Vec<f32>, InferenceError> {
    // Unwrap the batched shape: [[{..}, ..]]
    let raw = match raw {
        Value::Array(mut outer)
            if outer.len() == 1 && matches!(outer.first(), Some(Value::Array(_))) =>
        {
            outer.remove(0)
        }
        other => other,
    };

    let labels: Vec<LabelScore> =
        serde_json::from_value(raw).map_err(|e| invalid_response(CLASSIFIER, e))?;

    let mut scores: Vec<Option<f32>> = vec![None; Category::ALL.len()];
    for entry in labels {
        let category = Category::from_label(&entry.label).ok_or_else(|| {
            invalid_response(CLASSIFIER, format!("unknown label '{}'", entry.label))
        })?;
        scores[category.index()] = Some(entry.score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| {
                invalid_response(CLASSIFIER, format!("missing score for label index {i}"))
            })
        })
        .collect()
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        CLASSIFIER
    }

    async fn scores(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .await
            .map_err(|e| request_failed(CLASSIFIER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(request_failed(CLASSIFIER, format!("{status}: {body}")));
        }

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| invalid_response(CLASSIFIER, e))?;
        scores_from_labels(raw)
    }
}

// ── Embedder ────────────────────────────────────────────────────────

const EMBEDDER: &str = "http-embedder";

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.expose_secret().trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| request_failed(EMBEDDER, "invalid API key header"))?,
            );
        }
        let client = build_client(timeout, headers).map_err(|e| request_failed(EMBEDDER, e))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        EMBEDDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(EMBEDDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(request_failed(EMBEDDER, format!("{status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| invalid_response(EMBEDDER, e))?;
        parsed.data.sort_by_key(|entry| entry.index);
        parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| invalid_response(EMBEDDER, "response contained no embeddings"))
    }
}

// ── Similarity RPC ──────────────────────────────────────────────────

/// PostgREST `rpc/match_tickets` client.
pub struct RpcSimilaritySearch {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct MatchTicketsRequest<'a> {
    query_embedding: &'a [f32],
    match_threshold: f32,
    match_count: usize,
}

#[derive(Deserialize)]
struct MatchTicketsRow {
    id: Value,
    #[serde(default)]
    ai_solution: Option<String>,
    similarity: f32,
}

impl RpcSimilaritySearch {
    pub fn new(
        endpoint: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, RecommendationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = api_key.expose_secret().trim();
        if !key.is_empty() {
            let invalid = |_| RecommendationError::RequestFailed("invalid API key header".into());
            headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
            );
        }
        let client = build_client(timeout, headers)
            .map_err(|e| RecommendationError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

fn rows_to_similar(rows: Vec<MatchTicketsRow>) -> Vec<SimilarTicket> {
    rows.into_iter()
        .filter_map(|row| {
            let solution_text = row.ai_solution.filter(|s| !s.trim().is_empty())?;
            let id = match row.id {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some(SimilarTicket {
                id,
                solution_text,
                score: row.similarity,
            })
        })
        .collect()
}

#[async_trait]
impl SimilaritySearch for RpcSimilaritySearch {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn search(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarTicket>, RecommendationError> {
        let request = MatchTicketsRequest {
            query_embedding: vector,
            match_threshold: threshold,
            match_count: limit,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecommendationError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RecommendationError::RequestFailed(format!("{status}: {body}")));
        }

        let rows: Vec<MatchTicketsRow> = resp
            .json()
            .await
            .map_err(|e| RecommendationError::InvalidResponse(e.to_string()))?;
        Ok(rows_to_similar(rows))
    }
}
