//! Pipeline stages: classify, embed, recommend.
//!
//! Each stage wraps one provider call in the per-call timeout. Classification
//! and embedding failures abort the job; recommendation failures degrade to
//! `RecommendationSet::Unavailable`.

use std::cmp::Ordering;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{InferenceError, RecommendationError};
use crate::inference::{Classifier, Embedder, SimilaritySearch};
use crate::pipeline::types::{
    Category, EmbeddingVector, Recommendation, RecommendationSet, SimilarTicket,
};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace regex"));

/// Collapse whitespace runs and cut to `max_chars` characters.
pub fn normalize_input(text: &str, max_chars: usize) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    collapsed.chars().take(max_chars).collect()
}

/// Highest-scoring category. Ties go to the lowest label index; NaN never wins.
///
/// Returns `None` unless there is exactly one score per category.
pub fn argmax_category(scores: &[f32]) -> Option<Category> {
    if scores.len() != Category::ALL.len() {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    // All-NaN input still needs a deterministic answer.
    Category::from_index(best.map_or(0, |(i, _)| i))
}

/// Classification stage.
pub async fn classify(
    classifier: &dyn Classifier,
    description: &str,
    timeout: Duration,
) -> Result<Category, InferenceError> {
    let input = normalize_input(description, classifier.max_input_chars());
    let scores = tokio::time::timeout(timeout, classifier.scores(&input))
        .await
        .map_err(|_| InferenceError::Timeout {
            provider: classifier.name().to_string(),
            timeout,
        })??;

    let category = argmax_category(&scores).ok_or_else(|| InferenceError::InvalidResponse {
        provider: classifier.name().to_string(),
        reason: format!(
            "expected {} scores, got {}",
            Category::ALL.len(),
            scores.len()
        ),
    })?;
    debug!(category = %category, ?scores, "Classified description");
    Ok(category)
}

/// Embedding stage.
pub async fn embed(
    embedder: &dyn Embedder,
    description: &str,
    timeout: Duration,
) -> Result<EmbeddingVector, InferenceError> {
    let values = tokio::time::timeout(timeout, embedder.embed(description))
        .await
        .map_err(|_| InferenceError::Timeout {
            provider: embedder.name().to_string(),
            timeout,
        })??;
    EmbeddingVector::new(values)
}

/// Filter by threshold, rank by descending score, keep at most `limit`.
pub fn rank(rows: Vec<SimilarTicket>, threshold: f32, limit: usize) -> Vec<Recommendation> {
    let mut kept: Vec<SimilarTicket> = rows
        .into_iter()
        .filter(|row| row.score >= threshold)
        .collect();
    // Stable sort keeps provider order for equal scores.
    kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    kept.truncate(limit);
    kept.into_iter()
        .map(|row| Recommendation {
            reference_id: row.id,
            solution_text: row.solution_text,
            score: row.score,
        })
        .collect()
}

/// Recommendation stage. Never fails.
pub async fn recommend(
    search: &dyn SimilaritySearch,
    embedding: &EmbeddingVector,
    threshold: f32,
    limit: usize,
    timeout: Duration,
) -> RecommendationSet {
    let result = tokio::time::timeout(
        timeout,
        search.search(embedding.as_slice(), threshold, limit),
    )
    .await
    .unwrap_or(Err(RecommendationError::Timeout(timeout)));

    match result {
        Ok(rows) => {
            let set = RecommendationSet::from_ranked(rank(rows, threshold, limit));
            debug!(
                provider = search.name(),
                outcome = set.label(),
                count = set.entries().len(),
                "Similarity search complete"
            );
            set
        }
        Err(e) => {
            warn!(
                provider = search.name(),
                error = %e,
                "Recommendation lookup failed, continuing without suggestions"
            );
            RecommendationSet::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::pipeline::types::EMBEDDING_DIM;

    struct FixedClassifier {
        scores: Vec<f32>,
        max_chars: usize,
        seen: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }
        fn max_input_chars(&self) -> usize {
            self.max_chars
        }
        async fn scores(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
            *self.seen.lock().unwrap() = Some(text.to_string());
            Ok(self.scores.clone())
        }
    }

    fn classifier(scores: Vec<f32>) -> FixedClassifier {
        FixedClassifier {
            scores,
            max_chars: 2048,
            seen: std::sync::Mutex::new(None),
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![0.0; EMBEDDING_DIM])
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![0.1; 8])
        }
    }

    enum SearchBehaviour {
        Rows(Vec<SimilarTicket>),
        Fail,
    }

    struct StubSearch(SearchBehaviour);

    #[async_trait]
    impl SimilaritySearch for StubSearch {
        fn name(&self) -> &str {
            "stub"
        }
        async fn search(
            &self,
            _vector: &[f32],
            _threshold: f32,
            _limit: usize,
        ) -> Result<Vec<SimilarTicket>, RecommendationError> {
            match &self.0 {
                SearchBehaviour::Rows(rows) => Ok(rows.clone()),
                SearchBehaviour::Fail => {
                    Err(RecommendationError::RequestFailed("connection refused".into()))
                }
            }
        }
    }

    fn row(id: &str, score: f32) -> SimilarTicket {
        SimilarTicket {
            id: id.into(),
            solution_text: format!("fix for {id}"),
            score,
        }
    }

    fn embedding() -> EmbeddingVector {
        EmbeddingVector::new(vec![0.1; EMBEDDING_DIM]).unwrap()
    }

    #[test]
    fn normalize_collapses_and_truncates() {
        assert_eq!(normalize_input("  printer \n\n jams\tagain ", 100), "printer jams again");
        assert_eq!(normalize_input("abcdef", 3), "abc");
        // Truncation respects char boundaries.
        assert_eq!(normalize_input("ééé", 2), "éé");
    }

    #[test]
    fn argmax_picks_highest() {
        assert_eq!(argmax_category(&[0.1, 0.8, 0.1]), Some(Category::Billing));
        assert_eq!(argmax_category(&[-1.0, -3.0, 2.5]), Some(Category::General));
    }

    #[test]
    fn argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax_category(&[0.4, 0.4, 0.2]), Some(Category::Technical));
        assert_eq!(argmax_category(&[0.1, 0.45, 0.45]), Some(Category::Billing));
    }

    #[test]
    fn argmax_ignores_nan_and_rejects_wrong_length() {
        assert_eq!(argmax_category(&[f32::NAN, 0.2, 0.3]), Some(Category::General));
        assert_eq!(
            argmax_category(&[f32::NAN, f32::NAN, f32::NAN]),
            Some(Category::Technical)
        );
        assert_eq!(argmax_category(&[0.5, 0.5]), None);
        assert_eq!(argmax_category(&[]), None);
    }

    #[tokio::test]
    async fn classify_truncates_input_for_provider() {
        let mut c = classifier(vec![0.9, 0.05, 0.05]);
        c.max_chars = 10;
        let category = classify(&c, "The printer   on the 2nd floor", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(category, Category::Technical);
        assert_eq!(c.seen.lock().unwrap().as_deref(), Some("The printe"));
    }

    #[tokio::test]
    async fn classify_wrong_score_count_is_inference_error() {
        let c = classifier(vec![1.0]);
        let err = classify(&c, "refund", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn embed_times_out() {
        let err = embed(&SlowEmbedder, "text", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimension() {
        let err = embed(&ShortEmbedder, "text", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::DimensionMismatch { actual: 8, .. }));
    }

    #[test]
    fn rank_filters_sorts_and_truncates() {
        let rows = vec![
            row("a", 0.80),
            row("b", 0.95),
            row("c", 0.50),
            row("d", 0.90),
            row("e", 0.76),
        ];
        let ranked = rank(rows, 0.75, 3);
        let ids: Vec<&str> = ranked.iter().map(|r| r.reference_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
    }

    #[tokio::test]
    async fn recommend_empty_result_is_sentinel() {
        let search = StubSearch(SearchBehaviour::Rows(vec![]));
        let set = recommend(&search, &embedding(), 0.75, 3, Duration::from_secs(1)).await;
        assert_eq!(set, RecommendationSet::Empty);
    }

    #[tokio::test]
    async fn recommend_below_threshold_is_sentinel() {
        let search = StubSearch(SearchBehaviour::Rows(vec![row("x", 0.2)]));
        let set = recommend(&search, &embedding(), 0.75, 3, Duration::from_secs(1)).await;
        assert_eq!(set, RecommendationSet::Empty);
    }

    #[tokio::test]
    async fn recommend_failure_degrades() {
        let search = StubSearch(SearchBehaviour::Fail);
        let set = recommend(&search, &embedding(), 0.75, 3, Duration::from_secs(1)).await;
        match set {
            RecommendationSet::Unavailable { reason } => {
                assert!(reason.contains("connection refused"))
            }
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn recommend_matches_are_ranked() {
        let search = StubSearch(SearchBehaviour::Rows(vec![row("1", 0.8), row("2", 0.99)]));
        let set = recommend(&search, &embedding(), 0.75, 3, Duration::from_secs(1)).await;
        assert_eq!(set.entries()[0].reference_id, "2");
        assert_eq!(set.entries()[1].reference_id, "1");
    }
}
