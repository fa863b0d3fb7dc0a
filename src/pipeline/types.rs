//! Shared types for the enrichment pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Dimensionality of every embedding the pipeline produces or stores.
pub const EMBEDDING_DIM: usize = 384;

// ── Job ─────────────────────────────────────────────────────────────

/// Opaque ticket key. Producers send either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TicketId {
    Number(i64),
    Text(String),
}

impl TicketId {
    /// Key used for the store row.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for TicketId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// One unit of work decoded from a queue message. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub ticket_id: TicketId,
    pub description: String,
}

// ── Classification ──────────────────────────────────────────────────

/// Closed set of ticket categories, in classifier label order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Technical,
    Billing,
    General,
}

impl Category {
    /// All labels, indexed the way the classifier scores them.
    pub const ALL: [Category; 3] = [Category::Technical, Category::Billing, Category::General];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Self::Technical => 0,
            Self::Billing => 1,
            Self::General => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "Technical",
            Self::Billing => "Billing",
            Self::General => "General",
        }
    }

    /// Match a provider label: a category name or `LABEL_<n>`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if let Some(n) = label.strip_prefix("LABEL_") {
            return n.parse().ok().and_then(Self::from_index);
        }
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Embedding ───────────────────────────────────────────────────────

/// A job description in embedding space. Always `EMBEDDING_DIM` long.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Result<Self, InferenceError> {
        if values.len() != EMBEDDING_DIM {
            return Err(InferenceError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Recommendations ─────────────────────────────────────────────────

/// A row returned by a similarity search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarTicket {
    pub id: String,
    pub solution_text: String,
    pub score: f32,
}

/// A past ticket whose solution is suggested for the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub reference_id: String,
    pub solution_text: String,
    pub score: f32,
}

/// Outcome of the recommendation stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationSet {
    /// Ranked by descending score, never empty.
    Matches(Vec<Recommendation>),
    /// The search ran and nothing cleared the threshold.
    Empty,
    /// The search failed; the job continues without suggestions.
    Unavailable { reason: String },
}

impl RecommendationSet {
    pub fn from_ranked(recommendations: Vec<Recommendation>) -> Self {
        if recommendations.is_empty() {
            Self::Empty
        } else {
            Self::Matches(recommendations)
        }
    }

    pub fn entries(&self) -> &[Recommendation] {
        match self {
            Self::Matches(r) => r,
            Self::Empty | Self::Unavailable { .. } => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Matches(_) => "matches",
            Self::Empty => "empty",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

// ── Enrichment record ───────────────────────────────────────────────

/// Lifecycle status written with every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Draft,
}

impl LifecycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
        }
    }
}

/// Composed output of one pipeline run, committed as a single upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentRecord {
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub ai_solution: String,
    pub embedding: EmbeddingVector,
    pub status: LifecycleStatus,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_id_keys() {
        assert_eq!(TicketId::Number(101).as_key(), "101");
        assert_eq!(TicketId::from("T-9").as_key(), "T-9");
    }

    #[test]
    fn ticket_id_deserializes_number_or_string() {
        let n: TicketId = serde_json::from_str("7").unwrap();
        assert_eq!(n, TicketId::Number(7));
        let s: TicketId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, TicketId::Text("abc".into()));
    }

    #[test]
    fn category_label_order() {
        assert_eq!(Category::from_index(0), Some(Category::Technical));
        assert_eq!(Category::from_index(1), Some(Category::Billing));
        assert_eq!(Category::from_index(2), Some(Category::General));
        assert_eq!(Category::from_index(3), None);
        for c in Category::ALL {
            assert_eq!(Category::from_index(c.index()), Some(c));
        }
    }

    #[test]
    fn category_from_provider_labels() {
        assert_eq!(Category::from_label("billing"), Some(Category::Billing));
        assert_eq!(Category::from_label("LABEL_2"), Some(Category::General));
        assert_eq!(Category::from_label("LABEL_9"), None);
        assert_eq!(Category::from_label("Sales"), None);
    }

    #[test]
    fn embedding_requires_fixed_dimension() {
        assert!(EmbeddingVector::new(vec![0.0; EMBEDDING_DIM]).is_ok());
        let err = EmbeddingVector::new(vec![0.0; 12]).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: 12
            }
        ));
    }

    #[test]
    fn embedding_serializes_as_plain_array() {
        let v = EmbeddingVector::new(vec![0.5; EMBEDDING_DIM]).unwrap();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json.as_array().unwrap().len(), EMBEDDING_DIM);
    }

    #[test]
    fn recommendation_set_from_ranked() {
        assert_eq!(RecommendationSet::from_ranked(vec![]), RecommendationSet::Empty);
        let set = RecommendationSet::from_ranked(vec![Recommendation {
            reference_id: "1".into(),
            solution_text: "Restart".into(),
            score: 0.9,
        }]);
        assert_eq!(set.label(), "matches");
        assert_eq!(set.entries().len(), 1);
        let degraded = RecommendationSet::Unavailable {
            reason: "down".into(),
        };
        assert!(degraded.entries().is_empty());
    }

    #[test]
    fn lifecycle_status_is_draft() {
        assert_eq!(LifecycleStatus::Draft.as_str(), "draft");
        assert_eq!(
            serde_json::to_value(LifecycleStatus::Draft).unwrap(),
            serde_json::json!("draft")
        );
    }
}
