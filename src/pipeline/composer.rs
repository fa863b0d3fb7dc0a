//! Result composer: stage outputs to a single `EnrichmentRecord`. No I/O.

use chrono::{DateTime, Utc};

use crate::pipeline::types::{
    Category, EmbeddingVector, EnrichmentRecord, Job, LifecycleStatus, RecommendationSet,
};

/// Heading that precedes the suggested steps in `ai_solution`.
pub const SOLUTION_HEADING: &str = "AI Suggested Next Steps:";

/// Solution text when the search found nothing above the threshold.
pub const NO_SIMILAR_TICKETS: &str = "No similar past tickets found.";

/// Solution text when the search itself failed.
pub const RECOMMENDATIONS_UNAVAILABLE: &str = "Recommendations unavailable.";

/// Compose a record stamped with the current time.
pub fn compose(
    job: &Job,
    category: Category,
    embedding: EmbeddingVector,
    recommendations: &RecommendationSet,
    summary_prefix_chars: usize,
) -> EnrichmentRecord {
    compose_at(
        job,
        category,
        embedding,
        recommendations,
        summary_prefix_chars,
        Utc::now(),
    )
}

/// Compose a record with an explicit timestamp.
pub fn compose_at(
    job: &Job,
    category: Category,
    embedding: EmbeddingVector,
    recommendations: &RecommendationSet,
    summary_prefix_chars: usize,
    now: DateTime<Utc>,
) -> EnrichmentRecord {
    let prefix: String = job.description.chars().take(summary_prefix_chars).collect();

    EnrichmentRecord {
        title: format!("[{category}] Automated Ticket"),
        summary: format!("User reported a {category} issue: {prefix}..."),
        category,
        ai_solution: format!("{SOLUTION_HEADING}\n{}", solution_lines(recommendations)),
        embedding,
        status: LifecycleStatus::Draft,
        updated_at: now,
    }
}

fn solution_lines(recommendations: &RecommendationSet) -> String {
    match recommendations {
        RecommendationSet::Matches(entries) => entries
            .iter()
            .map(|r| format!("- (Ticket #{}) {}", r.reference_id, r.solution_text))
            .collect::<Vec<_>>()
            .join("\n"),
        RecommendationSet::Empty => NO_SIMILAR_TICKETS.to_string(),
        RecommendationSet::Unavailable { .. } => RECOMMENDATIONS_UNAVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{EMBEDDING_DIM, Recommendation};

    fn job(description: &str) -> Job {
        Job {
            ticket_id: 101.into(),
            description: description.into(),
        }
    }

    fn embedding() -> EmbeddingVector {
        EmbeddingVector::new(vec![0.25; EMBEDDING_DIM]).unwrap()
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-15T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn title_and_summary_format() {
        let record = compose_at(
            &job("The printer on the 2nd floor is jamming and making a loud noise when printing PDF files."),
            Category::Technical,
            embedding(),
            &RecommendationSet::Empty,
            60,
            fixed_time(),
        );
        assert_eq!(record.title, "[Technical] Automated Ticket");
        assert_eq!(
            record.summary,
            "User reported a Technical issue: The printer on the 2nd floor is jamming and making a loud no..."
        );
        assert_eq!(record.status, LifecycleStatus::Draft);
        assert_eq!(record.updated_at, fixed_time());
        assert_eq!(record.embedding.len(), EMBEDDING_DIM);
    }

    #[test]
    fn short_description_still_gets_ellipsis() {
        let record = compose_at(
            &job("Refund"),
            Category::Billing,
            embedding(),
            &RecommendationSet::Empty,
            60,
            fixed_time(),
        );
        assert_eq!(record.summary, "User reported a Billing issue: Refund...");
    }

    #[test]
    fn summary_prefix_counts_chars_not_bytes() {
        let record = compose_at(
            &job("ñandú ñandú"),
            Category::General,
            embedding(),
            &RecommendationSet::Empty,
            4,
            fixed_time(),
        );
        assert!(record.summary.ends_with(": ñand..."));
    }

    #[test]
    fn empty_recommendations_use_placeholder() {
        let record = compose_at(
            &job("x"),
            Category::General,
            embedding(),
            &RecommendationSet::Empty,
            60,
            fixed_time(),
        );
        assert_eq!(
            record.ai_solution,
            "AI Suggested Next Steps:\nNo similar past tickets found."
        );
    }

    #[test]
    fn unavailable_recommendations_use_placeholder() {
        let record = compose_at(
            &job("x"),
            Category::General,
            embedding(),
            &RecommendationSet::Unavailable {
                reason: "timeout".into(),
            },
            60,
            fixed_time(),
        );
        assert!(record.ai_solution.ends_with(RECOMMENDATIONS_UNAVAILABLE));
    }

    #[test]
    fn matches_become_bullet_lines() {
        let set = RecommendationSet::Matches(vec![
            Recommendation {
                reference_id: "12".into(),
                solution_text: "Clear the paper path".into(),
                score: 0.93,
            },
            Recommendation {
                reference_id: "40".into(),
                solution_text: "Replace the fuser".into(),
                score: 0.81,
            },
        ]);
        let record = compose_at(
            &job("printer jam"),
            Category::Technical,
            embedding(),
            &set,
            60,
            fixed_time(),
        );
        assert_eq!(
            record.ai_solution,
            "AI Suggested Next Steps:\n- (Ticket #12) Clear the paper path\n- (Ticket #40) Replace the fuser"
        );
    }

    #[test]
    fn composition_is_deterministic_for_fixed_clock() {
        let a = compose_at(
            &job("same"),
            Category::Billing,
            embedding(),
            &RecommendationSet::Empty,
            60,
            fixed_time(),
        );
        let b = compose_at(
            &job("same"),
            Category::Billing,
            embedding(),
            &RecommendationSet::Empty,
            60,
            fixed_time(),
        );
        assert_eq!(a, b);
    }
}
