use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DeliveryResult, DomainError};

/// What happened to one text unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
    Processed,
    SkippedNotNovel { nearest_similarity: Option<f32> },
    SkippedBlank,
    Failed { reason: String, detail: String },
    Cancelled { detail: String },
}

impl UnitOutcome {
    pub fn from_error(err: &DomainError) -> Self {
        match err {
            DomainError::Cancelled(detail) => Self::Cancelled {
                detail: detail.clone(),
            },
            other => Self::Failed {
                reason: other.kind().to_string(),
                detail: other.to_string(),
            },
        }
    }
}

/// A concept that produced no candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptFailure {
    pub concept: String,
    pub reason: String,
    pub detail: String,
}

/// Per-unit counters and outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub position: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
    pub topic: Option<String>,
    pub concepts: usize,
    pub candidates: usize,
    pub rejected: usize,
    pub accepted: usize,
    pub concept_failures: Vec<ConceptFailure>,
    pub indexed: bool,
}

impl UnitReport {
    pub fn new(position: impl Into<String>, outcome: UnitOutcome) -> Self {
        Self {
            position: position.into(),
            outcome,
            topic: None,
            concepts: 0,
            candidates: 0,
            rejected: 0,
            accepted: 0,
            concept_failures: Vec::new(),
            indexed: false,
        }
    }
}

/// Number of delivered cards per topic, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCoverage {
    pub topic: String,
    pub delivered: usize,
    pub failed: usize,
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub units_total: usize,
    pub units_processed: usize,
    pub units_skipped_not_novel: usize,
    pub units_skipped_blank: usize,
    pub units_failed: usize,
    pub units_cancelled: usize,
    pub concepts_extracted: usize,
    pub candidates_generated: usize,
    pub candidates_rejected: usize,
    pub concept_failures: usize,
    pub cards_accepted: usize,
    pub cards_delivered: usize,
    pub cards_failed: usize,
}

/// Full structured outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub coverage: Vec<TopicCoverage>,
    pub units: Vec<UnitReport>,
    pub deliveries: Vec<DeliveryResult>,
    pub index_persist_error: Option<String>,
}

impl RunReport {
    pub fn build(
        started_at: DateTime<Utc>,
        units: Vec<UnitReport>,
        deliveries: Vec<DeliveryResult>,
        index_persist_error: Option<String>,
    ) -> Self {
        let mut summary = RunSummary {
            units_total: units.len(),
            ..RunSummary::default()
        };

        for unit in &units {
            match unit.outcome {
                UnitOutcome::Processed => summary.units_processed += 1,
                UnitOutcome::SkippedNotNovel { .. } => summary.units_skipped_not_novel += 1,
                UnitOutcome::SkippedBlank => summary.units_skipped_blank += 1,
                UnitOutcome::Failed { .. } => summary.units_failed += 1,
                UnitOutcome::Cancelled { .. } => summary.units_cancelled += 1,
            }
            summary.concepts_extracted += unit.concepts;
            summary.candidates_generated += unit.candidates;
            summary.candidates_rejected += unit.rejected;
            summary.concept_failures += unit.concept_failures.len();
            summary.cards_accepted += unit.accepted;
        }

        let mut coverage: Vec<TopicCoverage> = Vec::new();
        for delivery in &deliveries {
            let idx = match coverage.iter().position(|c| c.topic == delivery.topic) {
                Some(idx) => idx,
                None => {
                    coverage.push(TopicCoverage {
                        topic: delivery.topic.clone(),
                        delivered: 0,
                        failed: 0,
                    });
                    coverage.len() - 1
                }
            };
            if delivery.is_delivered() {
                summary.cards_delivered += 1;
                coverage[idx].delivered += 1;
            } else {
                summary.cards_failed += 1;
                coverage[idx].failed += 1;
            }
        }

        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            summary,
            coverage,
            units,
            deliveries,
            index_persist_error,
        }
    }
}
