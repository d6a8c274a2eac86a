use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    application::{
        dtos::{ConceptFailure, RunReport, UnitOutcome, UnitReport},
        services::{
            CardSynthesizer, ConceptExtractor, NoveltyFilter, SyncDispatcher, TopicAssigner,
        },
    },
    domain::{
        AcceptedCard, CardCandidate, DomainError, EmbeddingVector, NoveltyIndexEntry, TextUnit,
    },
};

/// Which units enter the novelty index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexPolicy {
    /// Only units judged novel and fully processed.
    #[default]
    ProcessedOnly,
    /// Also units skipped as near-duplicates.
    AllAttempted,
}

/// Settings the pipeline needs at run time. Built once from `AppConfig`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub embedding_model: String,
    pub novelty: NoveltyFilter,
    pub index_policy: IndexPolicy,
}

impl ServiceConfig {
    pub fn new(
        embedding_model: impl Into<String>,
        novelty: NoveltyFilter,
        index_policy: IndexPolicy,
    ) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            novelty,
            index_policy,
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Abstraction over any embedding engine (hash, OpenAI, fastembed).
pub trait EmbeddingEngine: Send + Sync {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError>;

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Persistent nearest-neighbor store of previously accepted units.
pub trait NoveltyIndex: Send + Sync {
    /// Up to `k` neighbors sorted by descending similarity.
    fn query(
        &self,
        embedding: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<(f32, NoveltyIndexEntry)>, DomainError>;

    /// Create-only insert; an existing position yields `DuplicateEntry`.
    fn insert(&self, entry: &NoveltyIndexEntry) -> Result<(), DomainError>;

    fn len(&self) -> Result<usize, DomainError>;

    /// Flush to durable storage.
    fn persist(&self) -> Result<(), DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}

/// Text completion capability.
pub trait CompletionEngine: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, DomainError>;
}

/// Remote flashcard store. Both calls are idempotent on the sink side.
pub trait FlashcardSink: Send + Sync {
    fn ensure_container(&self, name: &str) -> Result<(), DomainError>;

    fn add_card(
        &self,
        container: &str,
        question: &str,
        answer: &str,
        tags: &[String],
    ) -> Result<(), DomainError>;
}

/// Deterministic accept/reject gate on a candidate.
pub trait QualityValidator: Send + Sync {
    fn validate(&self, candidate: &CardCandidate) -> bool;
}

/// Caller-supplied cancellation signal and optional per-unit time budget.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    token: CancellationToken,
    unit_budget: Option<Duration>,
}

impl RunControl {
    pub fn new(token: CancellationToken, unit_budget: Option<Duration>) -> Self {
        Self { token, unit_budget }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn unit_guard(&self) -> UnitGuard {
        UnitGuard {
            token: self.token.clone(),
            deadline: self.unit_budget.map(|budget| (Instant::now() + budget, budget)),
        }
    }
}

/// Checked between the blocking steps of one unit.
pub struct UnitGuard {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl UnitGuard {
    pub fn check(&self) -> Result<(), DomainError> {
        if self.token.is_cancelled() {
            return Err(DomainError::cancelled("run cancelled"));
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(DomainError::cancelled(format!(
                    "unit exceeded time budget of {budget:?}"
                )));
            }
        }
        Ok(())
    }
}

/// The orchestrator: embed, filter, extract, synthesize, validate, index,
/// and finally dispatch.
pub struct PipelineService {
    embedder: Arc<dyn EmbeddingEngine>,
    index: Arc<dyn NoveltyIndex>,
    extractor: ConceptExtractor,
    synthesizer: CardSynthesizer,
    topics: TopicAssigner,
    validator: Arc<dyn QualityValidator>,
    dispatcher: SyncDispatcher,
    config: ServiceConfig,
}

impl PipelineService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        index: Arc<dyn NoveltyIndex>,
        extractor: ConceptExtractor,
        synthesizer: CardSynthesizer,
        topics: TopicAssigner,
        validator: Arc<dyn QualityValidator>,
        dispatcher: SyncDispatcher,
        config: ServiceConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            extractor,
            synthesizer,
            topics,
            validator,
            dispatcher,
            config,
        }
    }

    /// Processes `units` in order and delivers the accepted cards.
    ///
    /// Only an unreachable index at start aborts the run; every other failure
    /// is recorded against its unit, concept, topic, or card.
    pub fn run(&self, units: &[TextUnit], control: &RunControl) -> Result<RunReport, DomainError> {
        let started_at = Utc::now();
        self.index.ping()?;

        let mut reports = Vec::with_capacity(units.len());
        let mut accepted: Vec<AcceptedCard> = Vec::new();

        for unit in units {
            if control.is_cancelled() {
                reports.push(UnitReport::new(
                    &unit.position,
                    UnitOutcome::Cancelled {
                        detail: "run cancelled".into(),
                    },
                ));
                continue;
            }

            let (report, cards) = self.process_unit(unit, &control.unit_guard());
            debug!(unit = %unit.position, outcome = ?report.outcome, cards = cards.len(), "unit finished");
            accepted.extend(cards);
            reports.push(report);
        }

        let deliveries = self.dispatcher.dispatch(&accepted);

        let index_persist_error = match self.index.persist() {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "failed to persist novelty index");
                Some(err.to_string())
            }
        };

        let report = RunReport::build(started_at, reports, deliveries, index_persist_error);
        info!(
            run = %report.run_id,
            processed = report.summary.units_processed,
            skipped = report.summary.units_skipped_not_novel,
            failed = report.summary.units_failed,
            delivered = report.summary.cards_delivered,
            delivery_failures = report.summary.cards_failed,
            "pipeline run complete"
        );
        Ok(report)
    }

    /// Runs one unit end to end. Cards are returned only when the unit
    /// completed; a failed or cancelled unit contributes nothing and is not
    /// indexed.
    fn process_unit(&self, unit: &TextUnit, guard: &UnitGuard) -> (UnitReport, Vec<AcceptedCard>) {
        if unit.is_blank() {
            return (
                UnitReport::new(&unit.position, UnitOutcome::SkippedBlank),
                Vec::new(),
            );
        }

        let mut report = UnitReport::new(&unit.position, UnitOutcome::Processed);
        match self.generate(unit, guard, &mut report) {
            Ok(cards) => (report, cards),
            Err(err) => {
                warn!(unit = %unit.position, error = %err, "unit aborted");
                report.outcome = UnitOutcome::from_error(&err);
                report.accepted = 0;
                (report, Vec::new())
            }
        }
    }

    fn generate(
        &self,
        unit: &TextUnit,
        guard: &UnitGuard,
        report: &mut UnitReport,
    ) -> Result<Vec<AcceptedCard>, DomainError> {
        guard.check()?;
        let embedding = self.embed(unit)?;

        guard.check()?;
        let decision = self.config.novelty.check(&embedding, self.index.as_ref())?;
        if !decision.novel {
            info!(
                unit = %unit.position,
                nearest = ?decision.nearest,
                "skipping near-duplicate unit"
            );
            report.outcome = UnitOutcome::SkippedNotNovel {
                nearest_similarity: decision.nearest,
            };
            if self.config.index_policy == IndexPolicy::AllAttempted {
                guard.check()?;
                report.indexed = self.index_unit(unit, embedding)?;
            }
            return Ok(Vec::new());
        }

        guard.check()?;
        let concepts = self.extractor.extract(unit)?;
        report.concepts = concepts.len();

        let mut cards = Vec::new();
        if !concepts.is_empty() {
            guard.check()?;
            let topic = self.topics.assign(unit);
            report.topic = Some(topic.clone());

            for concept in &concepts {
                guard.check()?;
                let pair = match self.synthesizer.synthesize(concept, &unit.text) {
                    Ok(pair) => pair,
                    Err(err) => {
                        debug!(unit = %unit.position, concept = %concept.as_str(), error = %err, "concept skipped");
                        report.concept_failures.push(ConceptFailure {
                            concept: concept.as_str().to_string(),
                            reason: err.kind().to_string(),
                            detail: err.to_string(),
                        });
                        continue;
                    }
                };

                report.candidates += 1;
                let candidate = pair.into_candidate(topic.clone());
                if self.validator.validate(&candidate) {
                    cards.push(AcceptedCard::new(candidate, &unit.position));
                } else {
                    report.rejected += 1;
                }
            }
        }

        guard.check()?;
        report.indexed = self.index_unit(unit, embedding)?;
        report.accepted = cards.len();
        Ok(cards)
    }

    fn embed(&self, unit: &TextUnit) -> Result<EmbeddingVector, DomainError> {
        let model = self.config.embedding_model();
        let vector = self.embedder.embed(model, &unit.text)?;
        Ok(EmbeddingVector::new(model, vector))
    }

    /// Returns whether a new entry was written. An entry already stored under
    /// the same position is left untouched.
    fn index_unit(&self, unit: &TextUnit, embedding: EmbeddingVector) -> Result<bool, DomainError> {
        match self.index.insert(&NoveltyIndexEntry::new(unit, embedding)) {
            Ok(()) => Ok(true),
            Err(DomainError::DuplicateEntry(detail)) => {
                warn!(unit = %unit.position, detail = %detail, "position already indexed");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embedder.dims(self.config.embedding_model())
    }

    pub fn default_topic(&self) -> &str {
        self.topics.default_topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::LengthHeuristicValidator;
    use crate::domain::DeliveryStatus;
    use crate::infrastructure::{FixedWindowChunker, InMemoryNoveltyIndex, SimpleEmbedEngine};
    use crate::test_support::{RecordingSink, ScriptedCompletion, UnavailableIndex};

    const MODEL: &str = "test/simple-hash";
    const UNIT_TEXT: &str = "Processes are isolated execution contexts.";

    fn long_card(question: &str) -> String {
        format!(
            "Q: {question} What does the operating system provide to each process?\nA: {}",
            "Each process receives a private virtual address space and its own register state. "
                .repeat(2)
        )
    }

    struct Harness {
        llm: Arc<ScriptedCompletion>,
        index: Arc<InMemoryNoveltyIndex>,
        sink: Arc<RecordingSink>,
        policy: IndexPolicy,
        k: usize,
    }

    impl Harness {
        fn new(responses: Vec<String>) -> Self {
            Self {
                llm: Arc::new(ScriptedCompletion::new(responses)),
                index: Arc::new(InMemoryNoveltyIndex::new()),
                sink: Arc::new(RecordingSink::default()),
                policy: IndexPolicy::ProcessedOnly,
                k: 1,
            }
        }

        fn service(&self) -> PipelineService {
            self.service_with_index(self.index.clone())
        }

        fn service_with_index(&self, index: Arc<dyn NoveltyIndex>) -> PipelineService {
            PipelineService::new(
                Arc::new(SimpleEmbedEngine::try_new(MODEL, 64).unwrap()),
                index,
                ConceptExtractor::new(self.llm.clone()),
                CardSynthesizer::new(self.llm.clone()),
                TopicAssigner::fixed("OSTEP"),
                Arc::new(LengthHeuristicValidator::default()),
                SyncDispatcher::new(self.sink.clone()),
                ServiceConfig::new(
                    MODEL,
                    NoveltyFilter::new(self.k, 0.85).unwrap(),
                    self.policy,
                ),
            )
        }
    }

    #[test]
    fn test_novel_unit_produces_delivered_cards() {
        let harness = Harness::new(vec![
            "Process isolation\nAddress spaces".into(),
            long_card("Why isolate?"),
            long_card("What is an address space?"),
        ]);
        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &RunControl::default())
            .unwrap();

        assert_eq!(report.summary.units_processed, 1);
        assert_eq!(report.summary.concepts_extracted, 2);
        assert_eq!(report.summary.cards_delivered, 2);
        assert!(report.units[0].indexed);
        assert_eq!(harness.index.len().unwrap(), 1);
        assert_eq!(harness.sink.cards().len(), 2);
        assert_eq!(report.coverage[0].topic, "OSTEP");
        assert_eq!(report.coverage[0].delivered, 2);
    }

    #[test]
    fn test_repeated_unit_is_skipped() {
        let harness = Harness::new(vec!["Process isolation".into(), long_card("Why?")]);
        let units = [
            TextUnit::new("doc#0", UNIT_TEXT),
            TextUnit::new("doc#1", UNIT_TEXT),
        ];
        let report = harness.service().run(&units, &RunControl::default()).unwrap();

        assert_eq!(report.summary.units_processed, 1);
        assert_eq!(report.summary.units_skipped_not_novel, 1);
        assert_eq!(report.summary.concepts_extracted, 1);
        assert_eq!(harness.llm.calls(), 2);
        match &report.units[1].outcome {
            UnitOutcome::SkippedNotNovel { nearest_similarity } => {
                assert!(nearest_similarity.unwrap() > 0.99)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!report.units[1].indexed);
        assert_eq!(harness.index.len().unwrap(), 1);
    }

    #[test]
    fn test_edited_document_is_indexed_once_then_skipped() {
        let harness = Harness::new(vec![
            "Process isolation".into(),
            long_card("Why isolate?"),
            "Thread scheduling".into(),
            long_card("Who picks the next thread?"),
        ]);
        let chunker = FixedWindowChunker::new(1000, 100).unwrap();
        let service = harness.service();
        let original = chunker.chunk("notes", UNIT_TEXT);
        let edited = chunker.chunk("notes", "The scheduler picks the next runnable thread.");

        let first = service.run(&original, &RunControl::default()).unwrap();
        assert_eq!(first.summary.units_processed, 1);

        let second = service.run(&edited, &RunControl::default()).unwrap();
        assert_eq!(second.summary.units_processed, 1);
        assert!(second.units[0].indexed);

        let third = service.run(&edited, &RunControl::default()).unwrap();
        assert_eq!(third.summary.units_skipped_not_novel, 1);
        assert_eq!(third.summary.cards_delivered, 0);

        assert_eq!(harness.index.len().unwrap(), 2);
        assert_eq!(harness.sink.cards().len(), 2);
        assert_eq!(harness.llm.calls(), 4);
    }

    #[test]
    fn test_all_attempted_policy_indexes_skipped_units() {
        let mut harness = Harness::new(vec!["Process isolation".into(), long_card("Why?")]);
        harness.policy = IndexPolicy::AllAttempted;
        let units = [
            TextUnit::new("doc#0", UNIT_TEXT),
            TextUnit::new("doc#1", UNIT_TEXT),
        ];
        let report = harness.service().run(&units, &RunControl::default()).unwrap();

        assert!(report.units[1].indexed);
        assert_eq!(harness.index.len().unwrap(), 2);
    }

    #[test]
    fn test_zero_concepts_short_circuits_but_indexes() {
        let harness = Harness::new(vec!["  \n".into()]);
        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &RunControl::default())
            .unwrap();

        assert_eq!(report.units[0].outcome, UnitOutcome::Processed);
        assert_eq!(report.summary.candidates_generated, 0);
        assert!(report.units[0].indexed);
        assert_eq!(harness.llm.calls(), 1);
    }

    #[test]
    fn test_extraction_failure_is_recorded_and_run_continues() {
        let harness = Harness::new(vec![]);
        harness.llm.fail_next();
        harness.llm.push("Scheduling");
        harness.llm.push(long_card("What does a scheduler do?"));

        let units = [
            TextUnit::new("doc#0", UNIT_TEXT),
            TextUnit::new("doc#1", "The scheduler picks the next runnable thread."),
        ];
        let report = harness.service().run(&units, &RunControl::default()).unwrap();

        match &report.units[0].outcome {
            UnitOutcome::Failed { reason, .. } => assert_eq!(reason, "provider_unavailable"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!report.units[0].indexed);
        assert_eq!(report.units[1].outcome, UnitOutcome::Processed);
        assert_eq!(report.summary.cards_delivered, 1);
        assert_eq!(harness.index.len().unwrap(), 1);
    }

    #[test]
    fn test_parse_failure_skips_only_that_concept() {
        let harness = Harness::new(vec![
            "First\nSecond".into(),
            "no markers here".into(),
            long_card("Second?"),
        ]);
        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &RunControl::default())
            .unwrap();

        let unit = &report.units[0];
        assert_eq!(unit.concept_failures.len(), 1);
        assert_eq!(unit.concept_failures[0].concept, "First");
        assert_eq!(unit.concept_failures[0].reason, "parse_failure");
        assert_eq!(unit.candidates, 1);
        assert_eq!(unit.accepted, 1);
    }

    #[test]
    fn test_rejected_candidates_are_counted() {
        let harness = Harness::new(vec!["Tiny".into(), "Q: X?\nA: Y.".into()]);
        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &RunControl::default())
            .unwrap();

        assert_eq!(report.summary.candidates_generated, 1);
        assert_eq!(report.summary.candidates_rejected, 1);
        assert_eq!(report.summary.cards_accepted, 0);
        assert!(harness.sink.cards().is_empty());
    }

    #[test]
    fn test_blank_unit_never_reaches_extractor() {
        let harness = Harness::new(vec![]);
        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", " \n\t ")], &RunControl::default())
            .unwrap();

        assert_eq!(report.units[0].outcome, UnitOutcome::SkippedBlank);
        assert_eq!(harness.llm.calls(), 0);
    }

    #[test]
    fn test_cancelled_run_indexes_nothing() {
        let harness = Harness::new(vec!["Concept".into(), long_card("Why?")]);
        let control = RunControl::default();
        control.token().cancel();

        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &control)
            .unwrap();

        assert_eq!(report.summary.units_cancelled, 1);
        assert_eq!(harness.index.len().unwrap(), 0);
        assert_eq!(harness.llm.calls(), 0);
    }

    #[test]
    fn test_exhausted_unit_budget_cancels_unit() {
        let harness = Harness::new(vec!["Concept".into(), long_card("Why?")]);
        let control = RunControl::new(CancellationToken::new(), Some(Duration::ZERO));

        let report = harness
            .service()
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &control)
            .unwrap();

        match &report.units[0].outcome {
            UnitOutcome::Cancelled { detail } => assert!(detail.contains("time budget")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!report.units[0].indexed);
        assert_eq!(harness.index.len().unwrap(), 0);
    }

    #[test]
    fn test_unreachable_index_aborts_run() {
        let harness = Harness::new(vec![]);
        let err = harness
            .service_with_index(Arc::new(UnavailableIndex))
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &RunControl::default())
            .unwrap_err();
        assert!(matches!(err, DomainError::IndexUnavailable(_)));
    }

    #[test]
    fn test_failed_container_reported_per_card() {
        let harness = Harness::new(vec!["Concept".into(), long_card("Why?")]);
        let sink = Arc::new(RecordingSink::default().refuse_container("OSTEP"));
        let service = PipelineService::new(
            Arc::new(SimpleEmbedEngine::try_new(MODEL, 64).unwrap()),
            harness.index.clone(),
            ConceptExtractor::new(harness.llm.clone()),
            CardSynthesizer::new(harness.llm.clone()),
            TopicAssigner::fixed("OSTEP"),
            Arc::new(LengthHeuristicValidator::default()),
            SyncDispatcher::new(sink),
            ServiceConfig::new(MODEL, NoveltyFilter::new(1, 0.85).unwrap(), IndexPolicy::ProcessedOnly),
        );

        let report = service
            .run(&[TextUnit::new("doc#0", UNIT_TEXT)], &RunControl::default())
            .unwrap();

        assert_eq!(report.summary.cards_failed, 1);
        assert!(matches!(
            report.deliveries[0].status,
            DeliveryStatus::Failed { .. }
        ));
        assert_eq!(report.coverage[0].failed, 1);
    }
}
