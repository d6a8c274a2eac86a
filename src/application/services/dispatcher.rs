use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    application::services::FlashcardSink,
    domain::{normalize_topic_tag, AcceptedCard, DeliveryResult, DomainError},
};

/// Delivers accepted cards to the sink, one container per topic.
///
/// Every card gets at most one delivery attempt. Failures are recorded in the
/// returned results and never stop the rest of the batch.
pub struct SyncDispatcher {
    sink: Arc<dyn FlashcardSink>,
}

impl SyncDispatcher {
    pub fn new(sink: Arc<dyn FlashcardSink>) -> Self {
        Self { sink }
    }

    /// Returns one result per input card, in input order.
    pub fn dispatch(&self, cards: &[AcceptedCard]) -> Vec<DeliveryResult> {
        let mut results: Vec<Option<DeliveryResult>> = vec![None; cards.len()];

        for (topic, members) in group_by_topic(cards) {
            if let Err(err) = self.sink.ensure_container(topic) {
                let err = match err {
                    DomainError::ContainerCreationFailed(_) => err,
                    other => DomainError::container(other.to_string()),
                };
                warn!(topic = %topic, error = %err, cards = members.len(), "container unavailable");
                for idx in members {
                    results[idx] = Some(DeliveryResult::failed(&cards[idx], &err));
                }
                continue;
            }

            let tags = vec![normalize_topic_tag(topic)];
            for idx in members {
                let card = &cards[idx];
                let outcome = self
                    .sink
                    .add_card(topic, &card.card.question, &card.card.answer, &tags);

                results[idx] = Some(match outcome {
                    Ok(()) => {
                        info!(topic = %topic, question = %preview(&card.card.question), "card delivered");
                        DeliveryResult::delivered(card)
                    }
                    Err(err) => {
                        let err = match err {
                            DomainError::DeliveryFailed(_) => err,
                            other => DomainError::delivery(other.to_string()),
                        };
                        warn!(topic = %topic, unit = %card.source_position, error = %err, "card delivery failed");
                        DeliveryResult::failed(card, &err)
                    }
                });
            }
        }

        results.into_iter().flatten().collect()
    }
}

/// Topics in first-seen order, each with its card indices in input order.
fn group_by_topic(cards: &[AcceptedCard]) -> Vec<(&str, Vec<usize>)> {
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (idx, card) in cards.iter().enumerate() {
        match groups.iter_mut().find(|(topic, _)| *topic == card.topic()) {
            Some((_, members)) => members.push(idx),
            None => groups.push((card.topic(), vec![idx])),
        }
    }
    groups
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        short.push_str("...");
    }
    short
}
