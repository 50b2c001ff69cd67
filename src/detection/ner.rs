//! Statistical named-entity recognition over a page.
//!
//! The recognizer itself is a capability: an implementation registers at
//! startup if its runtime prerequisites (model weights, runtime) are
//! present, and must be deterministic for a fixed input. This module owns
//! the label mapping onto the core PII enum and the per-type
//! false-positive filtering applied to the raw model output.

use async_trait::async_trait;

use crate::detection::noise;
use crate::detection::{CancelToken, Detection, DetectionSource, Language, PiiType};
use crate::errors::Result;

/// A raw entity as emitted by the underlying recognizer.
#[derive(Debug, Clone)]
pub struct NerEntity {
    /// Model label, e.g. "PER", "ORG", "LOC", "GPE", "MISC"
    pub label: String,
    pub start: usize,
    pub end: usize,
    /// The model's posterior for this entity
    pub confidence: f32,
}

/// Backend contract. Implementations must be deterministic for a fixed
/// `(text, language)` input, and must poll `cancel` at coarse
/// checkpoints (between chunks, between model batches) so an in-flight
/// call can bail out within the cancel grace period.
#[async_trait]
pub trait NerBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_ready(&self) -> bool;

    async fn recognize(
        &self,
        text: &str,
        language: Language,
        cancel: &CancelToken,
    ) -> Result<Vec<NerEntity>>;
}

/// Map a recognizer label onto the core enum. MISC and unknown labels
/// are dropped.
fn map_label(label: &str) -> Option<PiiType> {
    match label {
        "PER" | "PERSON" => Some(PiiType::Person),
        "ORG" => Some(PiiType::Org),
        "LOC" | "GPE" => Some(PiiType::Location),
        _ => None,
    }
}

pub struct NerDetector {
    backend: Box<dyn NerBackend>,
}

impl NerDetector {
    pub fn new(backend: Box<dyn NerBackend>) -> Self {
        Self { backend }
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_ready()
    }

    /// Run the recognizer and post-filter its output: label mapping, the
    /// per-type noise predicate, and for gendered/function-stopword
    /// languages a drop of hits whose whole span is a generic role noun.
    pub async fn detect(
        &self,
        full_text: &str,
        language: Language,
        cancel: &CancelToken,
    ) -> Result<Vec<Detection>> {
        let entities = self.backend.recognize(full_text, language, cancel).await?;

        let mut detections = Vec::with_capacity(entities.len());
        for entity in entities {
            let Some(pii_type) = map_label(&entity.label) else {
                continue;
            };
            let Some(text) = full_text.get(entity.start..entity.end) else {
                continue;
            };

            if noise::is_noise(pii_type, text) {
                continue;
            }
            if language == Language::Fr && noise::is_role_noun(text) {
                continue;
            }

            detections.push(Detection {
                pii_type,
                text: text.to_string(),
                start: entity.start,
                end: entity.end,
                confidence: entity.confidence,
                source: DetectionSource::Ner,
                bbox: None,
            });
        }

        detections.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.end.cmp(&b.end))
                .then(a.pii_type.cmp(&b.pii_type))
        });
        Ok(detections)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticNerBackend;
    use super::*;

    fn entity(label: &str, start: usize, end: usize) -> NerEntity {
        NerEntity {
            label: label.to_string(),
            start,
            end,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn test_label_mapping_drops_misc() {
        let text = "Jean Tremblay visited Montréal for Expo";
        let backend = StaticNerBackend {
            entities: vec![
                entity("PER", 0, 13),
                entity("LOC", 22, text.find(" for").unwrap()),
                entity("MISC", 35, 39),
            ],
        };
        let detector = NerDetector::new(Box::new(backend));
        let detections = detector
            .detect(text, Language::En, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].pii_type, PiiType::Person);
        assert_eq!(detections[1].pii_type, PiiType::Location);
        assert!(detections.iter().all(|d| d.source == DetectionSource::Ner));
    }

    #[tokio::test]
    async fn test_french_role_noun_spans_are_dropped() {
        let text = "la société exploite un restaurant";
        let backend = StaticNerBackend {
            entities: vec![entity("ORG", 0, 10)],
        };
        let detector = NerDetector::new(Box::new(backend));
        let detections = detector
            .detect(text, Language::Fr, &CancelToken::new())
            .await
            .unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_bounds_entity_is_skipped() {
        let text = "short";
        let backend = StaticNerBackend {
            entities: vec![entity("PER", 0, 100)],
        };
        let detector = NerDetector::new(Box::new(backend));
        let detections = detector
            .detect(text, Language::En, &CancelToken::new())
            .await
            .unwrap();
        assert!(detections.is_empty());
    }
}
