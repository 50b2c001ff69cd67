//! Generative-model PII suggestions.
//!
//! The inference backend is a capability that may or may not be present
//! at runtime. The detector runs only when the backend reports ready,
//! never retries internally, and turns any backend failure into an empty
//! result plus a structured error log; timeout and backpressure belong to
//! the orchestrator.

use async_trait::async_trait;

use crate::detection::{CancelToken, Detection, DetectionSource, Language, PiiType};
use crate::errors::Result;

/// One suggestion from the model, already offset-aligned by the backend.
#[derive(Debug, Clone)]
pub struct LlmSuggestion {
    pub pii_type: PiiType,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

/// Implementations must poll `cancel` at coarse checkpoints (between
/// generation chunks) so an in-flight call can bail out within the
/// cancel grace period.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_ready(&self) -> bool;

    async fn suggest(
        &self,
        text: &str,
        language: Language,
        cancel: &CancelToken,
    ) -> Result<Vec<LlmSuggestion>>;
}

pub struct LlmDetector {
    backend: Box<dyn LlmBackend>,
}

impl LlmDetector {
    pub fn new(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_ready()
    }

    /// Best-effort detection. A backend that is not ready or that fails
    /// yields an empty sequence; duplicates of higher-precision sources
    /// are dropped later in merge.
    pub async fn detect(
        &self,
        full_text: &str,
        language: Language,
        cancel: &CancelToken,
    ) -> Vec<Detection> {
        if !self.backend.is_ready() {
            return Vec::new();
        }

        let suggestions = match self.backend.suggest(full_text, language, cancel).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                tracing::error!(
                    error_type = e.kind(),
                    detail = %e,
                    "LLM detector failed, continuing without it"
                );
                return Vec::new();
            }
        };

        let mut detections: Vec<Detection> = suggestions
            .into_iter()
            .filter_map(|s| {
                let text = full_text.get(s.start..s.end)?;
                Some(Detection {
                    pii_type: s.pii_type,
                    text: text.to_string(),
                    start: s.start,
                    end: s.end,
                    confidence: s.confidence.clamp(0.0, 1.0),
                    source: DetectionSource::Llm,
                    bbox: None,
                })
            })
            .collect();

        detections.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.end.cmp(&b.end))
                .then(a.pii_type.cmp(&b.pii_type))
        });
        detections
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticLlmBackend;
    use super::*;

    #[tokio::test]
    async fn test_not_ready_yields_empty() {
        let detector = LlmDetector::new(Box::new(StaticLlmBackend {
            ready: false,
            suggestions: vec![],
            fail: false,
        }));
        assert!(detector
            .detect("text", Language::En, &CancelToken::new())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_yields_empty() {
        let detector = LlmDetector::new(Box::new(StaticLlmBackend {
            ready: true,
            suggestions: vec![],
            fail: true,
        }));
        assert!(detector
            .detect("text", Language::En, &CancelToken::new())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_become_llm_detections() {
        let text = "Jean Tremblay lives here";
        let detector = LlmDetector::new(Box::new(StaticLlmBackend {
            ready: true,
            suggestions: vec![LlmSuggestion {
                pii_type: PiiType::Person,
                start: 0,
                end: 13,
                confidence: 1.2,
            }],
            fail: false,
        }));
        let detections = detector
            .detect(text, Language::En, &CancelToken::new())
            .await;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "Jean Tremblay");
        assert_eq!(detections[0].source, DetectionSource::Llm);
        assert_eq!(detections[0].confidence, 1.0);
    }
}
