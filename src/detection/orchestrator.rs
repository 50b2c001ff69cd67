//! Per-page detection driver.
//!
//! For each page the enabled detectors fan out concurrently, their output
//! is merged, and progress is published into a shared map the API layer
//! polls. Work on one document id is serialized by a per-doc lock; the
//! LLM backend is additionally serialized process-wide through a depth-1
//! FIFO gate so a slow model never runs twice at once.
//!
//! Cancellation is two-level: the document loop checks the cancel token
//! between pages, and the token is threaded into every in-flight
//! detector call, which must wind down within `CANCEL_GRACE_SECS`. A
//! detector that keeps running past the grace period is aborted and the
//! page completes with whatever the others returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::audit::{self, AuditKind};
use crate::config::DetectionConfig;
use crate::constants::{CANCEL_GRACE_SECS, CANCEL_POLL_MS, PAGE_BUDGET_SECS};
use crate::detection::llm::LlmDetector;
use crate::detection::merge::{self, MergeConfig};
use crate::detection::ner::NerDetector;
use crate::detection::regex_detector::RegexDetector;
use crate::detection::{Action, CancelToken, Detection, Language, PageData, PiiRegion};
use crate::errors::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionProgress {
    pub doc_id: String,
    pub page_done: u32,
    pub page_total: u32,
    pub regions_so_far: usize,
}

/// Why an in-flight detector was interrupted.
enum Interrupt {
    Budget,
    Cancelled,
}

pub struct Orchestrator {
    config: DetectionConfig,
    regex: Option<RegexDetector>,
    ner: Option<Arc<NerDetector>>,
    llm: Option<Arc<LlmDetector>>,
    /// Depth-1 FIFO admission to the LLM backend
    llm_gate: Arc<Mutex<()>>,
    progress: RwLock<HashMap<String, DetectionProgress>>,
    doc_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cancel_flags: Mutex<HashMap<String, CancelToken>>,
    page_budget: Duration,
}

impl Orchestrator {
    pub fn new(
        config: DetectionConfig,
        ner: Option<NerDetector>,
        llm: Option<LlmDetector>,
    ) -> Self {
        let regex = config
            .regex_enabled
            .then(|| RegexDetector::new(config.context_boost));
        let ner = if config.ner_enabled { ner } else { None };
        let llm = if config.llm_enabled { llm } else { None };
        Self {
            config,
            regex,
            ner: ner.map(Arc::new),
            llm: llm.map(Arc::new),
            llm_gate: Arc::new(Mutex::new(())),
            progress: RwLock::new(HashMap::new()),
            doc_locks: Mutex::new(HashMap::new()),
            cancel_flags: Mutex::new(HashMap::new()),
            page_budget: Duration::from_secs(PAGE_BUDGET_SECS),
        }
    }

    #[cfg(test)]
    fn with_page_budget(mut self, budget: Duration) -> Self {
        self.page_budget = budget;
        self
    }

    /// Progress snapshot for a running or finished detection.
    pub async fn progress(&self, doc_id: &str) -> Option<DetectionProgress> {
        self.progress.read().await.get(doc_id).cloned()
    }

    /// Request cooperative cancellation of a running detection. In-flight
    /// detectors see the token trip and must return within the grace
    /// period; the page loop stops at the next boundary. A no-op when
    /// the document is not being processed.
    pub async fn cancel(&self, doc_id: &str) {
        if let Some(token) = self.cancel_flags.lock().await.get(doc_id) {
            token.cancel();
        }
    }

    /// Detect over all pages of a document. Returns the regions in
    /// deterministic `(page_number, start, end, pii_type)` order; a
    /// cancelled run returns the pages finished so far.
    pub async fn detect_document(
        &self,
        doc_id: &str,
        pages: &[PageData],
        language: Option<Language>,
        action_overrides: &HashMap<String, Action>,
    ) -> Result<Vec<PiiRegion>> {
        let doc_lock = {
            let mut locks = self.doc_locks.lock().await;
            locks
                .entry(doc_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _doc_guard = doc_lock.lock().await;

        let cancel = CancelToken::new();
        self.cancel_flags
            .lock()
            .await
            .insert(doc_id.to_string(), cancel.clone());

        audit::document_event(AuditKind::DetectionStarted, doc_id);
        self.publish(doc_id, 0, pages.len() as u32, 0).await;

        let mut regions: Vec<PiiRegion> = Vec::new();
        let mut cancelled = false;

        for (index, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let page_regions = self
                .detect_page(doc_id, page, language, action_overrides, &cancel)
                .await;
            regions.extend(page_regions);

            self.publish(doc_id, index as u32 + 1, pages.len() as u32, regions.len())
                .await;
        }

        self.cancel_flags.lock().await.remove(doc_id);

        if cancelled {
            audit::document_event(AuditKind::DetectionCancelled, doc_id);
        } else {
            audit::document_event(AuditKind::DetectionCompleted, doc_id);
        }

        Ok(regions)
    }

    /// Fan the enabled detectors out over one page, bounded by the page
    /// wall-clock budget and the cancel grace period. A detector missing
    /// either bound is aborted and contributes nothing; the page still
    /// merges what the others returned and a Degraded event is emitted.
    async fn detect_page(
        &self,
        doc_id: &str,
        page: &PageData,
        language: Option<Language>,
        action_overrides: &HashMap<String, Action>,
        cancel: &CancelToken,
    ) -> Vec<PiiRegion> {
        let deadline = Instant::now() + self.page_budget;
        let mut detections: Vec<Detection> = Vec::new();
        let mut degraded: Option<&'static str> = None;
        let mut cancelled = false;

        if let Some(regex) = &self.regex {
            detections.extend(regex.detect(&page.full_text, language));
        }

        let ner_task = self.ner.as_ref().map(|ner| {
            let ner = ner.clone();
            let text = page.full_text.clone();
            let lang = language.unwrap_or(Language::En);
            let token = cancel.clone();
            tokio::spawn(async move { ner.detect(&text, lang, &token).await })
        });

        let llm_task = self.llm.as_ref().map(|llm| {
            let llm = llm.clone();
            let gate = self.llm_gate.clone();
            let text = page.full_text.clone();
            let lang = language.unwrap_or(Language::En);
            let token = cancel.clone();
            tokio::spawn(async move {
                let _admitted = gate.lock().await;
                llm.detect(&text, lang, &token).await
            })
        });

        if let Some(mut task) = ner_task {
            tokio::select! {
                joined = &mut task => match joined {
                    Ok(Ok(found)) => detections.extend(found),
                    Ok(Err(e)) => {
                        tracing::error!(error_type = e.kind(), doc_id = doc_id, "NER detector failed");
                        degraded = Some("ner_failed");
                    }
                    Err(_) => degraded = Some("ner_panicked"),
                },
                interrupt = interrupted(deadline, cancel.clone()) => {
                    task.abort();
                    match interrupt {
                        Interrupt::Budget => degraded = Some("page_budget_exhausted"),
                        Interrupt::Cancelled => {
                            degraded = Some("cancelled");
                            cancelled = true;
                        }
                    }
                }
            }
        }

        if let Some(mut task) = llm_task {
            // Once the grace period has been spent on one detector, the
            // rest of the page's in-flight work is cut off immediately.
            if cancelled {
                task.abort();
            } else {
                tokio::select! {
                    joined = &mut task => match joined {
                        Ok(found) => detections.extend(found),
                        Err(_) => degraded = Some("llm_panicked"),
                    },
                    interrupt = interrupted(deadline, cancel.clone()) => {
                        task.abort();
                        degraded = Some(match interrupt {
                            Interrupt::Budget => "page_budget_exhausted",
                            Interrupt::Cancelled => "cancelled",
                        });
                    }
                }
            }
        }

        if let Some(reason) = degraded {
            audit::degraded(doc_id, page.page_number, reason);
        }

        merge::merge_page(
            detections,
            page,
            action_overrides,
            MergeConfig {
                confidence_threshold: self.config.confidence_threshold,
                date_money_threshold: self.config.date_money_threshold,
            },
        )
    }

    async fn publish(&self, doc_id: &str, page_done: u32, page_total: u32, regions_so_far: usize) {
        self.progress.write().await.insert(
            doc_id.to_string(),
            DetectionProgress {
                doc_id: doc_id.to_string(),
                page_done,
                page_total,
                regions_so_far,
            },
        );
    }
}

/// Resolves when the page budget runs out, or when the cancel token has
/// tripped and the grace period for in-flight work has elapsed.
async fn interrupted(deadline: Instant, cancel: CancelToken) -> Interrupt {
    let cancel_watch = async {
        loop {
            if cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_secs(CANCEL_GRACE_SECS)).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(CANCEL_POLL_MS)).await;
        }
    };
    tokio::select! {
        _ = cancel_watch => Interrupt::Cancelled,
        _ = tokio::time::sleep_until(deadline) => Interrupt::Budget,
    }
}
