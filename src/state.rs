//! Process-wide service registry.
//!
//! Every service the API layer touches is owned here, initialized once
//! at startup in dependency order and dropped in reverse. Handlers
//! receive `&AppState`; nothing reaches for hidden globals.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::SidecarConfig;
use crate::detection::llm::LlmDetector;
use crate::detection::ner::NerDetector;
use crate::detection::orchestrator::Orchestrator;
use crate::detection::{Action, Language, PageData};
use crate::vault::Vault;

/// One ingested document as the external file layer handed it over.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub pages: Vec<PageData>,
    pub language: Option<Language>,
    /// User action overrides keyed by stable region id
    pub action_overrides: HashMap<String, Action>,
}

pub struct AppState {
    pub config: SidecarConfig,
    pub vault: Arc<Vault>,
    pub orchestrator: Arc<Orchestrator>,
    pub documents: RwLock<HashMap<String, DocumentEntry>>,
}

impl AppState {
    /// Wire the sidecar together. The NER and LLM detectors are
    /// capabilities: pass `None` for whichever runtime is absent and
    /// detection runs with the remaining stages.
    pub fn initialize(
        config: SidecarConfig,
        ner: Option<NerDetector>,
        llm: Option<LlmDetector>,
    ) -> Self {
        let vault = Arc::new(Vault::new(
            config.vault_path.clone(),
            &config.token_prefix,
        ));
        let orchestrator = Arc::new(Orchestrator::new(config.detection.clone(), ner, llm));

        Self {
            config,
            vault,
            orchestrator,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Teardown in reverse initialization order. The vault is locked
    /// first so key material is zeroized before anything else unwinds.
    pub fn shutdown(&self) {
        self.vault.lock();
        tracing::info!("sidecar services shut down");
    }
}
