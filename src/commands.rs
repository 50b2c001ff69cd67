//! Sidecar API handlers.
//!
//! The HTTP router itself lives outside this crate; each handler here is
//! the typed operation behind one route, taking `&AppState` and
//! returning either a response body or a taxonomy error the router maps
//! to a status code (`Error::http_status`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::orchestrator::DetectionProgress;
use crate::detection::PiiRegion;
use crate::errors::{Error, Result};
use crate::state::{AppState, DocumentEntry};
use crate::vault::TokenEntry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ===================== Request/response bodies =====================

#[derive(Debug, Deserialize)]
pub struct PassphraseRequest {
    pub passphrase: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VaultStatusResponse {
    pub unlocked: bool,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct DetokenizeRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DetokenizeResponse {
    pub original_text: String,
    pub tokens_replaced: usize,
    pub unresolved_tokens: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileDetokenizeResponse {
    pub file_name: String,
    pub content: Vec<u8>,
    /// `X-Tokens-Replaced` response header
    pub tokens_replaced: usize,
    /// `X-Unresolved-Tokens` response header (comma-joined)
    pub unresolved_tokens: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VaultImportRequest {
    pub export_data: String,
    pub passphrase: String,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub doc_id: String,
    pub region_count: usize,
    pub regions: Vec<PiiRegion>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ===================== Vault =====================

pub async fn vault_unlock(state: &AppState, req: PassphraseRequest) -> Result<StatusResponse> {
    let vault = state.vault.clone();
    tokio::task::spawn_blocking(move || vault.unlock(&req.passphrase))
        .await
        .map_err(|e| Error::Internal(anyhow::anyhow!("unlock task failed: {e}")))??;
    Ok(StatusResponse {
        status: "ok".into(),
        message: "Vault unlocked".into(),
    })
}

pub async fn vault_status(state: &AppState) -> VaultStatusResponse {
    VaultStatusResponse {
        unlocked: state.vault.is_unlocked(),
        path: state.vault.path().display().to_string(),
    }
}

pub async fn vault_stats(
    state: &AppState,
) -> Result<std::collections::HashMap<String, usize>> {
    state.vault.stats()
}

pub async fn vault_tokens(
    state: &AppState,
    source_document: Option<&str>,
) -> Result<Vec<TokenEntry>> {
    state.vault.list_tokens(source_document)
}

pub async fn vault_export(state: &AppState, req: PassphraseRequest) -> Result<String> {
    state.vault.export(&req.passphrase)
}

pub async fn vault_import(state: &AppState, req: VaultImportRequest) -> Result<StatusResponse> {
    let added = state.vault.import(&req.export_data, &req.passphrase)?;
    Ok(StatusResponse {
        status: "ok".into(),
        message: format!("Imported {added} tokens"),
    })
}

// ===================== Detokenize =====================

pub async fn detokenize(state: &AppState, req: DetokenizeRequest) -> Result<DetokenizeResponse> {
    let (original_text, tokens_replaced, unresolved_tokens) =
        state.vault.resolve_all(&req.text)?;
    Ok(DetokenizeResponse {
        original_text,
        tokens_replaced,
        unresolved_tokens,
    })
}

/// De-tokenize an uploaded file. Plain-text formats are rewritten here;
/// structured formats (docx, xlsx, pdf) belong to the external codec
/// layer and are rejected at this boundary.
pub async fn detokenize_file(
    state: &AppState,
    file_name: &str,
    content: &[u8],
) -> Result<FileDetokenizeResponse> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "txt" | "csv" | "md" => {
            let text = String::from_utf8(content.to_vec())
                .map_err(|_| Error::InvalidInput("file is not valid UTF-8 text".into()))?;
            let (resolved, tokens_replaced, unresolved_tokens) =
                state.vault.resolve_all(&text)?;
            Ok(FileDetokenizeResponse {
                file_name: format!("detokenized_{file_name}"),
                content: resolved.into_bytes(),
                tokens_replaced,
                unresolved_tokens,
            })
        }
        other => Err(Error::InvalidInput(format!(
            "unsupported file type '.{other}' for de-tokenization"
        ))),
    }
}

// ===================== Documents / detection =====================

/// Register (or replace) a document's extracted pages. The file layer
/// calls this after text extraction; detection runs separately.
pub async fn register_document(state: &AppState, doc_id: &str, entry: DocumentEntry) {
    state
        .documents
        .write()
        .await
        .insert(doc_id.to_string(), entry);
}

pub async fn detect_document(state: &AppState, doc_id: &str) -> Result<DetectResponse> {
    let entry = {
        let documents = state.documents.read().await;
        documents
            .get(doc_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("document '{doc_id}'")))?
    };

    let regions = state
        .orchestrator
        .detect_document(doc_id, &entry.pages, entry.language, &entry.action_overrides)
        .await?;

    Ok(DetectResponse {
        doc_id: doc_id.to_string(),
        region_count: regions.len(),
        regions,
    })
}

pub async fn detection_progress(
    state: &AppState,
    doc_id: &str,
) -> Result<DetectionProgress> {
    state
        .orchestrator
        .progress(doc_id)
        .await
        .ok_or_else(|| Error::NotFound(format!("no detection run for '{doc_id}'")))
}

pub async fn cancel_detection(state: &AppState, doc_id: &str) -> StatusResponse {
    state.orchestrator.cancel(doc_id).await;
    StatusResponse {
        status: "ok".into(),
        message: "Cancellation requested".into(),
    }
}

// ===================== Health =====================

pub async fn health() -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        version: VERSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SidecarConfig;
    use crate::detection::{Language, PageData, PiiType, TextBlock};
    use crate::geometry::BBox;
    use crate::vault::crypto::KdfParams;
    use crate::vault::Vault;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        let mut config = SidecarConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.vault_path = dir.path().join("vault.db");

        let mut state = AppState::initialize(config, None, None);
        // Cheap KDF parameters keep the unlock fast in tests.
        state.vault = Arc::new(
            Vault::new(dir.path().join("vault.db"), "ANON").with_kdf(KdfParams {
                m_cost: 8,
                t_cost: 1,
                p_cost: 1,
            }),
        );
        state
    }

    fn sample_page(text: &str) -> PageData {
        PageData {
            page_number: 1,
            width: 612.0,
            height: 792.0,
            full_text: text.to_string(),
            text_blocks: vec![TextBlock {
                text: text.to_string(),
                bbox: BBox::new(10.0, 10.0, 500.0, 24.0),
                source_confidence: 1.0,
            }],
        }
    }

    #[tokio::test]
    async fn test_vault_unlock_and_status() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        assert!(!vault_status(&state).await.unlocked);
        vault_unlock(
            &state,
            PassphraseRequest {
                passphrase: "correct horse".into(),
            },
        )
        .await
        .unwrap();
        assert!(vault_status(&state).await.unlocked);
    }

    #[tokio::test]
    async fn test_detokenize_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.vault.unlock("pw").unwrap();

        let token = state
            .vault
            .mint(PiiType::Email, "foo@bar.com", "doc-1")
            .unwrap();
        let ghost = "[ANON_EMAIL_000000000000]";

        let response = detokenize(
            &state,
            DetokenizeRequest {
                text: format!("Write to {token} and {ghost}"),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            response.original_text,
            format!("Write to foo@bar.com and {ghost}")
        );
        assert_eq!(response.tokens_replaced, 1);
        assert_eq!(response.unresolved_tokens, vec![ghost.to_string()]);
    }

    #[tokio::test]
    async fn test_detokenize_requires_unlocked_vault() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let result = detokenize(
            &state,
            DetokenizeRequest {
                text: "whatever".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(Error::VaultLocked)));
        assert_eq!(result.unwrap_err().http_status(), 403);
    }

    #[tokio::test]
    async fn test_detokenize_text_file() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.vault.unlock("pw").unwrap();
        let token = state
            .vault
            .mint(PiiType::Person, "Jean Tremblay", "doc-1")
            .unwrap();

        let body = format!("Hello {token}!");
        let response = detokenize_file(&state, "letter.txt", body.as_bytes())
            .await
            .unwrap();
        assert_eq!(response.file_name, "detokenized_letter.txt");
        assert_eq!(response.content, b"Hello Jean Tremblay!");
        assert_eq!(response.tokens_replaced, 1);

        let unsupported = detokenize_file(&state, "report.docx", b"...").await;
        assert!(matches!(unsupported, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_detect_endpoint_flow() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        assert!(matches!(
            detect_document(&state, "missing").await,
            Err(Error::NotFound(_))
        ));

        register_document(
            &state,
            "doc-1",
            DocumentEntry {
                pages: vec![sample_page("Write to foo@bar.com today")],
                language: Some(Language::En),
                action_overrides: HashMap::new(),
            },
        )
        .await;

        let response = detect_document(&state, "doc-1").await.unwrap();
        assert_eq!(response.region_count, 1);
        assert_eq!(response.regions[0].pii_type, PiiType::Email);

        let progress = detection_progress(&state, "doc-1").await.unwrap();
        assert_eq!(progress.page_done, 1);
    }

    #[tokio::test]
    async fn test_health() {
        let response = health().await;
        assert_eq!(response.status, "ok");
        assert!(!response.version.is_empty());
    }
}
