//! Structured audit event stream.
//!
//! Every security- or billing-relevant action is emitted as one tagged
//! event through `tracing` under the `audit` target. With JSON logging
//! enabled each event becomes a single JSON record carrying the reserved
//! fields (`doc_id`, `machine_id`, `user_id`, ...).

use serde::{Deserialize, Serialize};

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    VaultUnlocked,
    VaultLocked,
    VaultExported,
    VaultImported,
    TokenMinted,
    DetectionStarted,
    DetectionCompleted,
    DetectionCancelled,
    Degraded,
    LicenseIssued,
    LicenseValidated,
    MachineActivated,
    MachineDeactivated,
    TrialClaimed,
    RateLimited,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::VaultUnlocked => "vault_unlocked",
            AuditKind::VaultLocked => "vault_locked",
            AuditKind::VaultExported => "vault_exported",
            AuditKind::VaultImported => "vault_imported",
            AuditKind::TokenMinted => "token_minted",
            AuditKind::DetectionStarted => "detection_started",
            AuditKind::DetectionCompleted => "detection_completed",
            AuditKind::DetectionCancelled => "detection_cancelled",
            AuditKind::Degraded => "degraded",
            AuditKind::LicenseIssued => "license_issued",
            AuditKind::LicenseValidated => "license_validated",
            AuditKind::MachineActivated => "machine_activated",
            AuditKind::MachineDeactivated => "machine_deactivated",
            AuditKind::TrialClaimed => "trial_claimed",
            AuditKind::RateLimited => "rate_limited",
        }
    }
}

/// Vault lifecycle event (no extra context).
pub fn vault_event(kind: AuditKind) {
    tracing::info!(target: "audit", event = kind.as_str(), "vault event");
}

/// Per-document detection lifecycle event.
pub fn document_event(kind: AuditKind, doc_id: &str) {
    tracing::info!(target: "audit", event = kind.as_str(), doc_id = doc_id, "detection event");
}

/// A page completed with partial output (detector failure or page budget
/// exhausted). The page still ships whatever the remaining detectors found.
pub fn degraded(doc_id: &str, page_number: u32, reason: &str) {
    tracing::warn!(
        target: "audit",
        event = AuditKind::Degraded.as_str(),
        doc_id = doc_id,
        error_type = reason,
        page = page_number,
        "page degraded"
    );
}

/// Licensing action tied to a subscription owner and machine.
pub fn license_event(kind: AuditKind, user_id: &str, machine_id: &str) {
    tracing::info!(
        target: "audit",
        event = kind.as_str(),
        user_id = user_id,
        machine_id = machine_id,
        "license event"
    );
}

/// Request rejected by the rate limiter.
pub fn rate_limited(ip: &str, path: &str) {
    tracing::warn!(
        target: "audit",
        event = AuditKind::RateLimited.as_str(),
        ip = ip,
        path = path,
        "rate limited"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_snake_case() {
        assert_eq!(AuditKind::VaultUnlocked.as_str(), "vault_unlocked");
        assert_eq!(AuditKind::Degraded.as_str(), "degraded");
        assert_eq!(AuditKind::TrialClaimed.as_str(), "trial_claimed");
    }
}
