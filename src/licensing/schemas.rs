//! Request/response bodies for the licensing service.
//!
//! Validation happens at this edge: anything deeper in the service can
//! assume a well-formed fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{FINGERPRINT_MAX_LEN, FINGERPRINT_MIN_LEN};
use crate::errors::{Error, Result};

/// The server never interprets a fingerprint; it only has to be a
/// reasonably-sized opaque string.
pub fn validate_fingerprint(fingerprint: &str) -> Result<()> {
    let len = fingerprint.chars().count();
    if len < FINGERPRINT_MIN_LEN || len > FINGERPRINT_MAX_LEN {
        return Err(Error::InvalidInput(format!(
            "machine_fingerprint must be {FINGERPRINT_MIN_LEN}-{FINGERPRINT_MAX_LEN} characters"
        )));
    }
    Ok(())
}

// ===================== Auth =====================

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// seconds
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// ===================== License =====================

#[derive(Debug, Clone, Deserialize)]
pub struct ActivateRequest {
    pub machine_fingerprint: String,
    pub machine_name: Option<String>,
}

impl ActivateRequest {
    pub fn validate(&self) -> Result<()> {
        validate_fingerprint(&self.machine_fingerprint)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    pub machine_fingerprint: String,
}

impl ValidateRequest {
    pub fn validate(&self) -> Result<()> {
        validate_fingerprint(&self.machine_fingerprint)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineKeyRequest {
    pub machine_fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseResponse {
    pub license_blob: String,
    pub expires_at: DateTime<Utc>,
    pub plan: String,
    pub seats: u32,
    pub machine_fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseStatusResponse {
    pub valid: bool,
    pub plan: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub seats: Option<u32>,
    pub days_remaining: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineResponse {
    pub id: String,
    pub machine_fingerprint: String,
    pub machine_name: Option<String>,
    pub activated_at: DateTime<Utc>,
    pub last_validated: Option<DateTime<Utc>>,
    pub is_active: bool,
}

// ===================== Billing =====================

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingPortalResponse {
    pub portal_url: String,
}
