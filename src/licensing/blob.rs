// SPDX-License-Identifier: MIT
// Copyright (c) 2025 docshield
//
// Ed25519 signing and offline license blob creation/verification.
//
// Blob format:
//
//     b64url(payload_json) "." b64url(signature)
//
// The payload JSON is canonical: fixed field order, no whitespace. The
// server holds the private key and signs; the desktop client ships with
// the public key only and verifies offline.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::config::LicensingConfig;
use crate::constants::LICENSE_SCHEMA_VERSION;
use crate::errors::{Error, Result};

/// Signed license payload. Field order is the wire order; do not
/// reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensePayload {
    pub email: String,
    pub plan: String,
    pub seats: u32,
    pub machine_id: String,
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub v: u8,
}

pub struct LicenseIssuer {
    signing_key: SigningKey,
    validity_days: i64,
}

impl LicenseIssuer {
    /// Load the long-term signing key from configuration. A missing or
    /// malformed key is a startup failure; the service must not come up
    /// without the ability to sign.
    pub fn from_config(config: &LicensingConfig) -> Result<Self> {
        if config.signing_key_b64.is_empty() {
            return Err(Error::InvalidInput(
                "PS_ED25519_PRIVATE_KEY_B64 is not set".into(),
            ));
        }
        let raw = STANDARD
            .decode(&config.signing_key_b64)
            .map_err(|_| Error::InvalidInput("signing key is not valid base64".into()))?;
        let seed: [u8; 32] = raw
            .try_into()
            .map_err(|_| Error::InvalidInput("signing key must be a 32-byte Ed25519 seed".into()))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
            validity_days: config.validity_days,
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_b64(&self) -> String {
        STANDARD.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign a fresh license blob. Re-issuance is always permitted; a new
    /// blob simply supersedes whatever the client held before.
    pub fn issue(
        &self,
        email: &str,
        plan: &str,
        seats: u32,
        machine_fingerprint: &str,
    ) -> Result<(String, LicensePayload)> {
        self.issue_at(email, plan, seats, machine_fingerprint, Utc::now())
    }

    pub fn issue_at(
        &self,
        email: &str,
        plan: &str,
        seats: u32,
        machine_fingerprint: &str,
        issued: DateTime<Utc>,
    ) -> Result<(String, LicensePayload)> {
        let payload = LicensePayload {
            email: email.to_string(),
            plan: plan.to_string(),
            seats,
            machine_id: machine_fingerprint.to_string(),
            issued,
            expires: issued + Duration::days(self.validity_days),
            v: LICENSE_SCHEMA_VERSION,
        };

        let payload_bytes = serde_json::to_vec(&payload)
            .map_err(|e| Error::Internal(anyhow::anyhow!("payload serialization failed: {e}")))?;
        let signature = self.signing_key.sign(&payload_bytes);

        let blob = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload_bytes),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );
        Ok((blob, payload))
    }
}

/// Offline verification: pure, network-free, every failure carries its
/// specific reason so the client can route the user to renew, reactivate
/// or re-download.
pub fn verify_blob(
    blob: &str,
    public_key: &VerifyingKey,
    local_fingerprint: &str,
    now: DateTime<Utc>,
) -> Result<LicensePayload> {
    let (payload_b64, sig_b64) = blob.split_once('.').ok_or_else(malformed)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| malformed())?;
    let sig_bytes = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| malformed())?;
    let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|_| malformed())?;
    let signature = Signature::from_bytes(&sig_array);

    public_key
        .verify(&payload_bytes, &signature)
        .map_err(|_| Error::InvalidSignature)?;

    let payload: LicensePayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| malformed())?;

    if now > payload.expires {
        return Err(Error::Expired);
    }
    if payload.machine_id != local_fingerprint {
        return Err(Error::WrongMachine);
    }
    Ok(payload)
}

fn malformed() -> Error {
    Error::InvalidInput("license blob is malformed".into())
}

/// Generate a fresh Ed25519 keypair, base64-encoded, for initial server
/// setup.
pub fn generate_keypair() -> (String, String) {
    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let private = STANDARD.encode(signing_key.to_bytes());
    let public = STANDARD.encode(signing_key.verifying_key().as_bytes());
    (private, public)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> LicenseIssuer {
        let (private, _) = generate_keypair();
        let config = LicensingConfig {
            signing_key_b64: private,
            ..LicensingConfig::default()
        };
        LicenseIssuer::from_config(&config).unwrap()
    }

    const FP: &str = "machine-fingerprint-0001";

    #[test]
    fn test_issue_and_verify_round_trip() {
        let issuer = issuer();
        let (blob, payload) = issuer.issue("a@b.com", "pro", 5, FP).unwrap();

        let verified = verify_blob(&blob, &issuer.verifying_key(), FP, Utc::now()).unwrap();
        assert_eq!(verified.email, "a@b.com");
        assert_eq!(verified.plan, "pro");
        assert_eq!(verified.seats, 5);
        assert_eq!(verified.machine_id, FP);
        assert_eq!(verified.v, LICENSE_SCHEMA_VERSION);
        assert_eq!(verified.expires, payload.issued + Duration::days(35));
    }

    #[test]
    fn test_expiry_boundary() {
        let issuer = issuer();
        let issued = Utc::now();
        let (blob, payload) = issuer.issue_at("a@b.com", "pro", 5, FP, issued).unwrap();

        // Valid until expiry, Expired one second after.
        assert!(verify_blob(&blob, &issuer.verifying_key(), FP, payload.expires).is_ok());
        let just_after = payload.expires + Duration::seconds(1);
        match verify_blob(&blob, &issuer.verifying_key(), FP, just_after) {
            Err(Error::Expired) => {}
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let issuer = issuer();
        let (blob, _) = issuer.issue("a@b.com", "pro", 5, FP).unwrap();

        let (payload_b64, sig_b64) = blob.split_once('.').unwrap();
        let mut payload = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let json = String::from_utf8(payload.clone()).unwrap();
        let upgraded = json.replace("\"seats\":5", "\"seats\":500");
        payload = upgraded.into_bytes();
        let tampered = format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), sig_b64);

        match verify_blob(&tampered, &issuer.verifying_key(), FP, Utc::now()) {
            Err(Error::InvalidSignature) => {}
            other => panic!("expected InvalidSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_machine() {
        let issuer = issuer();
        let (blob, _) = issuer.issue("a@b.com", "pro", 5, FP).unwrap();
        match verify_blob(&blob, &issuer.verifying_key(), "other-machine-fp-02", Utc::now()) {
            Err(Error::WrongMachine) => {}
            other => panic!("expected WrongMachine, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_blob() {
        let issuer = issuer();
        for junk in ["", "no-dot-here", "a.b", "!!!.###"] {
            assert!(verify_blob(junk, &issuer.verifying_key(), FP, Utc::now()).is_err());
        }
    }

    #[test]
    fn test_missing_signing_key_is_startup_failure() {
        let config = LicensingConfig::default();
        assert!(LicenseIssuer::from_config(&config).is_err());
    }

    #[test]
    fn test_payload_json_is_canonical() {
        let issuer = issuer();
        let (blob, _) = issuer.issue("a@b.com", "pro", 5, FP).unwrap();
        let payload_b64 = blob.split_once('.').unwrap().0;
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(payload_b64).unwrap()).unwrap();
        assert!(json.starts_with("{\"email\":"));
        assert!(!json.contains(": "));
        assert!(json.contains("\"v\":1"));
    }
}
