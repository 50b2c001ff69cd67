// SPDX-License-Identifier: MIT
// Copyright (c) 2025 docshield
//
// Deterministic token derivation.
//
// A token is `[PREFIX_TYPE_HEX]` where HEX is the truncated keyed
// BLAKE2b MAC of the normalized plaintext under the vault's index
// subkey. Minting the same `(type, normalized plaintext)` twice within
// one vault therefore yields the same token, which makes re-detection
// idempotent across runs.

use blake2::digest::{KeyInit, Mac};
use blake2::Blake2bMac512;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::constants::TOKEN_HEX_LEN;
use crate::detection::PiiType;
use crate::errors::{Error, Result};

/// Canonical plaintext form used for both hashing and storage: NFKC,
/// internal whitespace collapsed to single spaces, trimmed. Email
/// addresses are additionally case-folded since the address space is
/// case-insensitive in practice.
pub fn normalize(pii_type: PiiType, plaintext: &str) -> String {
    let folded: String = plaintext.nfkc().collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if pii_type == PiiType::Email {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

/// Index key for the reverse lookup map: a plain hash over the same
/// input the MAC sees, usable before the token itself exists.
pub fn plaintext_index_key(pii_type: PiiType, normalized: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(pii_type.mnemonic().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncated keyed MAC for the token suffix. `attempt` > 0 salts the
/// derivation after a truncation collision; the counter byte sits right
/// after the type separator.
pub fn token_hex(
    index_key: &[u8],
    pii_type: PiiType,
    normalized: &str,
    attempt: u8,
) -> Result<String> {
    let mut mac = <Blake2bMac512 as KeyInit>::new_from_slice(index_key)
        .map_err(|_| Error::Internal(anyhow::anyhow!("invalid token index key length")))?;
    mac.update(pii_type.mnemonic().as_bytes());
    mac.update(&[0u8]);
    if attempt > 0 {
        mac.update(&[attempt]);
    }
    mac.update(normalized.as_bytes());

    let digest = mac.finalize().into_bytes();
    Ok(hex::encode(&digest[..TOKEN_HEX_LEN / 2]))
}

pub fn format_token(prefix: &str, pii_type: PiiType, hex_suffix: &str) -> String {
    format!("[{}_{}_{}]", prefix, pii_type.mnemonic(), hex_suffix)
}

/// Regex matching every token minted under `prefix`, with the TYPE and
/// HEX capture groups.
pub fn token_regex(prefix: &str) -> Regex {
    Regex::new(&format!(
        r"\[{}_([A-Z]+)_([0-9a-f]{{{TOKEN_HEX_LEN}}})\]",
        regex::escape(prefix)
    ))
    .expect("token regex is invalid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            normalize(PiiType::Person, "  Jean   \n Tremblay "),
            "Jean Tremblay"
        );
    }

    #[test]
    fn test_normalize_email_case_folds() {
        assert_eq!(normalize(PiiType::Email, "Foo@Bar.com"), "foo@bar.com");
        assert_eq!(
            normalize(PiiType::Person, "Jean Tremblay"),
            "Jean Tremblay"
        );
    }

    #[test]
    fn test_normalize_applies_nfkc() {
        // Fullwidth digits compose to ASCII under NFKC.
        assert_eq!(normalize(PiiType::IdNumber, "１２３"), "123");
    }

    #[test]
    fn test_token_hex_is_deterministic_and_keyed() {
        let key_a = [1u8; 32];
        let key_b = [2u8; 32];
        let h1 = token_hex(&key_a, PiiType::Email, "foo@bar.com", 0).unwrap();
        let h2 = token_hex(&key_a, PiiType::Email, "foo@bar.com", 0).unwrap();
        let h3 = token_hex(&key_b, PiiType::Email, "foo@bar.com", 0).unwrap();
        let h4 = token_hex(&key_a, PiiType::Phone, "foo@bar.com", 0).unwrap();
        let h5 = token_hex(&key_a, PiiType::Email, "foo@bar.com", 1).unwrap();

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_ne!(h1, h4);
        assert_ne!(h1, h5);
        assert_eq!(h1.len(), TOKEN_HEX_LEN);
    }

    #[test]
    fn test_token_format_and_regex() {
        let key = [1u8; 32];
        let hex = token_hex(&key, PiiType::Email, "foo@bar.com", 0).unwrap();
        let token = format_token("ANON", PiiType::Email, &hex);
        let re = token_regex("ANON");

        let caps = re.captures(&token).expect("token must match its regex");
        assert_eq!(&caps[1], "EMAIL");
        assert_eq!(&caps[2], hex);
        assert!(!re.is_match("[OTHER_EMAIL_0123456789ab]"));
    }
}
