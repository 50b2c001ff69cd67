// SPDX-License-Identifier: MIT
// Copyright (c) 2025 docshield
//
// Vault cryptography: passphrase key derivation and authenticated
// encryption of the vault payload.
//
// The payload is sealed with AES-256-GCM under a key derived from the
// user's passphrase with Argon2id; the KDF parameters and salt travel in
// the vault header so they can be tuned without breaking old files.

use anyhow::anyhow;
use ring::aead::{
    Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM,
};
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use crate::errors::{Error, Result};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

/// Argon2id parameters persisted in the vault header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: crate::constants::VAULT_KDF_M_COST,
            t_cost: crate::constants::VAULT_KDF_T_COST,
            p_cost: crate::constants::VAULT_KDF_P_COST,
        }
    }
}

/// Derive the key-encryption key from a passphrase.
pub fn derive_kek(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<Vec<u8>> {
    use argon2::{Algorithm, Argon2, ParamsBuilder, Version};

    let argon_params = ParamsBuilder::new()
        .m_cost(params.m_cost)
        .t_cost(params.t_cost)
        .p_cost(params.p_cost)
        .output_len(KEY_LEN)
        .build()
        .map_err(|e| Error::Internal(anyhow!("invalid KDF parameters: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut kek = vec![0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut kek)
        .map_err(|e| Error::Internal(anyhow!("key derivation failed: {e}")))?;
    Ok(kek)
}

/// Fill `buf` with cryptographically secure random bytes.
pub fn random_bytes(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| Error::Internal(anyhow!("system RNG failure")))
}

/// AES-256-GCM seal; the authentication tag is appended to the returned
/// ciphertext.
pub fn seal(key: &[u8], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Internal(anyhow!("invalid encryption key length")))?;
    let mut sealing_key = SealingKey::new(unbound, OneNonceSequence::new(*nonce));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| Error::Internal(anyhow!("encryption failed")))?;
    Ok(in_out)
}

/// AES-256-GCM open. A tag mismatch means the passphrase-derived key is
/// wrong (or the file was tampered with), reported as `WrongPassphrase`.
pub fn open(key: &[u8], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Internal(anyhow!("invalid decryption key length")))?;
    let mut opening_key = OpeningKey::new(unbound, OneNonceSequence::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| Error::WrongPassphrase)?
        .to_vec();
    in_out.zeroize();
    Ok(plaintext)
}

/// Single-use nonce sequence for one seal/open operation.
struct OneNonceSequence {
    nonce: [u8; NONCE_LEN],
    used: bool,
}

impl OneNonceSequence {
    fn new(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce, used: false }
    }
}

impl NonceSequence for OneNonceSequence {
    fn advance(&mut self) -> std::result::Result<Nonce, Unspecified> {
        if self.used {
            return Err(Unspecified);
        }
        self.used = true;
        Nonce::try_assume_unique_for_key(&self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> KdfParams {
        // Keep KDF cost low in tests
        KdfParams {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn test_kdf_is_deterministic_per_salt() {
        let salt_a = [1u8; SALT_LEN];
        let salt_b = [2u8; SALT_LEN];
        let k1 = derive_kek("hunter2", &salt_a, small_params()).unwrap();
        let k2 = derive_kek("hunter2", &salt_a, small_params()).unwrap();
        let k3 = derive_kek("hunter2", &salt_b, small_params()).unwrap();
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1.len(), KEY_LEN);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; KEY_LEN];
        let nonce = [9u8; NONCE_LEN];
        let sealed = seal(&key, &nonce, b"vault payload").unwrap();
        assert!(sealed.len() > b"vault payload".len());
        let opened = open(&key, &nonce, &sealed).unwrap();
        assert_eq!(opened, b"vault payload");
    }

    #[test]
    fn test_wrong_key_is_wrong_passphrase() {
        let key = [7u8; KEY_LEN];
        let other = [8u8; KEY_LEN];
        let nonce = [9u8; NONCE_LEN];
        let sealed = seal(&key, &nonce, b"secret").unwrap();
        match open(&other, &nonce, &sealed) {
            Err(Error::WrongPassphrase) => {}
            other => panic!("expected WrongPassphrase, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = [7u8; KEY_LEN];
        let nonce = [9u8; NONCE_LEN];
        let mut sealed = seal(&key, &nonce, b"secret").unwrap();
        sealed[0] ^= 0xFF;
        assert!(open(&key, &nonce, &sealed).is_err());
    }
}
