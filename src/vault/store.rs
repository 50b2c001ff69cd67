// SPDX-License-Identifier: MIT
// Copyright (c) 2025 docshield
//
// Encrypted reversible token vault.
//
// On disk the vault is a single binary file:
//
//   magic(4) | version(1) | m_cost(4) | t_cost(4) | p_cost(4)
//   | salt(16) | nonce(12) | AES-256-GCM ciphertext+tag
//
// The ciphertext holds the JSON payload `{master_key_wrap, entries,
// reverse_index}`. Every save rewrites the file atomically (temp file +
// fsync + rename) and an exclusive OS file lock on a sidecar `.lock`
// file keeps other processes out between unlock and lock.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use zeroize::Zeroize;

use crate::audit::{self, AuditKind};
use crate::constants::{MINT_MAX_ATTEMPTS, VAULT_MAGIC, VAULT_VERSION};
use crate::detection::PiiType;
use crate::errors::{Error, Result};
use crate::vault::crypto::{self, KdfParams, KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::vault::minter;

const HEADER_LEN: usize = 4 + 1 + 12 + SALT_LEN + NONCE_LEN;

/// One reversible substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token_string: String,
    pub pii_type: PiiType,
    pub plaintext: String,
    pub source_document: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct VaultPayload {
    /// hex(nonce || AES-GCM(master_key)) under the passphrase KEK
    master_key_wrap: String,
    entries: HashMap<String, TokenEntry>,
    /// plaintext hash -> token_string, for idempotent minting
    reverse_index: HashMap<String, String>,
}

struct Unlocked {
    master_key: Vec<u8>,
    index_key: Vec<u8>,
    kek: Vec<u8>,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
    entries: HashMap<String, TokenEntry>,
    reverse_index: HashMap<String, String>,
    /// Holds the exclusive OS lock for the unlock..lock window
    _lock_file: std::fs::File,
}

impl Drop for Unlocked {
    fn drop(&mut self) {
        self.master_key.zeroize();
        self.index_key.zeroize();
        self.kek.zeroize();
        for entry in self.entries.values_mut() {
            entry.plaintext.zeroize();
        }
    }
}

pub struct Vault {
    path: PathBuf,
    token_prefix: String,
    token_regex: Regex,
    state: RwLock<Option<Unlocked>>,
    kdf: KdfParams,
}

impl Vault {
    pub fn new(path: PathBuf, token_prefix: &str) -> Self {
        Self {
            token_regex: minter::token_regex(token_prefix),
            token_prefix: token_prefix.to_string(),
            path,
            state: RwLock::new(None),
            kdf: KdfParams::default(),
        }
    }

    #[cfg(test)]
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.read().expect("vault lock poisoned").is_some()
    }

    /// Open the vault with a passphrase, creating a fresh one when no
    /// file exists yet. A tag rejection on an existing file is reported
    /// as `WrongPassphrase`; a malformed header as `VaultCorrupt` (never
    /// silently repaired). Unlocking an already-unlocked vault is a
    /// no-op.
    pub fn unlock(&self, passphrase: &str) -> Result<()> {
        let mut state = self.state.write().expect("vault lock poisoned");
        if state.is_some() {
            return Ok(());
        }

        let lock_file = self.acquire_process_lock()?;

        let unlocked = if self.path.exists() {
            self.open_existing(passphrase, lock_file)?
        } else {
            self.create_fresh(passphrase, lock_file)?
        };

        *state = Some(unlocked);
        drop(state);

        audit::vault_event(AuditKind::VaultUnlocked);
        Ok(())
    }

    /// Zeroize key material and entry plaintexts, release the process
    /// lock.
    pub fn lock(&self) {
        let mut state = self.state.write().expect("vault lock poisoned");
        if state.take().is_some() {
            audit::vault_event(AuditKind::VaultLocked);
        }
    }

    /// Mint (or return the existing) token for `(pii_type, plaintext)`.
    pub fn mint(
        &self,
        pii_type: PiiType,
        plaintext: &str,
        source_document: &str,
    ) -> Result<String> {
        let mut state = self.state.write().expect("vault lock poisoned");
        let unlocked = state.as_mut().ok_or(Error::VaultLocked)?;

        let normalized = minter::normalize(pii_type, plaintext);
        if normalized.is_empty() {
            return Err(Error::InvalidInput("cannot mint an empty value".into()));
        }

        let index_key = minter::plaintext_index_key(pii_type, &normalized);
        if let Some(existing) = unlocked.reverse_index.get(&index_key) {
            return Ok(existing.clone());
        }

        for attempt in 0..MINT_MAX_ATTEMPTS {
            let hex_suffix =
                minter::token_hex(&unlocked.index_key, pii_type, &normalized, attempt)?;
            let token = minter::format_token(&self.token_prefix, pii_type, &hex_suffix);

            if unlocked.entries.contains_key(&token) {
                // Truncation collision with a different plaintext
                continue;
            }

            unlocked.entries.insert(
                token.clone(),
                TokenEntry {
                    token_string: token.clone(),
                    pii_type,
                    plaintext: normalized,
                    source_document: source_document.to_string(),
                    created_at: Utc::now(),
                },
            );
            unlocked.reverse_index.insert(index_key, token.clone());
            self.save(unlocked)?;

            audit::vault_event(AuditKind::TokenMinted);
            return Ok(token);
        }

        Err(Error::Internal(anyhow::anyhow!(
            "persistent token collision after {MINT_MAX_ATTEMPTS} attempts; \
             check the vault configuration"
        )))
    }

    /// Reverse lookup. `None` for tokens this vault never minted.
    pub fn resolve(&self, token: &str) -> Result<Option<String>> {
        let state = self.state.read().expect("vault lock poisoned");
        let unlocked = state.as_ref().ok_or(Error::VaultLocked)?;
        Ok(unlocked.entries.get(token).map(|e| e.plaintext.clone()))
    }

    /// Substitute every resolvable token in `text`. Returns the rewritten
    /// text, the number of substitutions, and the tokens left unresolved.
    pub fn resolve_all(&self, text: &str) -> Result<(String, usize, Vec<String>)> {
        let state = self.state.read().expect("vault lock poisoned");
        let unlocked = state.as_ref().ok_or(Error::VaultLocked)?;

        let mut out = String::with_capacity(text.len());
        let mut last = 0usize;
        let mut replaced = 0usize;
        let mut unresolved = Vec::new();

        for m in self.token_regex.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            match unlocked.entries.get(m.as_str()) {
                Some(entry) => {
                    out.push_str(&entry.plaintext);
                    replaced += 1;
                }
                None => {
                    out.push_str(m.as_str());
                    unresolved.push(m.as_str().to_string());
                }
            }
            last = m.end();
        }
        out.push_str(&text[last..]);

        Ok((out, replaced, unresolved))
    }

    /// Token counts per PII type.
    pub fn stats(&self) -> Result<HashMap<String, usize>> {
        let state = self.state.read().expect("vault lock poisoned");
        let unlocked = state.as_ref().ok_or(Error::VaultLocked)?;
        let mut counts = HashMap::new();
        for entry in unlocked.entries.values() {
            *counts.entry(entry.pii_type.mnemonic().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Entries, optionally filtered by source document, in stable order.
    pub fn list_tokens(&self, source_document: Option<&str>) -> Result<Vec<TokenEntry>> {
        let state = self.state.read().expect("vault lock poisoned");
        let unlocked = state.as_ref().ok_or(Error::VaultLocked)?;
        let mut tokens: Vec<TokenEntry> = unlocked
            .entries
            .values()
            .filter(|e| source_document.map_or(true, |doc| e.source_document == doc))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.token_string.cmp(&b.token_string))
        });
        Ok(tokens)
    }

    /// Re-encrypt all entries under a passphrase-derived key and return a
    /// self-contained transferable blob.
    pub fn export(&self, passphrase: &str) -> Result<String> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let state = self.state.read().expect("vault lock poisoned");
        let unlocked = state.as_ref().ok_or(Error::VaultLocked)?;

        let entries: Vec<&TokenEntry> = {
            let mut v: Vec<&TokenEntry> = unlocked.entries.values().collect();
            v.sort_by(|a, b| a.token_string.cmp(&b.token_string));
            v
        };
        let json = serde_json::to_vec(&entries)
            .map_err(|e| Error::Internal(anyhow::anyhow!("export serialization failed: {e}")))?;

        let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(
            passphrase.to_string(),
        ));
        let mut sealed = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut sealed)
            .map_err(|e| Error::Internal(anyhow::anyhow!("export encryption failed: {e}")))?;
        writer.write_all(&json)?;
        writer
            .finish()
            .map_err(|e| Error::Internal(anyhow::anyhow!("export encryption failed: {e}")))?;

        audit::vault_event(AuditKind::VaultExported);
        Ok(STANDARD.encode(sealed))
    }

    /// Merge entries from an export blob. A token that already exists
    /// with a different plaintext aborts the import before anything is
    /// written.
    pub fn import(&self, blob: &str, passphrase: &str) -> Result<usize> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let sealed = STANDARD
            .decode(blob.trim())
            .map_err(|_| Error::InvalidInput("export data is not valid base64".into()))?;

        let decryptor = match age::Decryptor::new(&sealed[..]) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => return Err(Error::InvalidInput("unsupported export format".into())),
            Err(_) => return Err(Error::InvalidInput("export data is malformed".into())),
        };
        let mut reader = decryptor
            .decrypt(&age::secrecy::Secret::new(passphrase.to_string()), None)
            .map_err(|_| Error::WrongPassphrase)?;
        let mut json = Vec::new();
        reader
            .read_to_end(&mut json)
            .map_err(|_| Error::InvalidInput("export data is truncated".into()))?;

        let incoming: Vec<TokenEntry> = serde_json::from_slice(&json)
            .map_err(|_| Error::InvalidInput("export data does not parse".into()))?;

        let mut state = self.state.write().expect("vault lock poisoned");
        let unlocked = state.as_mut().ok_or(Error::VaultLocked)?;

        // Validate the whole batch first so a conflict leaves no partial
        // state behind.
        for entry in &incoming {
            if let Some(existing) = unlocked.entries.get(&entry.token_string) {
                if existing.plaintext != entry.plaintext {
                    return Err(Error::Conflict(format!(
                        "token {} already maps to a different value",
                        entry.token_string
                    )));
                }
            }
        }

        let mut added = 0usize;
        for entry in incoming {
            if unlocked.entries.contains_key(&entry.token_string) {
                continue;
            }
            let index_key = minter::plaintext_index_key(entry.pii_type, &entry.plaintext);
            unlocked
                .reverse_index
                .insert(index_key, entry.token_string.clone());
            unlocked.entries.insert(entry.token_string.clone(), entry);
            added += 1;
        }
        if added > 0 {
            self.save(unlocked)?;
        }

        audit::vault_event(AuditKind::VaultImported);
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }

    fn acquire_process_lock(&self) -> Result<std::fs::File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Conflict("vault is already open in another process".into())
        })?;
        Ok(file)
    }

    fn create_fresh(&self, passphrase: &str, lock_file: std::fs::File) -> Result<Unlocked> {
        let mut salt = [0u8; SALT_LEN];
        crypto::random_bytes(&mut salt)?;
        let kek = crypto::derive_kek(passphrase, &salt, self.kdf)?;

        let mut master_key = vec![0u8; KEY_LEN];
        crypto::random_bytes(&mut master_key)?;

        let unlocked = Unlocked {
            index_key: index_subkey(&master_key),
            master_key,
            kek,
            salt,
            kdf: self.kdf,
            entries: HashMap::new(),
            reverse_index: HashMap::new(),
            _lock_file: lock_file,
        };
        self.save(&unlocked)?;
        Ok(unlocked)
    }

    fn open_existing(&self, passphrase: &str, lock_file: std::fs::File) -> Result<Unlocked> {
        let raw = std::fs::read(&self.path)?;
        if raw.len() < HEADER_LEN || &raw[..4] != VAULT_MAGIC {
            return Err(Error::VaultCorrupt("bad header magic".into()));
        }
        if raw[4] != VAULT_VERSION {
            return Err(Error::VaultCorrupt(format!(
                "unsupported vault version {}",
                raw[4]
            )));
        }

        let mut offset = 5;
        let mut read_u32 = |raw: &[u8]| {
            let v = u32::from_le_bytes(raw[offset..offset + 4].try_into().unwrap());
            offset += 4;
            v
        };
        let kdf = KdfParams {
            m_cost: read_u32(&raw),
            t_cost: read_u32(&raw),
            p_cost: read_u32(&raw),
        };

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[offset..offset + SALT_LEN]);
        offset += SALT_LEN;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[offset..offset + NONCE_LEN]);
        offset += NONCE_LEN;

        let kek = crypto::derive_kek(passphrase, &salt, kdf)?;
        let mut payload_json = crypto::open(&kek, &nonce, &raw[offset..])?;

        let payload: VaultPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| Error::VaultCorrupt(format!("payload does not parse: {e}")))?;
        payload_json.zeroize();

        let master_key = unwrap_master_key(&kek, &payload.master_key_wrap)?;

        Ok(Unlocked {
            index_key: index_subkey(&master_key),
            master_key,
            kek,
            salt,
            kdf,
            entries: payload.entries,
            reverse_index: payload.reverse_index,
            _lock_file: lock_file,
        })
    }

    /// Serialize, seal under the KEK with a fresh nonce, and atomically
    /// replace the vault file.
    fn save(&self, unlocked: &Unlocked) -> Result<()> {
        let payload = VaultPayload {
            master_key_wrap: wrap_master_key(&unlocked.kek, &unlocked.master_key)?,
            entries: unlocked.entries.clone(),
            reverse_index: unlocked.reverse_index.clone(),
        };
        let mut payload_json = serde_json::to_vec(&payload)
            .map_err(|e| Error::Internal(anyhow::anyhow!("payload serialization failed: {e}")))?;

        let mut nonce = [0u8; NONCE_LEN];
        crypto::random_bytes(&mut nonce)?;
        let ciphertext = crypto::seal(&unlocked.kek, &nonce, &payload_json)?;
        payload_json.zeroize();

        let mut file_bytes = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        file_bytes.extend_from_slice(VAULT_MAGIC);
        file_bytes.push(VAULT_VERSION);
        file_bytes.extend_from_slice(&unlocked.kdf.m_cost.to_le_bytes());
        file_bytes.extend_from_slice(&unlocked.kdf.t_cost.to_le_bytes());
        file_bytes.extend_from_slice(&unlocked.kdf.p_cost.to_le_bytes());
        file_bytes.extend_from_slice(&unlocked.salt);
        file_bytes.extend_from_slice(&nonce);
        file_bytes.extend_from_slice(&ciphertext);

        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("vault path has no parent")))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&file_bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| Error::Internal(anyhow::anyhow!("atomic vault replace failed: {e}")))?;

        Ok(())
    }
}

fn index_subkey(master_key: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(master_key);
    hasher.update(b"token-index");
    hasher.finalize().to_vec()
}

fn wrap_master_key(kek: &[u8], master_key: &[u8]) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    crypto::random_bytes(&mut nonce)?;
    let sealed = crypto::seal(kek, &nonce, master_key)?;
    let mut wrapped = nonce.to_vec();
    wrapped.extend_from_slice(&sealed);
    Ok(hex::encode(wrapped))
}

fn unwrap_master_key(kek: &[u8], wrap: &str) -> Result<Vec<u8>> {
    let wrapped = hex::decode(wrap)
        .map_err(|_| Error::VaultCorrupt("master key wrap is not hex".into()))?;
    if wrapped.len() <= NONCE_LEN {
        return Err(Error::VaultCorrupt("master key wrap is truncated".into()));
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&wrapped[..NONCE_LEN]);
    crypto::open(kek, &nonce, &wrapped[NONCE_LEN..])
        .map_err(|_| Error::VaultCorrupt("master key wrap does not open".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_kdf() -> KdfParams {
        KdfParams {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn open_vault(dir: &TempDir) -> Vault {
        let vault = Vault::new(dir.path().join("vault.db"), "ANON").with_kdf(test_kdf());
        vault.unlock("correct horse").unwrap();
        vault
    }

    #[test]
    fn test_mint_is_idempotent_and_normalizing() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        let t1 = vault.mint(PiiType::Email, "Foo@Bar.com", "doc-1").unwrap();
        let t2 = vault.mint(PiiType::Email, "foo@bar.com", "doc-2").unwrap();
        assert_eq!(t1, t2);

        assert_eq!(vault.resolve(&t1).unwrap().unwrap(), "foo@bar.com");
    }

    #[test]
    fn test_same_plaintext_different_types_mint_distinct_tokens() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        let email = vault.mint(PiiType::Email, "514-555-1234", "doc").unwrap();
        let phone = vault.mint(PiiType::Phone, "514-555-1234", "doc").unwrap();
        assert_ne!(email, phone);
        assert!(email.contains("_EMAIL_"));
        assert!(phone.contains("_PHONE_"));
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");
        {
            let vault = Vault::new(path.clone(), "ANON").with_kdf(test_kdf());
            vault.unlock("correct horse").unwrap();
            vault.mint(PiiType::Email, "a@b.com", "doc").unwrap();
            vault.lock();
        }

        let vault = Vault::new(path, "ANON").with_kdf(test_kdf());
        match vault.unlock("wrong words") {
            Err(Error::WrongPassphrase) => {}
            other => panic!("expected WrongPassphrase, got {other:?}"),
        }
        assert!(!vault.is_unlocked());
    }

    #[test]
    fn test_vault_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");
        let token = {
            let vault = Vault::new(path.clone(), "ANON").with_kdf(test_kdf());
            vault.unlock("correct horse").unwrap();
            let token = vault.mint(PiiType::Person, "Jean Tremblay", "doc").unwrap();
            vault.lock();
            token
        };

        let vault = Vault::new(path, "ANON").with_kdf(test_kdf());
        vault.unlock("correct horse").unwrap();
        assert_eq!(vault.resolve(&token).unwrap().unwrap(), "Jean Tremblay");
        // Re-minting after reopen yields the same token.
        let again = vault.mint(PiiType::Person, "Jean Tremblay", "doc").unwrap();
        assert_eq!(again, token);
    }

    #[test]
    fn test_corrupt_header_is_reported_not_repaired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");
        std::fs::write(&path, b"not a vault at all").unwrap();

        let vault = Vault::new(path, "ANON").with_kdf(test_kdf());
        match vault.unlock("anything") {
            Err(Error::VaultCorrupt(_)) => {}
            other => panic!("expected VaultCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_locked_vault_refuses_operations() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(dir.path().join("vault.db"), "ANON").with_kdf(test_kdf());
        assert!(matches!(
            vault.mint(PiiType::Email, "a@b.com", "doc"),
            Err(Error::VaultLocked)
        ));
        assert!(matches!(vault.resolve("x"), Err(Error::VaultLocked)));
        assert!(matches!(vault.stats(), Err(Error::VaultLocked)));
    }

    #[test]
    fn test_resolve_all_round_trip_and_unresolved() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        let token = vault.mint(PiiType::Email, "foo@bar.com", "doc").unwrap();
        let ghost = "[ANON_EMAIL_000000000000]";
        let text = format!("Write to {token} or {ghost} today");

        let (resolved, count, unresolved) = vault.resolve_all(&text).unwrap();
        assert_eq!(resolved, format!("Write to foo@bar.com or {ghost} today"));
        assert_eq!(count, 1);
        assert_eq!(unresolved, vec![ghost.to_string()]);
    }

    #[test]
    fn test_stats_and_list_tokens() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);

        vault.mint(PiiType::Email, "a@b.com", "doc-1").unwrap();
        vault.mint(PiiType::Email, "c@d.com", "doc-2").unwrap();
        vault.mint(PiiType::Person, "Jean Tremblay", "doc-1").unwrap();

        let stats = vault.stats().unwrap();
        assert_eq!(stats.get("EMAIL"), Some(&2));
        assert_eq!(stats.get("PERSON"), Some(&1));

        let doc1 = vault.list_tokens(Some("doc-1")).unwrap();
        assert_eq!(doc1.len(), 2);
        assert_eq!(vault.list_tokens(None).unwrap().len(), 3);
    }

    #[test]
    fn test_export_import_merges_into_other_vault() {
        let dir = TempDir::new().unwrap();
        let vault_a = Vault::new(dir.path().join("a.db"), "ANON").with_kdf(test_kdf());
        vault_a.unlock("pass-a").unwrap();
        let token = vault_a.mint(PiiType::Email, "foo@bar.com", "doc").unwrap();
        let blob = vault_a.export("transfer-secret").unwrap();

        let vault_b = Vault::new(dir.path().join("b.db"), "ANON").with_kdf(test_kdf());
        vault_b.unlock("pass-b").unwrap();
        let added = vault_b.import(&blob, "transfer-secret").unwrap();
        assert_eq!(added, 1);
        assert_eq!(vault_b.resolve(&token).unwrap().unwrap(), "foo@bar.com");
    }

    #[test]
    fn test_import_wrong_passphrase() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);
        vault.mint(PiiType::Email, "foo@bar.com", "doc").unwrap();
        let blob = vault.export("right").unwrap();

        match vault.import(&blob, "wrong") {
            Err(Error::WrongPassphrase) => {}
            other => panic!("expected WrongPassphrase, got {other:?}"),
        }
    }

    #[test]
    fn test_import_conflict_leaves_no_partial_state() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir);
        let token = vault.mint(PiiType::Email, "foo@bar.com", "doc").unwrap();
        let count_before = vault.list_tokens(None).unwrap().len();

        // Forge an export whose token collides with a different value.
        let conflicting = vec![
            TokenEntry {
                token_string: "[ANON_PHONE_0123456789ab]".into(),
                pii_type: PiiType::Phone,
                plaintext: "514-555-0000".into(),
                source_document: "other".into(),
                created_at: Utc::now(),
            },
            TokenEntry {
                token_string: token.clone(),
                pii_type: PiiType::Email,
                plaintext: "other@val.ue".into(),
                source_document: "other".into(),
                created_at: Utc::now(),
            },
        ];
        let blob = {
            use base64::engine::general_purpose::STANDARD;
            use base64::Engine;
            let json = serde_json::to_vec(&conflicting).unwrap();
            let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(
                "secret".to_string(),
            ));
            let mut sealed = Vec::new();
            let mut writer = encryptor.wrap_output(&mut sealed).unwrap();
            writer.write_all(&json).unwrap();
            writer.finish().unwrap();
            STANDARD.encode(sealed)
        };

        match vault.import(&blob, "secret") {
            Err(Error::Conflict(_)) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
        // The non-conflicting entry must not have been written either.
        assert_eq!(vault.list_tokens(None).unwrap().len(), count_before);
        assert_eq!(vault.resolve(&token).unwrap().unwrap(), "foo@bar.com");
    }

    #[test]
    fn test_second_process_lockout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");
        let vault_a = Vault::new(path.clone(), "ANON").with_kdf(test_kdf());
        vault_a.unlock("pass").unwrap();

        let vault_b = Vault::new(path, "ANON").with_kdf(test_kdf());
        match vault_b.unlock("pass") {
            Err(Error::Conflict(_)) => {}
            other => panic!("expected Conflict, got {other:?}"),
        }

        vault_a.lock();
        let vault_c = Vault::new(vault_a.path().to_path_buf(), "ANON").with_kdf(test_kdf());
        vault_c.unlock("pass").unwrap();
    }
}
