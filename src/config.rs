use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::constants;

/// Detection pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub regex_enabled: bool,
    pub ner_enabled: bool,
    pub llm_enabled: bool,
    /// Minimum confidence for a region to be kept after merge
    pub confidence_threshold: f32,
    /// DATE/MONEY detections at or above this confidence default to
    /// TOKENIZE instead of IGNORE
    pub date_money_threshold: f32,
    /// Additive boost for contextual regex hits, capped at 1.0
    pub context_boost: f32,
    /// NER model preference: "trf" > "lg" > "sm", falls back automatically
    pub ner_preference: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            regex_enabled: true,
            ner_enabled: true,
            llm_enabled: true,
            confidence_threshold: constants::DETECTION_MIN_CONFIDENCE,
            date_money_threshold: constants::DATE_MONEY_ACTION_THRESHOLD,
            context_boost: constants::CONTEXT_CUE_BOOST,
            ner_preference: "trf".to_string(),
        }
    }
}

/// Sidecar settings, loaded once at startup from `config.toml` in the
/// data directory. Every field has a sensible default so a missing file
/// yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub vault_path: PathBuf,

    pub host: String,
    /// 0 = pick a random free port
    pub port: u16,

    pub token_prefix: String,
    pub detection: DetectionConfig,

    /// "json" or "text"
    pub log_format: String,
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::APP_DATA_DIR)
}

impl Default for SidecarConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            models_dir: data_dir.join("models"),
            temp_dir: env::temp_dir().join(constants::APP_DATA_DIR),
            vault_path: data_dir.join(constants::VAULT_FILE),
            data_dir,
            host: "127.0.0.1".to_string(),
            port: 8910,
            token_prefix: constants::DEFAULT_TOKEN_PREFIX.to_string(),
            detection: DetectionConfig::default(),
            log_format: "text".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl SidecarConfig {
    /// Load from `config.toml` in the default data directory, falling back
    /// to defaults when the file does not exist. Directories are created
    /// so later components can assume they are present.
    pub fn load() -> Result<Self> {
        let path = default_data_dir().join(constants::CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("invalid config at {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(port) = env::var("DOCSHIELD_PORT") {
            config.port = port.parse().context("DOCSHIELD_PORT is not a port number")?;
        }
        if let Ok(fmt) = env::var("DOCSHIELD_LOG_FORMAT") {
            config.log_format = fmt;
        }

        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.models_dir)?;
        std::fs::create_dir_all(&config.temp_dir)?;

        Ok(config)
    }
}

/// Licensing service settings, namespaced `PS_` in the environment.
#[derive(Debug, Clone)]
pub struct LicensingConfig {
    pub database_url: String,
    pub jwt_secret: String,
    /// base64-encoded Ed25519 private seed (32 bytes). The server signs;
    /// the desktop client ships with the public key only.
    pub signing_key_b64: String,
    pub public_key_b64: String,
    pub validity_days: i64,
    pub max_seats_per_subscription: u32,
    pub max_machines_per_seat: u32,
    pub trial_days: i64,
    pub free_trial_allowed: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
}

fn ps_var(name: &str) -> Option<String> {
    env::var(format!("PS_{name}")).ok().filter(|v| !v.is_empty())
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            database_url: "licensing.db".to_string(),
            jwt_secret: "CHANGE-ME-IN-PRODUCTION".to_string(),
            signing_key_b64: String::new(),
            public_key_b64: String::new(),
            validity_days: constants::LICENSE_VALIDITY_DAYS,
            max_seats_per_subscription: 5,
            max_machines_per_seat: 3,
            trial_days: 14,
            free_trial_allowed: true,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_max_requests: constants::RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window_secs: constants::RATE_LIMIT_WINDOW_SECS,
        }
    }
}

impl LicensingConfig {
    /// Read `PS_*` environment variables over the defaults. A missing
    /// signing key is not an error here; the issuer rejects it at startup
    /// so key generation tooling can still run with a bare environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = ps_var("DATABASE_URL") {
            config.database_url = v;
        }
        if let Some(v) = ps_var("JWT_SECRET") {
            config.jwt_secret = v;
        }
        if let Some(v) = ps_var("ED25519_PRIVATE_KEY_B64") {
            config.signing_key_b64 = v;
        }
        if let Some(v) = ps_var("ED25519_PUBLIC_KEY_B64") {
            config.public_key_b64 = v;
        }
        if let Some(v) = ps_var("LICENSE_VALIDITY_DAYS").and_then(|v| v.parse().ok()) {
            config.validity_days = v;
        }
        if let Some(v) = ps_var("MAX_SEATS_PER_SUBSCRIPTION").and_then(|v| v.parse().ok()) {
            config.max_seats_per_subscription = v;
        }
        if let Some(v) = ps_var("MAX_MACHINES_PER_SEAT").and_then(|v| v.parse().ok()) {
            config.max_machines_per_seat = v;
        }
        if let Some(v) = ps_var("TRIAL_DAYS").and_then(|v| v.parse().ok()) {
            config.trial_days = v;
        }
        if let Some(v) = ps_var("FREE_TRIAL_ALLOWED").and_then(|v| v.parse().ok()) {
            config.free_trial_allowed = v;
        }
        if let Some(v) = ps_var("ALLOWED_ORIGINS") {
            config.allowed_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        config
    }
}
