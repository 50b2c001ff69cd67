/// Application-wide constants
///
/// This module centralizes the magic numbers and thresholds used by the
/// detection pipeline, the vault, and the licensing service.
// ============================================================================
// PII Detection
// ============================================================================
/// Minimum confidence for a region to be kept after merge
pub const DETECTION_MIN_CONFIDENCE: f32 = 0.3;

/// Default threshold above which DATE/MONEY detections are tokenized
/// instead of ignored (configurable, see `DetectionConfig`)
pub const DATE_MONEY_ACTION_THRESHOLD: f32 = 0.85;

/// Character window scanned for contextual cue words around a regex hit
pub const CONTEXT_CUE_WINDOW: usize = 40;

/// Additive confidence boost applied when a contextual cue is present
pub const CONTEXT_CUE_BOOST: f32 = 0.1;

/// Confidence margin that lets a shorter/weaker-typed detection survive
/// subsumption or cross-type arbitration
pub const ARBITRATION_OVERRIDE_MARGIN: f32 = 0.15;

/// Fraction of the shorter span that must overlap before two detections
/// of different types are arbitrated
pub const CROSS_TYPE_OVERLAP_RATIO: f32 = 0.5;

// ============================================================================
// Geometry
// ============================================================================

/// Minimum width/height (page units) a clipped region may keep
pub const MIN_CLIPPED_SIDE: f32 = 2.0;

// ============================================================================
// Orchestrator
// ============================================================================

/// Wall-clock budget for one page of detection
pub const PAGE_BUDGET_SECS: u64 = 30;

/// In-flight detectors must honor a cooperative cancel within this bound
pub const CANCEL_GRACE_SECS: u64 = 2;

/// How often the orchestrator re-checks the cancel flag while a
/// detector is in flight
pub const CANCEL_POLL_MS: u64 = 250;

// ============================================================================
// Token Vault
// ============================================================================

/// Hex digits taken from the token MAC
pub const TOKEN_HEX_LEN: usize = 12;

/// Salted re-derivation attempts before a collision is fatal
pub const MINT_MAX_ATTEMPTS: u8 = 16;

/// Vault file magic, followed by a single version byte
pub const VAULT_MAGIC: &[u8; 4] = b"DSVL";

/// Current vault file format version
pub const VAULT_VERSION: u8 = 1;

/// Argon2id parameters stored in the vault header
pub const VAULT_KDF_M_COST: u32 = 65536; // 64 MB
pub const VAULT_KDF_T_COST: u32 = 3;
pub const VAULT_KDF_P_COST: u32 = 4;

// ============================================================================
// Licensing
// ============================================================================

/// Offline license blobs are valid this many days after issuance
pub const LICENSE_VALIDITY_DAYS: i64 = 35;

/// License blob schema version
pub const LICENSE_SCHEMA_VERSION: u8 = 1;

/// Machine fingerprint length bounds (opaque client-supplied string)
pub const FINGERPRINT_MIN_LEN: usize = 16;
pub const FINGERPRINT_MAX_LEN: usize = 128;

// ============================================================================
// Rate Limiting
// ============================================================================

/// Max requests per sliding window, per IP
pub const RATE_LIMIT_MAX_REQUESTS: usize = 60;

/// Sliding window duration in seconds
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

// ============================================================================
// Application Metadata
// ============================================================================

/// Application data directory name
pub const APP_DATA_DIR: &str = "docshield";

/// Vault file name inside the data directory
pub const VAULT_FILE: &str = "vault.db";

/// Sidecar configuration file name
pub const CONFIG_FILE: &str = "config.toml";

/// Default token prefix (configurable)
pub const DEFAULT_TOKEN_PREFIX: &str = "ANON";
