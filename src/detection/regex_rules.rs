//! Compiled pattern bank for the regex detector.
//!
//! Patterns come in two classes: standalone patterns applied to the raw
//! page text, and contextual patterns that only count when a cue word
//! appears within `CONTEXT_CUE_WINDOW` characters. Patterns are grouped
//! into locale packs; a detector run without a language hint applies all
//! of them and deduplicates afterwards.

use lazy_static::lazy_static;
use regex::Regex;

use crate::detection::{Language, PiiType};

/// Where the cue word must sit relative to the hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuePosition {
    Before,
    After,
    Either,
}

pub struct PatternRule {
    pub regex: Regex,
    pub pii_type: PiiType,
    pub base_confidence: f32,
    /// `None` = applies to every locale
    pub locale: Option<Language>,
    /// `Some` makes this a contextual pattern: the hit only counts when
    /// one of the cue words appears in the window, and it then receives
    /// the configured confidence boost.
    pub cues: Option<(&'static [&'static str], CuePosition)>,
}

fn rule(
    pattern: &str,
    pii_type: PiiType,
    base_confidence: f32,
    locale: Option<Language>,
) -> PatternRule {
    PatternRule {
        regex: Regex::new(pattern).expect("pattern bank regex is invalid"),
        pii_type,
        base_confidence,
        locale,
        cues: None,
    }
}

fn contextual(
    pattern: &str,
    pii_type: PiiType,
    base_confidence: f32,
    locale: Option<Language>,
    cues: &'static [&'static str],
    position: CuePosition,
) -> PatternRule {
    PatternRule {
        cues: Some((cues, position)),
        ..rule(pattern, pii_type, base_confidence, locale)
    }
}

lazy_static! {
    pub static ref PATTERN_BANK: Vec<PatternRule> = build_bank();
}

fn build_bank() -> Vec<PatternRule> {
    vec![
        // ====================== Universal ======================
        // RFC-5321-shaped email
        rule(
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            PiiType::Email,
            0.95,
            None,
        ),
        // Bare E.164
        rule(r"\+[1-9]\d{6,14}\b", PiiType::Phone, 0.9, None),
        // Canadian SIN
        rule(r"\b\d{3}[ -]\d{3}[ -]\d{3}\b", PiiType::IdNumber, 0.8, None),
        // Canadian postal code
        rule(
            r"\b[ABCEGHJ-NPRSTVXY]\d[A-Z]\s?\d[A-Z]\d\b",
            PiiType::Address,
            0.8,
            None,
        ),
        // ISO date
        rule(
            r"\b(?:19|20)\d{2}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12]\d|3[01])\b",
            PiiType::Date,
            0.85,
            None,
        ),
        // Capitalized first/last name pair; heavily noise-filtered later
        rule(
            r"\b[A-ZÀ-Ü][a-zà-ÿ]+ (?:[A-ZÀ-Ü]\. )?[A-ZÀ-Ü][a-zà-ÿ]+\b",
            PiiType::Person,
            0.65,
            None,
        ),
        // ====================== English pack ======================
        rule(
            r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            PiiType::Phone,
            0.85,
            Some(Language::En),
        ),
        // US SSN
        rule(
            r"\b\d{3}-\d{2}-\d{4}\b",
            PiiType::IdNumber,
            0.95,
            Some(Language::En),
        ),
        rule(
            r"\b\d+\s+[\w\s]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Circle|Cir|Plaza|Pl|Way|Parkway|Pkwy)\b",
            PiiType::Address,
            0.85,
            Some(Language::En),
        ),
        rule(
            r"\b(?:Mr\.|Mrs\.|Ms\.|Dr\.|Prof\.)\s+([A-Z][a-z]+(?: [A-Z][a-z]+)?)\b",
            PiiType::Person,
            0.9,
            Some(Language::En),
        ),
        rule(
            r"\b[A-Z][A-Za-z&\s]+ (?:Inc|LLC|LLP|Corp|Corporation|Company|Partners|Group|Associates|LTD|Limited)\b\.?",
            PiiType::Org,
            0.85,
            Some(Language::En),
        ),
        rule(
            r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+(?:0?[1-9]|[12]\d|3[01]),?\s+(?:19|20)\d{2}\b",
            PiiType::Date,
            0.8,
            Some(Language::En),
        ),
        rule(
            r"\$\s?\d{1,3}(?:[, ]\d{3})*(?:\.\d{2})?\b",
            PiiType::Money,
            0.8,
            Some(Language::En),
        ),
        // ====================== French pack ======================
        // Company name ending in a Québec/France corporate suffix, with
        // connecting words allowed ("Les entreprises de restauration
        // B.N. ltée").
        rule(
            r"\b[A-ZÀ-Ü][A-Za-zÀ-ÿ0-9.&'\-]*(?:\s+[A-Za-zÀ-ÿ0-9.&'\-]+){0,6}\s+(?:[Ll]t[ée]e|[Ll]imit[ée]e|[Ii]nc|[Ee]nr\.?g?|SENC|senc)\b\.?",
            PiiType::Org,
            0.8,
            Some(Language::Fr),
        ),
        // Numbered companies: "9425-7524 Québec inc."
        rule(
            r"\b\d{3,10}(?:-\d{3,10})?\s+(?:[A-Za-zÀ-ÿ\-']{1,20}\s+){0,3}(?i:inc|corp|llc|ltd|llp|plc|lp|gmbh|ag|bv|nv|s\.a\.r\.l|sarl|lt[ée]e|limit[ée]e|enr\.?g?|senc)\b\.?",
            PiiType::Org,
            0.9,
            Some(Language::Fr),
        ),
        // French landline/mobile
        rule(
            r"\b0[1-9](?:[ .-]?\d{2}){4}\b",
            PiiType::Phone,
            0.85,
            Some(Language::Fr),
        ),
        rule(
            r"(?i)\b\d{1,5}[a-z]?,?\s+(?:rue|avenue|av\.|boulevard|boul\.|chemin|ch\.|place|côte|montée|impasse|allée)\s+[A-Za-zÀ-ÿ'\-]+(?:\s+[A-Za-zÀ-ÿ'\-]+){0,3}",
            PiiType::Address,
            0.85,
            Some(Language::Fr),
        ),
        rule(
            r"\b(?:M\.|Mme|Mlle|Me|Dr)\s+([A-ZÀ-Ü][a-zà-ÿ\-]+(?:\s+[A-ZÀ-Ü][a-zà-ÿ\-]+)?)",
            PiiType::Person,
            0.9,
            Some(Language::Fr),
        ),
        rule(
            r"(?i)\b(?:0?[1-9]|[12]\d|3[01])(?:er)?\s+(?:janvier|février|mars|avril|mai|juin|juillet|août|septembre|octobre|novembre|décembre)\s+(?:19|20)\d{2}\b",
            PiiType::Date,
            0.8,
            Some(Language::Fr),
        ),
        rule(
            r"\b\d{1,3}(?:[ .]\d{3})*(?:,\d{2})?\s?(?:\$|€)",
            PiiType::Money,
            0.8,
            Some(Language::Fr),
        ),
        // ====================== Contextual patterns ======================
        // Capitalized run after an introducing business noun:
        // "la société Tremblay Transport"
        contextual(
            r"\b[A-ZÀ-Ü][A-Za-zÀ-ÿ0-9.&'\-]+(?:\s+[A-ZÀ-Ü][A-Za-zÀ-ÿ0-9.&'\-]+){0,4}\b",
            PiiType::Org,
            0.45,
            Some(Language::Fr),
            &["société", "entreprise", "compagnie", "firme"],
            CuePosition::Before,
        ),
        // Opaque identifier near a file/account label
        contextual(
            r"\b[A-Z0-9][A-Z0-9\-]{4,14}\b",
            PiiType::IdNumber,
            0.55,
            None,
            &[
                "dossier",
                "matricule",
                "compte",
                "case no",
                "file no",
                "account",
                "id:",
            ],
            CuePosition::Before,
        ),
        // Seven-digit local phone next to a telephony label
        contextual(
            r"\b\d{3}[ .-]\d{4}\b",
            PiiType::Phone,
            0.6,
            None,
            &["tel", "tél", "phone", "poste", "fax"],
            CuePosition::Before,
        ),
    ]
}
