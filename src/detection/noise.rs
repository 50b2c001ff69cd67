//! Per-type noise suppression.
//!
//! The statistical detectors in particular produce generic role nouns
//! ("la société", "le Prêteur"), form-field labels and layout fragments.
//! Each predicate here is pure: stop-phrase lookup over a case-folded,
//! whitespace-normalized rendering, a handful of structural rules, and
//! length guards.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::detection::PiiType;

static ORG_STOP_PHRASES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "la société",
        "société",
        "l'entreprise",
        "lentreprise",
        "entreprise",
        "la compagnie",
        "compagnie",
        "mon entreprise",
        "de l",
        "d'une",
        "à l",
        "le plus",
        "la fin de",
        "période d",
        "a payer",
        "d'assurance",
        "déboursés",
        "principales",
        "comptables",
        "corporelles",
        "elles",
        "activités",
        "informations financières",
        "seuil de rentabilité",
        "bénéfices non répartis",
        "la tps/tvh",
        "choix 2",
        "the company",
        "the firm",
        "our company",
    ]
    .into_iter()
    .collect()
});

static PERSON_STOP_PHRASES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "la personne",
        "la compagnie",
        "la société",
        "le prêteur",
        "prêteur",
        "l'emprunteur",
        "emprunteur",
        "le producteur",
        "administrateur",
        "signature",
        "client",
        "période",
        "emploi",
        "travaux",
        "intérêts",
        "émission",
        "horodatage",
        "livraison",
        "distribution",
        "processus",
        "inscrite",
        "débiteur",
        "date",
        "docusign",
        "additionnez",
        "the person",
        "the client",
        "the undersigned",
    ]
    .into_iter()
    .collect()
});

static LOCATION_STOP_PHRASES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "location",
        "localement",
        "l'emplacement",
        "pays",
        "province",
        "territoire",
        "régions",
        "outre-mer",
        "protégé b",
    ]
    .into_iter()
    .collect()
});

static ROLE_NOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "société",
        "personne",
        "entreprise",
        "compagnie",
        "client",
        "fournisseur",
        "prêteur",
        "emprunteur",
        "producteur",
        "administrateur",
        "directeur",
        "président",
        "signataire",
        "débiteur",
        "promoteur",
        "entrepreneur",
    ]
    .into_iter()
    .collect()
});

const MONTH_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "janvier", "février", "mars", "avril", "mai", "juin",
    "juillet", "août", "septembre", "octobre", "novembre", "décembre",
];

const ARTICLE_FRAGMENTS: &[&str] = &["la ", "le ", "les ", "l'", "de ", "du ", "d'", "des "];

/// Case-fold and collapse all internal whitespace to single spaces.
pub fn normalize_phrase(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when the span is exactly a generic role noun, optionally behind a
/// French article ("la société", "l'emprunteur"). Used by the NER filter
/// for languages with gendered/function stopword problems.
pub fn is_role_noun(text: &str) -> bool {
    let normalized = normalize_phrase(text);
    if ROLE_NOUNS.contains(normalized.as_str()) {
        return true;
    }
    for article in ["la ", "le ", "les ", "l'", "un ", "une "] {
        if let Some(rest) = normalized.strip_prefix(article) {
            if ROLE_NOUNS.contains(rest) {
                return true;
            }
        }
    }
    false
}

fn starts_with_month(normalized: &str) -> bool {
    MONTH_WORDS
        .iter()
        .any(|m| normalized.starts_with(m))
}

/// Newline glued to an article fragment is a line-wrap artifact, not an
/// entity ("BÉNÉFICES ...\nPOUR LES EXERCICES").
fn is_wrap_artifact(text: &str) -> bool {
    match text.split_once('\n') {
        Some((_, tail)) => {
            let tail = tail.to_lowercase();
            ARTICLE_FRAGMENTS
                .iter()
                .any(|frag| tail.starts_with(frag) || tail.contains(&format!(" {frag}")))
        }
        None => false,
    }
}

fn is_structureless(text: &str) -> bool {
    !text.chars().any(|c| c.is_alphabetic())
}

/// Per-type noise predicate applied after merge dedup and before bbox
/// attachment. Pure and side-effect free.
pub fn is_noise(pii_type: PiiType, text: &str) -> bool {
    let normalized = normalize_phrase(text);
    if normalized.is_empty() {
        return true;
    }

    match pii_type {
        PiiType::Org => {
            if normalized.chars().count() < 2 || is_structureless(text) {
                return true;
            }
            ORG_STOP_PHRASES.contains(normalized.as_str())
                || normalized.starts_with("annexe ")
                || starts_with_month(&normalized)
                || is_wrap_artifact(text)
        }
        PiiType::Person => {
            if normalized.chars().count() > 80 || is_structureless(text) {
                return true;
            }
            PERSON_STOP_PHRASES.contains(normalized.as_str())
                || normalized.contains("www.")
                || normalized.ends_with(".com")
                || normalized.ends_with(".ca")
                || starts_with_month(&normalized)
                || is_wrap_artifact(text)
                || is_role_noun(text)
        }
        PiiType::Location => {
            if normalized.chars().count() < 3 || is_structureless(text) {
                return true;
            }
            LOCATION_STOP_PHRASES.contains(normalized.as_str()) || is_wrap_artifact(text)
        }
        // The structured types are regex-anchored; only reject spans that
        // carry no letters or digits at all.
        _ => !text.chars().any(|c| c.is_alphanumeric()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_role_nouns_are_noise() {
        assert!(is_noise(PiiType::Person, "la société"));
        assert!(is_noise(PiiType::Org, "la société"));
        assert!(is_noise(PiiType::Person, "la personne"));
        assert!(is_noise(PiiType::Person, "le Prêteur"));
        assert!(is_noise(PiiType::Org, "L'entreprise"));
    }

    #[test]
    fn test_real_entities_pass() {
        assert!(!is_noise(PiiType::Person, "Jean Tremblay"));
        assert!(!is_noise(PiiType::Org, "Acme Corporation Inc."));
        assert!(!is_noise(PiiType::Location, "Montréal"));
    }

    #[test]
    fn test_whitespace_variants_collapse() {
        assert!(is_noise(PiiType::Person, "la\npersonne"));
        assert!(is_noise(PiiType::Person, "LA  PERSONNE"));
    }

    #[test]
    fn test_structural_rules() {
        assert!(is_noise(PiiType::Org, "---"));
        assert!(is_noise(PiiType::Person, "www.paiements.ca"));
        assert!(is_noise(PiiType::Org, "Annexe 2"));
        assert!(is_noise(PiiType::Person, "Janvier 2024"));
        assert!(is_noise(
            PiiType::Org,
            "NOTES AFFÉRENTES AUX ÉTATS FINANCIERS\nPOUR LES EXERCICES SE TERMINANT"
        ));
    }

    #[test]
    fn test_length_guards() {
        assert!(is_noise(PiiType::Org, "A"));
        let long_name = "a ".repeat(50);
        assert!(is_noise(PiiType::Person, &long_name));
    }

    #[test]
    fn test_role_noun_detection() {
        assert!(is_role_noun("la société"));
        assert!(is_role_noun("L'emprunteur"));
        assert!(is_role_noun("société"));
        assert!(!is_role_noun("Société Radio-Canada"));
    }
}
