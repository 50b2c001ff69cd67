//! Regex-based PII detector.
//!
//! Runs the compiled pattern bank over a page's full text. Standalone
//! patterns emit directly; contextual patterns emit only when one of
//! their cue words appears within the configured window, and then carry
//! an additive confidence boost capped at 1.0.

use std::collections::HashMap;

use crate::constants::CONTEXT_CUE_WINDOW;
use crate::detection::regex_rules::{CuePosition, PATTERN_BANK};
use crate::detection::{Detection, DetectionSource, Language, PiiType};

pub struct RegexDetector {
    context_boost: f32,
}

impl RegexDetector {
    pub fn new(context_boost: f32) -> Self {
        Self { context_boost }
    }

    /// Detect over `full_text`. With a language hint only that locale's
    /// pack (plus universal patterns) runs; without one, every enabled
    /// locale runs and `(pii_type, start, end)` duplicates keep the
    /// highest confidence.
    pub fn detect(&self, full_text: &str, language: Option<Language>) -> Vec<Detection> {
        let mut best: HashMap<(PiiType, usize, usize), Detection> = HashMap::new();

        for rule in PATTERN_BANK.iter() {
            if let (Some(hint), Some(locale)) = (language, rule.locale) {
                if hint != locale {
                    continue;
                }
            }

            for caps in rule.regex.captures_iter(full_text) {
                // A capture group narrows the hit to the entity itself
                // (e.g. the name after a title); otherwise the whole
                // match is the span.
                let m = caps.get(1).unwrap_or_else(|| caps.get(0).unwrap());
                let (start, end) = (m.start(), m.end());

                let confidence = match rule.cues {
                    None => rule.base_confidence,
                    Some((cues, position)) => {
                        if !cue_in_window(full_text, start, end, cues, position) {
                            continue;
                        }
                        (rule.base_confidence + self.context_boost).min(1.0)
                    }
                };

                let detection = Detection {
                    pii_type: rule.pii_type,
                    text: m.as_str().to_string(),
                    start,
                    end,
                    confidence,
                    source: DetectionSource::Regex,
                    bbox: None,
                };

                best.entry((rule.pii_type, start, end))
                    .and_modify(|existing| {
                        if detection.confidence > existing.confidence {
                            *existing = detection.clone();
                        }
                    })
                    .or_insert(detection);
            }
        }

        let mut detections: Vec<Detection> = best.into_values().collect();
        detections.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.end.cmp(&b.end))
                .then(a.pii_type.cmp(&b.pii_type))
        });
        detections
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn cue_in_window(
    text: &str,
    start: usize,
    end: usize,
    cues: &[&str],
    position: CuePosition,
) -> bool {
    let before = {
        let lo = floor_char_boundary(text, start.saturating_sub(CONTEXT_CUE_WINDOW));
        text[lo..start].to_lowercase()
    };
    let after = {
        let hi = ceil_char_boundary(text, (end + CONTEXT_CUE_WINDOW).min(text.len()));
        text[end..hi].to_lowercase()
    };

    cues.iter().any(|cue| match position {
        CuePosition::Before => before.contains(cue),
        CuePosition::After => after.contains(cue),
        CuePosition::Either => before.contains(cue) || after.contains(cue),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTEXT_CUE_BOOST;

    fn detector() -> RegexDetector {
        RegexDetector::new(CONTEXT_CUE_BOOST)
    }

    fn find(detections: &[Detection], pii_type: PiiType) -> Option<&Detection> {
        detections.iter().find(|d| d.pii_type == pii_type)
    }

    #[test]
    fn test_french_org_suffix_full_span() {
        let text = "Les entreprises de restauration B.N. ltée";
        let detections = detector().detect(text, Some(Language::Fr));
        let org = find(&detections, PiiType::Org).expect("ORG expected");
        assert_eq!(org.start, 0);
        assert_eq!(org.end, text.len());
        assert!(org.confidence >= 0.7);
    }

    #[test]
    fn test_quebec_numbered_company_full_span() {
        let text = "9425-7524 Québec inc.";
        let detections = detector().detect(text, Some(Language::Fr));
        let org = find(&detections, PiiType::Org).expect("ORG expected");
        assert_eq!(&text[org.start..org.end], text);
    }

    #[test]
    fn test_email_detected_in_any_locale() {
        for hint in [None, Some(Language::En), Some(Language::Fr)] {
            let detections = detector().detect("write to foo@bar.com please", hint);
            let email = find(&detections, PiiType::Email).expect("EMAIL expected");
            assert_eq!(email.text, "foo@bar.com");
            assert!(email.confidence >= 0.9);
        }
    }

    #[test]
    fn test_contextual_phone_requires_cue() {
        let detections = detector().detect("valeur 555-1234 au total", None);
        assert!(find(&detections, PiiType::Phone).is_none());

        let detections = detector().detect("Tél: 555-1234", None);
        let phone = find(&detections, PiiType::Phone).expect("PHONE expected");
        assert_eq!(phone.text, "555-1234");
        assert!((phone.confidence - (0.6 + CONTEXT_CUE_BOOST)).abs() < 1e-6);
    }

    #[test]
    fn test_no_hint_runs_all_locales_and_dedups() {
        let text = "Call 514-555-1234 or mail foo@bar.com";
        let detections = detector().detect(text, None);
        // No duplicate spans survive.
        let mut seen = std::collections::HashSet::new();
        for d in &detections {
            assert!(seen.insert((d.pii_type, d.start, d.end)));
        }
        assert!(find(&detections, PiiType::Email).is_some());
        assert!(find(&detections, PiiType::Phone).is_some());
    }

    #[test]
    fn test_output_order_is_deterministic() {
        let text = "Mr. John Smith, 123 Main Street, foo@bar.com";
        let a = detector().detect(text, Some(Language::En));
        let b = detector().detect(text, Some(Language::En));
        let spans_a: Vec<_> = a.iter().map(|d| (d.start, d.end, d.pii_type)).collect();
        let spans_b: Vec<_> = b.iter().map(|d| (d.start, d.end, d.pii_type)).collect();
        assert_eq!(spans_a, spans_b);
        assert!(spans_a.windows(2).all(|w| w[0] <= w[1]));
    }
}
