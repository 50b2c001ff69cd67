//! PII detection pipeline: shared data model plus the detector stages.
//!
//! Per page, the regex, NER, and LLM detectors each produce `Detection`s
//! over the page's `full_text`; the merge stage arbitrates them into
//! non-overlapping, bbox-attached `PiiRegion`s.

pub mod llm;
pub mod merge;
pub mod ner;
pub mod noise;
pub mod orchestrator;
pub mod regex_detector;
pub mod regex_rules;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geometry::BBox;

/// Document-level cancellation flag shared between the orchestrator and
/// the detectors it fans out. Detectors poll it at coarse checkpoints
/// and must return within the cancel grace period once it trips.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// PII categories. `Filename` is minted only by the vault layer and is
/// never produced by a detector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiType {
    Person,
    Org,
    Location,
    Address,
    Email,
    Phone,
    Date,
    IdNumber,
    Money,
    Filename,
}

impl PiiType {
    /// Short mnemonic embedded in minted tokens, e.g. `[ANON_EMAIL_...]`.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            PiiType::Person => "PERSON",
            PiiType::Org => "ORG",
            PiiType::Location => "LOC",
            PiiType::Address => "ADDR",
            PiiType::Email => "EMAIL",
            PiiType::Phone => "PHONE",
            PiiType::Date => "DATE",
            PiiType::IdNumber => "ID",
            PiiType::Money => "MONEY",
            PiiType::Filename => "FILE",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s {
            "PERSON" => Some(PiiType::Person),
            "ORG" => Some(PiiType::Org),
            "LOC" => Some(PiiType::Location),
            "ADDR" => Some(PiiType::Address),
            "EMAIL" => Some(PiiType::Email),
            "PHONE" => Some(PiiType::Phone),
            "DATE" => Some(PiiType::Date),
            "ID" => Some(PiiType::IdNumber),
            "MONEY" => Some(PiiType::Money),
            "FILE" => Some(PiiType::Filename),
            _ => None,
        }
    }

    /// Pattern strictness used for cross-type arbitration. Higher wins.
    pub fn strictness(&self) -> u8 {
        match self {
            PiiType::Email | PiiType::Phone | PiiType::IdNumber => 3,
            PiiType::Person | PiiType::Org => 2,
            PiiType::Location | PiiType::Address => 1,
            PiiType::Date | PiiType::Money | PiiType::Filename => 0,
        }
    }
}

/// Which detector produced a hit. Precedence on exact-span ties:
/// REGEX > NER > LLM.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionSource {
    Regex,
    Ner,
    Llm,
}

impl DetectionSource {
    pub fn precedence(&self) -> u8 {
        match self {
            DetectionSource::Regex => 2,
            DetectionSource::Ner => 1,
            DetectionSource::Llm => 0,
        }
    }
}

/// Language hint passed down from the document layer. Without a hint all
/// locale packs run and duplicates are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
}

/// One extracted word/line with its page rectangle. Produced by the native
/// text extractor or OCR; the detectors never see the difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: BBox,
    pub source_confidence: f32,
}

/// A single page handed to the pipeline. `full_text` offsets are
/// authoritative; rectangles for character ranges are reconstructed from
/// `text_blocks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageData {
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    pub full_text: String,
    pub text_blocks: Vec<TextBlock>,
}

impl PageData {
    /// Character span of every text block inside `full_text`, located by
    /// a forward scan. Blocks whose text cannot be found (OCR artifacts)
    /// get no span and never contribute a rectangle.
    pub fn block_spans(&self) -> Vec<Option<(usize, usize)>> {
        let mut spans = Vec::with_capacity(self.text_blocks.len());
        let mut cursor = 0usize;
        for block in &self.text_blocks {
            let needle = block.text.trim();
            if needle.is_empty() {
                spans.push(None);
                continue;
            }
            match self.full_text[cursor.min(self.full_text.len())..].find(needle) {
                Some(rel) => {
                    let start = cursor + rel;
                    let end = start + needle.len();
                    spans.push(Some((start, end)));
                    cursor = end;
                }
                None => spans.push(None),
            }
        }
        spans
    }

    /// Tightest rectangle covering every block whose span intersects
    /// `[start, end)`. `None` when no block intersects.
    pub fn bbox_for_range(&self, start: usize, end: usize) -> Option<BBox> {
        let mut acc: Option<BBox> = None;
        for (block, span) in self.text_blocks.iter().zip(self.block_spans()) {
            let Some((bs, be)) = span else { continue };
            if bs < end && start < be {
                acc = Some(match acc {
                    Some(existing) => existing.union(&block.bbox),
                    None => block.bbox,
                });
            }
        }
        acc
    }
}

/// Pre-merge detector output. `[start, end)` are byte offsets into the
/// page's `full_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub pii_type: PiiType,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub source: DetectionSource,
    pub bbox: Option<BBox>,
}

/// What the anonymizer does with a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Tokenize,
    Redact,
    Ignore,
}

/// Post-merge region: a detection with a resolved rectangle, a stable id,
/// and an action. The id is a content hash so user overrides survive
/// re-detection of an unchanged page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiRegion {
    pub id: String,
    pub page_number: u32,
    pub pii_type: PiiType,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub source: DetectionSource,
    pub bbox: BBox,
    pub action: Action,
}

impl PiiRegion {
    pub fn from_detection(d: Detection, bbox: BBox, page_number: u32, action: Action) -> Self {
        let id = stable_region_id(page_number, d.start, d.end, d.pii_type, &d.text);
        Self {
            id,
            page_number,
            pii_type: d.pii_type,
            text: d.text,
            start: d.start,
            end: d.end,
            confidence: d.confidence,
            source: d.source,
            bbox,
            action,
        }
    }
}

fn stable_region_id(page: u32, start: usize, end: usize, pii_type: PiiType, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page.to_le_bytes());
    hasher.update(start.to_le_bytes());
    hasher.update(end.to_le_bytes());
    hasher.update(pii_type.mnemonic().as_bytes());
    hasher.update(text.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_blocks() -> PageData {
        PageData {
            page_number: 1,
            width: 612.0,
            height: 792.0,
            full_text: "Contact John Smith at john@example.com today".to_string(),
            text_blocks: vec![
                TextBlock {
                    text: "Contact".into(),
                    bbox: BBox::new(10.0, 10.0, 60.0, 22.0),
                    source_confidence: 1.0,
                },
                TextBlock {
                    text: "John".into(),
                    bbox: BBox::new(65.0, 10.0, 95.0, 22.0),
                    source_confidence: 1.0,
                },
                TextBlock {
                    text: "Smith".into(),
                    bbox: BBox::new(100.0, 10.0, 140.0, 22.0),
                    source_confidence: 1.0,
                },
                TextBlock {
                    text: "at".into(),
                    bbox: BBox::new(145.0, 10.0, 158.0, 22.0),
                    source_confidence: 1.0,
                },
                TextBlock {
                    text: "john@example.com".into(),
                    bbox: BBox::new(163.0, 10.0, 280.0, 22.0),
                    source_confidence: 1.0,
                },
            ],
        }
    }

    #[test]
    fn test_bbox_for_range_unions_intersecting_blocks() {
        let page = page_with_blocks();
        // "John Smith" spans two blocks.
        let start = page.full_text.find("John").unwrap();
        let end = start + "John Smith".len();
        let bbox = page.bbox_for_range(start, end).unwrap();
        assert_eq!(bbox.x0, 65.0);
        assert_eq!(bbox.x1, 140.0);
    }

    #[test]
    fn test_bbox_for_range_without_intersection() {
        let page = page_with_blocks();
        let len = page.full_text.len();
        assert!(page.bbox_for_range(len, len + 4).is_none());
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_region_id(1, 5, 12, PiiType::Person, "John Doe");
        let b = stable_region_id(1, 5, 12, PiiType::Person, "John Doe");
        let c = stable_region_id(2, 5, 12, PiiType::Person, "John Doe");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_mnemonic_round_trip() {
        for t in [
            PiiType::Person,
            PiiType::Org,
            PiiType::Location,
            PiiType::Address,
            PiiType::Email,
            PiiType::Phone,
            PiiType::Date,
            PiiType::IdNumber,
            PiiType::Money,
            PiiType::Filename,
        ] {
            assert_eq!(PiiType::from_mnemonic(t.mnemonic()), Some(t));
        }
    }
}
