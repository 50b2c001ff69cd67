//! Merge & arbitration: unify the detectors' output for one page into
//! non-overlapping, bbox-attached, actionable regions.
//!
//! The stages run in a fixed order (offset dedup, span subsumption,
//! cross-type arbitration, noise filter, bbox attachment, geometry
//! resolution, action assignment) and the result is byte-deterministic
//! for identical input and configuration.

use std::collections::HashMap;

use crate::constants::{ARBITRATION_OVERRIDE_MARGIN, CROSS_TYPE_OVERLAP_RATIO};
use crate::detection::noise;
use crate::detection::{Action, Detection, PageData, PiiRegion, PiiType};
use crate::geometry::{self, BBox};

#[derive(Debug, Clone, Copy)]
pub struct MergeConfig {
    /// Regions under this confidence are discarded
    pub confidence_threshold: f32,
    /// DATE/MONEY at or above this confidence default to TOKENIZE
    pub date_money_threshold: f32,
}

/// Arbitrate one page's detections into final regions.
///
/// `action_overrides` maps stable region ids to user-chosen actions and
/// wins over the defaults, so overrides survive re-detection.
pub fn merge_page(
    detections: Vec<Detection>,
    page: &PageData,
    action_overrides: &HashMap<String, Action>,
    config: MergeConfig,
) -> Vec<PiiRegion> {
    let mut detections = detections;
    detections.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.end.cmp(&b.end))
            .then(a.pii_type.cmp(&b.pii_type))
            .then(a.source.cmp(&b.source))
    });

    let detections = dedup_offsets(detections);
    let detections = arbitrate_spans(detections);

    // Noise + confidence floor
    let detections: Vec<Detection> = detections
        .into_iter()
        .filter(|d| d.confidence >= config.confidence_threshold)
        .filter(|d| !noise::is_noise(d.pii_type, &d.text))
        .collect();

    // Bbox attachment: tightest rectangle over intersecting text blocks.
    // Detections no block can anchor have nothing to highlight and drop.
    let spans = page.block_spans();
    let mut regions: Vec<PiiRegion> = Vec::with_capacity(detections.len());
    for detection in detections {
        let Some(bbox) = bbox_for(&detection, page, &spans) else {
            continue;
        };
        let action = default_action(&detection, config);
        regions.push(PiiRegion::from_detection(
            detection,
            bbox,
            page.page_number,
            action,
        ));
    }

    let mut regions = geometry::resolve_overlaps(regions);

    for region in &mut regions {
        if let Some(action) = action_overrides.get(&region.id) {
            region.action = *action;
        }
    }

    regions.sort_by(|a, b| {
        a.page_number
            .cmp(&b.page_number)
            .then(a.start.cmp(&b.start))
            .then(a.end.cmp(&b.end))
            .then(a.pii_type.cmp(&b.pii_type))
    });
    regions
}

/// Stage 1: identical `(start, end)` spans collapse to one detection.
/// Highest confidence wins; on a tie, source precedence REGEX > NER > LLM.
fn dedup_offsets(detections: Vec<Detection>) -> Vec<Detection> {
    let mut best: HashMap<(usize, usize), Detection> = HashMap::new();
    for detection in detections {
        match best.entry((detection.start, detection.end)) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(detection);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let held = slot.get();
                let wins = detection.confidence > held.confidence
                    || (detection.confidence == held.confidence
                        && detection.source.precedence() > held.source.precedence());
                if wins {
                    slot.insert(detection);
                }
            }
        }
    }
    let mut out: Vec<Detection> = best.into_values().collect();
    out.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.end.cmp(&b.end))
            .then(a.pii_type.cmp(&b.pii_type))
    });
    out
}

/// Stages 2 and 3: same-type span subsumption, then cross-type overlap
/// arbitration by pattern strictness. In both cases the loser survives
/// only when its confidence beats the winner's by the override margin.
fn arbitrate_spans(detections: Vec<Detection>) -> Vec<Detection> {
    let mut dropped = vec![false; detections.len()];

    // Same type: a strictly containing span absorbs the shorter one.
    for i in 0..detections.len() {
        if dropped[i] {
            continue;
        }
        for j in 0..detections.len() {
            if i == j || dropped[j] {
                continue;
            }
            let (a, b) = (&detections[i], &detections[j]);
            if a.pii_type == b.pii_type
                && strictly_contains(b, a)
                && a.confidence < b.confidence + ARBITRATION_OVERRIDE_MARGIN
            {
                dropped[i] = true;
                break;
            }
        }
    }

    // Different types: overlap above half the shorter span is arbitrated
    // by type strictness (EMAIL/PHONE/ID > PERSON/ORG > LOC/ADDRESS >
    // DATE/MONEY), with the same confidence override.
    for i in 0..detections.len() {
        if dropped[i] {
            continue;
        }
        for j in 0..detections.len() {
            if i == j || dropped[j] {
                continue;
            }
            let (a, b) = (&detections[i], &detections[j]);
            if a.pii_type == b.pii_type || !overlaps_majority(a, b) {
                continue;
            }

            let a_loses = match b.pii_type.strictness().cmp(&a.pii_type.strictness()) {
                std::cmp::Ordering::Greater => {
                    a.confidence < b.confidence + ARBITRATION_OVERRIDE_MARGIN
                }
                std::cmp::Ordering::Equal => a.confidence < b.confidence,
                std::cmp::Ordering::Less => false,
            };
            if a_loses {
                dropped[i] = true;
                break;
            }
        }
    }

    detections
        .into_iter()
        .zip(dropped)
        .filter(|(_, dropped)| !dropped)
        .map(|(d, _)| d)
        .collect()
}

fn strictly_contains(outer: &Detection, inner: &Detection) -> bool {
    outer.start <= inner.start
        && inner.end <= outer.end
        && (outer.end - outer.start) > (inner.end - inner.start)
}

fn overlaps_majority(a: &Detection, b: &Detection) -> bool {
    let overlap = a.end.min(b.end).saturating_sub(a.start.max(b.start));
    if overlap == 0 {
        return false;
    }
    let shorter = (a.end - a.start).min(b.end - b.start);
    overlap as f32 > CROSS_TYPE_OVERLAP_RATIO * shorter as f32
}

fn bbox_for(
    detection: &Detection,
    page: &PageData,
    spans: &[Option<(usize, usize)>],
) -> Option<BBox> {
    if let Some(bbox) = detection.bbox {
        return Some(bbox);
    }
    let mut acc: Option<BBox> = None;
    for (block, span) in page.text_blocks.iter().zip(spans) {
        let Some((bs, be)) = span else { continue };
        if *bs < detection.end && detection.start < *be {
            acc = Some(match acc {
                Some(existing) => existing.union(&block.bbox),
                None => block.bbox,
            });
        }
    }
    acc
}

fn default_action(detection: &Detection, config: MergeConfig) -> Action {
    match detection.pii_type {
        PiiType::Date | PiiType::Money => {
            if detection.confidence >= config.date_money_threshold {
                Action::Tokenize
            } else {
                Action::Ignore
            }
        }
        _ => Action::Tokenize,
    }
}
