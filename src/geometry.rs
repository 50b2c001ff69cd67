//! Bounding-box geometry for PII regions.
//!
//! Highlight rectangles on a page must never overlap: overlapping boxes
//! render as double-redaction artifacts and break region hit-testing in
//! the viewer. `resolve_overlaps` enforces that invariant by clipping
//! lower-confidence boxes against the ones already accepted.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_CLIPPED_SIDE;
use crate::detection::PiiRegion;

/// Rectangle in page coordinate space. `x1 > x0`, `y1 > y0`; the origin
/// and orientation come from the page that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Smallest rectangle covering both boxes.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn overlap_area(&self, other: &BBox) -> f32 {
        let ix0 = self.x0.max(other.x0);
        let iy0 = self.y0.max(other.y0);
        let ix1 = self.x1.min(other.x1);
        let iy1 = self.y1.min(other.y1);
        if ix1 <= ix0 || iy1 <= iy0 {
            return 0.0;
        }
        (ix1 - ix0) * (iy1 - iy0)
    }

    fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

/// Ensure no two highlight rectangles on a page overlap.
///
/// Regions are processed in descending confidence order (ties: earlier
/// `start`, then smaller area), so larger, more confident regions keep
/// their full extent and later candidates are clipped against them along
/// the axis with the smaller overlap extent. A candidate whose clipped
/// box falls under `MIN_CLIPPED_SIDE` on either side is dropped.
pub fn resolve_overlaps(regions: Vec<PiiRegion>) -> Vec<PiiRegion> {
    if regions.len() <= 1 {
        return regions;
    }

    let mut ordered = regions;
    ordered.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.start.cmp(&b.start))
            .then(
                a.bbox
                    .area()
                    .partial_cmp(&b.bbox.area())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let mut accepted: Vec<PiiRegion> = Vec::with_capacity(ordered.len());

    for mut region in ordered {
        let mut bbox = region.bbox;

        for keeper in &accepted {
            if bbox.overlap_area(&keeper.bbox) <= 0.0 {
                continue;
            }

            let overlap_x = bbox.x1.min(keeper.bbox.x1) - bbox.x0.max(keeper.bbox.x0);
            let overlap_y = bbox.y1.min(keeper.bbox.y1) - bbox.y0.max(keeper.bbox.y0);

            let (cx, cy) = bbox.center();
            let (kcx, kcy) = keeper.bbox.center();

            if overlap_y <= overlap_x {
                // Push the candidate's y-edge to the keeper's near edge,
                // away from the keeper's centroid.
                if cy < kcy {
                    bbox.y1 = keeper.bbox.y0;
                } else {
                    bbox.y0 = keeper.bbox.y1;
                }
            } else if cx < kcx {
                bbox.x1 = keeper.bbox.x0;
            } else {
                bbox.x0 = keeper.bbox.x1;
            }
        }

        if bbox.width() < MIN_CLIPPED_SIDE || bbox.height() < MIN_CLIPPED_SIDE {
            continue;
        }

        region.bbox = bbox;
        accepted.push(region);
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Action, Detection, DetectionSource, PiiType};

    fn region(confidence: f32, start: usize, bbox: BBox) -> PiiRegion {
        PiiRegion::from_detection(
            Detection {
                pii_type: PiiType::Person,
                text: "x".to_string(),
                start,
                end: start + 1,
                confidence,
                source: DetectionSource::Regex,
                bbox: None,
            },
            bbox,
            1,
            Action::Tokenize,
        )
    }

    fn assert_no_overlap(regions: &[PiiRegion]) {
        for (i, a) in regions.iter().enumerate() {
            for b in regions.iter().skip(i + 1) {
                assert_eq!(
                    a.bbox.overlap_area(&b.bbox),
                    0.0,
                    "regions {:?} and {:?} overlap",
                    a.bbox,
                    b.bbox
                );
            }
        }
    }

    #[test]
    fn test_disjoint_regions_untouched() {
        let regions = vec![
            region(0.9, 0, BBox::new(0.0, 0.0, 50.0, 10.0)),
            region(0.8, 10, BBox::new(0.0, 20.0, 50.0, 30.0)),
        ];
        let resolved = resolve_overlaps(regions);
        assert_eq!(resolved.len(), 2);
        assert_no_overlap(&resolved);
    }

    #[test]
    fn test_lower_confidence_region_is_clipped() {
        // Vertical overlap is smaller than horizontal, so the candidate's
        // y-edge moves to the keeper's near edge.
        let keeper = region(0.9, 0, BBox::new(0.0, 10.0, 100.0, 20.0));
        let candidate = region(0.5, 10, BBox::new(0.0, 18.0, 100.0, 40.0));
        let resolved = resolve_overlaps(vec![candidate, keeper]);

        assert_eq!(resolved.len(), 2);
        assert_no_overlap(&resolved);
        let clipped = resolved.iter().find(|r| r.confidence < 0.9).unwrap();
        assert_eq!(clipped.bbox.y0, 20.0);
        assert_eq!(clipped.bbox.y1, 40.0);
    }

    #[test]
    fn test_sliver_after_clip_is_dropped() {
        let keeper = region(0.9, 0, BBox::new(0.0, 0.0, 100.0, 30.0));
        // Fully buried in the keeper; clipping leaves a sub-2-unit sliver.
        let candidate = region(0.4, 10, BBox::new(10.0, 5.0, 60.0, 29.0));
        let resolved = resolve_overlaps(vec![keeper, candidate]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].confidence, 0.9);
    }

    #[test]
    fn test_confidence_tie_breaks_by_start() {
        // Same confidence: the earlier-start region wins its full extent.
        let a = region(0.7, 5, BBox::new(0.0, 0.0, 50.0, 10.0));
        let b = region(0.7, 0, BBox::new(40.0, 0.0, 90.0, 10.0));
        let resolved = resolve_overlaps(vec![a, b]);
        assert_no_overlap(&resolved);
        let first = resolved.iter().find(|r| r.start == 0).unwrap();
        assert_eq!(first.bbox.x0, 40.0);
        assert_eq!(first.bbox.x1, 90.0);
    }
}
