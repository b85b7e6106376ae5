use std::collections::BTreeMap;

use tracing::debug;

use super::region::Region;

/// Combines detector, pattern and recognizer regions into one padded,
/// clipped list.
pub struct BoxFusionEngine;

impl BoxFusionEngine {
    /// Concatenates the three sources in order, pads each box by `pad` on
    /// every side, clips into `[0, width - 1] × [0, height - 1]` and drops
    /// boxes left without area.
    ///
    /// Overlapping boxes are kept: painting a pixel twice with the same
    /// redaction gives the same result.
    pub fn fuse(
        detector: &[Region],
        pattern: &[Region],
        recognizer: &[Region],
        width: u32,
        height: u32,
        pad: i32,
    ) -> Vec<Region> {
        let total = detector.len() + pattern.len() + recognizer.len();
        let fused: Vec<Region> = detector
            .iter()
            .chain(pattern)
            .chain(recognizer)
            .filter_map(|region| {
                let bbox = region.bbox.pad(pad).clip(width, height);
                (!bbox.is_degenerate()).then(|| region.with_bbox(bbox))
            })
            .collect();

        debug!(input = total, kept = fused.len(), pad, "Fused regions");
        fused
    }

    /// Merges regions whose boxes intersect into their bounding union.
    ///
    /// Connected components are found with union-find over pairwise
    /// intersection, so chains of overlapping boxes collapse into one. The
    /// merged region keeps the source of its first member, joins distinct
    /// labels with `+` and keeps the highest score.
    pub fn merge_overlapping(regions: &[Region]) -> Vec<Region> {
        let mut sets = DisjointSet::new(regions.len());
        for i in 0..regions.len() {
            for j in (i + 1)..regions.len() {
                if regions[i].bbox.intersects(&regions[j].bbox) {
                    sets.union(i, j);
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..regions.len() {
            components.entry(sets.find(i)).or_default().push(i);
        }

        let mut merged: Vec<(usize, Region)> = components
            .into_values()
            .map(|members| {
                let first = members[0];
                let mut region = regions[first].clone();
                let mut labels = vec![region.label.clone()];
                for &idx in &members[1..] {
                    let other = &regions[idx];
                    region.bbox = region.bbox.union(&other.bbox);
                    region.score = match (region.score, other.score) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (a, b) => a.or(b),
                    };
                    if !labels.contains(&other.label) {
                        labels.push(other.label.clone());
                    }
                }
                region.label = labels.join("+");
                (first, region)
            })
            .collect();

        // Keep the order of first appearance for deterministic reports
        merged.sort_by_key(|(first, _)| *first);
        merged.into_iter().map(|(_, region)| region).collect()
    }
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut idx: usize) -> usize {
        while self.parent[idx] != idx {
            self.parent[idx] = self.parent[self.parent[idx]];
            idx = self.parent[idx];
        }
        idx
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller index becomes the root
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{bbox::Bbox, region::BoxSource};

    fn region(x1: i32, y1: i32, x2: i32, y2: i32, source: BoxSource) -> Region {
        Region::new(Bbox::from_xyxy(x1, y1, x2, y2), "PII", Some(0.8), source)
    }

    #[test]
    fn test_fuse_order_and_padding() {
        let detector = [region(100, 100, 150, 120, BoxSource::Detector)];
        let pattern = [region(10, 10, 20, 20, BoxSource::Pattern)];
        let recognizer = [region(10, 10, 90, 30, BoxSource::Recognizer)];

        let fused = BoxFusionEngine::fuse(&detector, &pattern, &recognizer, 200, 200, 5);
        let sources: Vec<_> = fused.iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            vec![BoxSource::Detector, BoxSource::Pattern, BoxSource::Recognizer]
        );
        assert_eq!(fused[2].bbox.xyxy(), [5, 5, 95, 35]);
        assert_eq!(fused[0].bbox.xyxy(), [95, 95, 155, 125]);
    }

    #[test]
    fn test_fuse_clips_into_image() {
        let boxes = [
            region(180, -20, 260, 40, BoxSource::Detector),
            region(-30, 150, 40, 130 + 100, BoxSource::Detector),
        ];
        let (width, height) = (200u32, 160u32);
        let fused = BoxFusionEngine::fuse(&boxes, &[], &[], width, height, 3);

        assert_eq!(fused.len(), 2);
        for region in &fused {
            let [x1, y1, x2, y2] = region.bbox.xyxy();
            assert!(0 <= x1 && x1 < x2 && x2 <= width as i32);
            assert!(0 <= y1 && y1 < y2 && y2 <= height as i32);
        }
        assert_eq!(fused[0].bbox.xyxy(), [177, 0, 199, 43]);
    }

    #[test]
    fn test_fuse_drops_degenerate() {
        let boxes = [
            region(300, 300, 400, 400, BoxSource::Pattern),
            region(50, 50, 50, 80, BoxSource::Pattern),
            region(10, 10, 30, 30, BoxSource::Pattern),
        ];
        let fused = BoxFusionEngine::fuse(&[], &boxes, &[], 200, 200, 0);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].bbox.xyxy(), [10, 10, 30, 30]);
    }

    #[test]
    fn test_fuse_empty() {
        assert!(BoxFusionEngine::fuse(&[], &[], &[], 100, 100, 4).is_empty());
    }

    #[test]
    fn test_merge_overlapping_chains() {
        let mut a = region(0, 0, 10, 10, BoxSource::Detector);
        a.label = "license_plate".into();
        let mut b = region(8, 8, 20, 20, BoxSource::Recognizer);
        b.label = "PERSON".into();
        b.score = Some(0.95);
        let c = region(18, 18, 30, 30, BoxSource::Pattern);
        let far = region(100, 100, 110, 110, BoxSource::Pattern);

        let merged = BoxFusionEngine::merge_overlapping(&[a, b, far, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].bbox.xyxy(), [0, 0, 30, 30]);
        assert_eq!(merged[0].label, "license_plate+PERSON+PII");
        assert_eq!(merged[0].score, Some(0.95));
        assert_eq!(merged[0].source, BoxSource::Detector);
        assert_eq!(merged[1].bbox.xyxy(), [100, 100, 110, 110]);
    }
}
