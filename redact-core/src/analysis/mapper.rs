use tracing::warn;

use crate::text::{EntitySpan, TextIndex};

use super::{
    bbox::Bbox,
    region::{BoxSource, Region},
};

/// Maps text spans back onto the pixel boxes of the words that produced them.
pub struct SpanToRegionMapper;

impl SpanToRegionMapper {
    /// Union of every word box whose text range overlaps the span.
    ///
    /// Returns `None` when no word overlaps or when the span does not fit the
    /// indexed text; the latter is logged and dropped.
    pub fn map(span: &EntitySpan, index: &TextIndex) -> Option<Bbox> {
        if let Err(err) = index.check_span(span) {
            warn!(
                recognizer = %span.recognizer,
                entity = %span.entity_type,
                "Dropping span: {}",
                err
            );
            return None;
        }

        index
            .overlapping(span.start, span.end)
            .map(|w| w.bbox)
            .reduce(|acc, bbox| acc.union(&bbox))
    }

    /// Maps every span, keeping entity type and confidence on the region.
    pub fn map_all(spans: &[EntitySpan], index: &TextIndex) -> Vec<Region> {
        spans
            .iter()
            .filter_map(|span| {
                Self::map(span, index).map(|bbox| {
                    Region::new(
                        bbox,
                        span.entity_type.clone(),
                        Some(span.confidence),
                        BoxSource::Recognizer,
                    )
                })
            })
            .collect()
    }
}
