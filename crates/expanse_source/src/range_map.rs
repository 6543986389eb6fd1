//! Bidirectional mapping between expansion text and invocation text.

use serde::{Deserialize, Serialize};

use crate::error::RangeMapError;
use crate::range::TextRange;

/// One mapping pair: a range of expansion ("target") text and the range of
/// invocation ("source") text it was produced from.
///
/// A *literal* pair is a verbatim copy of source text, so sub-ranges of it can
/// be attributed proportionally. A synthesized pair only attributes as a
/// whole: the macro fabricated that text, and pointing at a fraction of its
/// source would be misleading.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct MappedRange {
    /// Range in the expanded text.
    pub target: TextRange,
    /// Range in the invocation text.
    pub source: TextRange,
    /// Whether the target text is a verbatim copy of the source text.
    pub literal: bool,
}

impl MappedRange {
    /// A pair whose target text is copied verbatim from `source`.
    pub fn literal(target: TextRange, source: TextRange) -> Self {
        Self {
            target,
            source,
            literal: true,
        }
    }

    /// A pair whose target text was fabricated from `source` as a whole.
    pub fn synthesized(target: TextRange, source: TextRange) -> Self {
        Self {
            target,
            source,
            literal: false,
        }
    }
}

/// An immutable, sorted set of [`MappedRange`] pairs for one expansion.
///
/// Target ranges are non-empty and pairwise disjoint, and the pairs are kept
/// sorted by target start so target lookups are a binary search. Source
/// ranges may overlap one another (a macro can repeat its input), so a
/// secondary index sorted by source start serves the reverse direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeMap {
    pairs: Vec<MappedRange>,
    /// Indices into `pairs`, sorted by `source.start`.
    by_source: Vec<u32>,
}

impl RangeMap {
    /// Builds a range map from pairs in any order.
    ///
    /// Fails if any range is inverted, any target range is empty, a literal
    /// pair has an empty source, or two target ranges overlap.
    pub fn new(mut pairs: Vec<MappedRange>) -> Result<Self, RangeMapError> {
        pairs.sort_by_key(|p| (p.target.start, p.target.end));
        Self::from_sorted(pairs)
    }

    /// A range map with no pairs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a range map from pairs that must already be sorted by target
    /// start. Out-of-order input is reported as overlap.
    pub(crate) fn from_sorted(pairs: Vec<MappedRange>) -> Result<Self, RangeMapError> {
        let mut previous: Option<TextRange> = None;
        for pair in &pairs {
            for range in [pair.target, pair.source] {
                if range.start > range.end {
                    return Err(RangeMapError::InvalidRange {
                        start: range.start,
                        end: range.end,
                    });
                }
            }
            if pair.target.is_empty() {
                return Err(RangeMapError::EmptyTarget {
                    offset: pair.target.start,
                });
            }
            if pair.literal && pair.source.is_empty() {
                return Err(RangeMapError::EmptyLiteralSource {
                    target: pair.target,
                });
            }
            if let Some(prev) = previous {
                if pair.target.start < prev.end {
                    return Err(RangeMapError::OverlappingTargets {
                        previous: prev,
                        next: pair.target,
                    });
                }
            }
            previous = Some(pair.target);
        }

        let mut by_source: Vec<u32> = (0..pairs.len() as u32).collect();
        by_source.sort_by_key(|&i| pairs[i as usize].source.start);
        Ok(Self { pairs, by_source })
    }

    /// The mapping pairs, sorted by target start.
    pub fn pairs(&self) -> &[MappedRange] {
        &self.pairs
    }

    /// Number of mapping pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if the map has no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Maps a range of expansion text to the invocation ranges it came from.
    ///
    /// The result is ordered by target position and may hold zero, one or
    /// several ranges. An empty `range` is treated as a caret position and
    /// only resolves through literal pairs.
    pub fn map_target_to_source(&self, range: TextRange) -> Vec<TextRange> {
        let first = self.pairs.partition_point(|p| p.target.end <= range.start);

        if range.is_empty() {
            return self
                .pairs
                .get(first)
                .filter(|p| p.literal && p.target.contains(range.start))
                .map(|p| vec![TextRange::empty(project_offset(p.target, p.source, range.start))])
                .unwrap_or_default();
        }

        self.pairs[first..]
            .iter()
            .take_while(|p| p.target.start < range.end)
            .filter_map(|p| clip(p.target, p.source, p.literal, range))
            .collect()
    }

    /// Maps a range of invocation text to every expansion range produced
    /// from it, ordered by target position.
    pub fn map_source_to_target(&self, range: TextRange) -> Vec<TextRange> {
        let candidates = self
            .by_source
            .partition_point(|&i| self.pairs[i as usize].source.start <= range.end);

        let mut mapped: Vec<TextRange> = self.by_source[..candidates]
            .iter()
            .map(|&i| &self.pairs[i as usize])
            .filter_map(|p| {
                if range.is_empty() {
                    (p.literal && p.source.contains(range.start))
                        .then(|| TextRange::empty(project_offset(p.source, p.target, range.start)))
                } else {
                    clip(p.source, p.target, p.literal, range)
                }
            })
            .collect();
        mapped.sort_unstable();
        mapped
    }

    /// Resolves a single expansion offset (e.g. a diagnostic position) to the
    /// invocation offset it was copied from.
    pub fn map_offset_to_source(&self, offset: u32) -> Option<u32> {
        self.map_target_to_source(TextRange::empty(offset))
            .first()
            .map(|r| r.start)
    }

    /// Resolves an invocation offset to every expansion offset copied from it.
    pub fn map_offset_to_target(&self, offset: u32) -> Vec<u32> {
        self.map_source_to_target(TextRange::empty(offset))
            .into_iter()
            .map(|r| r.start)
            .collect()
    }
}

/// Maps `query` through one pair in the `from -> to` direction.
///
/// A pair fully covered by the query maps to the whole of `to`. A partially
/// covered pair maps to a proportional slice of `to` when literal, and to
/// nothing otherwise.
fn clip(from: TextRange, to: TextRange, literal: bool, query: TextRange) -> Option<TextRange> {
    if query.contains_range(from) {
        return Some(to);
    }
    let overlap = from.intersect(query)?;
    literal.then(|| TextRange {
        start: project_offset(from, to, overlap.start),
        end: project_end(from, to, overlap.end),
    })
}

/// Projects an offset inside `from` onto `to`, rounding down.
fn project_offset(from: TextRange, to: TextRange, offset: u32) -> u32 {
    if from.len() == to.len() {
        return to.start + (offset - from.start);
    }
    if from.is_empty() {
        return to.start;
    }
    let scaled = u64::from(offset - from.start) * u64::from(to.len()) / u64::from(from.len());
    to.start + scaled as u32
}

/// Projects an end offset inside `from` onto `to`, rounding up so the
/// projected slice never loses its last partially covered unit.
fn project_end(from: TextRange, to: TextRange, offset: u32) -> u32 {
    if from.len() == to.len() {
        return to.start + (offset - from.start);
    }
    if from.is_empty() {
        return to.end;
    }
    let scaled = (u64::from(offset - from.start) * u64::from(to.len())).div_ceil(u64::from(from.len()));
    to.start + scaled as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u32, end: u32) -> TextRange {
        TextRange::new(start, end)
    }

    /// `foo!(a, b)` expanding to `a + b`.
    fn foo_expansion() -> RangeMap {
        RangeMap::new(vec![
            MappedRange::literal(r(4, 5), r(8, 9)),
            MappedRange::literal(r(0, 1), r(5, 6)),
            MappedRange::synthesized(r(1, 4), r(0, 10)),
        ])
        .unwrap()
    }

    #[test]
    fn pairs_sorted_by_target() {
        let map = foo_expansion();
        let starts: Vec<u32> = map.pairs().iter().map(|p| p.target.start).collect();
        assert_eq!(starts, vec![0, 1, 4]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn diagnostic_offset_resolves_to_source() {
        let map = foo_expansion();
        assert_eq!(map.map_offset_to_source(4), Some(8));
        assert_eq!(map.map_offset_to_source(0), Some(5));
    }

    #[test]
    fn offset_inside_synthesized_pair_is_unattributed() {
        let map = foo_expansion();
        assert_eq!(map.map_offset_to_source(2), None);
    }

    #[test]
    fn offset_past_end_is_unattributed() {
        let map = foo_expansion();
        assert_eq!(map.map_offset_to_source(5), None);
        assert_eq!(map.map_offset_to_source(100), None);
    }

    #[test]
    fn whole_text_maps_every_pair() {
        let map = foo_expansion();
        let mapped = map.map_target_to_source(r(0, 5));
        assert_eq!(mapped, vec![r(5, 6), r(0, 10), r(8, 9)]);
    }

    #[test]
    fn partial_synthesized_overlap_is_dropped() {
        let map = foo_expansion();
        // Covers "a" fully and only part of " + ".
        let mapped = map.map_target_to_source(r(0, 2));
        assert_eq!(mapped, vec![r(5, 6)]);
    }

    #[test]
    fn partial_literal_overlap_is_clipped() {
        let map = RangeMap::new(vec![MappedRange::literal(r(10, 20), r(100, 110))]).unwrap();
        assert_eq!(map.map_target_to_source(r(12, 15)), vec![r(102, 105)]);
        assert_eq!(map.map_target_to_source(r(5, 12)), vec![r(100, 102)]);
        assert_eq!(map.map_target_to_source(r(18, 30)), vec![r(108, 110)]);
    }

    #[test]
    fn literal_clip_scales_when_lengths_differ() {
        let map = RangeMap::new(vec![MappedRange::literal(r(0, 10), r(0, 5))]).unwrap();
        assert_eq!(map.map_target_to_source(r(2, 5)), vec![r(1, 3)]);
        assert_eq!(map.map_offset_to_source(9), Some(4));
    }

    #[test]
    fn unmapped_gap_yields_nothing() {
        let map = RangeMap::new(vec![
            MappedRange::literal(r(0, 2), r(0, 2)),
            MappedRange::literal(r(6, 8), r(6, 8)),
        ])
        .unwrap();
        assert!(map.map_target_to_source(r(3, 5)).is_empty());
    }

    #[test]
    fn reverse_mapping_finds_repetitions() {
        // `dup!(x)` expanding to `x x`.
        let map = RangeMap::new(vec![
            MappedRange::literal(r(0, 1), r(5, 6)),
            MappedRange::literal(r(2, 3), r(5, 6)),
        ])
        .unwrap();
        assert_eq!(map.map_source_to_target(r(5, 6)), vec![r(0, 1), r(2, 3)]);
        assert_eq!(map.map_offset_to_target(5), vec![0, 2]);
    }

    #[test]
    fn reverse_mapping_symmetry_for_literals() {
        let map = foo_expansion();
        assert_eq!(map.map_source_to_target(r(8, 9)), vec![r(4, 5)]);
        assert_eq!(map.map_source_to_target(r(5, 6)), vec![r(0, 1)]);
    }

    #[test]
    fn reverse_partial_synthesized_overlap_is_dropped() {
        let map = foo_expansion();
        // Covers part of the synthesized source `foo!(a, b)` and all of `a`.
        assert_eq!(map.map_source_to_target(r(5, 6)), vec![r(0, 1)]);
        // Covering the whole invocation picks up every pair.
        assert_eq!(map.map_source_to_target(r(0, 10)), vec![r(0, 1), r(1, 4), r(4, 5)]);
    }

    #[test]
    fn overlapping_targets_rejected() {
        let err = RangeMap::new(vec![
            MappedRange::literal(r(0, 4), r(0, 4)),
            MappedRange::literal(r(3, 6), r(10, 13)),
        ])
        .unwrap_err();
        assert!(matches!(err, RangeMapError::OverlappingTargets { .. }));
    }

    #[test]
    fn empty_target_rejected() {
        let err = RangeMap::new(vec![MappedRange::synthesized(r(3, 3), r(0, 1))]).unwrap_err();
        assert!(matches!(err, RangeMapError::EmptyTarget { offset: 3 }));
    }

    #[test]
    fn inverted_ranges_rejected() {
        let inverted = TextRange { start: 5, end: 3 };
        let err = RangeMap::new(vec![MappedRange::literal(r(0, 2), inverted)]).unwrap_err();
        assert!(matches!(err, RangeMapError::InvalidRange { start: 5, end: 3 }));

        let err = RangeMap::new(vec![MappedRange::synthesized(
            TextRange { start: 4, end: 1 },
            r(0, 1),
        )])
        .unwrap_err();
        assert!(matches!(err, RangeMapError::InvalidRange { start: 4, end: 1 }));
    }

    #[test]
    fn inverted_pair_from_json_rejected() {
        let json = r#"{"target":{"start":4,"end":1},"source":{"start":0,"end":1},"literal":false}"#;
        assert!(serde_json::from_str::<MappedRange>(json).is_err());
    }

    #[test]
    fn literal_pair_needs_source_text() {
        let err = RangeMap::new(vec![MappedRange::literal(r(0, 2), TextRange::empty(3))])
            .unwrap_err();
        assert!(matches!(err, RangeMapError::EmptyLiteralSource { .. }));
    }

    #[test]
    fn synthesized_pair_may_have_empty_source() {
        let map = RangeMap::new(vec![MappedRange::synthesized(r(0, 2), TextRange::empty(3))])
            .unwrap();
        assert_eq!(map.map_target_to_source(r(0, 2)), vec![TextRange::empty(3)]);
        assert_eq!(map.map_source_to_target(TextRange::empty(3)), Vec::<TextRange>::new());
    }

    #[test]
    fn adjacent_targets_allowed() {
        let map = RangeMap::new(vec![
            MappedRange::literal(r(0, 3), r(0, 3)),
            MappedRange::literal(r(3, 6), r(3, 6)),
        ])
        .unwrap();
        assert_eq!(map.map_target_to_source(r(2, 4)), vec![r(2, 3), r(3, 4)]);
    }

    #[test]
    fn empty_map_maps_nothing() {
        let map = RangeMap::empty();
        assert!(map.is_empty());
        assert!(map.map_target_to_source(r(0, 10)).is_empty());
        assert!(map.map_source_to_target(r(0, 10)).is_empty());
    }

    #[test]
    fn equal_maps_regardless_of_input_order() {
        let a = RangeMap::new(vec![
            MappedRange::literal(r(0, 1), r(5, 6)),
            MappedRange::literal(r(4, 5), r(8, 9)),
        ])
        .unwrap();
        let b = RangeMap::new(vec![
            MappedRange::literal(r(4, 5), r(8, 9)),
            MappedRange::literal(r(0, 1), r(5, 6)),
        ])
        .unwrap();
        assert_eq!(a, b);
    }
}
