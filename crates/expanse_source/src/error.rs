//! Error types for range map construction and decoding.

use crate::range::TextRange;

/// Errors produced while building or decoding a [`RangeMap`](crate::RangeMap).
#[derive(Debug, thiserror::Error)]
pub enum RangeMapError {
    /// A range whose start lies after its end.
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// The offending start offset.
        start: u32,
        /// The offending end offset.
        end: u32,
    },

    /// A mapping pair whose target range is empty.
    #[error("mapped target range at offset {offset} is empty")]
    EmptyTarget {
        /// Offset of the empty target range.
        offset: u32,
    },

    /// A literal pair whose source range is empty: there is no text to copy.
    #[error("literal pair at {target} has an empty source range")]
    EmptyLiteralSource {
        /// Target range of the offending pair.
        target: TextRange,
    },

    /// Two mapping pairs claim overlapping target text.
    #[error("target ranges {previous} and {next} overlap")]
    OverlappingTargets {
        /// The earlier of the two target ranges.
        previous: TextRange,
        /// The later of the two target ranges.
        next: TextRange,
    },

    /// A range map could not be encoded.
    #[error("failed to encode range map: {reason}")]
    Encode {
        /// Description of the encoder failure.
        reason: String,
    },

    /// Serialized range map bytes are malformed or truncated.
    #[error("corrupt range map data: {reason}")]
    Corrupt {
        /// Description of the problem.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_range_display() {
        let err = RangeMapError::InvalidRange { start: 9, end: 3 };
        assert_eq!(err.to_string(), "invalid range: start 9 is after end 3");
    }

    #[test]
    fn overlapping_display() {
        let err = RangeMapError::OverlappingTargets {
            previous: TextRange::new(0, 4),
            next: TextRange::new(2, 6),
        };
        assert_eq!(err.to_string(), "target ranges [0, 4) and [2, 6) overlap");
    }

    #[test]
    fn corrupt_display() {
        let err = RangeMapError::Corrupt {
            reason: "unexpected end of input".to_string(),
        };
        assert!(err.to_string().contains("unexpected end of input"));
    }

    #[test]
    fn empty_literal_source_display() {
        let err = RangeMapError::EmptyLiteralSource {
            target: TextRange::new(0, 2),
        };
        assert_eq!(
            err.to_string(),
            "literal pair at [0, 2) has an empty source range"
        );
    }

    #[test]
    fn empty_target_display() {
        let err = RangeMapError::EmptyTarget { offset: 12 };
        assert!(err.to_string().contains("offset 12"));
    }
}
