//! Compact binary payload for persisted range maps.
//!
//! Layout (bincode standard configuration, so integers are varints):
//!
//! ```text
//! payload := pair_count:varint | pair*
//! pair    := target_start:varint | target_len:varint |
//!            source_start:varint | source_len:varint | flags:u8
//! flags   := bit0: literal copy
//! ```
//!
//! The schema version that precedes the payload in a stored record is owned
//! by the store, not by this codec.

use serde::{Deserialize, Serialize};

use crate::error::RangeMapError;
use crate::range::TextRange;
use crate::range_map::{MappedRange, RangeMap};

/// Flag bit marking a pair as a verbatim copy of source text.
const FLAG_LITERAL: u8 = 0b0000_0001;

/// On-disk form of one mapping pair.
#[derive(Serialize, Deserialize)]
struct WirePair {
    target_start: u32,
    target_len: u32,
    source_start: u32,
    source_len: u32,
    flags: u8,
}

impl From<&MappedRange> for WirePair {
    fn from(pair: &MappedRange) -> Self {
        Self {
            target_start: pair.target.start,
            target_len: pair.target.len(),
            source_start: pair.source.start,
            source_len: pair.source.len(),
            flags: if pair.literal { FLAG_LITERAL } else { 0 },
        }
    }
}

impl TryFrom<WirePair> for MappedRange {
    type Error = RangeMapError;

    fn try_from(wire: WirePair) -> Result<Self, Self::Error> {
        if wire.flags & !FLAG_LITERAL != 0 {
            return Err(corrupt(format!("unknown flag bits {:#04x}", wire.flags)));
        }
        let target = TextRange::at(wire.target_start, wire.target_len)
            .ok_or_else(|| corrupt("target range overflows".to_string()))?;
        let source = TextRange::at(wire.source_start, wire.source_len)
            .ok_or_else(|| corrupt("source range overflows".to_string()))?;
        Ok(Self {
            target,
            source,
            literal: wire.flags & FLAG_LITERAL != 0,
        })
    }
}

fn corrupt(reason: String) -> RangeMapError {
    RangeMapError::Corrupt { reason }
}

impl RangeMap {
    /// Encodes the map into its compact binary payload.
    pub fn serialize(&self) -> Result<Vec<u8>, RangeMapError> {
        let wire: Vec<WirePair> = self.pairs().iter().map(WirePair::from).collect();
        bincode::serde::encode_to_vec(&wire, bincode::config::standard()).map_err(|e| {
            RangeMapError::Encode {
                reason: e.to_string(),
            }
        })
    }

    /// Decodes a payload produced by [`RangeMap::serialize`].
    ///
    /// Fails closed: truncated input, trailing bytes, unknown flags,
    /// overflowing offsets and out-of-order or overlapping target ranges are
    /// all reported as [`RangeMapError::Corrupt`]. A partial map is never
    /// returned.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, RangeMapError> {
        let (wire, read): (Vec<WirePair>, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| corrupt(e.to_string()))?;
        if read != bytes.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after {} pairs",
                bytes.len() - read,
                wire.len()
            )));
        }

        let pairs = wire
            .into_iter()
            .map(MappedRange::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        RangeMap::from_sorted(pairs).map_err(|e| match e {
            RangeMapError::Corrupt { .. } => e,
            other => corrupt(other.to_string()),
        })
    }
}
