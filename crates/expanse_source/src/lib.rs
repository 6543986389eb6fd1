//! Text ranges and the range maps that tie macro expansions back to source.
//!
//! A macro expansion is synthesized text. Every diagnostic or navigation
//! target computed on that text has to be reported against the invocation
//! that produced it, so each expansion carries a [`RangeMap`]: a sorted set
//! of [`MappedRange`] pairs from expansion ("target") offsets to invocation
//! ("source") offsets. This crate also owns the compact binary payload the
//! map is persisted in, and [`LineIndex`] for reporting mapped offsets as
//! `line:col`.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod line_index;
pub mod range;
pub mod range_map;

pub use error::RangeMapError;
pub use line_index::{LineCol, LineIndex};
pub use range::TextRange;
pub use range_map::{MappedRange, RangeMap};
