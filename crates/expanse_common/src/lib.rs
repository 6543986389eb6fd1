//! Shared foundational types used across the Expanse crates.
//!
//! Currently this is the [`ContentHash`] used to identify macro call sites and
//! macro definitions by content rather than by modification time.

#![warn(missing_docs)]

pub mod hash;

pub use hash::ContentHash;
