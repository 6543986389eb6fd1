//! Expansion identity: mixed call/definition fingerprints and the file names
//! that carry them.
//!
//! An expansion is valid exactly as long as both the macro call and the macro
//! definition it resolves to are unchanged, so its identity is a hash of the
//! two rather than a timestamp. The identity is encoded at the front of the
//! synthetic expansion file's name, which lets a lookup decide staleness
//! without opening the stored record.

use std::fmt;

use expanse_common::ContentHash;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::backend::TEMP_PREFIX;
use crate::error::CacheError;

/// Domain tag hashed ahead of the two inputs.
const MIX_DOMAIN: &[u8] = b"expanse.mix.v1";

/// Separates the fingerprint prefix from the rest of an expansion file name.
pub const NAME_DELIMITER: char = '_';

/// Suffix of the file names produced by [`ExpansionFile::for_fingerprint`].
const EXPANSION_SUFFIX: &str = "expansion.rs";

/// Identity of one macro expansion: the call-site hash mixed with the hash of
/// the macro definition it resolved to.
///
/// Mixing is order-sensitive, so `mix(a, b)` and `mix(b, a)` differ.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Mixes a call hash with a definition hash.
    pub fn mix(call: ContentHash, definition: ContentHash) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(MIX_DOMAIN);
        hasher.update(call.as_bytes());
        hasher.update(definition.as_bytes());
        Self(ContentHash::from_raw(hasher.digest128().to_le_bytes()))
    }

    /// Fingerprint of a call text expanded against a definition text.
    pub fn of_texts(call_text: &str, definition_text: &str) -> Self {
        Self::mix(
            ContentHash::from_bytes(call_text.as_bytes()),
            ContentHash::from_bytes(definition_text.as_bytes()),
        )
    }

    /// The underlying hash.
    pub fn hash(&self) -> ContentHash {
        self.0
    }

    /// Lossless, sortable textual form used as a file name prefix.
    pub fn to_name_prefix(&self) -> String {
        self.0.to_string()
    }

    /// Parses a prefix produced by [`Fingerprint::to_name_prefix`].
    ///
    /// Anything else yields `None`: foreign files may share the directory.
    pub fn from_name_prefix(prefix: &str) -> Option<Self> {
        ContentHash::from_hex(prefix).map(Self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        Self::from_name_prefix(&hex).ok_or_else(|| format!("invalid fingerprint {hex:?}"))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_name_prefix()
    }
}

/// Name of a synthetic expansion file; the key of every stored record.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpansionFile(String);

impl ExpansionFile {
    /// Validates a file name.
    ///
    /// Names must be non-empty, must not be `.` or `..`, must not contain
    /// path separators or NUL, and must not start with the prefix the
    /// filesystem store uses for in-flight writes.
    pub fn new(name: impl Into<String>) -> Result<Self, CacheError> {
        let name = name.into();
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
            || name.starts_with(TEMP_PREFIX);
        if invalid {
            return Err(CacheError::InvalidFileName { name });
        }
        Ok(Self(name))
    }

    /// The canonical file for an expansion with the given fingerprint.
    pub fn for_fingerprint(fingerprint: Fingerprint) -> Self {
        Self(format!(
            "{}{NAME_DELIMITER}{EXPANSION_SUFFIX}",
            fingerprint.to_name_prefix()
        ))
    }

    /// The file name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Decodes the fingerprint from the part of the name before the last
    /// delimiter. Returns `None` for files not named by this crate.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        let (prefix, _) = self.0.rsplit_once(NAME_DELIMITER)?;
        Fingerprint::from_name_prefix(prefix)
    }
}

impl fmt::Display for ExpansionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ExpansionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpansionFile({})", self.0)
    }
}

impl TryFrom<String> for ExpansionFile {
    type Error = CacheError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<ExpansionFile> for String {
    fn from(file: ExpansionFile) -> Self {
        file.0
    }
}
