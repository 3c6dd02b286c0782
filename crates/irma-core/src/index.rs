//! Scheme manager index (the `index` file)
//!
//! The index lists every authenticated file under a scheme manager together
//! with the SHA-256 hash of its contents. One line per entry:
//!
//! ```text
//! <lowercase-hex sha256> <relative-path>
//! ```
//!
//! Serialization sorts entries by path so that the signed bytes are
//! reproducible; parsing accepts any order.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a file hash
pub const HASH_LENGTH: usize = 32;

/// SHA-256 hash of an authenticated file
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHash([u8; HASH_LENGTH]);

impl FileHash {
    /// Hash the given file contents
    pub fn of(contents: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        Self(hasher.finalize().into())
    }

    /// Decode a hex-encoded hash; anything but 64 hex digits is rejected
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; HASH_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }
}

impl From<[u8; HASH_LENGTH]> for FileHash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHash({})", self.to_hex())
    }
}

/// Errors from parsing an index
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("scheme manager index line {line} has {found} parts, expected 2")]
    MalformedLine { line: usize, found: usize },

    #[error("scheme manager index line {line} has an invalid hash: {source}")]
    InvalidHash {
        line: usize,
        #[source]
        source: hex::FromHexError,
    },
}

/// Signed list of files under a scheme manager with their hashes
///
/// Paths are relative to the configuration root and therefore start with
/// the scheme manager name, e.g. `irma-demo/RU/description.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemeManagerIndex {
    entries: BTreeMap<String, FileHash>,
}

impl SchemeManagerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse index text. Line numbers in errors are 1-based.
    ///
    /// Duplicate paths are allowed; the last occurrence wins.
    pub fn parse(text: &str) -> Result<Self, IndexError> {
        let mut entries = BTreeMap::new();

        for (i, line) in text.split('\n').enumerate() {
            let line_no = i + 1;
            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 2 {
                return Err(IndexError::MalformedLine {
                    line: line_no,
                    found: parts.len(),
                });
            }

            let hash = FileHash::from_hex(parts[0]).map_err(|source| IndexError::InvalidHash {
                line: line_no,
                source,
            })?;
            entries.insert(parts[1].to_string(), hash);
        }

        Ok(Self { entries })
    }

    /// Canonical text form: sorted by path, one `<hash> <path>` line each
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (path, hash) in &self.entries {
            out.push_str(&hash.to_hex());
            out.push(' ');
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Insert or replace an entry, returning the previous hash
    pub fn insert(&mut self, path: impl Into<String>, hash: FileHash) -> Option<FileHash> {
        self.entries.insert(path.into(), hash)
    }

    pub fn get(&self, path: &str) -> Option<&FileHash> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileHash)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Display for SchemeManagerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for SchemeManagerIndex {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<(String, FileHash)> for SchemeManagerIndex {
    fn from_iter<I: IntoIterator<Item = (String, FileHash)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
