//! Reading files attested by a scheme manager index

use std::fs;
use std::path::Path;

use irma_core::{FileHash, SchemeManagerIndex};

use crate::error::{IntegrityError, SchemeError};

/// Read `rel` (relative to the configuration root) and check its hash
/// against `index`.
///
/// Returns `Ok(None)` when the index does not list `rel`. A listed file
/// that cannot be read is an I/O error; a hash mismatch is an integrity
/// error.
pub fn read_authenticated(
    root: &Path,
    index: &SchemeManagerIndex,
    rel: &str,
) -> Result<Option<Vec<u8>>, SchemeError> {
    let Some(expected) = index.get(rel) else {
        return Ok(None);
    };

    let path = root.join(rel);
    let bytes = fs::read(&path).map_err(|e| SchemeError::io(&path, e))?;

    check_hash(rel, expected, &bytes)?;
    Ok(Some(bytes))
}

/// Compare `bytes` against the expected index hash for `rel`
pub fn check_hash(rel: &str, expected: &FileHash, bytes: &[u8]) -> Result<(), IntegrityError> {
    let actual = FileHash::of(bytes);
    if &actual != expected {
        return Err(IntegrityError {
            path: rel.to_string(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}
