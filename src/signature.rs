//! Scheme manager index signatures
//!
//! A scheme manager folder is trusted when `index.sig` is a valid ECDSA
//! P-256 signature over the SHA-256 digest of `index`, made with the key
//! in `pk.pem`:
//! - `pk.pem`: PEM-encoded SubjectPublicKeyInfo
//! - `index.sig`: DER `SEQUENCE { INTEGER r, INTEGER s }`
//!
//! Malformed keys and signatures are reported as errors; a well-formed
//! signature that does not match is `Ok(false)`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};

/// Signed index file name
pub const INDEX_FILE: &str = "index";

/// Detached index signature file name
pub const SIGNATURE_FILE: &str = "index.sig";

/// Scheme manager public key file name
pub const PUBLIC_KEY_FILE: &str = "pk.pem";

const PEM_PUBLIC_KEY_LABEL: &str = "-----BEGIN PUBLIC KEY-----";

/// Signature verification errors
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing {file} in {}", .path.display())]
    MissingFile { file: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid scheme manager public key: {0}")]
    InvalidKey(String),

    #[error("malformed index signature: {0}")]
    MalformedSignature(String),

    #[error("scheme manager index signature is invalid")]
    Invalid,
}

fn read_required(dir: &Path, file: &'static str) -> Result<Vec<u8>, SignatureError> {
    let path = dir.join(file);
    match fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(SignatureError::MissingFile { file, path: dir.to_path_buf() })
        }
        Err(source) => Err(SignatureError::Io { path, source }),
    }
}

/// Parse a PEM SubjectPublicKeyInfo holding a P-256 key
pub fn parse_public_key_pem(pem: &[u8]) -> Result<VerifyingKey, SignatureError> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| SignatureError::InvalidKey("public key is not UTF-8".to_string()))?;
    if !text.contains(PEM_PUBLIC_KEY_LABEL) {
        return Err(SignatureError::InvalidKey(
            "no PEM public key block found".to_string(),
        ));
    }
    VerifyingKey::from_public_key_pem(text.trim())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// Parse a DER-encoded ECDSA signature
pub fn parse_signature_der(der: &[u8]) -> Result<Signature, SignatureError> {
    if der.is_empty() {
        return Err(SignatureError::MalformedSignature("empty signature".to_string()));
    }
    Signature::from_der(der).map_err(|e| SignatureError::MalformedSignature(e.to_string()))
}

/// Verify `signature` over the SHA-256 digest of `message`
pub fn verify_digest(key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    let digest = Sha256::digest(message);
    key.verify_prehash(&digest, signature).is_ok()
}

/// Check the index signature of the scheme manager folder at `manager_dir`
pub fn verify_signature(manager_dir: &Path) -> Result<bool, SignatureError> {
    let index = read_required(manager_dir, INDEX_FILE)?;
    let sig = read_required(manager_dir, SIGNATURE_FILE)?;
    let pem = read_required(manager_dir, PUBLIC_KEY_FILE)?;

    let key = parse_public_key_pem(&pem)?;
    let signature = parse_signature_der(&sig)?;
    Ok(verify_digest(&key, &index, &signature))
}
