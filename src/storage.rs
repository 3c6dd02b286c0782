//! Client-side record storage
//!
//! A directory of JSON files, one per record kind, plus a `sigs/` folder
//! holding credential signatures named by the hash of their attribute list.
//! The directory itself is never created here; placing it somewhere
//! suitably protected is up to the application.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::disk;

pub const SECRET_KEY_FILE: &str = "sk";
pub const ATTRIBUTES_FILE: &str = "attrs";
pub const KEYSHARE_SERVERS_FILE: &str = "kss";
pub const PAILLIER_FILE: &str = "paillier";
pub const UPDATES_FILE: &str = "updates";
pub const LOGS_FILE: &str = "logs";
pub const PREFERENCES_FILE: &str = "preferences";
pub const SIGNATURES_DIR: &str = "sigs";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage path {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Check the storage directory exists and create `sigs/` inside it
    pub fn ensure_storage_exists(&self) -> Result<(), StorageError> {
        if !self.path.is_dir() {
            return Err(StorageError::Missing(self.path.clone()));
        }
        let sigs = self.file(SIGNATURES_DIR);
        disk::ensure_directory_exists(&sigs).map_err(|source| StorageError::Io {
            path: sigs,
            source,
        })
    }

    /// Load a record; `None` when it was never stored
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let path = self.file(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Json { path, source })
    }

    /// Store a record atomically
    pub fn store<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let path = self.file(name);
        let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        disk::save_file(&path, &bytes).map_err(|source| StorageError::Io { path, source })
    }

    /// Record name of the signature over `attributes`
    pub fn signature_name(attributes: &[String]) -> String {
        let mut hasher = Sha256::new();
        for attribute in attributes {
            hasher.update((attribute.len() as u64).to_be_bytes());
            hasher.update(attribute.as_bytes());
        }
        format!("{}/{}", SIGNATURES_DIR, hex::encode(hasher.finalize()))
    }

    pub fn store_signature<T: Serialize + ?Sized>(
        &self,
        attributes: &[String],
        signature: &T,
    ) -> Result<(), StorageError> {
        self.store(&Self::signature_name(attributes), signature)
    }

    /// Load the signature over `attributes`; a missing one is an error
    pub fn load_signature<T: DeserializeOwned>(&self, attributes: &[String]) -> Result<T, StorageError> {
        let name = Self::signature_name(attributes);
        self.load(&name)?
            .ok_or_else(|| StorageError::Missing(self.file(&name)))
    }

    pub fn delete_signature(&self, attributes: &[String]) -> Result<(), StorageError> {
        let path = self.file(&Self::signature_name(attributes));
        fs::remove_file(&path).map_err(|source| StorageError::Io { path, source })
    }
}
