//! Synchronizing scheme managers from their remote source
//!
//! Updating a manager:
//! 1. Back up `index` and `index.sig` (to `*.backup`)
//! 2. Download the new `index` and `index.sig`
//! 3. Verify them; on any failure restore the backups
//! 4. Download every file whose hash changed or that is missing on disk,
//!    checking each download against the new index before writing it
//! 5. Replace the in-memory index
//!
//! The parsed graph is not refreshed here; `download` reparses when
//! anything arrived.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::{debug, info, warn};

use irma_core::{IdentifierSet, SchemeManagerId, SchemeManagerIndex};

use crate::authenticated::check_hash;
use crate::cancel::CancelToken;
use crate::configuration::Configuration;
use crate::disk;
use crate::error::{ConfigurationError, ConfigurationResult, SchemeError, SchemeResult};
use crate::scheme::{decode, join_url, SchemeManager, DESCRIPTION_FILE};
use crate::signature::{self, SignatureError, INDEX_FILE, PUBLIC_KEY_FILE, SIGNATURE_FILE};

const BACKUP_SUFFIX: &str = ".backup";

fn manager_description_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^/]+)/description\.xml$").expect("valid regex"))
}

fn issuer_description_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^/]+)/([^/]+)/description\.xml$").expect("valid regex"))
}

fn credential_description_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^/]+)/([^/]+)/Issues/([^/]+)/description\.xml$").expect("valid regex")
    })
}

fn public_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^/]+)/([^/]+)/PublicKeys/([0-9]+)\.xml$").expect("valid regex")
    })
}

/// Add the object described by the index path `path` to `set`
fn record_download(set: &mut IdentifierSet, path: &str) {
    if let Some(c) = manager_description_pattern().captures(path) {
        set.scheme_managers.insert(SchemeManagerId::new(&c[1]));
    } else if let Some(c) = issuer_description_pattern().captures(path) {
        set.issuers.insert(SchemeManagerId::new(&c[1]).issuer(&c[2]));
    } else if let Some(c) = credential_description_pattern().captures(path) {
        set.credential_types
            .insert(SchemeManagerId::new(&c[1]).issuer(&c[2]).credential_type(&c[3]));
    } else if let Some(c) = public_key_pattern().captures(path) {
        if let Ok(counter) = c[3].parse::<u32>() {
            set.add_public_key(SchemeManagerId::new(&c[1]).issuer(&c[2]), counter);
        }
    }
}

/// Normalize a user-supplied scheme manager URL: default to HTTPS and strip
/// a trailing `/` or `/description.xml`
pub fn normalize_scheme_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("https://{}", url);
    }
    if url.ends_with('/') {
        url.pop();
    }
    if let Some(stripped) = url.strip_suffix(&format!("/{}", DESCRIPTION_FILE)) {
        url = stripped.to_string();
    }
    url
}

/// Copies of `index` and `index.sig` taken before they are replaced
struct SignatureBackup {
    files: Vec<(PathBuf, PathBuf, bool)>,
}

impl SignatureBackup {
    fn create(dir: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        for name in [INDEX_FILE, SIGNATURE_FILE] {
            let original = dir.join(name);
            let backup = dir.join(format!("{}{}", name, BACKUP_SUFFIX));
            let existed = original.is_file();
            if existed {
                disk::copy_file(&original, &backup)?;
            }
            files.push((original, backup, existed));
        }
        Ok(Self { files })
    }

    /// Put the old files back; files that did not exist before are removed
    fn restore(self) -> io::Result<()> {
        for (original, backup, existed) in self.files {
            if existed {
                disk::copy_file(&backup, &original)?;
                fs::remove_file(&backup)?;
            } else if original.exists() {
                fs::remove_file(&original)?;
            }
        }
        Ok(())
    }

    fn discard(self) -> io::Result<()> {
        for (_, backup, existed) in self.files {
            if existed {
                fs::remove_file(&backup)?;
            }
        }
        Ok(())
    }
}

impl Configuration {
    /// Download and verify the latest `index` and `index.sig` of a manager.
    ///
    /// On any failure the previous files are restored byte for byte. Returns
    /// the new index.
    pub fn download_scheme_manager_signature(
        &self,
        id: &SchemeManagerId,
        url: &str,
        cancel: &CancelToken,
    ) -> SchemeResult<SchemeManagerIndex> {
        let dir = self.manager_dir(id);
        disk::ensure_directory_exists(&dir).map_err(|e| SchemeError::io(&dir, e))?;
        let backup = SignatureBackup::create(&dir).map_err(|e| SchemeError::io(&dir, e))?;

        match self.fetch_signed_index(id, url, &dir, cancel) {
            Ok(index) => {
                backup.discard().map_err(|e| SchemeError::io(&dir, e))?;
                Ok(index)
            }
            Err(err) => {
                warn!(manager = %id, error = %err, "restoring previous scheme manager index");
                backup.restore().map_err(|e| SchemeError::io(&dir, e))?;
                Err(err)
            }
        }
    }

    fn fetch_signed_index(
        &self,
        id: &SchemeManagerId,
        url: &str,
        dir: &Path,
        cancel: &CancelToken,
    ) -> SchemeResult<SchemeManagerIndex> {
        self.transport
            .get_file(&join_url(url, INDEX_FILE), &dir.join(INDEX_FILE), cancel)?;
        self.transport
            .get_file(&join_url(url, SIGNATURE_FILE), &dir.join(SIGNATURE_FILE), cancel)?;

        if !signature::verify_signature(dir)? {
            return Err(SignatureError::Invalid.into());
        }
        self.load_index(id)
    }

    /// Bring a manager's files in line with its remote index.
    ///
    /// Identifiers of downloaded issuer, credential type and public key files
    /// are added to `downloaded` when given.
    pub fn update_scheme_manager(
        &mut self,
        id: &SchemeManagerId,
        downloaded: Option<&mut IdentifierSet>,
        cancel: &CancelToken,
    ) -> ConfigurationResult<()> {
        let manager = self
            .scheme_managers
            .get(id)
            .ok_or_else(|| ConfigurationError::UnknownSchemeManager(id.clone()))?;
        let url = manager.url.clone();
        let old_index = manager.index.clone();

        info!(manager = %id, url = %url, "updating scheme manager");
        let new_index = self.download_scheme_manager_signature(id, &url, cancel)?;

        let written =
            self.download_changed_files(id, &url, &old_index, &new_index, downloaded, cancel);
        // Keys on disk may have changed even when a later download failed
        if !matches!(written, Ok(0)) {
            self.drop_cached_keys(id);
        }
        let changed = written?;

        if let Some(manager) = self.scheme_managers.get_mut(id) {
            manager.index = new_index;
        }
        info!(manager = %id, files = changed, "scheme manager updated");
        Ok(())
    }

    /// Download every file of `new_index` that changed since `old_index` or
    /// is missing on disk. Returns the number of files written.
    fn download_changed_files(
        &self,
        id: &SchemeManagerId,
        url: &str,
        old_index: &SchemeManagerIndex,
        new_index: &SchemeManagerIndex,
        mut downloaded: Option<&mut IdentifierSet>,
        cancel: &CancelToken,
    ) -> ConfigurationResult<usize> {
        let prefix = format!("{}/", id.as_str());
        let mut changed = 0usize;
        for (path, hash) in new_index.iter() {
            let dest = self.path.join(path);
            if old_index.get(path) == Some(hash) && dest.exists() {
                continue;
            }

            let remote = path.strip_prefix(&prefix).unwrap_or(path);
            let bytes = self
                .transport
                .get_bytes(&join_url(url, remote), cancel)
                .map_err(SchemeError::from)?;
            check_hash(path, hash, &bytes).map_err(SchemeError::from)?;
            disk::save_file(&dest, &bytes).map_err(|e| ConfigurationError::io(&dest, e))?;
            debug!(path, "downloaded");

            changed += 1;
            if let Some(set) = downloaded.as_deref_mut() {
                record_download(set, path);
            }
        }
        Ok(changed)
    }

    /// Make sure everything in `wanted` is available, updating each manager
    /// that is missing something exactly once. Returns what was downloaded;
    /// the configuration is reparsed when that is non-empty.
    pub fn download(
        &mut self,
        wanted: &IdentifierSet,
        cancel: &CancelToken,
    ) -> ConfigurationResult<IdentifierSet> {
        let mut managers = BTreeSet::new();

        for issuer in &wanted.issuers {
            if !self.issuers.contains_key(issuer) {
                managers.insert(issuer.scheme_manager_id());
            }
        }
        for (issuer, counters) in &wanted.public_keys {
            for counter in counters {
                if self.public_key(issuer, *counter)?.is_none() {
                    managers.insert(issuer.scheme_manager_id());
                }
            }
        }
        for cred in &wanted.credential_types {
            if !self.credential_types.contains_key(cred) {
                managers.insert(cred.scheme_manager_id());
            }
        }

        let mut downloaded = IdentifierSet::new();
        for id in &managers {
            self.update_scheme_manager(id, Some(&mut downloaded), cancel)?;
        }

        if !downloaded.is_empty() {
            self.parse_folder()?;
        }
        Ok(downloaded)
    }

    /// Fetch and decode the description of a scheme manager that is not
    /// installed yet
    pub fn fetch_scheme_manager(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> ConfigurationResult<SchemeManager> {
        let url = normalize_scheme_url(url);
        let bytes = self
            .transport
            .get_bytes(&join_url(&url, DESCRIPTION_FILE), cancel)?;

        let mut manager: SchemeManager = decode(DESCRIPTION_FILE, &bytes)?;
        SchemeManagerId::parse(manager.id.as_str())?;
        manager.url = url;
        Ok(manager)
    }

    /// Download a fetched manager into the configuration and parse it
    pub fn install_scheme_manager(
        &mut self,
        manager: SchemeManager,
        cancel: &CancelToken,
    ) -> ConfigurationResult<()> {
        let id = SchemeManagerId::parse(manager.id.as_str())?;
        let dir = self.manager_dir(&id);
        disk::ensure_directory_exists(&dir).map_err(|e| ConfigurationError::io(&dir, e))?;

        self.transport.get_file(
            &manager.file_url(DESCRIPTION_FILE),
            &dir.join(DESCRIPTION_FILE),
            cancel,
        )?;
        self.transport.get_file(
            &manager.file_url(PUBLIC_KEY_FILE),
            &dir.join(PUBLIC_KEY_FILE),
            cancel,
        )?;

        let mut pending = SchemeManager::new(id.clone());
        pending.url = manager.url.clone();
        self.scheme_managers.insert(id.clone(), pending);

        if let Err(err) = self.update_scheme_manager(&id, None, cancel) {
            self.scheme_managers.remove(&id);
            return Err(err);
        }

        self.disabled_scheme_managers.remove(&id);
        self.parse_scheme_manager_folder(&dir, manager)?;
        info!(manager = %id, "installed scheme manager");
        Ok(())
    }
}
